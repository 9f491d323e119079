use chrono::{DateTime, Local, NaiveDateTime, Utc};

/// Canonical serialization format for timestamps persisted in the store.
/// Fractional seconds are always six digits so string comparison and the
/// date-prefix match used by grip-specs both work on the raw column value.
const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// A UTC wall-clock instant. The canonical string form is the only
/// representation that ever reaches the store or a digest input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Stamp(DateTime<Utc>);

impl Stamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_utc(value: DateTime<Utc>) -> Self {
        Self(value)
    }

    pub fn parse(raw: &str) -> Result<Self, chrono::ParseError> {
        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.fZ")?;
        Ok(Self(naive.and_utc()))
    }

    pub fn canonical(&self) -> String {
        self.0.format(CANONICAL_FORMAT).to_string()
    }

    /// Elapsed seconds since `earlier`, fractional.
    pub fn seconds_since(&self, earlier: &Stamp) -> f64 {
        let delta = self.0.signed_duration_since(earlier.0);
        delta.num_microseconds().map_or_else(
            || delta.num_seconds() as f64,
            |micros| micros as f64 / 1_000_000.0,
        )
    }

    /// Render in the local timezone with a strftime-style format string.
    pub fn format_local(&self, format: &str) -> String {
        self.0.with_timezone(&Local).format(format).to_string()
    }

    /// Render the UTC date components with a strftime-style format string.
    pub fn format_utc(&self, format: &str) -> String {
        self.0.format(format).to_string()
    }
}

impl std::fmt::Display for Stamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical())
    }
}
