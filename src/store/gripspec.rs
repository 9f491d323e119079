use crate::digest::{FINGERPRINT_HEX_LEN, GRIP_HEX_LEN};

/// Shortest fingerprint argument accepted on the command line. Leading
/// zeros of the size field may be trimmed by the caller, the digest half
/// may not.
const MIN_FINGERPRINT_ARG_LEN: usize = 21;

/// Parsed form of the external `[YYYY[.MM[.DD]]]GRIP` addressing syntax.
/// The date part narrows a colliding grip: matching is exact on the grip
/// plus a prefix match of `date_pattern` against the event's start
/// timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GripSpec {
    pub grip: String,
    /// SQL LIKE pattern against `start_dt`, e.g. `2024-01-%` or `%`.
    pub date_pattern: String,
}

/// Parse one grip-spec argument. Returns None for anything that is not a
/// well-formed spec; callers skip such arguments.
pub fn parse_grip_spec(raw: &str) -> Option<GripSpec> {
    if raw.len() < GRIP_HEX_LEN || !raw.is_char_boundary(raw.len() - GRIP_HEX_LEN) {
        return None;
    }
    let (date_part, grip) = raw.split_at(raw.len() - GRIP_HEX_LEN);
    if !grip.chars().all(is_lower_hex) {
        return None;
    }
    let date_pattern = parse_date_prefix(date_part)?;
    Some(GripSpec {
        grip: grip.to_string(),
        date_pattern,
    })
}

/// Year, month and day are progressively optional; each present component
/// tightens the prefix matched against the stored start timestamp.
fn parse_date_prefix(raw: &str) -> Option<String> {
    let trimmed = raw.strip_suffix('.').unwrap_or(raw);
    if trimmed.is_empty() {
        return if raw.is_empty() { Some("%".to_string()) } else { None };
    }

    let mut prefix = String::new();
    let parts: Vec<&str> = trimmed.split('.').collect();
    if parts.len() > 3 {
        return None;
    }
    for (idx, part) in parts.iter().enumerate() {
        let expected_len = if idx == 0 { 4 } else { 2 };
        if part.len() != expected_len || !part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if idx > 0 {
            prefix.push('-');
        }
        prefix.push_str(part);
    }
    prefix.push('%');
    Some(prefix)
}

/// Parse a fingerprint argument for purge, restoring trimmed leading
/// zeros to the full fixed width.
pub fn parse_fingerprint_arg(raw: &str) -> Option<String> {
    if !(MIN_FINGERPRINT_ARG_LEN..=FINGERPRINT_HEX_LEN).contains(&raw.len()) {
        return None;
    }
    if !raw.chars().all(is_lower_hex) {
        return None;
    }
    Some(format!("{raw:0>width$}", width = FINGERPRINT_HEX_LEN))
}

fn is_lower_hex(c: char) -> bool {
    c.is_ascii_digit() || ('a'..='f').contains(&c)
}
