pub mod gripspec;

use std::path::Path;
use std::time::Duration;

use rusqlite::{
    Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior, params,
};

use crate::digest::{final_grip, provisional_grip};
use crate::store::gripspec::GripSpec;
use crate::when::Stamp;

/// How long a write transaction waits for the write-intent lock before
/// surfacing `LedgerError::Busy`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum LedgerError {
    /// The write-intent lock could not be acquired within the busy
    /// timeout. The invocation should retry or fail whole; it must never
    /// fall back to an unlocked read-then-write.
    Busy,
    /// An under-qualified grip-spec matched more than one history row;
    /// nothing was deleted.
    AmbiguousGrip { grip: String, matches: i64 },
    /// The stored filenames column did not parse as a JSON string array.
    Names(serde_json::Error),
    Sqlite(rusqlite::Error),
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Busy => write!(f, "store is busy; another writer holds the lock"),
            Self::AmbiguousGrip { grip, matches } => {
                write!(f, "grip {grip} has {matches} matches; use a more specific grip-spec")
            }
            Self::Names(err) => write!(f, "stored filenames are not a JSON array: {err}"),
            Self::Sqlite(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<rusqlite::Error> for LedgerError {
    fn from(value: rusqlite::Error) -> Self {
        match &value {
            rusqlite::Error::SqliteFailure(err, _)
                if matches!(
                    err.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) =>
            {
                Self::Busy
            }
            _ => Self::Sqlite(value),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// One history event joined with its filepath and the grip collision count.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub filepath: String,
    pub start: String,
    pub stop: Option<String>,
    pub play_secs: Option<i64>,
    pub grip: String,
    pub grip_count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackRow {
    pub filepath: String,
    pub last_seen: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdentityRow {
    pub fingerprint: String,
    pub filenames: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub filepath: String,
    pub start: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub events: i64,
    pub files: i64,
    pub paths: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeletedEvent {
    pub grip: String,
    pub start: String,
    pub filepath: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PurgedFile {
    pub fingerprint: String,
    pub filenames: Vec<String>,
}

/// The shared, file-backed ledger. One connection per invocation; all
/// coordination between concurrent invocations goes through SQLite's
/// transaction isolation, never through in-process state.
pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let ledger = Self { conn };
        ledger.init_schema()?;
        Ok(ledger)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let ledger = Self { conn };
        ledger.init_schema()?;
        Ok(ledger)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.busy_timeout(BUSY_TIMEOUT)?;
        self.conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY ASC,
                hash TEXT NOT NULL UNIQUE,
                filenames TEXT NOT NULL,
                renames INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS filetrack (
                id INTEGER PRIMARY KEY ASC,
                file_id INTEGER NOT NULL,
                filepath TEXT NOT NULL,
                first_seen_dt TEXT NOT NULL,
                last_seen_dt TEXT NOT NULL,
                FOREIGN KEY(file_id) REFERENCES files(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY ASC,
                file_id INTEGER NOT NULL,
                ftrack_id INTEGER NOT NULL,
                start_dt TEXT NOT NULL,
                stop_dt TEXT,
                play_secs INTEGER,
                grip TEXT NOT NULL,
                FOREIGN KEY(file_id) REFERENCES files(id) ON DELETE CASCADE,
                FOREIGN KEY(ftrack_id) REFERENCES filetrack(id) ON DELETE CASCADE
            );

            CREATE VIEW IF NOT EXISTS v_grips (grip, grip_count)
            AS SELECT grip, count(grip) FROM history GROUP BY grip;

            CREATE INDEX IF NOT EXISTS history_idx1 ON history(ftrack_id);
            CREATE INDEX IF NOT EXISTS history_idx2 ON history(start_dt);
            CREATE INDEX IF NOT EXISTS history_idx3 ON history(grip);

            CREATE UNIQUE INDEX IF NOT EXISTS filetrack_uniq
            ON filetrack(file_id, filepath);
            ",
        )?;
        Ok(())
    }

    /// Open one atomic write scope. The write-intent lock is taken up
    /// front (BEGIN IMMEDIATE), before any read inside the scope, so a
    /// check-then-act sequence cannot be invalidated by a concurrent
    /// writer between its read and its write.
    pub fn begin_write(&mut self) -> Result<WriteScope<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(WriteScope { tx })
    }

    /// Events ordered by start time ascending, at most `limit` newest ones.
    pub fn latest(&self, limit: u32) -> Result<Vec<EventRow>> {
        let mut rows = self.event_rows(
            "SELECT filepath, start_dt, stop_dt, play_secs, h.grip, grip_count
             FROM history AS h
             JOIN filetrack ON filetrack.id = h.ftrack_id
             JOIN v_grips ON v_grips.grip = h.grip
             ORDER BY start_dt DESC LIMIT ?1",
            params![limit],
        )?;
        rows.reverse();
        Ok(rows)
    }

    /// Substring search over event filepaths, oldest first.
    pub fn search(&self, needle: &str) -> Result<Vec<EventRow>> {
        self.event_rows(
            "SELECT filepath, start_dt, stop_dt, play_secs, h.grip, grip_count
             FROM history AS h
             JOIN filetrack ON filetrack.id = h.ftrack_id
             JOIN v_grips ON v_grips.grip = h.grip
             WHERE filepath LIKE ?1
             ORDER BY start_dt",
            params![like_pattern(needle)],
        )
    }

    fn event_rows(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<EventRow>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(args)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(EventRow {
                filepath: row.get(0)?,
                start: row.get(1)?,
                stop: row.get(2)?,
                play_secs: row.get(3)?,
                grip: row.get(4)?,
                grip_count: row.get(5)?,
            });
        }
        Ok(out)
    }

    /// Substring search over every path a file has ever been seen at.
    pub fn file_search(&self, needle: &str) -> Result<Vec<TrackRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT filepath, last_seen_dt FROM filetrack WHERE filepath LIKE ?1",
        )?;
        let mut rows = stmt.query(params![like_pattern(needle)])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(TrackRow {
                filepath: row.get(0)?,
                last_seen: row.get(1)?,
            });
        }
        Ok(out)
    }

    /// The most recent open session, if any. An abandoned session (its
    /// process died before recording a stop) is reported here until it is
    /// deleted or a newer session starts.
    pub fn now_playing(&self) -> Result<Option<NowPlaying>> {
        let row = self
            .conn
            .query_row(
                "SELECT filepath, start_dt FROM history
                 JOIN filetrack ON filetrack.id = history.ftrack_id
                 WHERE stop_dt IS NULL
                 ORDER BY start_dt DESC LIMIT 1",
                [],
                |row| {
                    Ok(NowPlaying {
                        filepath: row.get(0)?,
                        start: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_identities(&self) -> Result<Vec<IdentityRow>> {
        let mut stmt = self.conn.prepare("SELECT hash, filenames FROM files")?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let names_json: String = row.get(1)?;
            out.push(IdentityRow {
                fingerprint: row.get(0)?,
                filenames: decode_filenames(&names_json)?,
            });
        }
        Ok(out)
    }

    pub fn totals(&self) -> Result<Totals> {
        let count = |sql| self.conn.query_row(sql, [], |row| row.get(0));
        Ok(Totals {
            events: count("SELECT count(id) FROM history")?,
            files: count("SELECT count(id) FROM files")?,
            paths: count("SELECT count(id) FROM filetrack")?,
        })
    }
}

/// One atomic check-then-act scope over the ledger. Every mutation path
/// (session start, session stop, delete, purge, cleanup) runs inside a
/// scope; dropping it without `commit` rolls everything back.
pub struct WriteScope<'a> {
    tx: Transaction<'a>,
}

impl WriteScope<'_> {
    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }

    /// Resolve a fingerprint to its file id, creating the identity on
    /// first observation. A not-yet-seen basename is appended to the
    /// identity's name list and counted as a rename; a known name leaves
    /// the row untouched.
    pub fn resolve_identity(&self, fingerprint: &str, observed_name: &str) -> Result<i64> {
        let existing = self
            .tx
            .query_row(
                "SELECT id, filenames FROM files WHERE hash = ?1",
                params![fingerprint],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        let Some((file_id, names_json)) = existing else {
            let serialized = encode_filenames(&[observed_name.to_string()])?;
            self.tx.execute(
                "INSERT INTO files(hash, filenames) VALUES(?1, ?2)",
                params![fingerprint, serialized],
            )?;
            return Ok(self.tx.last_insert_rowid());
        };

        let mut names = decode_filenames(&names_json)?;
        if !names.iter().any(|name| name == observed_name) {
            names.push(observed_name.to_string());
            let serialized = encode_filenames(&names)?;
            self.tx.execute(
                "UPDATE files SET filenames = ?1, renames = renames + 1 WHERE id = ?2",
                params![serialized, file_id],
            )?;
        }
        Ok(file_id)
    }

    /// Record that `file_id` was observed at `filepath`. First observation
    /// creates the track row; later ones only refresh `last_seen_dt`. The
    /// unique (file_id, filepath) pair resolves conflicts to the update
    /// branch, never to a duplicate row.
    pub fn touch_path(&self, file_id: i64, filepath: &str, now: &Stamp) -> Result<i64> {
        let ts = now.canonical();
        let track_id = self.tx.query_row(
            "INSERT INTO filetrack(file_id, filepath, first_seen_dt, last_seen_dt)
             VALUES(?1, ?2, ?3, ?3)
             ON CONFLICT(file_id, filepath) DO UPDATE SET last_seen_dt = excluded.last_seen_dt
             RETURNING id",
            params![file_id, filepath, ts],
            |row| row.get(0),
        )?;
        Ok(track_id)
    }

    /// Open a history event stamped with the provisional grip. No lock is
    /// held between this returning and the eventual stop.
    pub fn start_session(&self, file_id: i64, track_id: i64, now: &Stamp) -> Result<i64> {
        let ts = now.canonical();
        let grip = provisional_grip(file_id, track_id, &ts);
        self.tx.execute(
            "INSERT INTO history(file_id, ftrack_id, start_dt, grip)
             VALUES(?1, ?2, ?3, ?4)",
            params![file_id, track_id, ts, grip],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    /// Close a history event: set the stop instant, the play time rounded
    /// to whole seconds, and the final grip. Returns false when the
    /// session id no longer exists — a concurrent purge or delete
    /// legitimately removed it, so a stale stop is a no-op, not an error.
    pub fn stop_session(&self, session_id: i64, now: &Stamp, played_secs: f64) -> Result<bool> {
        let row = self
            .tx
            .query_row(
                "SELECT file_id, ftrack_id, start_dt FROM history WHERE id = ?1",
                params![session_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((file_id, track_id, start)) = row else {
            return Ok(false);
        };

        let ts = now.canonical();
        let grip = final_grip(file_id, track_id, &start, &ts);
        let play_secs = (played_secs + 0.5).floor() as i64;
        self.tx.execute(
            "UPDATE history SET stop_dt = ?1, play_secs = ?2, grip = ?3 WHERE id = ?4",
            params![ts, play_secs, grip, session_id],
        )?;
        Ok(true)
    }

    /// Remove every filetrack row and file identity no history event
    /// references. Counting and deleting happen inside this scope's
    /// transaction, so a session starting concurrently cannot slip in
    /// between the count and the delete.
    pub fn cleanup(&self) -> Result<(i64, i64)> {
        let paths: i64 = self.tx.query_row(
            "SELECT count(id) FROM filetrack WHERE id NOT IN
             (SELECT ftrack_id FROM history)",
            [],
            |row| row.get(0),
        )?;
        let files: i64 = self.tx.query_row(
            "SELECT count(id) FROM files WHERE id NOT IN
             (SELECT file_id FROM history)",
            [],
            |row| row.get(0),
        )?;

        self.tx.execute(
            "DELETE FROM filetrack WHERE id NOT IN (SELECT ftrack_id FROM history)",
            [],
        )?;
        self.tx.execute(
            "DELETE FROM files WHERE id NOT IN (SELECT file_id FROM history)",
            [],
        )?;
        Ok((paths, files))
    }

    /// Delete the single history event a grip-spec addresses. More than
    /// one match is `AmbiguousGrip` and deletes nothing; no match returns
    /// None.
    pub fn delete_event(&self, spec: &GripSpec) -> Result<Option<DeletedEvent>> {
        let (matches, start, filepath): (i64, Option<String>, Option<String>) =
            self.tx.query_row(
                "SELECT count(h.grip), h.start_dt, filetrack.filepath
                 FROM history AS h
                 JOIN filetrack ON filetrack.id = h.ftrack_id
                 WHERE h.grip = ?1 AND h.start_dt LIKE ?2",
                params![spec.grip, spec.date_pattern],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

        if matches > 1 {
            return Err(LedgerError::AmbiguousGrip {
                grip: spec.grip.clone(),
                matches,
            });
        }
        if matches == 0 {
            return Ok(None);
        }

        self.tx.execute(
            "DELETE FROM history WHERE grip = ?1 AND start_dt LIKE ?2",
            params![spec.grip, spec.date_pattern],
        )?;
        Ok(Some(DeletedEvent {
            grip: spec.grip.clone(),
            start: start.unwrap_or_default(),
            filepath: filepath.unwrap_or_default(),
        }))
    }

    /// Delete one file identity by fingerprint, cascading to its track
    /// rows and history events. Unknown fingerprints yield None.
    pub fn purge_fingerprint(&self, fingerprint: &str) -> Result<Option<PurgedFile>> {
        let row = self
            .tx
            .query_row(
                "DELETE FROM files WHERE hash = ?1 RETURNING hash, filenames",
                params![fingerprint],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        let Some((hash, names_json)) = row else {
            return Ok(None);
        };
        Ok(Some(PurgedFile {
            fingerprint: hash,
            filenames: decode_filenames(&names_json)?,
        }))
    }

    /// Purge many fingerprints lazily, one result per matched fingerprint
    /// in input order. Each yielded item has already mutated the scope.
    pub fn purge<'s>(
        &'s self,
        fingerprints: &'s [String],
    ) -> impl Iterator<Item = Result<PurgedFile>> + 's {
        fingerprints
            .iter()
            .filter_map(|fingerprint| self.purge_fingerprint(fingerprint).transpose())
    }
}

fn like_pattern(needle: &str) -> String {
    format!("%{needle}%")
}

fn encode_filenames(names: &[String]) -> Result<String> {
    serde_json::to_string(names).map_err(LedgerError::Names)
}

fn decode_filenames(raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw).map_err(LedgerError::Names)
}

#[cfg(test)]
mod tests {
    use super::{Ledger, LedgerError};
    use crate::digest::provisional_grip;
    use crate::store::gripspec::parse_grip_spec;
    use crate::when::Stamp;

    const FP_A: &str = "00000000000b4f0840d4b65293454921";
    const FP_B: &str = "0000003000008090af5dc3f62688f33a";

    fn stamp(raw: &str) -> Stamp {
        Stamp::parse(raw).expect("test stamp")
    }

    #[test]
    fn resolve_identity_is_idempotent_per_name() {
        let mut ledger = Ledger::open_in_memory().expect("in-memory ledger");
        let scope = ledger.begin_write().expect("write scope");

        let first = scope.resolve_identity(FP_A, "movie.mkv").expect("create");
        let second = scope.resolve_identity(FP_A, "movie.mkv").expect("repeat");
        assert_eq!(first, second);
        scope.commit().expect("commit");

        let identities = ledger.list_identities().expect("list");
        assert_eq!(identities.len(), 1);
        assert_eq!(identities[0].filenames, vec!["movie.mkv"]);

        let renames: i64 = ledger
            .conn
            .query_row("SELECT renames FROM files WHERE hash = ?1", [FP_A], |row| {
                row.get(0)
            })
            .expect("renames");
        assert_eq!(renames, 0);
    }

    #[test]
    fn new_name_appends_and_counts_one_rename() {
        let mut ledger = Ledger::open_in_memory().expect("in-memory ledger");
        let scope = ledger.begin_write().expect("write scope");
        let id = scope.resolve_identity(FP_A, "original.mkv").expect("create");
        let same = scope.resolve_identity(FP_A, "renamed.mkv").expect("rename");
        assert_eq!(id, same);
        scope.commit().expect("commit");

        let identities = ledger.list_identities().expect("list");
        assert_eq!(identities[0].filenames, vec!["original.mkv", "renamed.mkv"]);

        let renames: i64 = ledger
            .conn
            .query_row("SELECT renames FROM files WHERE hash = ?1", [FP_A], |row| {
                row.get(0)
            })
            .expect("renames");
        assert_eq!(renames, 1);
    }

    #[test]
    fn touch_path_upserts_single_row_and_keeps_first_seen() {
        let mut ledger = Ledger::open_in_memory().expect("in-memory ledger");
        let scope = ledger.begin_write().expect("write scope");
        let file_id = scope.resolve_identity(FP_A, "movie.mkv").expect("identity");

        let early = stamp("2024-01-01T00:00:00.000000Z");
        let late = stamp("2024-01-02T00:00:00.000000Z");
        let first = scope
            .touch_path(file_id, "/media/movie.mkv", &early)
            .expect("first touch");
        let second = scope
            .touch_path(file_id, "/media/movie.mkv", &late)
            .expect("second touch");
        assert_eq!(first, second);
        scope.commit().expect("commit");

        let (count, first_seen, last_seen): (i64, String, String) = ledger
            .conn
            .query_row(
                "SELECT count(id), first_seen_dt, last_seen_dt FROM filetrack",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .expect("track row");
        assert_eq!(count, 1);
        assert_eq!(first_seen, "2024-01-01T00:00:00.000000Z");
        assert_eq!(last_seen, "2024-01-02T00:00:00.000000Z");
    }

    #[test]
    fn stop_finalizes_grip_and_rounds_duration() {
        let mut ledger = Ledger::open_in_memory().expect("in-memory ledger");
        let start = stamp("2024-01-01T00:00:00.000000Z");
        let stop = stamp("2024-01-01T01:00:00.000000Z");

        let scope = ledger.begin_write().expect("write scope");
        let file_id = scope.resolve_identity(FP_A, "movie.mkv").expect("identity");
        let track_id = scope
            .touch_path(file_id, "/media/movie.mkv", &start)
            .expect("track");
        let session_id = scope
            .start_session(file_id, track_id, &start)
            .expect("start");
        scope.commit().expect("commit start");

        let open_grip = provisional_grip(file_id, track_id, &start.canonical());
        let rows = ledger.latest(10).expect("latest");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].grip, open_grip);
        assert!(rows[0].stop.is_none());

        let scope = ledger.begin_write().expect("write scope");
        let stopped = scope
            .stop_session(session_id, &stop, 3600.4)
            .expect("stop");
        assert!(stopped);
        scope.commit().expect("commit stop");

        let rows = ledger.latest(10).expect("latest after stop");
        assert_eq!(rows[0].stop.as_deref(), Some("2024-01-01T01:00:00.000000Z"));
        assert_eq!(rows[0].play_secs, Some(3600));
        assert_ne!(rows[0].grip, open_grip);
    }

    #[test]
    fn stale_stop_is_a_no_op() {
        let mut ledger = Ledger::open_in_memory().expect("in-memory ledger");
        let scope = ledger.begin_write().expect("write scope");
        let stopped = scope
            .stop_session(999, &stamp("2024-01-01T00:00:00.000000Z"), 10.0)
            .expect("stale stop");
        assert!(!stopped);
        scope.commit().expect("commit");
    }

    #[test]
    fn cleanup_removes_only_unreferenced_rows() {
        let mut ledger = Ledger::open_in_memory().expect("in-memory ledger");
        let now = stamp("2024-01-01T00:00:00.000000Z");

        let scope = ledger.begin_write().expect("write scope");
        // Referenced by a session.
        let kept_id = scope.resolve_identity(FP_A, "kept.mkv").expect("kept");
        let kept_track = scope
            .touch_path(kept_id, "/media/kept.mkv", &now)
            .expect("kept track");
        scope
            .start_session(kept_id, kept_track, &now)
            .expect("kept session");
        // Observed but never played.
        let orphan_id = scope.resolve_identity(FP_B, "orphan.mkv").expect("orphan");
        scope
            .touch_path(orphan_id, "/media/orphan.mkv", &now)
            .expect("orphan track");
        scope.commit().expect("commit seed");

        let scope = ledger.begin_write().expect("write scope");
        let (paths, files) = scope.cleanup().expect("cleanup");
        scope.commit().expect("commit cleanup");
        assert_eq!((paths, files), (1, 1));

        let totals = ledger.totals().expect("totals");
        assert_eq!(totals.files, 1);
        assert_eq!(totals.paths, 1);
        assert_eq!(totals.events, 1);
    }

    #[test]
    fn cleanup_on_unreferenced_store_empties_it() {
        let mut ledger = Ledger::open_in_memory().expect("in-memory ledger");
        let now = stamp("2024-01-01T00:00:00.000000Z");

        let scope = ledger.begin_write().expect("write scope");
        let file_id = scope.resolve_identity(FP_A, "only.mkv").expect("identity");
        scope
            .touch_path(file_id, "/media/only.mkv", &now)
            .expect("track");
        scope.commit().expect("commit");

        let scope = ledger.begin_write().expect("write scope");
        let counts = scope.cleanup().expect("cleanup");
        scope.commit().expect("commit");
        assert_eq!(counts, (1, 1));

        let totals = ledger.totals().expect("totals");
        assert_eq!((totals.files, totals.paths), (0, 0));
    }

    /// Seed two events on different days that share one grip value.
    fn seed_colliding_grips(ledger: &mut Ledger, grip: &str) {
        let scope = ledger.begin_write().expect("write scope");
        let file_id = scope.resolve_identity(FP_A, "movie.mkv").expect("identity");
        let track_id = scope
            .touch_path(
                file_id,
                "/media/movie.mkv",
                &stamp("2024-01-01T00:00:00.000000Z"),
            )
            .expect("track");
        for start in ["2024-01-01T12:00:00.000000Z", "2025-02-02T12:00:00.000000Z"] {
            scope
                .tx
                .execute(
                    "INSERT INTO history(file_id, ftrack_id, start_dt, grip)
                     VALUES(?1, ?2, ?3, ?4)",
                    rusqlite::params![file_id, track_id, start, grip],
                )
                .expect("seed history");
        }
        scope.commit().expect("commit seed");
    }

    #[test]
    fn unqualified_colliding_grip_is_ambiguous_and_deletes_nothing() {
        let mut ledger = Ledger::open_in_memory().expect("in-memory ledger");
        seed_colliding_grips(&mut ledger, "abcd1234");

        let spec = parse_grip_spec("abcd1234").expect("spec");
        let scope = ledger.begin_write().expect("write scope");
        let err = scope.delete_event(&spec).expect_err("ambiguous");
        assert!(matches!(
            err,
            LedgerError::AmbiguousGrip { matches: 2, .. }
        ));
        scope.commit().expect("commit");

        let totals = ledger.totals().expect("totals");
        assert_eq!(totals.events, 2);
    }

    #[test]
    fn date_qualified_grip_deletes_exactly_one_row() {
        let mut ledger = Ledger::open_in_memory().expect("in-memory ledger");
        seed_colliding_grips(&mut ledger, "abcd1234");

        let spec = parse_grip_spec("2024.abcd1234").expect("spec");
        let scope = ledger.begin_write().expect("write scope");
        let deleted = scope
            .delete_event(&spec)
            .expect("delete")
            .expect("one match");
        assert_eq!(deleted.grip, "abcd1234");
        assert_eq!(deleted.start, "2024-01-01T12:00:00.000000Z");
        assert_eq!(deleted.filepath, "/media/movie.mkv");
        scope.commit().expect("commit");

        let totals = ledger.totals().expect("totals");
        assert_eq!(totals.events, 1);
    }

    #[test]
    fn unknown_grip_spec_deletes_nothing() {
        let mut ledger = Ledger::open_in_memory().expect("in-memory ledger");
        let spec = parse_grip_spec("deadbeef").expect("spec");
        let scope = ledger.begin_write().expect("write scope");
        assert!(scope.delete_event(&spec).expect("delete").is_none());
        scope.commit().expect("commit");
    }

    #[test]
    fn grip_collisions_are_counted_in_query_rows() {
        let mut ledger = Ledger::open_in_memory().expect("in-memory ledger");
        seed_colliding_grips(&mut ledger, "abcd1234");

        let rows = ledger.search("movie").expect("search");
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.grip_count == 2));
        // Oldest first.
        assert!(rows[0].start < rows[1].start);
    }

    #[test]
    fn purge_yields_matches_in_input_order_and_cascades() {
        let mut ledger = Ledger::open_in_memory().expect("in-memory ledger");
        let now = stamp("2024-01-01T00:00:00.000000Z");

        let scope = ledger.begin_write().expect("write scope");
        for (fingerprint, name, path) in [
            (FP_A, "a.mkv", "/media/a.mkv"),
            (FP_B, "b.mkv", "/media/b.mkv"),
        ] {
            let file_id = scope.resolve_identity(fingerprint, name).expect("identity");
            let track_id = scope.touch_path(file_id, path, &now).expect("track");
            scope
                .start_session(file_id, track_id, &now)
                .expect("session");
        }
        scope.commit().expect("commit seed");

        let targets = vec![
            FP_B.to_string(),
            "0".repeat(32), // unknown, yields nothing
            FP_A.to_string(),
        ];
        let scope = ledger.begin_write().expect("write scope");
        let purged = scope
            .purge(&targets)
            .collect::<Result<Vec<_>, _>>()
            .expect("purge");
        scope.commit().expect("commit purge");

        assert_eq!(purged.len(), 2);
        assert_eq!(purged[0].fingerprint, FP_B);
        assert_eq!(purged[1].fingerprint, FP_A);
        assert_eq!(purged[1].filenames, vec!["a.mkv"]);

        let totals = ledger.totals().expect("totals");
        assert_eq!((totals.events, totals.files, totals.paths), (0, 0, 0));
    }

    #[test]
    fn now_playing_reports_most_recent_open_session() {
        let mut ledger = Ledger::open_in_memory().expect("in-memory ledger");
        assert!(ledger.now_playing().expect("empty").is_none());

        let scope = ledger.begin_write().expect("write scope");
        let file_id = scope.resolve_identity(FP_A, "movie.mkv").expect("identity");
        let older = stamp("2024-01-01T00:00:00.000000Z");
        let newer = stamp("2024-01-01T06:00:00.000000Z");
        let track_id = scope
            .touch_path(file_id, "/media/movie.mkv", &older)
            .expect("track");
        scope
            .start_session(file_id, track_id, &older)
            .expect("older session");
        scope
            .start_session(file_id, track_id, &newer)
            .expect("newer session");
        scope.commit().expect("commit");

        let playing = ledger.now_playing().expect("query").expect("open session");
        assert_eq!(playing.start, "2024-01-01T06:00:00.000000Z");
        assert_eq!(playing.filepath, "/media/movie.mkv");
    }
}
