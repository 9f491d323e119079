use std::fmt::Write as _;

use blake2::Blake2bVar;
use blake2::digest::{Update, VariableOutput};

/// Grip digest width in bytes. Deliberately small: collisions between
/// distinct events are expected and resolved by date-qualified grip-specs.
const GRIP_LEN: usize = 4;

pub const GRIP_HEX_LEN: usize = 2 * GRIP_LEN;

/// Grip recorded when a session opens, before the stop instant is known.
pub fn provisional_grip(file_id: i64, track_id: i64, start: &str) -> String {
    grip_digest(&[file_id, track_id], &[start])
}

/// Grip recorded when a session closes. Overwrites the provisional grip;
/// this is the only mutation a grip ever sees.
pub fn final_grip(file_id: i64, track_id: i64, start: &str, stop: &str) -> String {
    grip_digest(&[file_id, track_id], &[start, stop])
}

/// Digest input order is fixed: every timestamp's canonical string first,
/// then every id in its minimal big-endian encoding (zero encodes to no
/// bytes at all). Reference fixtures depend on this exact stream.
fn grip_digest(ids: &[i64], stamps: &[&str]) -> String {
    let mut hasher = Blake2bVar::new(GRIP_LEN).expect("blake2b supports a 4-byte output");
    for stamp in stamps {
        hasher.update(stamp.as_bytes());
    }
    for &id in ids {
        hasher.update(minimal_be(id as u64).as_slice());
    }

    let mut digest = [0u8; GRIP_LEN];
    hasher
        .finalize_variable(&mut digest)
        .expect("output buffer matches the configured digest length");

    let mut out = String::with_capacity(GRIP_HEX_LEN);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Big-endian bytes of `value` with leading zero bytes stripped.
fn minimal_be(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[first..].to_vec()
}
