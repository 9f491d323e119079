use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use blake2::Blake2bVar;
use blake2::digest::{Update, VariableOutput};

/// Bytes read at each sample location.
pub const SAMPLE_WINDOW: u64 = 16 * 1024;
/// First skip offset and the factor it grows by between samples.
const SKIP_INITIAL: u64 = 1024 * 1024;
const SKIP_MULTIPLIER: u64 = 8;
/// Byte widths of the digest and the size field inside the fingerprint.
const DIGEST_LEN: usize = 10;
const SIZE_LEN: usize = 6;
/// Largest file size the fixed-width size field can carry.
const MAX_FILE_SIZE: u64 = (1 << (SIZE_LEN * 8)) - 1;

pub const FINGERPRINT_HEX_LEN: usize = 2 * (DIGEST_LEN + SIZE_LEN);

#[derive(Debug)]
pub enum FingerprintError {
    /// File is too large for the fingerprint's reserved size field.
    SizeOverflow { size: u64 },
    Io(io::Error),
}

impl std::fmt::Display for FingerprintError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SizeOverflow { size } => write!(
                f,
                "file size {size} does not fit inside {SIZE_LEN} bytes (max {MAX_FILE_SIZE})"
            ),
            Self::Io(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for FingerprintError {}

impl From<io::Error> for FingerprintError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Content fingerprint of a file: hex of the size as six big-endian bytes
/// followed by a ten-byte blake2b digest over sampled windows. Identical
/// content and size produce the same fingerprint regardless of path or name.
pub fn fingerprint_file(path: &Path) -> Result<String, FingerprintError> {
    let size = checked_size(path)?;

    let mut hasher =
        Blake2bVar::new(DIGEST_LEN).expect("blake2b supports a 10-byte output");
    if size > 0 {
        let mut file = File::open(path)?;
        let mut window = Vec::with_capacity(SAMPLE_WINDOW as usize);
        for location in sample_locations(size) {
            window.clear();
            file.seek(SeekFrom::Start(location))?;
            (&mut file).take(SAMPLE_WINDOW).read_to_end(&mut window)?;
            hasher.update(&window);
        }
    }

    let mut digest = [0u8; DIGEST_LEN];
    hasher
        .finalize_variable(&mut digest)
        .expect("output buffer matches the configured digest length");

    let size_bytes = size.to_be_bytes();
    let mut out = String::with_capacity(FINGERPRINT_HEX_LEN);
    push_hex(&mut out, &size_bytes[8 - SIZE_LEN..]);
    push_hex(&mut out, &digest);
    Ok(out)
}

fn checked_size(path: &Path) -> Result<u64, FingerprintError> {
    let size = std::fs::metadata(path)?.len();
    if size > MAX_FILE_SIZE {
        Err(FingerprintError::SizeOverflow { size })
    } else {
        Ok(size)
    }
}

/// Offsets to sample, in the order they feed the digest. Starts at the
/// file's beginning, skips ahead geometrically, ends with the final
/// window, and carries the file's midpoint at its sorted position. Files
/// no larger than one window collapse to the single location 0.
pub fn sample_locations(filesize: u64) -> Vec<u64> {
    if filesize <= SAMPLE_WINDOW {
        return vec![0];
    }

    let end_location = filesize - SAMPLE_WINDOW;
    let mut locations = vec![0];
    let mut skip = SKIP_INITIAL;
    while skip < end_location {
        locations.push(skip);
        skip *= SKIP_MULTIPLIER;
    }
    locations.push(end_location);
    sorted_insert(&mut locations, filesize / 2);
    locations
}

/// Insert `value` at its sorted position, but only when it falls strictly
/// between the first and last element; values already present, at the
/// boundaries, or outside the range are dropped.
fn sorted_insert(locations: &mut Vec<u64>, value: u64) {
    let (Some(&first), Some(&last)) = (locations.first(), locations.last()) else {
        return;
    };
    if value <= first || value >= last {
        return;
    }
    if let Err(position) = locations.binary_search(&value) {
        locations.insert(position, value);
    }
}

fn push_hex(out: &mut String, bytes: &[u8]) {
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
}
