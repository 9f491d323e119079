pub mod grip;
pub mod sample;

pub use grip::{GRIP_HEX_LEN, final_grip, provisional_grip};
pub use sample::{FINGERPRINT_HEX_LEN, FingerprintError, fingerprint_file};
