use std::fmt;

use serde::{Deserialize, Serialize};

/// Size of a content fingerprint in bytes
pub const FINGERPRINT_SIZE: usize = 32;

/// Content-integrity value attached to a chunk
///
/// Either supplied by the caller alongside a write (content addressing) or
/// read back from the backend after the physical blob is stored (generated
/// addressing). The all-zero value is a sentinel meaning "no fingerprint
/// recorded"; queries for absent chunks return it rather than erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint([u8; FINGERPRINT_SIZE]);

impl Fingerprint {
    /// The "absent" sentinel
    pub const ZERO: Fingerprint = Fingerprint([0; FINGERPRINT_SIZE]);

    /// Fingerprint a byte sequence with BLAKE3
    pub fn of(data: &[u8]) -> Self {
        Fingerprint(*blake3::hash(data).as_bytes())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; FINGERPRINT_SIZE]
    }

    /// Parse a fingerprint from a hexadecimal string
    pub fn from_hex(hex: &str) -> Result<Self, hex::FromHexError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut buff = [0; FINGERPRINT_SIZE];
        hex::decode_to_slice(hex, &mut buff)?;
        Ok(Fingerprint(buff))
    }

    pub fn to_bytes(&self) -> [u8; FINGERPRINT_SIZE] {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Default for Fingerprint {
    fn default() -> Self {
        Fingerprint::ZERO
    }
}

impl From<[u8; FINGERPRINT_SIZE]> for Fingerprint {
    fn from(bytes: [u8; FINGERPRINT_SIZE]) -> Self {
        Fingerprint(bytes)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
