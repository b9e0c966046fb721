use std::fmt;

use serde::{Deserialize, Serialize};

/// Size of an addressing key in bytes
pub const KEY_SIZE: usize = 32;

/// Errors that can occur during key operations
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key error: {0}")]
    Default(#[from] anyhow::Error),
}

/// Identifier for one logical object
///
/// A logical name is caller-chosen and of arbitrary length; internally every
/// operation works on its BLAKE3 fingerprint. The key is stable for the
/// object's lifetime and never reused across distinct names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey([u8; KEY_SIZE]);

impl ObjectKey {
    /// Normalize a logical name into its fixed-size key
    pub fn from_name(name: &str) -> Self {
        ObjectKey(*blake3::hash(name.as_bytes()).as_bytes())
    }

    /// Parse an object key from a hexadecimal string
    ///
    /// Accepts both plain hex and "0x"-prefixed hex strings.
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut buff = [0; KEY_SIZE];
        hex::decode_to_slice(hex, &mut buff)
            .map_err(|_| anyhow::anyhow!("object key hex decode error"))?;
        Ok(ObjectKey(buff))
    }

    pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; KEY_SIZE]> for ObjectKey {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        ObjectKey(bytes)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Addressing key for one physically stored blob
///
/// Under content addressing this is a fingerprint of the blob's plaintext,
/// supplied by the caller. Under generated addressing the store derives a
/// fresh key per write; see `store::addressing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlobKey([u8; KEY_SIZE]);

impl BlobKey {
    /// Content-address a blob: the key is the BLAKE3 fingerprint of its bytes
    pub fn content_of(data: &[u8]) -> Self {
        BlobKey(*blake3::hash(data).as_bytes())
    }

    /// Parse a blob key from a hexadecimal string
    ///
    /// Accepts both plain hex and "0x"-prefixed hex strings.
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut buff = [0; KEY_SIZE];
        hex::decode_to_slice(hex, &mut buff)
            .map_err(|_| anyhow::anyhow!("blob key hex decode error"))?;
        Ok(BlobKey(buff))
    }

    pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; KEY_SIZE]> for BlobKey {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        BlobKey(bytes)
    }
}

impl TryFrom<&[u8]> for BlobKey {
    type Error = KeyError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != KEY_SIZE {
            return Err(anyhow::anyhow!(
                "invalid blob key size, expected {}, got {}",
                KEY_SIZE,
                bytes.len()
            )
            .into());
        }
        let mut buff = [0; KEY_SIZE];
        buff.copy_from_slice(bytes);
        Ok(BlobKey(buff))
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Identity of the caller performing writes
///
/// Mixed into generated blob keys so that distinct writers cannot collide on
/// the same derived key. In a deployment this would typically wrap the
/// caller's account or public key; any stable 32-byte identity works.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WriterId([u8; KEY_SIZE]);

impl WriterId {
    /// Derive a writer identity from a human-readable name
    pub fn from_name(name: &str) -> Self {
        WriterId(*blake3::hash(name.as_bytes()).as_bytes())
    }

    pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
        self.0
    }
}

impl From<[u8; KEY_SIZE]> for WriterId {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        WriterId(bytes)
    }
}

impl fmt::Display for WriterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
