//! Blob backend abstraction.
//!
//! The backend is an external capacity-bounded, key-addressed storage service
//! with payable writes. The store consumes it through [`BlobBackend`] and
//! never caches blob bytes; it only holds references to them in its chunk
//! index. Two implementations ship with this crate: [`MemoryBackend`] for
//! tests and demos, and [`SlotStoreBackend`] over the `object_store` crate
//! (S3/MinIO/local filesystem/memory).

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use common::prelude::*;

mod memory;
mod slots;

pub use memory::{BackendOp, MemoryBackend};
pub use slots::{BackendPolicy, SlotStoreBackend, SlotStoreConfig};

/// Default fixed capacity of one physical storage slot (4 MiB)
pub const DEFAULT_SLOT_CAPACITY: u64 = 4 * 1024 * 1024;

/// Backend-side transform descriptor for generated-key blobs.
///
/// Recorded verbatim per blob reference at write time and passed back
/// unmodified on every read. The store never interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecodeMode(u32);

impl DecodeMode {
    pub const fn new(mode: u32) -> Self {
        DecodeMode(mode)
    }

    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Errors surfaced by blob backend implementations
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// No blob stored under the given key
    #[error("blob not found: {0}")]
    NotFound(BlobKey),

    /// Payment attached to a blob write is below the current upfront fee
    #[error("fee too low: attached {attached}, upfront payment is {required}")]
    FeeTooLow { attached: Credits, required: Credits },

    /// Declared blob length does not fit in one storage slot
    #[error("blob of {length} bytes exceeds slot capacity {capacity}")]
    SlotOverflow { length: u64, capacity: u64 },

    /// Read range extends past the slot capacity
    #[error("read of {offset}..{end} outside slot capacity {capacity}")]
    OutOfRange { offset: u64, end: u64, capacity: u64 },

    /// Anything else the backend reports
    #[error("backend error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for backend operations
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// A capacity-bounded key-addressed blob service with payable writes.
///
/// Writes allocate one fixed-capacity slot per blob and charge an upfront
/// fee quoted live by [`BlobBackend::upfront_payment`]. Reads address slot
/// bytes; bytes past a blob's logical content read as zeroes.
#[async_trait]
pub trait BlobBackend: Send + Sync + std::fmt::Debug + 'static {
    /// Fixed capacity of one physical storage slot in bytes.
    ///
    /// Every stored blob occupies one slot regardless of its logical length;
    /// callers validate blob lengths against this limit before paying.
    fn slot_capacity(&self) -> u64;

    /// Current per-blob storage fee.
    ///
    /// May change between calls; the store quotes it fresh for every write.
    async fn upfront_payment(&self) -> BackendResult<Credits>;

    /// Store a blob under `key`, paying `payment` upfront.
    ///
    /// `position` is the blob's index within its chunk and `length` its
    /// logical byte length. Rejects with [`BackendError::FeeTooLow`] if the
    /// payment does not cover the current upfront fee, and with
    /// [`BackendError::SlotOverflow`] if `length` exceeds the slot capacity.
    async fn put_blob(
        &self,
        key: BlobKey,
        position: u32,
        length: u64,
        payment: Credits,
    ) -> BackendResult<()>;

    /// Read exactly `length` bytes starting at `offset`.
    ///
    /// `decode` is the transform descriptor recorded at write time, passed
    /// through unmodified. Slot bytes past the logical content read as
    /// zeroes; ranges past the slot capacity are rejected.
    async fn read(
        &self,
        key: &BlobKey,
        decode: Option<DecodeMode>,
        offset: u64,
        length: u64,
    ) -> BackendResult<Bytes>;

    /// Copy `buf.len()` bytes starting at `offset` directly into `buf`.
    ///
    /// Implementations whose responses keep blob bytes at a fixed offset may
    /// override this to skip the intermediate decode step. The result must
    /// be byte-identical to [`BlobBackend::read`] over the same range.
    async fn read_into(
        &self,
        key: &BlobKey,
        decode: Option<DecodeMode>,
        offset: u64,
        buf: &mut [u8],
    ) -> BackendResult<()> {
        let bytes = self.read(key, decode, offset, buf.len() as u64).await?;
        buf.copy_from_slice(&bytes);
        Ok(())
    }

    /// Delete a blob. Deleting an absent key is not an error.
    async fn remove(&self, key: &BlobKey) -> BackendResult<()>;

    /// Fingerprint the backend recorded for a stored blob.
    async fn stored_hash(&self, key: &BlobKey) -> BackendResult<Fingerprint>;
}
