//! Error types for the chunk store.

use common::prelude::*;

use crate::backend::BackendError;
use crate::index::IndexError;

/// Errors that can occur when operating on the chunk store.
///
/// Absence on read paths is not an error: reads and size queries report it
/// through `Option` return values instead.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Writing a chunk would leave a gap in the index range
    #[error("invalid chunk index {chunk_id}: object has {count} chunks")]
    InvalidChunkIndex { chunk_id: u64, count: u64 },

    /// Blob count outside what the addressing strategy allows
    #[error("invalid blob count {given}: expected between {min} and {max}")]
    InvalidBlobCount { given: usize, min: usize, max: usize },

    /// Blob length exceeds the backend's slot capacity
    #[error("blob of {length} bytes exceeds slot capacity {capacity}")]
    BlobTooLarge { length: u64, capacity: u64 },

    /// Attached payment below the quoted backend fee
    #[error("insufficient payment: attached {attached}, required {required}")]
    InsufficientPayment { attached: Credits, required: Credits },

    /// Removal requested on an object with no chunks
    #[error("object {0} has no chunks")]
    EmptyObject(ObjectKey),

    /// Chunk removal targeting a non-last index
    #[error("cannot remove chunk {chunk_id}: last index is {last}")]
    IllegalPartialRemoval { chunk_id: u64, last: u64 },

    /// Metadata index failure
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Blob backend failure
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
