//! Blob addressing strategies.
//!
//! Two strategies name physically stored blobs:
//!
//! - **Content addressing**: the caller supplies each blob's key, typically a
//!   fingerprint of the blob's plaintext, and a chunk may span up to
//!   [`MAX_CONTENT_BLOBS`] blobs, so chunks can be larger than one slot.
//! - **Generated addressing**: the store derives a fresh randomized key per
//!   write, one blob per chunk. Content is not fingerprinted client-side
//!   before the call, so a deterministic content-hash key is unavailable;
//!   the derived key mixes the writer identity, the wall clock, the target
//!   chunk index, and the blob position. A backend-side [`DecodeMode`]
//!   travels with the write and is replayed verbatim on reads.

use common::prelude::*;

/// Maximum number of blobs per chunk under content addressing
pub const MAX_CONTENT_BLOBS: usize = 2;

/// Derive a fresh physical key for a generated-addressing write.
///
/// The wall clock alone is not collision-resistant under concurrent writers,
/// so a random 64-bit nonce is mixed into the input as well.
pub(crate) fn derive_blob_key(writer: &WriterId, chunk_id: u64, position: u32) -> BlobKey {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&writer.to_bytes());
    hasher.update(&chrono::Utc::now().timestamp_micros().to_le_bytes());
    hasher.update(&chunk_id.to_le_bytes());
    hasher.update(&position.to_le_bytes());
    hasher.update(&rand::random::<u64>().to_le_bytes());
    BlobKey::from(*hasher.finalize().as_bytes())
}
