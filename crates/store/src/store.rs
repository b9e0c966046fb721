//! The chunked large-object store.
//!
//! [`SiloStore`] turns "store these bytes under this name" into a sequence of
//! backend blob operations. A logical object is an ordered sequence of
//! chunks; each chunk is composed of one or more physically stored blobs.
//! The store validates chunk positions, pays and forwards blobs to the
//! backend, and records chunk metadata (aggregate size, fingerprint, blob
//! references) in its index.
//!
//! Chunk indices for an object always form a contiguous range starting at
//! zero: writes either append at the end or replace an existing index, and
//! removals only pop from the tail. Replacing a chunk releases every old
//! physical blob before any new blob is stored, so no orphaned blobs survive
//! a replacement.
//!
//! Operations are serialized per store instance: the multi-step
//! validate/clear/write and tail-delete sequences must appear atomic to
//! every other call, readers included.

use std::path::Path;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::{debug, info};

use common::prelude::*;

use crate::addressing::{derive_blob_key, MAX_CONTENT_BLOBS};
use crate::backend::{BlobBackend, DecodeMode, SlotStoreBackend};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::index::{BlobRef, ChunkIndex};

/// Caller-supplied description of one blob to store under content addressing
#[derive(Debug, Clone)]
pub struct BlobSpec {
    /// Physical blob key, typically a fingerprint of the blob's plaintext
    pub key: BlobKey,
    /// Logical byte length
    pub length: u64,
}

impl BlobSpec {
    pub fn new(key: BlobKey, length: u64) -> Self {
        Self { key, length }
    }
}

/// Outcome of a successful chunk write
#[derive(Debug, Clone)]
pub struct WriteReceipt {
    /// Index the chunk was stored at
    pub chunk_id: u64,
    /// Aggregate chunk size, the sum of the written blob lengths
    pub size: u64,
    /// Integrity value recorded for the chunk
    pub fingerprint: Fingerprint,
    /// Physical keys the chunk's blobs were stored under, in position order
    pub blob_keys: Vec<BlobKey>,
    /// Total backend fee paid
    pub fee: Credits,
    /// Excess payment accrued to the refundable balance
    pub refunded: Credits,
}

/// Where a write lands in the chunk range
enum ChunkTarget {
    /// Append at the current chunk count
    Append,
    /// Append at exactly this index, or replace it if it already exists
    At(u64),
}

/// What to store, per addressing strategy
enum ChunkPayload {
    /// Caller-supplied keys and lengths, 1 to [`MAX_CONTENT_BLOBS`] blobs
    Content {
        fingerprint: Fingerprint,
        blobs: Vec<BlobSpec>,
    },
    /// One store-derived key; fingerprint read back from the backend
    Generated { decode: DecodeMode, length: u64 },
}

/// Chunked large-object storage manager over a payable blob backend
#[derive(Debug)]
pub struct SiloStore<B: BlobBackend> {
    index: ChunkIndex,
    backend: B,
    writer: WriterId,
    /// Excess payment owed back to the administrator
    refundable: Mutex<Credits>,
    /// Serializes calls so none observes another's partial effect
    op_lock: tokio::sync::Mutex<()>,
}

impl<B: BlobBackend> SiloStore<B> {
    /// Open a store with a file-backed chunk index
    pub async fn open(index_path: &Path, backend: B, writer: WriterId) -> Result<Self> {
        let index = ChunkIndex::new(index_path).await?;
        Ok(Self::assemble(index, backend, writer))
    }

    /// Create a store with an in-memory chunk index
    pub async fn ephemeral(backend: B, writer: WriterId) -> Result<Self> {
        let index = ChunkIndex::in_memory().await?;
        Ok(Self::assemble(index, backend, writer))
    }

    fn assemble(index: ChunkIndex, backend: B, writer: WriterId) -> Self {
        Self {
            index,
            backend,
            writer,
            refundable: Mutex::new(Credits::ZERO),
            op_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// The underlying blob backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    // ---- write path ----

    /// Append a chunk at the end of the object
    pub async fn write(
        &self,
        name: &str,
        fingerprint: Fingerprint,
        blobs: Vec<BlobSpec>,
        payment: Credits,
    ) -> Result<WriteReceipt> {
        self.put_chunk(
            ObjectKey::from_name(name),
            ChunkTarget::Append,
            ChunkPayload::Content { fingerprint, blobs },
            payment,
        )
        .await
    }

    /// Write a chunk at `chunk_id`: append if `chunk_id` equals the current
    /// chunk count, replace if below it. Any other index is a gap and is
    /// rejected.
    pub async fn write_chunk(
        &self,
        name: &str,
        chunk_id: u64,
        fingerprint: Fingerprint,
        blobs: Vec<BlobSpec>,
        payment: Credits,
    ) -> Result<WriteReceipt> {
        self.put_chunk(
            ObjectKey::from_name(name),
            ChunkTarget::At(chunk_id),
            ChunkPayload::Content { fingerprint, blobs },
            payment,
        )
        .await
    }

    /// Append a generated-addressing chunk: one blob under a store-derived
    /// key, with `decode` recorded for the backend and replayed on reads.
    pub async fn write_generated(
        &self,
        name: &str,
        decode: DecodeMode,
        length: u64,
        payment: Credits,
    ) -> Result<WriteReceipt> {
        self.put_chunk(
            ObjectKey::from_name(name),
            ChunkTarget::Append,
            ChunkPayload::Generated { decode, length },
            payment,
        )
        .await
    }

    /// Write a generated-addressing chunk at `chunk_id`
    pub async fn write_chunk_generated(
        &self,
        name: &str,
        chunk_id: u64,
        decode: DecodeMode,
        length: u64,
        payment: Credits,
    ) -> Result<WriteReceipt> {
        self.put_chunk(
            ObjectKey::from_name(name),
            ChunkTarget::At(chunk_id),
            ChunkPayload::Generated { decode, length },
            payment,
        )
        .await
    }

    async fn put_chunk(
        &self,
        key: ObjectKey,
        target: ChunkTarget,
        payload: ChunkPayload,
        payment: Credits,
    ) -> Result<WriteReceipt> {
        let _guard = self.op_lock.lock().await;

        // validate before touching any state, so rejections are
        // side-effect free
        let count = self.index.count_chunks(&key).await?;
        let chunk_id = match target {
            ChunkTarget::Append => count,
            ChunkTarget::At(id) => {
                if id > count {
                    return Err(StoreError::InvalidChunkIndex { chunk_id: id, count });
                }
                id
            }
        };

        let planned = match &payload {
            ChunkPayload::Content { blobs, .. } => {
                if blobs.is_empty() || blobs.len() > MAX_CONTENT_BLOBS {
                    return Err(StoreError::InvalidBlobCount {
                        given: blobs.len(),
                        min: 1,
                        max: MAX_CONTENT_BLOBS,
                    });
                }
                blobs
                    .iter()
                    .map(|blob| BlobRef {
                        position: 0, // assigned below
                        length: blob.length,
                        blob_key: blob.key,
                        decode: None,
                    })
                    .collect::<Vec<_>>()
            }
            ChunkPayload::Generated { decode, length } => vec![BlobRef {
                position: 0,
                length: *length,
                blob_key: derive_blob_key(&self.writer, chunk_id, 0),
                decode: Some(*decode),
            }],
        };

        let capacity = self.backend.slot_capacity();
        for blob in &planned {
            if blob.length > capacity {
                return Err(StoreError::BlobTooLarge {
                    length: blob.length,
                    capacity,
                });
            }
        }

        // the fee may change between calls, so quote it fresh
        let fee = self.backend.upfront_payment().await?;
        let required = fee * planned.len() as u64;
        if payment < required {
            return Err(StoreError::InsufficientPayment {
                attached: payment,
                required,
            });
        }

        // replacing: release every old physical blob before any new write,
        // so there is no window where both blob sets exist
        if chunk_id < count {
            let old = self.index.blob_refs(&key, chunk_id).await?;
            debug!(key = %key, chunk = chunk_id, blobs = old.len(), "replacing chunk");
            for blob in &old {
                self.backend.remove(&blob.blob_key).await?;
            }
        }

        // pay and forward each blob in order
        let mut size = 0u64;
        let mut refs = Vec::with_capacity(planned.len());
        for (position, mut blob) in planned.into_iter().enumerate() {
            blob.position = position as u32;
            self.backend
                .put_blob(blob.blob_key, blob.position, blob.length, fee)
                .await?;
            size += blob.length;
            refs.push(blob);
        }

        let fingerprint = match payload {
            ChunkPayload::Content { fingerprint, .. } => fingerprint,
            // content is not fingerprinted client-side; the backend derives
            // one when the blob is stored
            ChunkPayload::Generated { .. } => {
                self.backend.stored_hash(&refs[0].blob_key).await?
            }
        };

        // commit metadata only after every backend call succeeded
        self.index
            .commit_chunk(&key, chunk_id, size, fingerprint, &refs)
            .await?;

        let refunded = payment - required;
        *self.refundable.lock() += refunded;

        info!(key = %key, chunk = chunk_id, size, fee = %required, "chunk stored");
        Ok(WriteReceipt {
            chunk_id,
            size,
            fingerprint,
            blob_keys: refs.iter().map(|blob| blob.blob_key).collect(),
            fee: required,
            refunded,
        })
    }

    // ---- read path ----

    /// Reconstruct the whole object, chunk and blob order preserved.
    ///
    /// Returns `None` for an object with no chunks.
    pub async fn read(&self, name: &str) -> Result<Option<Bytes>> {
        let key = ObjectKey::from_name(name);
        let _guard = self.op_lock.lock().await;

        let mut out = BytesMut::new();
        let mut chunk_id = 0u64;
        // discover the chunk count by probing sizes until the first miss
        while self.index.chunk_size(&key, chunk_id).await?.is_some() {
            if let Some(bytes) = self.fetch_chunk(&key, chunk_id).await? {
                out.extend_from_slice(&bytes);
            }
            chunk_id += 1;
        }

        if chunk_id == 0 {
            Ok(None)
        } else {
            Ok(Some(out.freeze()))
        }
    }

    /// Read one chunk, or `None` if it has no blobs
    pub async fn read_chunk(&self, name: &str, chunk_id: u64) -> Result<Option<Bytes>> {
        let key = ObjectKey::from_name(name);
        let _guard = self.op_lock.lock().await;
        self.fetch_chunk(&key, chunk_id).await
    }

    async fn fetch_chunk(&self, key: &ObjectKey, chunk_id: u64) -> Result<Option<Bytes>> {
        let refs = self.index.blob_refs(key, chunk_id).await?;
        if refs.is_empty() {
            return Ok(None);
        }

        let total: u64 = refs.iter().map(|blob| blob.length).sum();
        let mut out = BytesMut::with_capacity(total as usize);
        for blob in &refs {
            if blob.decode.is_some() {
                // generated-key blobs sit at a fixed offset of the backend
                // response; copy straight into the destination buffer
                let start = out.len();
                out.resize(start + blob.length as usize, 0);
                self.backend
                    .read_into(&blob.blob_key, blob.decode, 0, &mut out[start..])
                    .await?;
            } else {
                let bytes = self
                    .backend
                    .read(&blob.blob_key, None, 0, blob.length)
                    .await?;
                out.extend_from_slice(&bytes);
            }
        }
        Ok(Some(out.freeze()))
    }

    // ---- size and count queries ----

    /// Total size and chunk count, discovered by a linear probe over
    /// ascending chunk indices
    pub async fn size(&self, name: &str) -> Result<(u64, u64)> {
        let key = ObjectKey::from_name(name);
        let _guard = self.op_lock.lock().await;

        let mut total = 0u64;
        let mut count = 0u64;
        while let Some(size) = self.index.chunk_size(&key, count).await? {
            total += size;
            count += 1;
        }
        Ok((total, count))
    }

    /// Size of one chunk, or `None` if it is absent
    pub async fn chunk_size(&self, name: &str, chunk_id: u64) -> Result<Option<u64>> {
        let key = ObjectKey::from_name(name);
        let _guard = self.op_lock.lock().await;
        Ok(self.index.chunk_size(&key, chunk_id).await?)
    }

    /// Number of chunks for an object
    pub async fn count_chunks(&self, name: &str) -> Result<u64> {
        let key = ObjectKey::from_name(name);
        let _guard = self.op_lock.lock().await;
        Ok(self.index.count_chunks(&key).await?)
    }

    /// Stored fingerprint of a chunk, or the zero sentinel if absent
    pub async fn chunk_hash(&self, name: &str, chunk_id: u64) -> Result<Fingerprint> {
        let key = ObjectKey::from_name(name);
        let _guard = self.op_lock.lock().await;
        Ok(self
            .index
            .chunk_fingerprint(&key, chunk_id)
            .await?
            .unwrap_or(Fingerprint::ZERO))
    }

    // ---- removal and truncation ----

    /// Remove the last chunk of an object.
    ///
    /// Only the current last index may be removed; removing an interior
    /// chunk would leave a gap in the index range.
    pub async fn remove_chunk(&self, name: &str, chunk_id: u64) -> Result<()> {
        let key = ObjectKey::from_name(name);
        let _guard = self.op_lock.lock().await;

        let count = self.index.count_chunks(&key).await?;
        if count == 0 {
            return Err(StoreError::EmptyObject(key));
        }
        let last = count - 1;
        if chunk_id != last {
            return Err(StoreError::IllegalPartialRemoval { chunk_id, last });
        }

        self.release_chunk(&key, chunk_id).await
    }

    /// Truncate an object: delete every chunk from the current last index
    /// down to `chunk_id` inclusive, back to front
    pub async fn truncate(&self, name: &str, chunk_id: u64) -> Result<()> {
        let key = ObjectKey::from_name(name);
        let _guard = self.op_lock.lock().await;

        let count = self.index.count_chunks(&key).await?;
        if count == 0 {
            return Err(StoreError::EmptyObject(key));
        }

        for id in (chunk_id..count).rev() {
            self.release_chunk(&key, id).await?;
        }
        info!(key = %key, from = chunk_id, removed = count.saturating_sub(chunk_id), "object truncated");
        Ok(())
    }

    /// Remove the whole object
    pub async fn remove(&self, name: &str) -> Result<()> {
        self.truncate(name, 0).await
    }

    /// Release a chunk's backend blobs, then drop its record
    async fn release_chunk(&self, key: &ObjectKey, chunk_id: u64) -> Result<()> {
        let refs = self.index.blob_refs(key, chunk_id).await?;
        for blob in &refs {
            self.backend.remove(&blob.blob_key).await?;
        }
        self.index.drop_chunk(key, chunk_id).await?;
        debug!(key = %key, chunk = chunk_id, blobs = refs.len(), "chunk released");
        Ok(())
    }

    // ---- payment accounting ----

    /// Balance of excess payments not yet returned
    pub fn refundable(&self) -> Credits {
        *self.refundable.lock()
    }

    /// Return the accumulated excess payment to the administrator
    pub fn refund(&self) -> Credits {
        std::mem::take(&mut *self.refundable.lock())
    }
}

impl SiloStore<SlotStoreBackend> {
    /// Assemble a store from a [`StoreConfig`]
    pub async fn from_config(config: &StoreConfig) -> Result<Self> {
        let backend = SlotStoreBackend::new(config.backend.clone(), config.policy).await?;
        let writer = WriterId::from_name(&config.writer);
        match &config.index_path {
            Some(path) => Self::open(path, backend, writer).await,
            None => Self::ephemeral(backend, writer).await,
        }
    }
}
