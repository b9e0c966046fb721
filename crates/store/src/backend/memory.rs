//! In-memory blob backend for tests and demos.
//!
//! [`MemoryBackend`] keeps slots in a hash map behind an `RwLock` and models
//! the payable-write contract of a real backend: a per-blob upfront fee
//! (adjustable at runtime), a fixed slot capacity, and zero-filled reads past
//! the logical content. It also records an operation journal so tests can
//! assert ordering contracts, e.g. that a chunk replacement removes every old
//! blob before any new blob is stored.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use common::prelude::*;

use super::{BackendError, BackendResult, BlobBackend, DecodeMode, DEFAULT_SLOT_CAPACITY};

const DEFAULT_UPFRONT_PAYMENT: Credits = Credits::new(10);

/// One entry in the backend's operation journal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOp {
    Put(BlobKey),
    Remove(BlobKey),
}

/// In-memory blob backend backed by a hash map
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<RwLock<MemoryBackendInner>>,
}

#[derive(Debug)]
struct MemoryBackendInner {
    slots: HashMap<BlobKey, Slot>,
    /// Content pushed by producers ahead of a payable write, by key
    staged: HashMap<BlobKey, Bytes>,
    /// Anonymous content consumed in order by upcoming payable writes
    queued: VecDeque<Bytes>,
    upfront_payment: Credits,
    slot_capacity: u64,
    collected: Credits,
    journal: Vec<BackendOp>,
}

impl Default for MemoryBackendInner {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
            staged: HashMap::new(),
            queued: VecDeque::new(),
            upfront_payment: DEFAULT_UPFRONT_PAYMENT,
            slot_capacity: DEFAULT_SLOT_CAPACITY,
            collected: Credits::ZERO,
            journal: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct Slot {
    /// Logical content, exactly `length` bytes
    content: Bytes,
    fingerprint: Fingerprint,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend with a custom slot capacity
    pub fn with_slot_capacity(slot_capacity: u64) -> Self {
        let backend = Self::default();
        backend.inner.write().slot_capacity = slot_capacity;
        backend
    }

    /// Push blob content ahead of a payable write.
    ///
    /// This is the producer-side upload path: content arrives at the backend
    /// out of band, and a later [`BlobBackend::put_blob`] for the same key
    /// commits it into a slot.
    pub fn stage(&self, key: BlobKey, data: Bytes) {
        self.inner.write().staged.insert(key, data);
    }

    /// Queue blob content for the next payable write, whatever its key.
    ///
    /// Models the backend's own ingest pipeline for generated keys: content
    /// travels in the same envelope as the payable write, not addressed in
    /// advance, and the backend binds it to whichever key the write names.
    pub fn stage_next(&self, data: Bytes) {
        self.inner.write().queued.push_back(data);
    }

    /// Adjust the fee quoted for subsequent writes
    pub fn set_upfront_payment(&self, fee: Credits) {
        self.inner.write().upfront_payment = fee;
    }

    /// Total fees collected across all writes
    pub fn collected(&self) -> Credits {
        self.inner.read().collected
    }

    /// Snapshot of the operation journal
    pub fn journal(&self) -> Vec<BackendOp> {
        self.inner.read().journal.clone()
    }

    /// Return the number of blobs currently stored
    pub fn len(&self) -> usize {
        self.inner.read().slots.len()
    }

    /// Return `true` if the backend holds no blobs
    pub fn is_empty(&self) -> bool {
        self.inner.read().slots.is_empty()
    }

    /// Check whether a blob with the given key exists
    pub fn contains(&self, key: &BlobKey) -> bool {
        self.inner.read().slots.contains_key(key)
    }
}

/// Truncate or zero-extend `data` to exactly `length` bytes
fn fit_to_length(data: Bytes, length: usize) -> Bytes {
    if data.len() == length {
        data
    } else {
        let mut fitted = vec![0u8; length];
        let copy = length.min(data.len());
        fitted[..copy].copy_from_slice(&data[..copy]);
        Bytes::from(fitted)
    }
}

#[async_trait]
impl BlobBackend for MemoryBackend {
    fn slot_capacity(&self) -> u64 {
        self.inner.read().slot_capacity
    }

    async fn upfront_payment(&self) -> BackendResult<Credits> {
        Ok(self.inner.read().upfront_payment)
    }

    async fn put_blob(
        &self,
        key: BlobKey,
        _position: u32,
        length: u64,
        payment: Credits,
    ) -> BackendResult<()> {
        let mut inner = self.inner.write();

        if length > inner.slot_capacity {
            return Err(BackendError::SlotOverflow {
                length,
                capacity: inner.slot_capacity,
            });
        }
        if payment < inner.upfront_payment {
            return Err(BackendError::FeeTooLow {
                attached: payment,
                required: inner.upfront_payment,
            });
        }

        let staged = inner
            .staged
            .remove(&key)
            .or_else(|| inner.queued.pop_front())
            .unwrap_or_default();
        let content = fit_to_length(staged, length as usize);
        let fingerprint = Fingerprint::of(&content);

        inner.slots.insert(
            key,
            Slot {
                content,
                fingerprint,
            },
        );
        inner.collected += payment;
        inner.journal.push(BackendOp::Put(key));
        Ok(())
    }

    async fn read(
        &self,
        key: &BlobKey,
        _decode: Option<DecodeMode>,
        offset: u64,
        length: u64,
    ) -> BackendResult<Bytes> {
        let inner = self.inner.read();

        let end = offset + length;
        if end > inner.slot_capacity {
            return Err(BackendError::OutOfRange {
                offset,
                end,
                capacity: inner.slot_capacity,
            });
        }

        let slot = inner.slots.get(key).ok_or(BackendError::NotFound(*key))?;

        let mut out = vec![0u8; length as usize];
        let start = offset as usize;
        if start < slot.content.len() {
            let copy = (slot.content.len() - start).min(out.len());
            out[..copy].copy_from_slice(&slot.content[start..start + copy]);
        }
        Ok(Bytes::from(out))
    }

    async fn read_into(
        &self,
        key: &BlobKey,
        _decode: Option<DecodeMode>,
        offset: u64,
        buf: &mut [u8],
    ) -> BackendResult<()> {
        let inner = self.inner.read();

        let end = offset + buf.len() as u64;
        if end > inner.slot_capacity {
            return Err(BackendError::OutOfRange {
                offset,
                end,
                capacity: inner.slot_capacity,
            });
        }

        let slot = inner.slots.get(key).ok_or(BackendError::NotFound(*key))?;

        buf.fill(0);
        let start = offset as usize;
        if start < slot.content.len() {
            let copy = (slot.content.len() - start).min(buf.len());
            buf[..copy].copy_from_slice(&slot.content[start..start + copy]);
        }
        Ok(())
    }

    async fn remove(&self, key: &BlobKey) -> BackendResult<()> {
        let mut inner = self.inner.write();
        inner.slots.remove(key);
        inner.journal.push(BackendOp::Remove(*key));
        Ok(())
    }

    async fn stored_hash(&self, key: &BlobKey) -> BackendResult<Fingerprint> {
        let inner = self.inner.read();
        inner
            .slots
            .get(key)
            .map(|slot| slot.fingerprint)
            .ok_or(BackendError::NotFound(*key))
    }
}
