//! Generated-key addressing: derived keys, decode passthrough, logical sizes.

use async_trait::async_trait;
use bytes::Bytes;

use common::prelude::*;
use store::backend::{
    BackendResult, BlobBackend, DecodeMode, MemoryBackend,
};
use store::SiloStore;

/// Backend wrapper that applies a trivial byte transform on reads.
///
/// The decode mode names an XOR mask. Blobs are stored in their transformed
/// form; a read with the recorded decode mode undoes the mask. The store
/// never interprets the mode, it only replays it, which is exactly what this
/// wrapper verifies.
#[derive(Debug, Clone)]
struct XorBackend {
    inner: MemoryBackend,
}

fn xor(mut bytes: Vec<u8>, mask: u8) -> Vec<u8> {
    for byte in &mut bytes {
        *byte ^= mask;
    }
    bytes
}

#[async_trait]
impl BlobBackend for XorBackend {
    fn slot_capacity(&self) -> u64 {
        self.inner.slot_capacity()
    }

    async fn upfront_payment(&self) -> BackendResult<Credits> {
        self.inner.upfront_payment().await
    }

    async fn put_blob(
        &self,
        key: BlobKey,
        position: u32,
        length: u64,
        payment: Credits,
    ) -> BackendResult<()> {
        self.inner.put_blob(key, position, length, payment).await
    }

    async fn read(
        &self,
        key: &BlobKey,
        decode: Option<DecodeMode>,
        offset: u64,
        length: u64,
    ) -> BackendResult<Bytes> {
        let raw = self.inner.read(key, None, offset, length).await?;
        match decode {
            Some(mode) => Ok(Bytes::from(xor(raw.to_vec(), mode.get() as u8))),
            None => Ok(raw),
        }
    }

    async fn remove(&self, key: &BlobKey) -> BackendResult<()> {
        self.inner.remove(key).await
    }

    async fn stored_hash(&self, key: &BlobKey) -> BackendResult<Fingerprint> {
        self.inner.stored_hash(key).await
    }
}

const PAYMENT: Credits = Credits::new(50);
const MASK: u8 = 0x5a;

async fn new_store() -> (SiloStore<XorBackend>, MemoryBackend) {
    let inner = MemoryBackend::new();
    let backend = XorBackend {
        inner: inner.clone(),
    };
    let store = SiloStore::ephemeral(backend, WriterId::from_name("generator"))
        .await
        .unwrap();
    (store, inner)
}

#[tokio::test]
async fn generated_write_round_trips_through_decode() {
    let (store, inner) = new_store().await;

    let plaintext = b"transformed at rest".to_vec();
    // the backend holds the transformed form; the decode mode undoes it
    inner.stage_next(Bytes::from(xor(plaintext.clone(), MASK)));

    let receipt = store
        .write_generated(
            "gen.bin",
            DecodeMode::new(MASK as u32),
            plaintext.len() as u64,
            PAYMENT,
        )
        .await
        .unwrap();
    assert_eq!(receipt.chunk_id, 0);
    assert_eq!(receipt.blob_keys.len(), 1);

    let bytes = store.read("gen.bin").await.unwrap().unwrap();
    assert_eq!(&bytes[..], &plaintext[..]);

    let chunk = store.read_chunk("gen.bin", 0).await.unwrap().unwrap();
    assert_eq!(&chunk[..], &plaintext[..]);
}

#[tokio::test]
async fn generated_chunk_records_logical_length() {
    let (store, inner) = new_store().await;

    inner.stage_next(Bytes::from(xor(vec![7u8; 100], MASK)));
    store
        .write_generated("sized.bin", DecodeMode::new(MASK as u32), 100, PAYMENT)
        .await
        .unwrap();

    // the backend allocates a fixed-capacity slot; the chunk records the
    // logical, pre-transform size
    assert_eq!(store.chunk_size("sized.bin", 0).await.unwrap(), Some(100));
    assert_eq!(store.size("sized.bin").await.unwrap(), (100, 1));
}

#[tokio::test]
async fn generated_fingerprint_comes_from_backend() {
    let (store, inner) = new_store().await;

    let stored_form = xor(b"fingerprint me".to_vec(), MASK);
    inner.stage_next(Bytes::from(stored_form.clone()));

    let receipt = store
        .write_generated(
            "hashed.bin",
            DecodeMode::new(MASK as u32),
            stored_form.len() as u64,
            PAYMENT,
        )
        .await
        .unwrap();

    let expected = inner.stored_hash(&receipt.blob_keys[0]).await.unwrap();
    assert_eq!(receipt.fingerprint, expected);
    assert_eq!(store.chunk_hash("hashed.bin", 0).await.unwrap(), expected);
    assert!(!expected.is_zero());
}

#[tokio::test]
async fn replacement_derives_a_fresh_key() {
    let (store, inner) = new_store().await;

    inner.stage_next(Bytes::from(xor(b"v1".to_vec(), MASK)));
    let first = store
        .write_generated("rotate.bin", DecodeMode::new(MASK as u32), 2, PAYMENT)
        .await
        .unwrap();

    inner.stage_next(Bytes::from(xor(b"v2".to_vec(), MASK)));
    let second = store
        .write_chunk_generated("rotate.bin", 0, DecodeMode::new(MASK as u32), 2, PAYMENT)
        .await
        .unwrap();

    // a fresh key per write, and the old physical blob is gone
    assert_ne!(first.blob_keys[0], second.blob_keys[0]);
    assert!(!inner.contains(&first.blob_keys[0]));
    assert_eq!(inner.len(), 1);

    let bytes = store.read("rotate.bin").await.unwrap().unwrap();
    assert_eq!(&bytes[..], b"v2");
}

#[tokio::test]
async fn fixed_offset_copy_matches_naive_read() {
    let inner = MemoryBackend::new();
    let backend = XorBackend {
        inner: inner.clone(),
    };

    let content: Vec<u8> = (0u8..=255).collect();
    let key = BlobKey::content_of(&content);
    inner.stage(key, Bytes::from(content.clone()));
    backend
        .put_blob(key, 0, content.len() as u64, PAYMENT)
        .await
        .unwrap();

    let decode = Some(DecodeMode::new(MASK as u32));
    for (offset, length) in [(0u64, 256usize), (1, 17), (100, 156), (255, 1), (64, 0)] {
        let naive = backend
            .read(&key, decode, offset, length as u64)
            .await
            .unwrap();
        let mut copied = vec![0xeeu8; length];
        backend
            .read_into(&key, decode, offset, &mut copied)
            .await
            .unwrap();
        assert_eq!(&naive[..], &copied[..]);
    }
}

#[tokio::test]
async fn generated_and_content_chunks_coexist() {
    let (store, inner) = new_store().await;

    // chunk 0 written under a caller-supplied content key
    let data = b"plain chunk".to_vec();
    let content_key = BlobKey::content_of(&data);
    inner.stage(content_key, Bytes::from(data.clone()));
    store
        .write(
            "mixed.bin",
            Fingerprint::of(&data),
            vec![store::BlobSpec::new(content_key, data.len() as u64)],
            PAYMENT,
        )
        .await
        .unwrap();

    // chunk 1 written under a generated key with a decode mode
    let tail = b"masked chunk".to_vec();
    inner.stage_next(Bytes::from(xor(tail.clone(), MASK)));
    store
        .write_generated("mixed.bin", DecodeMode::new(MASK as u32), tail.len() as u64, PAYMENT)
        .await
        .unwrap();

    let bytes = store.read("mixed.bin").await.unwrap().unwrap();
    assert_eq!(&bytes[..], b"plain chunkmasked chunk");
}
