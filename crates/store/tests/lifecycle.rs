//! End-to-end chunk lifecycle: append, replace, truncate, remove.

use bytes::Bytes;

use common::prelude::*;
use store::backend::{BackendOp, MemoryBackend};
use store::{BlobSpec, SiloStore, StoreError};

const PAYMENT: Credits = Credits::new(100);

async fn new_store() -> (SiloStore<MemoryBackend>, MemoryBackend) {
    let backend = MemoryBackend::new();
    let store = SiloStore::ephemeral(backend.clone(), WriterId::from_name("tester"))
        .await
        .unwrap();
    (store, backend)
}

/// Stage `data` with the backend and describe it for a content-addressed write
fn staged(backend: &MemoryBackend, data: &[u8]) -> BlobSpec {
    let key = BlobKey::content_of(data);
    backend.stage(key, Bytes::copy_from_slice(data));
    BlobSpec::new(key, data.len() as u64)
}

#[tokio::test]
async fn append_truncate_scenario() {
    let (store, backend) = new_store().await;

    // chunk 0: two blobs of 100 and 50 bytes
    let blobs = vec![staged(&backend, &[1u8; 100]), staged(&backend, &[2u8; 50])];
    let receipt = store
        .write("data.bin", Fingerprint::of(b"c0"), blobs, PAYMENT)
        .await
        .unwrap();
    assert_eq!(receipt.chunk_id, 0);
    assert_eq!(receipt.size, 150);
    assert_eq!(store.chunk_size("data.bin", 0).await.unwrap(), Some(150));

    // chunk 1: one blob of 200 bytes
    store
        .write("data.bin", Fingerprint::of(b"c1"), vec![staged(&backend, &[3u8; 200])], PAYMENT)
        .await
        .unwrap();
    assert_eq!(store.size("data.bin").await.unwrap(), (350, 2));

    // truncate back to one chunk
    store.truncate("data.bin", 1).await.unwrap();
    assert_eq!(store.size("data.bin").await.unwrap(), (150, 1));

    // remove the last remaining chunk
    store.remove_chunk("data.bin", 0).await.unwrap();
    assert_eq!(store.count_chunks("data.bin").await.unwrap(), 0);
    assert_eq!(store.size("data.bin").await.unwrap(), (0, 0));
    assert!(store.read("data.bin").await.unwrap().is_none());

    // every physical blob was released
    assert!(backend.is_empty());
}

#[tokio::test]
async fn round_trip_preserves_order() {
    let (store, backend) = new_store().await;

    let parts: [&[u8]; 3] = [b"first blob ", b"second blob ", b"third chunk"];
    store
        .write(
            "doc.txt",
            Fingerprint::of(b"chunk0"),
            vec![staged(&backend, parts[0]), staged(&backend, parts[1])],
            PAYMENT,
        )
        .await
        .unwrap();
    store
        .write(
            "doc.txt",
            Fingerprint::of(b"chunk1"),
            vec![staged(&backend, parts[2])],
            PAYMENT,
        )
        .await
        .unwrap();

    let bytes = store.read("doc.txt").await.unwrap().unwrap();
    assert_eq!(&bytes[..], b"first blob second blob third chunk");

    let chunk0 = store.read_chunk("doc.txt", 0).await.unwrap().unwrap();
    assert_eq!(&chunk0[..], b"first blob second blob ");
    assert!(store.read_chunk("doc.txt", 2).await.unwrap().is_none());

    assert_eq!(
        store.chunk_hash("doc.txt", 0).await.unwrap(),
        Fingerprint::of(b"chunk0")
    );
    assert!(store.chunk_hash("doc.txt", 9).await.unwrap().is_zero());
}

#[tokio::test]
async fn replace_releases_old_blobs_first() {
    let (store, backend) = new_store().await;

    let old = vec![staged(&backend, b"old-a"), staged(&backend, b"old-b")];
    let old_keys: Vec<BlobKey> = old.iter().map(|blob| blob.key).collect();
    store
        .write("replace.bin", Fingerprint::of(b"v1"), old, PAYMENT)
        .await
        .unwrap();

    let new = vec![staged(&backend, b"new-content")];
    store
        .write_chunk("replace.bin", 0, Fingerprint::of(b"v2"), new, PAYMENT)
        .await
        .unwrap();

    // the replacement removed both old blobs before storing any new one
    let journal = backend.journal();
    let first_new_put = journal
        .iter()
        .position(|op| matches!(op, BackendOp::Put(key) if !old_keys.contains(key)))
        .unwrap();
    for key in &old_keys {
        let removed = journal
            .iter()
            .position(|op| matches!(op, BackendOp::Remove(k) if k == key))
            .unwrap();
        assert!(removed < first_new_put);
    }

    // no orphaned physical blobs survive the replacement
    assert_eq!(backend.len(), 1);
    let bytes = store.read("replace.bin").await.unwrap().unwrap();
    assert_eq!(&bytes[..], b"new-content");
    assert_eq!(store.count_chunks("replace.bin").await.unwrap(), 1);
}

#[tokio::test]
async fn write_gap_is_rejected() {
    let (store, backend) = new_store().await;

    let result = store
        .write_chunk(
            "gap.bin",
            5,
            Fingerprint::of(b"fp"),
            vec![staged(&backend, b"data")],
            PAYMENT,
        )
        .await;
    assert!(matches!(
        result,
        Err(StoreError::InvalidChunkIndex { chunk_id: 5, count: 0 })
    ));
    assert_eq!(store.count_chunks("gap.bin").await.unwrap(), 0);
}

#[tokio::test]
async fn blob_count_is_bounded() {
    let (store, backend) = new_store().await;

    let result = store
        .write("bad.bin", Fingerprint::ZERO, vec![], PAYMENT)
        .await;
    assert!(matches!(result, Err(StoreError::InvalidBlobCount { given: 0, .. })));

    let blobs = vec![
        staged(&backend, b"a"),
        staged(&backend, b"b"),
        staged(&backend, b"c"),
    ];
    let result = store.write("bad.bin", Fingerprint::ZERO, blobs, PAYMENT).await;
    assert!(matches!(result, Err(StoreError::InvalidBlobCount { given: 3, .. })));

    // nothing reached the backend
    assert!(backend.journal().is_empty());
}

#[tokio::test]
async fn oversized_blob_is_rejected() {
    let backend = MemoryBackend::with_slot_capacity(64);
    let store = SiloStore::ephemeral(backend.clone(), WriterId::from_name("tester"))
        .await
        .unwrap();

    let result = store
        .write(
            "big.bin",
            Fingerprint::ZERO,
            vec![staged(&backend, &[0u8; 65])],
            PAYMENT,
        )
        .await;
    assert!(matches!(
        result,
        Err(StoreError::BlobTooLarge { length: 65, capacity: 64 })
    ));
    assert!(backend.journal().is_empty());
}

#[tokio::test]
async fn interior_removal_is_rejected() {
    let (store, backend) = new_store().await;

    for chunk in 0..3u8 {
        store
            .write(
                "multi.bin",
                Fingerprint::of(&[chunk]),
                vec![staged(&backend, &[chunk; 10])],
                PAYMENT,
            )
            .await
            .unwrap();
    }

    let result = store.remove_chunk("multi.bin", 1).await;
    assert!(matches!(
        result,
        Err(StoreError::IllegalPartialRemoval { chunk_id: 1, last: 2 })
    ));
    assert_eq!(store.count_chunks("multi.bin").await.unwrap(), 3);

    // the tail itself is removable
    store.remove_chunk("multi.bin", 2).await.unwrap();
    assert_eq!(store.count_chunks("multi.bin").await.unwrap(), 2);
}

#[tokio::test]
async fn removal_on_empty_object_is_rejected() {
    let (store, _backend) = new_store().await;

    assert!(matches!(
        store.remove("absent.bin").await,
        Err(StoreError::EmptyObject(_))
    ));
    assert!(matches!(
        store.truncate("absent.bin", 0).await,
        Err(StoreError::EmptyObject(_))
    ));
    assert!(matches!(
        store.remove_chunk("absent.bin", 0).await,
        Err(StoreError::EmptyObject(_))
    ));
}

#[tokio::test]
async fn remove_empties_object() {
    let (store, backend) = new_store().await;

    for chunk in 0..4u8 {
        store
            .write(
                "victim.bin",
                Fingerprint::of(&[chunk]),
                vec![staged(&backend, &[chunk; 32])],
                PAYMENT,
            )
            .await
            .unwrap();
    }

    store.remove("victim.bin").await.unwrap();
    assert_eq!(store.count_chunks("victim.bin").await.unwrap(), 0);
    assert!(backend.is_empty());

    // other objects are untouched by a removal
    store
        .write(
            "other.bin",
            Fingerprint::of(b"other"),
            vec![staged(&backend, b"other data")],
            PAYMENT,
        )
        .await
        .unwrap();
    store
        .write(
            "victim.bin",
            Fingerprint::of(b"again"),
            vec![staged(&backend, b"rewritten")],
            PAYMENT,
        )
        .await
        .unwrap();
    store.remove("victim.bin").await.unwrap();
    assert_eq!(store.count_chunks("other.bin").await.unwrap(), 1);
}

#[tokio::test]
async fn reopened_store_keeps_metadata() {
    use store::backend::{BackendPolicy, SlotStoreBackend, SlotStoreConfig};

    let dir = tempfile::tempdir().unwrap();
    let index_path = dir.path().join("index.db");
    let slots_path = dir.path().join("slots");
    let data = Bytes::from_static(b"durable contents");
    let blob_key = BlobKey::content_of(&data);

    let config = SlotStoreConfig::Local {
        path: slots_path.clone(),
    };

    {
        let backend = SlotStoreBackend::new(config.clone(), BackendPolicy::default())
            .await
            .unwrap();
        backend.upload(blob_key, data.clone());
        let store = SiloStore::open(&index_path, backend, WriterId::from_name("tester"))
            .await
            .unwrap();
        store
            .write(
                "durable.bin",
                Fingerprint::of(&data),
                vec![BlobSpec::new(blob_key, data.len() as u64)],
                PAYMENT,
            )
            .await
            .unwrap();
    }

    let backend = SlotStoreBackend::new(config, BackendPolicy::default())
        .await
        .unwrap();
    let store = SiloStore::open(&index_path, backend, WriterId::from_name("tester"))
        .await
        .unwrap();

    assert_eq!(store.size("durable.bin").await.unwrap(), (16, 1));
    let bytes = store.read("durable.bin").await.unwrap().unwrap();
    assert_eq!(bytes, data);
}
