//! Physical slot storage over the `object_store` crate
//! (S3/MinIO/local filesystem/memory).
//!
//! [`SlotStoreBackend`] keeps each blob's logical content under `slots/` and
//! a small JSON sidecar (length + fingerprint) under `meta/`, so stored
//! fingerprints survive a restart when the storage location does. Producers
//! upload content to `staging/` out of band; a payable write promotes it
//! into a slot.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use common::prelude::*;

use super::{BackendError, BackendResult, BlobBackend, DecodeMode, DEFAULT_SLOT_CAPACITY};

/// Configuration for the physical slot storage location
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlotStoreConfig {
    /// In-memory storage (for testing)
    #[default]
    Memory,

    /// Local filesystem storage
    Local {
        /// Path to the storage directory
        path: PathBuf,
    },

    /// S3-compatible storage (AWS S3, MinIO, etc.)
    S3 {
        /// S3 endpoint URL (e.g., "http://localhost:9000" for MinIO)
        endpoint: String,
        /// Access key ID
        access_key: String,
        /// Secret access key
        secret_key: String,
        /// Bucket name
        bucket: String,
        /// Optional region (defaults to "us-east-1")
        region: Option<String>,
    },
}

/// Slot sizing and fee policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackendPolicy {
    /// Per-blob fee charged on every payable write
    #[serde(default = "BackendPolicy::default_fee")]
    pub upfront_payment: Credits,
    /// Fixed capacity of one storage slot in bytes
    #[serde(default = "BackendPolicy::default_capacity")]
    pub slot_capacity: u64,
}

impl BackendPolicy {
    fn default_fee() -> Credits {
        Credits::new(10)
    }

    fn default_capacity() -> u64 {
        DEFAULT_SLOT_CAPACITY
    }
}

impl Default for BackendPolicy {
    fn default() -> Self {
        Self {
            upfront_payment: Self::default_fee(),
            slot_capacity: Self::default_capacity(),
        }
    }
}

/// Sidecar metadata persisted next to each slot
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SlotMeta {
    length: u64,
    fingerprint: Fingerprint,
}

#[derive(Debug)]
struct FeeState {
    upfront_payment: Credits,
    collected: Credits,
}

/// Blob backend over pluggable object storage
#[derive(Debug, Clone)]
pub struct SlotStoreBackend {
    inner: Arc<dyn ObjectStore>,
    slot_capacity: u64,
    fees: Arc<RwLock<FeeState>>,
    /// Staged content indexed by key, promoted into slots on payable writes
    staged: Arc<RwLock<HashMap<BlobKey, Bytes>>>,
}

impl SlotStoreBackend {
    /// Create a new backend from a storage configuration and policy
    pub async fn new(config: SlotStoreConfig, policy: BackendPolicy) -> BackendResult<Self> {
        let inner: Arc<dyn ObjectStore> = match &config {
            SlotStoreConfig::Memory => Arc::new(InMemory::new()),

            SlotStoreConfig::Local { path } => {
                // Ensure directory exists
                tokio::fs::create_dir_all(path)
                    .await
                    .map_err(|e| anyhow::anyhow!("slot directory: {}", e))?;
                Arc::new(
                    LocalFileSystem::new_with_prefix(path)
                        .map_err(|e| anyhow::anyhow!("local slot storage: {}", e))?,
                )
            }

            SlotStoreConfig::S3 {
                endpoint,
                access_key,
                secret_key,
                bucket,
                region,
            } => {
                let builder = AmazonS3Builder::new()
                    .with_endpoint(endpoint)
                    .with_access_key_id(access_key)
                    .with_secret_access_key(secret_key)
                    .with_bucket_name(bucket)
                    .with_region(region.as_deref().unwrap_or("us-east-1"))
                    .with_allow_http(endpoint.starts_with("http://"));

                let store: Arc<dyn ObjectStore> =
                    Arc::new(builder.build().map_err(|e| anyhow::anyhow!("s3: {}", e))?);

                // Fail fast if the bucket does not exist
                {
                    use futures::TryStreamExt;
                    let prefix = ObjectPath::from("");
                    let mut stream = store.list(Some(&prefix));
                    if let Err(e) = stream.try_next().await {
                        return Err(anyhow::anyhow!("bucket '{}' not reachable: {}", bucket, e).into());
                    }
                }

                store
            }
        };

        Ok(Self {
            inner,
            slot_capacity: policy.slot_capacity,
            fees: Arc::new(RwLock::new(FeeState {
                upfront_payment: policy.upfront_payment,
                collected: Credits::ZERO,
            })),
            staged: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Build the storage path for a slot's content
    fn slot_path(key: &BlobKey) -> ObjectPath {
        ObjectPath::from(format!("slots/{}", key.to_hex()))
    }

    /// Build the storage path for a slot's metadata sidecar
    fn meta_path(key: &BlobKey) -> ObjectPath {
        ObjectPath::from(format!("meta/{}", key.to_hex()))
    }

    /// Upload blob content ahead of a payable write
    pub fn upload(&self, key: BlobKey, data: Bytes) {
        self.staged.write().insert(key, data);
    }

    /// Adjust the fee quoted for subsequent writes
    pub fn set_upfront_payment(&self, fee: Credits) {
        self.fees.write().upfront_payment = fee;
    }

    /// Total fees collected across all writes
    pub fn collected(&self) -> Credits {
        self.fees.read().collected
    }

    async fn read_meta(&self, key: &BlobKey) -> BackendResult<SlotMeta> {
        match self.inner.get(&Self::meta_path(key)).await {
            Ok(result) => {
                let bytes = result
                    .bytes()
                    .await
                    .map_err(|e| anyhow::anyhow!("slot meta read: {}", e))?;
                serde_json::from_slice(&bytes)
                    .map_err(|e| anyhow::anyhow!("slot meta decode: {}", e).into())
            }
            Err(object_store::Error::NotFound { .. }) => Err(BackendError::NotFound(*key)),
            Err(e) => Err(anyhow::anyhow!("slot meta read: {}", e).into()),
        }
    }
}

#[async_trait]
impl BlobBackend for SlotStoreBackend {
    fn slot_capacity(&self) -> u64 {
        self.slot_capacity
    }

    async fn upfront_payment(&self) -> BackendResult<Credits> {
        Ok(self.fees.read().upfront_payment)
    }

    async fn put_blob(
        &self,
        key: BlobKey,
        _position: u32,
        length: u64,
        payment: Credits,
    ) -> BackendResult<()> {
        if length > self.slot_capacity {
            return Err(BackendError::SlotOverflow {
                length,
                capacity: self.slot_capacity,
            });
        }
        {
            let fees = self.fees.read();
            if payment < fees.upfront_payment {
                return Err(BackendError::FeeTooLow {
                    attached: payment,
                    required: fees.upfront_payment,
                });
            }
        }

        let staged = self.staged.write().remove(&key).unwrap_or_default();
        let mut content = vec![0u8; length as usize];
        let copy = (length as usize).min(staged.len());
        content[..copy].copy_from_slice(&staged[..copy]);

        let meta = SlotMeta {
            length,
            fingerprint: Fingerprint::of(&content),
        };
        let meta_bytes =
            serde_json::to_vec(&meta).map_err(|e| anyhow::anyhow!("slot meta encode: {}", e))?;

        self.inner
            .put(&Self::slot_path(&key), Bytes::from(content).into())
            .await
            .map_err(|e| anyhow::anyhow!("slot write: {}", e))?;
        self.inner
            .put(&Self::meta_path(&key), Bytes::from(meta_bytes).into())
            .await
            .map_err(|e| anyhow::anyhow!("slot meta write: {}", e))?;

        self.fees.write().collected += payment;
        Ok(())
    }

    async fn read(
        &self,
        key: &BlobKey,
        _decode: Option<DecodeMode>,
        offset: u64,
        length: u64,
    ) -> BackendResult<Bytes> {
        let end = offset + length;
        if end > self.slot_capacity {
            return Err(BackendError::OutOfRange {
                offset,
                end,
                capacity: self.slot_capacity,
            });
        }

        let content = match self.inner.get(&Self::slot_path(key)).await {
            Ok(result) => result
                .bytes()
                .await
                .map_err(|e| anyhow::anyhow!("slot read: {}", e))?,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(BackendError::NotFound(*key))
            }
            Err(e) => return Err(anyhow::anyhow!("slot read: {}", e).into()),
        };

        let mut out = vec![0u8; length as usize];
        let start = offset as usize;
        if start < content.len() {
            let copy = (content.len() - start).min(out.len());
            out[..copy].copy_from_slice(&content[start..start + copy]);
        }
        Ok(Bytes::from(out))
    }

    async fn remove(&self, key: &BlobKey) -> BackendResult<()> {
        // Ignore NotFound - the blob may already be deleted
        for path in [Self::slot_path(key), Self::meta_path(key)] {
            match self.inner.delete(&path).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => return Err(anyhow::anyhow!("slot delete: {}", e).into()),
            }
        }
        Ok(())
    }

    async fn stored_hash(&self, key: &BlobKey) -> BackendResult<Fingerprint> {
        Ok(self.read_meta(key).await?.fingerprint)
    }
}
