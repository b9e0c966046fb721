//! Chunked Large-Object Storage Manager
//!
//! This crate persists named logical objects of arbitrary size across an
//! external fixed-capacity blob backend by splitting each object into an
//! ordered sequence of chunks, each chunk composed of one or more physically
//! stored blobs.
//!
//! # Features
//!
//! - Strict append/replace/truncate chunk protocol with contiguous indices
//! - Payment accounting against the backend's live per-blob fee, with a
//!   refundable balance for excess payments
//! - Two blob addressing strategies: caller-supplied content fingerprints
//!   (up to two blobs per chunk) and store-generated randomized keys (one
//!   blob per chunk, with a backend decode mode passed through)
//! - SQLite chunk index, file-backed or in-memory
//! - Backend implementations over a hash map (tests/demos) and over the
//!   `object_store` crate (S3/MinIO/local filesystem/memory)
//!
//! # Example
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use common::prelude::*;
//! use store::backend::MemoryBackend;
//! use store::{BlobSpec, SiloStore};
//!
//! # async fn example() -> store::Result<()> {
//! let backend = MemoryBackend::new();
//! let store = SiloStore::ephemeral(backend.clone(), WriterId::from_name("demo")).await?;
//!
//! let data = Bytes::from_static(b"hello, silo");
//! let blob_key = BlobKey::content_of(&data);
//! backend.stage(blob_key, data.clone());
//!
//! store
//!     .write(
//!         "greetings/hello.txt",
//!         Fingerprint::of(&data),
//!         vec![BlobSpec::new(blob_key, data.len() as u64)],
//!         Credits::new(10),
//!     )
//!     .await?;
//!
//! let bytes = store.read("greetings/hello.txt").await?;
//! assert_eq!(bytes.as_deref(), Some(&data[..]));
//! # Ok(())
//! # }
//! ```

pub mod addressing;
pub mod backend;
mod config;
mod error;
mod index;
mod store;

pub use config::{ConfigError, StoreConfig};
pub use error::{Result, StoreError};
pub use index::IndexError;
pub use store::{BlobSpec, SiloStore, WriteReceipt};
