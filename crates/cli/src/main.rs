//! Silo CLI - drive a local chunked large-object store.
//!
//! Stands up a store over a local slot directory and SQLite chunk index,
//! then exposes the manager surface as subcommands: put, cat, stat, rm,
//! truncate. Files are split into slot-sized blobs, two blobs per chunk,
//! and stored under content-addressed keys.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use common::prelude::*;
use store::backend::{BlobBackend, SlotStoreBackend, SlotStoreConfig};
use store::{BlobSpec, SiloStore, StoreConfig};

/// Silo - chunked large-object storage over a local slot directory
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the chunk index and slot storage
    #[arg(long, default_value = "./silo-data")]
    data_dir: PathBuf,

    /// TOML configuration file; takes precedence over --data-dir
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a file under a logical name
    Put {
        name: String,
        file: PathBuf,
        /// Credits attached to each chunk write
        #[arg(long, default_value_t = 100)]
        payment: u64,
    },
    /// Write an object's bytes to stdout
    Cat { name: String },
    /// Show an object's size and chunk layout
    Stat {
        name: String,
        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an object
    Rm { name: String },
    /// Drop every chunk from the given index to the end
    Truncate { name: String, chunk_id: u64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing; logs go to stderr so `cat` keeps a clean stdout
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
    let log_level: tracing::Level = args.log_level.parse().unwrap_or(tracing::Level::WARN);
    let env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(non_blocking_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stderr_layer).init();

    let config = match &args.config {
        Some(path) => StoreConfig::load(path)
            .await
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => StoreConfig {
            index_path: Some(args.data_dir.join("index.db")),
            backend: SlotStoreConfig::Local {
                path: args.data_dir.join("slots"),
            },
            ..StoreConfig::default()
        },
    };

    let store = SiloStore::from_config(&config).await?;

    match args.command {
        Command::Put {
            name,
            file,
            payment,
        } => put(&store, &name, &file, Credits::new(payment)).await,
        Command::Cat { name } => cat(&store, &name).await,
        Command::Stat { name, json } => stat(&store, &name, json).await,
        Command::Rm { name } => {
            store.remove(&name).await?;
            println!("removed {}", name);
            Ok(())
        }
        Command::Truncate { name, chunk_id } => {
            store.truncate(&name, chunk_id).await?;
            let (size, count) = store.size(&name).await?;
            println!("truncated {} to {} chunks ({} bytes)", name, count, size);
            Ok(())
        }
    }
}

/// Split a file into slot-sized blobs, two blobs per chunk, and write it
/// chunk by chunk. Replaces any existing chunks in place and truncates a
/// leftover tail from a previous, longer version.
async fn put(
    store: &SiloStore<SlotStoreBackend>,
    name: &str,
    file: &Path,
    payment: Credits,
) -> Result<()> {
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    if data.is_empty() {
        bail!("{} is empty, nothing to store", file.display());
    }

    let blob_size = store.backend().slot_capacity() as usize;
    let blobs: Vec<&[u8]> = data.chunks(blob_size).collect();
    let old_count = store.count_chunks(name).await?;

    let mut total_fee = Credits::ZERO;
    let mut chunk_count = 0u64;
    for (chunk_id, pair) in blobs.chunks(2).enumerate() {
        let mut specs = Vec::with_capacity(pair.len());
        let mut chunk_bytes = Vec::new();
        for blob in pair {
            let key = BlobKey::content_of(blob);
            store.backend().upload(key, Bytes::copy_from_slice(blob));
            specs.push(BlobSpec::new(key, blob.len() as u64));
            chunk_bytes.extend_from_slice(blob);
        }

        let receipt = store
            .write_chunk(
                name,
                chunk_id as u64,
                Fingerprint::of(&chunk_bytes),
                specs,
                payment,
            )
            .await?;
        total_fee += receipt.fee;
        chunk_count += 1;
    }

    // a shorter rewrite leaves stale tail chunks behind; drop them
    if old_count > chunk_count {
        store.truncate(name, chunk_count).await?;
    }

    let (size, count) = store.size(name).await?;
    println!(
        "stored {} as {} chunks ({} bytes), fees {} credits, refundable {}",
        name,
        count,
        size,
        total_fee,
        store.refundable()
    );
    Ok(())
}

async fn cat(store: &SiloStore<SlotStoreBackend>, name: &str) -> Result<()> {
    match store.read(name).await? {
        Some(bytes) => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&bytes).await?;
            stdout.flush().await?;
            Ok(())
        }
        None => bail!("object not found: {}", name),
    }
}

async fn stat(store: &SiloStore<SlotStoreBackend>, name: &str, json: bool) -> Result<()> {
    let (size, count) = store.size(name).await?;
    if count == 0 {
        bail!("object not found: {}", name);
    }

    let mut chunks = Vec::with_capacity(count as usize);
    for chunk_id in 0..count {
        let chunk_size = store.chunk_size(name, chunk_id).await?.unwrap_or(0);
        let hash = store.chunk_hash(name, chunk_id).await?;
        chunks.push((chunk_id, chunk_size, hash));
    }

    if json {
        let value = serde_json::json!({
            "name": name,
            "size": size,
            "chunks": chunks
                .iter()
                .map(|(id, chunk_size, hash)| {
                    serde_json::json!({
                        "chunk": id,
                        "size": chunk_size,
                        "fingerprint": hash.to_hex(),
                    })
                })
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}: {} bytes in {} chunks", name, size, count);
        for (id, chunk_size, hash) in chunks {
            println!("  chunk {:>3}  {:>10} bytes  {}", id, chunk_size, hash);
        }
    }
    Ok(())
}
