//! SQLite chunk index.
//!
//! The index exclusively owns chunk and blob-reference records; physical blob
//! bytes live in the backend and are only referenced from here. A chunk's
//! whole record set is committed in one transaction so readers never observe
//! a half-replaced chunk.

use std::path::Path;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
    Row,
};

use common::prelude::*;

use crate::backend::DecodeMode;

/// Errors from the chunk index
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row failed to decode
    #[error("corrupt index row: {0}")]
    Corrupt(String),
}

type Result<T> = std::result::Result<T, IndexError>;

/// Reference to one physically stored blob within a chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BlobRef {
    /// Index within the chunk, 0-based
    pub position: u32,
    /// Logical byte length
    pub length: u64,
    /// Backend addressing key
    pub blob_key: BlobKey,
    /// Transform descriptor for generated-key blobs, passed through on reads
    pub decode: Option<DecodeMode>,
}

/// SQLite-backed chunk index
#[derive(Debug, Clone)]
pub(crate) struct ChunkIndex {
    pool: SqlitePool,
}

impl ChunkIndex {
    /// Create a new index from a file path
    pub async fn new(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let index = Self { pool };
        index.run_migrations().await?;
        Ok(index)
    }

    /// Create an in-memory index
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let index = Self { pool };
        index.run_migrations().await?;
        Ok(index)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Number of chunks recorded for an object. The chunk list length is the
    /// authoritative count; there is no separate counter to desynchronize.
    pub async fn count_chunks(&self, key: &ObjectKey) -> Result<u64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) as count FROM chunks WHERE object_key = ?
            "#,
        )
        .bind(key.to_hex())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("count") as u64)
    }

    /// Aggregate size of one chunk, or `None` if the chunk is absent
    pub async fn chunk_size(&self, key: &ObjectKey, chunk_id: u64) -> Result<Option<u64>> {
        let row = sqlx::query(
            r#"
            SELECT size FROM chunks WHERE object_key = ? AND chunk_id = ?
            "#,
        )
        .bind(key.to_hex())
        .bind(chunk_id as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get::<i64, _>("size") as u64))
    }

    /// Stored fingerprint of one chunk, or `None` if the chunk is absent
    pub async fn chunk_fingerprint(
        &self,
        key: &ObjectKey,
        chunk_id: u64,
    ) -> Result<Option<Fingerprint>> {
        let row = sqlx::query(
            r#"
            SELECT fingerprint FROM chunks WHERE object_key = ? AND chunk_id = ?
            "#,
        )
        .bind(key.to_hex())
        .bind(chunk_id as i64)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let hex: String = r.get("fingerprint");
            Fingerprint::from_hex(&hex)
                .map_err(|e| IndexError::Corrupt(format!("fingerprint {}: {}", hex, e)))
        })
        .transpose()
    }

    /// Blob references of one chunk in ascending position order
    pub async fn blob_refs(&self, key: &ObjectKey, chunk_id: u64) -> Result<Vec<BlobRef>> {
        let rows = sqlx::query(
            r#"
            SELECT position, length, blob_key, decode
            FROM blob_refs
            WHERE object_key = ? AND chunk_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(key.to_hex())
        .bind(chunk_id as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                let hex: String = r.get("blob_key");
                let blob_key = BlobKey::from_hex(&hex)
                    .map_err(|e| IndexError::Corrupt(format!("blob key {}: {}", hex, e)))?;
                Ok(BlobRef {
                    position: r.get::<i64, _>("position") as u32,
                    length: r.get::<i64, _>("length") as u64,
                    blob_key,
                    decode: r
                        .get::<Option<i64>, _>("decode")
                        .map(|mode| DecodeMode::new(mode as u32)),
                })
            })
            .collect()
    }

    /// Commit a chunk's full record set in one transaction.
    ///
    /// Clears any previous blob references for the chunk, upserts the chunk
    /// row, and inserts the new references, so a replacement is atomic from
    /// the reader's point of view.
    pub async fn commit_chunk(
        &self,
        key: &ObjectKey,
        chunk_id: u64,
        size: u64,
        fingerprint: Fingerprint,
        refs: &[BlobRef],
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM blob_refs WHERE object_key = ? AND chunk_id = ?
            "#,
        )
        .bind(key.to_hex())
        .bind(chunk_id as i64)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO chunks (object_key, chunk_id, size, fingerprint, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(object_key, chunk_id) DO UPDATE SET
                size = excluded.size,
                fingerprint = excluded.fingerprint,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key.to_hex())
        .bind(chunk_id as i64)
        .bind(size as i64)
        .bind(fingerprint.to_hex())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for blob in refs {
            sqlx::query(
                r#"
                INSERT INTO blob_refs (object_key, chunk_id, position, length, blob_key, decode)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(key.to_hex())
            .bind(chunk_id as i64)
            .bind(blob.position as i64)
            .bind(blob.length as i64)
            .bind(blob.blob_key.to_hex())
            .bind(blob.decode.map(|mode| mode.get() as i64))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Drop a chunk record and its blob references
    pub async fn drop_chunk(&self, key: &ObjectKey, chunk_id: u64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM blob_refs WHERE object_key = ? AND chunk_id = ?
            "#,
        )
        .bind(key.to_hex())
        .bind(chunk_id as i64)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM chunks WHERE object_key = ? AND chunk_id = ?
            "#,
        )
        .bind(key.to_hex())
        .bind(chunk_id as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
impl ChunkIndex {
    /// Total blob references across all objects
    pub async fn total_blob_refs(&self) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) as count FROM blob_refs
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("count"))
    }
}
