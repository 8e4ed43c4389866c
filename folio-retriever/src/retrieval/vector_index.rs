//! Persistent SQLite storage for indexed documents and their vector records.
//!
//! ## Database Schema
//!
//! ```sql
//! -- One row per indexed file version
//! CREATE TABLE documents (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     source_path TEXT NOT NULL,
//!     content_hash BLOB NOT NULL,      -- blake3 of the raw file bytes
//!     size INTEGER NOT NULL,
//!     kind TEXT NOT NULL,              -- "text" or "pdf"
//!     indexed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
//!     UNIQUE(source_path, content_hash)
//! );
//!
//! -- One row per chunk; never updated after insertion
//! CREATE TABLE chunks (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     record_key TEXT UNIQUE,          -- NULL when duplicates are allowed
//!     document_id INTEGER NOT NULL REFERENCES documents(id),
//!     source_path TEXT NOT NULL,       -- denormalized for search results
//!     page INTEGER,                    -- 1-based PDF page, NULL for text
//!     sequence INTEGER NOT NULL,
//!     char_start INTEGER NOT NULL,
//!     char_end INTEGER NOT NULL,
//!     content TEXT NOT NULL,
//!     embedding BLOB NOT NULL,         -- f16 vector
//!     created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
//! );
//!
//! -- Identity of the embedding space all vectors belong to
//! CREATE TABLE index_metadata (
//!     id INTEGER PRIMARY KEY CHECK (id = 1),
//!     model_id TEXT NOT NULL,
//!     provider TEXT NOT NULL,
//!     model_name TEXT NOT NULL,
//!     dimension INTEGER NOT NULL,
//!     normalized BOOLEAN NOT NULL,
//!     created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
//! );
//! ```
//!
//! ## Concurrency
//!
//! The database runs in WAL mode, so searches keep reading a consistent snapshot
//! while a writer commits. Each document is written in a single transaction:
//! a concurrent reader sees either none or all of a file's records.
//!
//! SQLite allows one writer at a time. Writers inside this process queue on
//! [`VectorIndex`]'s write lock, and every write transaction starts with a
//! write so that a writer from another process waits on the busy timeout
//! instead of failing on a stale read snapshot.

use chrono::NaiveDateTime;
use folio_embed::EmbeddingProvider;
use half::f16;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// File name of the database inside the index directory.
pub const DATABASE_FILE: &str = "folio.db";

/// Bound parameters per `IN (...)` query, well below SQLite's variable limit.
const IDS_PER_QUERY: usize = 500;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to create index directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The index was built with a different embedding model. Vectors from two
    /// models are not comparable, so this is never recoverable at runtime.
    #[error(
        "Embedding model mismatch: index was built with '{stored}' but '{requested}' is configured"
    )]
    ModelMismatch { stored: String, requested: String },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// What to do when the same chunk of the same file is indexed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Key each record by its path, sequence and content; re-indexing unchanged
    /// content inserts nothing.
    #[default]
    Replace,
    /// Every indexing run inserts a fresh, independent set of records.
    Append,
}

impl std::fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuplicatePolicy::Replace => write!(f, "replace"),
            DuplicatePolicy::Append => write!(f, "append"),
        }
    }
}

impl std::str::FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "replace" | "dedup" | "upsert" => Ok(DuplicatePolicy::Replace),
            "append" | "duplicate" => Ok(DuplicatePolicy::Append),
            _ => Err(format!(
                "Invalid duplicate policy: '{s}'. Valid values are: replace, append"
            )),
        }
    }
}

/// Metadata about the embedding model whose vectors fill the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingModelMetadata {
    pub model_id: String,
    pub provider: String,
    pub model_name: String,
    pub dimension: usize,
    pub normalized: bool,
}

impl EmbeddingModelMetadata {
    pub fn from_provider(provider: &dyn EmbeddingProvider) -> Self {
        Self {
            model_id: provider.model_id(),
            provider: provider.provider_name().to_string(),
            model_name: provider.model_name().to_string(),
            dimension: provider.embedding_dimension(),
            normalized: provider.normalized(),
        }
    }
}

/// A source file as recorded in the `documents` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub source_path: String,
    pub content_hash: [u8; 32],
    pub size: u64,
    pub kind: String,
}

/// One chunk with its embedding. `id` is `None` until the record is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: Option<i64>,
    pub source_path: String,
    pub page: Option<u32>,
    pub sequence: usize,
    pub char_start: usize,
    pub char_end: usize,
    pub content: String,
    pub embedding: Vec<f16>,
}

impl VectorRecord {
    /// Content key used by [`DuplicatePolicy::Replace`].
    pub fn record_key(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.source_path.as_bytes());
        hasher.update(&[0]);
        hasher.update(&(self.sequence as u64).to_le_bytes());
        hasher.update(self.content.as_bytes());
        hex::encode(hasher.finalize().as_bytes())
    }
}

/// Counts of rows written by one [`VectorIndex::upsert_document`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpsertSummary {
    pub document_id: i64,
    pub inserted: usize,
    pub unchanged: usize,
}

/// SQLite-backed vector index.
#[derive(Clone, Debug)]
pub struct VectorIndex {
    location: Option<PathBuf>,
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl VectorIndex {
    /// Opens (creating if needed) the index stored in `dir`.
    pub async fn open(dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| IndexError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        let db_path = dir.join(DATABASE_FILE);

        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(&db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true),
        )
        .await?;

        tracing::debug!("Opened vector index at {}", db_path.display());
        Self::new_with_pool(Some(db_path), pool).await
    }

    /// Opens an in-memory index for testing.
    pub async fn open_memory() -> Result<Self> {
        // A single connection that never expires, since every new connection
        // to :memory: would see an empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::new_with_pool(None, pool).await
    }

    async fn new_with_pool(location: Option<PathBuf>, pool: SqlitePool) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self {
            location,
            pool,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_path TEXT NOT NULL,
                content_hash BLOB NOT NULL,
                size INTEGER NOT NULL,
                kind TEXT NOT NULL,
                indexed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                CONSTRAINT unique_document UNIQUE(source_path, content_hash)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                record_key TEXT UNIQUE,
                document_id INTEGER NOT NULL,
                source_path TEXT NOT NULL,
                page INTEGER,
                sequence INTEGER NOT NULL,
                char_start INTEGER NOT NULL,
                char_end INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (document_id) REFERENCES documents(id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS index_metadata (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                model_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                model_name TEXT NOT NULL,
                dimension INTEGER NOT NULL,
                normalized BOOLEAN NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_path ON chunks(source_path)")
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Path of the database file, or `None` for an in-memory index.
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Records the embedding model on first use and verifies it on every later open.
    pub async fn register_embedding_model(&self, model: &EmbeddingModelMetadata) -> Result<()> {
        if let Some(stored) = self.embedding_model().await? {
            if stored.model_id != model.model_id || stored.dimension != model.dimension {
                return Err(IndexError::ModelMismatch {
                    stored: stored.model_id,
                    requested: model.model_id.clone(),
                });
            }
            return Ok(());
        }

        let _writer = self.write_lock.lock().await;
        sqlx::query(
            r#"
            INSERT INTO index_metadata (id, model_id, provider, model_name, dimension, normalized)
            VALUES (1, ?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&model.model_id)
        .bind(&model.provider)
        .bind(&model.model_name)
        .bind(model.dimension as i64)
        .bind(model.normalized)
        .execute(&self.pool)
        .await?;

        // Another process may have registered a model between the read and the
        // insert; re-read so the check above still holds.
        match self.embedding_model().await? {
            Some(stored) if stored.model_id == model.model_id => {
                tracing::info!("Registered embedding model {}", model.model_id);
                Ok(())
            }
            Some(stored) => Err(IndexError::ModelMismatch {
                stored: stored.model_id,
                requested: model.model_id.clone(),
            }),
            None => Ok(()),
        }
    }

    /// The embedding model the index was built with, if any.
    pub async fn embedding_model(&self) -> Result<Option<EmbeddingModelMetadata>> {
        let row = sqlx::query(
            "SELECT model_id, provider, model_name, dimension, normalized FROM index_metadata WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| EmbeddingModelMetadata {
            model_id: row.get("model_id"),
            provider: row.get("provider"),
            model_name: row.get("model_name"),
            dimension: row.get::<i64, _>("dimension") as usize,
            normalized: row.get("normalized"),
        }))
    }

    /// Writes a document row and all of its records in one transaction.
    ///
    /// Either every record of the batch is committed or none is. Records are
    /// only ever inserted; with [`DuplicatePolicy::Replace`] a record whose key
    /// already exists is left untouched and counted as unchanged.
    pub async fn upsert_document(
        &self,
        document: &DocumentRecord,
        records: &[VectorRecord],
        policy: DuplicatePolicy,
    ) -> Result<UpsertSummary> {
        let _writer = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        // The first statement writes, so the transaction holds the write lock
        // before it reads anything.
        let document_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO documents (source_path, content_hash, size, kind, indexed_at)
            VALUES (?1, ?2, ?3, ?4, datetime('now'))
            ON CONFLICT(source_path, content_hash) DO UPDATE SET
                indexed_at = datetime('now')
            RETURNING id
            "#,
        )
        .bind(&document.source_path)
        .bind(&document.content_hash[..])
        .bind(document.size as i64)
        .bind(&document.kind)
        .fetch_one(&mut *tx)
        .await?;

        let expected_dimension = sqlx::query_scalar::<_, i64>(
            "SELECT dimension FROM index_metadata WHERE id = 1",
        )
        .fetch_optional(&mut *tx)
        .await?
        .map(|d| d as usize)
        .or_else(|| records.first().map(|r| r.embedding.len()));

        // Returning early drops `tx`, which rolls back the document row.
        if let Some(expected) = expected_dimension {
            if let Some(bad) = records.iter().find(|r| r.embedding.len() != expected) {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: bad.embedding.len(),
                });
            }
        }

        let mut summary = UpsertSummary {
            document_id,
            ..UpsertSummary::default()
        };

        for record in records {
            let record_key = match policy {
                DuplicatePolicy::Replace => Some(record.record_key()),
                DuplicatePolicy::Append => None,
            };
            let embedding_bytes = bytemuck::cast_slice::<f16, u8>(&record.embedding);

            let result = sqlx::query(
                r#"
                INSERT INTO chunks
                (record_key, document_id, source_path, page, sequence, char_start, char_end, content, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(record_key) DO NOTHING
                "#,
            )
            .bind(record_key)
            .bind(document_id)
            .bind(&record.source_path)
            .bind(record.page.map(i64::from))
            .bind(record.sequence as i64)
            .bind(record.char_start as i64)
            .bind(record.char_end as i64)
            .bind(&record.content)
            .bind(embedding_bytes)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                summary.unchanged += 1;
            } else {
                summary.inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(summary)
    }

    /// Get a record by ID
    pub async fn get_record(&self, id: i64) -> Result<Option<VectorRecord>> {
        let row = sqlx::query(
            "SELECT id, source_path, page, sequence, char_start, char_end, content, embedding
             FROM chunks WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(record_from_row))
    }

    /// Get records by ID, in the order the IDs are given. Unknown IDs are skipped.
    pub async fn get_records(&self, ids: &[i64]) -> Result<Vec<VectorRecord>> {
        let mut by_id: std::collections::HashMap<i64, VectorRecord> =
            std::collections::HashMap::with_capacity(ids.len());

        for batch in ids.chunks(IDS_PER_QUERY) {
            let placeholders = (1..=batch.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            let query = format!(
                "SELECT id, source_path, page, sequence, char_start, char_end, content, embedding
                 FROM chunks WHERE id IN ({placeholders})"
            );

            let mut query_builder = sqlx::query(&query);
            for id in batch {
                query_builder = query_builder.bind(id);
            }
            let rows = query_builder.fetch_all(&self.pool).await?;

            by_id.extend(
                rows.iter()
                    .map(record_from_row)
                    .filter_map(|record| record.id.map(|id| (id, record))),
            );
        }

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// All record IDs with their raw f16 embedding blobs, for brute-force
    /// similarity search. Decode with [`decode_embedding`].
    pub async fn embedding_blobs(&self) -> Result<Vec<(i64, Vec<u8>)>> {
        let rows = sqlx::query("SELECT id, embedding FROM chunks")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get("id"), row.get("embedding")))
            .collect())
    }

    /// List records without their embeddings, ordered by path then sequence.
    pub async fn list_records(
        &self,
        source_path: Option<&str>,
        path_prefix: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<VectorRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, source_path, page, sequence, char_start, char_end, content, X'' AS embedding
            FROM chunks
            WHERE (?1 IS NULL OR source_path = ?1)
              AND (?2 IS NULL OR substr(source_path, 1, length(?2)) = ?2)
            ORDER BY source_path, sequence, id
            LIMIT ?3
            "#,
        )
        .bind(source_path)
        .bind(path_prefix)
        .bind(limit.map(|l| l as i64).unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    pub async fn count_records(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    pub async fn count_documents(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT source_path) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    /// When a document was most recently written, if ever.
    pub async fn last_indexed_at(&self) -> Result<Option<NaiveDateTime>> {
        Ok(
            sqlx::query_scalar::<_, Option<NaiveDateTime>>("SELECT MAX(indexed_at) FROM documents")
                .fetch_one(&self.pool)
                .await?,
        )
    }

    /// Close the pool, flushing the WAL.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Get the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn record_from_row(row: &SqliteRow) -> VectorRecord {
    let page: Option<i64> = row.get("page");
    let embedding: Vec<u8> = row.get("embedding");
    VectorRecord {
        id: Some(row.get("id")),
        source_path: row.get("source_path"),
        page: page.map(|p| p as u32),
        sequence: row.get::<i64, _>("sequence") as usize,
        char_start: row.get::<i64, _>("char_start") as usize,
        char_end: row.get::<i64, _>("char_end") as usize,
        content: row.get("content"),
        embedding: decode_embedding(&embedding),
    }
}

/// Decode a stored f16 blob. Reads byte pairs so the blob's alignment never matters.
pub fn decode_embedding(bytes: &[u8]) -> Vec<f16> {
    bytes
        .chunks_exact(2)
        .map(|pair| f16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    fn embedding(values: &[f32]) -> Vec<f16> {
        values.iter().copied().map(f16::from_f32).collect()
    }

    fn document(path: &str, hash: u8) -> DocumentRecord {
        DocumentRecord {
            source_path: path.to_string(),
            content_hash: [hash; 32],
            size: 42,
            kind: "text".to_string(),
        }
    }

    fn record(path: &str, sequence: usize, content: &str, values: &[f32]) -> VectorRecord {
        VectorRecord {
            id: None,
            source_path: path.to_string(),
            page: None,
            sequence,
            char_start: sequence * 10,
            char_end: sequence * 10 + content.chars().count(),
            content: content.to_string(),
            embedding: embedding(values),
        }
    }

    fn model(id: &str, dimension: usize) -> EmbeddingModelMetadata {
        EmbeddingModelMetadata {
            model_id: id.to_string(),
            provider: "hashing".to_string(),
            model_name: "hashing".to_string(),
            dimension,
            normalized: true,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_read_back() -> Result<()> {
        let index = VectorIndex::open_memory().await?;
        let records = vec![
            record("docs/a.txt", 0, "first chunk", &[1.0, 0.0, 0.0]),
            record("docs/a.txt", 1, "second chunk", &[0.0, 1.0, 0.0]),
        ];

        let summary = index
            .upsert_document(&document("docs/a.txt", 1), &records, DuplicatePolicy::Replace)
            .await?;
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.unchanged, 0);
        assert_eq!(index.count_records().await?, 2);
        assert_eq!(index.count_documents().await?, 1);

        let listed = index.list_records(Some("docs/a.txt"), None, None).await?;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].content, "first chunk");
        assert_eq!(listed[1].sequence, 1);

        let fetched = index.get_record(listed[0].id.unwrap()).await?.unwrap();
        assert_eq!(fetched.embedding, embedding(&[1.0, 0.0, 0.0]));
        assert_eq!(fetched.char_end, "first chunk".len());

        Ok(())
    }

    #[tokio::test]
    async fn test_replace_policy_is_idempotent() -> Result<()> {
        let index = VectorIndex::open_memory().await?;
        let records = vec![record("a.txt", 0, "same text", &[0.6, 0.8])];

        index
            .upsert_document(&document("a.txt", 1), &records, DuplicatePolicy::Replace)
            .await?;
        let before = index.list_records(None, None, None).await?;

        let again = index
            .upsert_document(&document("a.txt", 1), &records, DuplicatePolicy::Replace)
            .await?;
        assert_eq!(again.inserted, 0);
        assert_eq!(again.unchanged, 1);

        let after = index.list_records(None, None, None).await?;
        assert_eq!(before, after);
        Ok(())
    }

    #[tokio::test]
    async fn test_append_policy_keeps_independent_sets() -> Result<()> {
        let index = VectorIndex::open_memory().await?;
        let records = vec![
            record("a.txt", 0, "alpha", &[1.0, 0.0]),
            record("a.txt", 1, "beta", &[0.0, 1.0]),
        ];

        index
            .upsert_document(&document("a.txt", 1), &records, DuplicatePolicy::Append)
            .await?;
        index
            .upsert_document(&document("a.txt", 1), &records, DuplicatePolicy::Append)
            .await?;

        let all = index.list_records(None, None, None).await?;
        assert_eq!(all.len(), 4);
        let ids: std::collections::HashSet<_> = all.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_model_mismatch_is_rejected() -> Result<()> {
        let index = VectorIndex::open_memory().await?;
        index
            .register_embedding_model(&model("hashing:hashing:8:norm", 8))
            .await?;
        // Same model again is fine
        index
            .register_embedding_model(&model("hashing:hashing:8:norm", 8))
            .await?;

        let err = index
            .register_embedding_model(&model("fastembed:all-MiniLM-L6-v2:384:norm", 384))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::ModelMismatch { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_dimension_mismatch_writes_nothing() -> Result<()> {
        let index = VectorIndex::open_memory().await?;
        index
            .register_embedding_model(&model("hashing:hashing:2:norm", 2))
            .await?;

        let records = vec![
            record("a.txt", 0, "ok", &[1.0, 0.0]),
            record("a.txt", 1, "bad", &[1.0, 0.0, 0.0]),
        ];
        let err = index
            .upsert_document(&document("a.txt", 1), &records, DuplicatePolicy::Replace)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert_eq!(index.count_records().await?, 0);
        assert_eq!(index.count_documents().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_state_survives_reopen() -> Result<()> {
        let temp_dir = tempdir()?;
        let dir = temp_dir.path().join("index");

        {
            let index = VectorIndex::open(&dir).await?;
            index
                .register_embedding_model(&model("hashing:hashing:2:norm", 2))
                .await?;
            index
                .upsert_document(
                    &document("a.txt", 7),
                    &[record("a.txt", 0, "persisted", &[0.0, 1.0])],
                    DuplicatePolicy::Replace,
                )
                .await?;
            index.close().await;
        }

        let reopened = VectorIndex::open(&dir).await?;
        assert_eq!(reopened.location(), Some(dir.join(DATABASE_FILE).as_path()));
        assert_eq!(reopened.count_records().await?, 1);
        let stored_model = reopened.embedding_model().await?.unwrap();
        assert_eq!(stored_model.dimension, 2);

        let err = reopened
            .register_embedding_model(&model("hashing:hashing:4:norm", 4))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::ModelMismatch { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_get_records_preserves_order() -> Result<()> {
        let index = VectorIndex::open_memory().await?;
        let records: Vec<_> = (0..3)
            .map(|i| record("a.txt", i, &format!("chunk {i}"), &[1.0]))
            .collect();
        index
            .upsert_document(&document("a.txt", 1), &records, DuplicatePolicy::Replace)
            .await?;

        let ids: Vec<i64> = index
            .list_records(None, None, None)
            .await?
            .iter()
            .filter_map(|r| r.id)
            .collect();
        let reversed: Vec<i64> = ids.iter().rev().copied().chain([9999]).collect();

        let fetched = index.get_records(&reversed).await?;
        assert_eq!(fetched.len(), 3);
        assert_eq!(fetched[0].content, "chunk 2");
        assert_eq!(fetched[2].content, "chunk 0");
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_upserts_on_disk_all_commit() -> Result<()> {
        let temp_dir = tempdir()?;
        let index = VectorIndex::open(&temp_dir.path().join("index")).await?;
        index
            .register_embedding_model(&model("hashing:hashing:2:norm", 2))
            .await?;

        let writers: Vec<_> = (0..16u8)
            .map(|n| {
                let index = index.clone();
                tokio::spawn(async move {
                    let path = format!("doc{n}.txt");
                    let records: Vec<_> = (0..25)
                        .map(|i| record(&path, i, &format!("doc {n} chunk {i}"), &[1.0, i as f32]))
                        .collect();
                    index
                        .upsert_document(&document(&path, n), &records, DuplicatePolicy::Replace)
                        .await
                })
            })
            .collect();

        for writer in writers {
            let summary = writer.await??;
            assert_eq!(summary.inserted, 25);
        }
        assert_eq!(index.count_documents().await?, 16);
        assert_eq!(index.count_records().await?, 16 * 25);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_records_with_more_ids_than_sqlite_variables() -> Result<()> {
        let index = VectorIndex::open_memory().await?;
        let records: Vec<_> = (0..1200)
            .map(|i| record("big.txt", i, &format!("chunk {i}"), &[1.0]))
            .collect();
        index
            .upsert_document(&document("big.txt", 1), &records, DuplicatePolicy::Replace)
            .await?;

        // Far past SQLite's 32766 bound-variable limit, mostly unknown ids.
        let ids: Vec<i64> = (1..=40_000).rev().collect();
        let fetched = index.get_records(&ids).await?;
        assert_eq!(fetched.len(), 1200);
        assert_eq!(fetched[0].content, "chunk 1199");
        assert_eq!(fetched[1199].content, "chunk 0");
        Ok(())
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "Replace".parse::<DuplicatePolicy>().unwrap(),
            DuplicatePolicy::Replace
        );
        assert_eq!(
            "append".parse::<DuplicatePolicy>().unwrap(),
            DuplicatePolicy::Append
        );
        assert!("merge".parse::<DuplicatePolicy>().is_err());
        assert_eq!(DuplicatePolicy::default().to_string(), "replace");
    }
}
