//! Storage abstraction layer for folio-retriever
//!
//! The pipeline writes through [`VectorStore::upsert`], the retriever reads
//! through [`VectorStore::search`], and the CLI inspects the index through
//! [`ChunkStore`]. Keeping them behind traits lets tests swap in failing or
//! recording stores without touching SQLite.
//!
//! ```text
//! ChunkStore ──┐
//!              ├── SqliteStore ── VectorIndex (SQLite)
//! VectorStore ─┘
//! ```

use crate::retrieval::vector_index::{DocumentRecord, DuplicatePolicy, UpsertSummary, VectorRecord};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use half::f16;
use serde::Serialize;

pub mod sqlite_store;

/// Database ID for a stored chunk.
pub type ChunkId = i64;

/// A stored chunk with its text and origin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub source_path: String,
    pub page: Option<u32>,
    pub sequence: usize,
    pub char_start: usize,
    pub char_end: usize,
    pub content: String,
}

/// Chunk metadata without content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkMetadata {
    pub id: ChunkId,
    pub source_path: String,
    pub page: Option<u32>,
    pub sequence: usize,
    pub char_len: usize,
}

/// Query filter for listing chunks.
#[derive(Debug, Clone, Default)]
pub struct ChunkFilter {
    pub source_path: Option<String>,
    pub path_prefix: Option<String>,
    pub limit: Option<usize>,
}

/// A chunk returned by similarity search, with its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// Summary of index contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub embedding_model: Option<String>,
    pub dimension: Option<usize>,
    pub last_indexed_at: Option<NaiveDateTime>,
}

/// Read access to stored chunks.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Get a specific chunk by ID
    async fn get_chunk(&self, id: ChunkId) -> Result<Option<Chunk>>;

    /// List chunks matching filter criteria
    async fn list_chunks(&self, filter: ChunkFilter) -> Result<Vec<ChunkMetadata>>;

    /// Number of stored chunks
    async fn count_chunks(&self) -> Result<usize>;

    async fn stats(&self) -> Result<IndexStats>;
}

/// Vector writes and similarity search.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Store all records of one document atomically
    async fn upsert(
        &self,
        document: &DocumentRecord,
        records: Vec<VectorRecord>,
        policy: DuplicatePolicy,
    ) -> Result<UpsertSummary>;

    /// Return at most `k` chunks ordered by non-increasing similarity to `query`
    async fn search(&self, query: &[f16], k: usize) -> Result<Vec<SearchHit>>;
}

impl From<VectorRecord> for Chunk {
    fn from(record: VectorRecord) -> Self {
        Chunk {
            id: record.id.unwrap_or_default(),
            source_path: record.source_path,
            page: record.page,
            sequence: record.sequence,
            char_start: record.char_start,
            char_end: record.char_end,
            content: record.content,
        }
    }
}
