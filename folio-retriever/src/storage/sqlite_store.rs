//! SQLite implementation of the storage traits
//!
//! An adapter over [`VectorIndex`]. Similarity search is brute force: every
//! stored vector is scored against the query in memory, the scores are sorted,
//! and only the top `k` records are fetched back with their text.

use super::{Chunk, ChunkFilter, ChunkId, ChunkMetadata, ChunkStore, IndexStats, SearchHit, VectorStore};
use crate::retrieval::vector_index::{
    DocumentRecord, DuplicatePolicy, UpsertSummary, VectorIndex, VectorRecord, decode_embedding,
};
use anyhow::Result;
use async_trait::async_trait;
use half::f16;

/// SQLite-based implementation of [`ChunkStore`] and [`VectorStore`].
#[derive(Clone, Debug)]
pub struct SqliteStore {
    index: VectorIndex,
}

impl SqliteStore {
    pub fn new(index: VectorIndex) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn get_chunk(&self, id: ChunkId) -> Result<Option<Chunk>> {
        Ok(self.index.get_record(id).await?.map(Chunk::from))
    }

    async fn list_chunks(&self, filter: ChunkFilter) -> Result<Vec<ChunkMetadata>> {
        let records = self
            .index
            .list_records(
                filter.source_path.as_deref(),
                filter.path_prefix.as_deref(),
                filter.limit,
            )
            .await?;

        Ok(records
            .into_iter()
            .filter_map(|record| {
                record.id.map(|id| ChunkMetadata {
                    id,
                    char_len: record.char_end - record.char_start,
                    source_path: record.source_path,
                    page: record.page,
                    sequence: record.sequence,
                })
            })
            .collect())
    }

    async fn count_chunks(&self) -> Result<usize> {
        Ok(self.index.count_records().await?)
    }

    async fn stats(&self) -> Result<IndexStats> {
        let model = self.index.embedding_model().await?;
        Ok(IndexStats {
            documents: self.index.count_documents().await?,
            chunks: self.index.count_records().await?,
            embedding_model: model.as_ref().map(|m| m.model_id.clone()),
            dimension: model.map(|m| m.dimension),
            last_indexed_at: self.index.last_indexed_at().await?,
        })
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn upsert(
        &self,
        document: &DocumentRecord,
        records: Vec<VectorRecord>,
        policy: DuplicatePolicy,
    ) -> Result<UpsertSummary> {
        Ok(self
            .index
            .upsert_document(document, &records, policy)
            .await?)
    }

    async fn search(&self, query: &[f16], k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let blobs = self.index.embedding_blobs().await?;
        let query = query.to_vec();
        // Scoring every stored vector is CPU-bound; keep it off the async workers.
        let similarities = tokio::task::spawn_blocking(move || rank(&query, blobs, k)).await?;

        let ids: Vec<ChunkId> = similarities.iter().map(|(id, _)| *id).collect();
        let records = self.index.get_records(&ids).await?;

        // A record can only be missing here if it was purged between the two
        // reads; zip by id so scores never attach to the wrong chunk.
        let mut hits = Vec::with_capacity(records.len());
        let mut records = records.into_iter().peekable();
        for (id, score) in similarities {
            if records.peek().and_then(|r| r.id) == Some(id) {
                if let Some(record) = records.next() {
                    hits.push(SearchHit {
                        chunk: Chunk::from(record),
                        score,
                    });
                }
            }
        }

        Ok(hits)
    }
}

/// Top `k` ids by similarity to `query`, highest first; equal scores keep insertion order.
fn rank(query: &[f16], blobs: Vec<(ChunkId, Vec<u8>)>, k: usize) -> Vec<(ChunkId, f32)> {
    let mut similarities: Vec<(ChunkId, f32)> = blobs
        .into_iter()
        .map(|(id, blob)| (id, cosine_similarity(query, &decode_embedding(&blob))))
        .collect();

    similarities.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    similarities.truncate(k);
    similarities
}

/// Cosine similarity of two vectors; 0 for zero vectors or mismatched lengths.
pub fn cosine_similarity(a: &[f16], b: &[f16]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot_product = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        let x = x.to_f32();
        let y = y.to_f32();
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let norm_a = norm_a.sqrt();
    let norm_b = norm_b.sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}
