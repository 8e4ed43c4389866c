//! Indexing pipeline for a single document.
//!
//! ## Pipeline Flow
//!
//! ```text
//! Document → DocumentLoader → TextSplitter → EmbeddingProvider → VectorStore
//!              (text / pages)   (chunks)        (f16 vectors)      (one transaction)
//! ```
//!
//! Unsupported file types are skipped without an error. Any failure after that
//! point is returned as an [`IndexingError`] carrying the path; the worker that
//! runs the pipeline logs it and moves on to the next file.

use super::analyzer::Analyzer;
use super::loader::{Document, DocumentLoader, LoadError};
use super::vector_index::{DocumentRecord, DuplicatePolicy, VectorRecord};
use crate::storage::VectorStore;
use async_trait::async_trait;
use folio_context::TextSplitter;
use folio_embed::{EmbedError, EmbeddingProvider};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Result of processing a single file
#[derive(Debug, Clone, PartialEq)]
pub struct FileProcessingResult {
    pub path: PathBuf,
    pub chunks_created: usize,
    pub embeddings_generated: usize,
    /// Records actually inserted; lower than `chunks_created` when identical
    /// records were already stored
    pub records_inserted: usize,
    pub processing_time: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexOutcome {
    Indexed(FileProcessingResult),
    Skipped { path: PathBuf, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum IndexingError {
    #[error("failed to load {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: LoadError,
    },

    #[error("failed to embed chunks of {path}: {source}")]
    Embedding {
        path: PathBuf,
        #[source]
        source: EmbedError,
    },

    #[error("embedding provider returned {actual} vectors for {expected} chunks of {path}")]
    EmbeddingCountMismatch {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    #[error("failed to store chunks of {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

impl IndexingError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            IndexingError::Load { path, .. }
            | IndexingError::Embedding { path, .. }
            | IndexingError::EmbeddingCountMismatch { path, .. }
            | IndexingError::Storage { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessingStats {
    pub files_processed: usize,
    pub files_skipped: usize,
    pub chunks_created: usize,
    pub records_inserted: usize,
    pub errors: usize,
}

/// Loads, splits, embeds and stores one document at a time.
///
/// Cheap to share: every collaborator is behind an `Arc`, and the pipeline
/// itself is used concurrently by all workers.
pub struct IndexingPipeline {
    loader: DocumentLoader,
    splitter: TextSplitter,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    policy: DuplicatePolicy,
    stats: RwLock<ProcessingStats>,
}

impl IndexingPipeline {
    pub fn new(
        loader: DocumentLoader,
        splitter: TextSplitter,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        policy: DuplicatePolicy,
    ) -> Self {
        Self {
            loader,
            splitter,
            embedder,
            store,
            policy,
            stats: RwLock::new(ProcessingStats::default()),
        }
    }

    pub async fn stats(&self) -> ProcessingStats {
        self.stats.read().await.clone()
    }

    pub async fn index_document(&self, document: &Document) -> Result<IndexOutcome, IndexingError> {
        let result = self.index_document_inner(document).await;

        let mut stats = self.stats.write().await;
        match &result {
            Ok(IndexOutcome::Indexed(file)) => {
                stats.files_processed += 1;
                stats.chunks_created += file.chunks_created;
                stats.records_inserted += file.records_inserted;
            }
            Ok(IndexOutcome::Skipped { .. }) => stats.files_skipped += 1,
            Err(_) => stats.errors += 1,
        }

        result
    }

    async fn index_document_inner(
        &self,
        document: &Document,
    ) -> Result<IndexOutcome, IndexingError> {
        let start_time = Instant::now();
        let path = document.path.clone();

        if !document.kind.is_supported() {
            warn!("Skipping unsupported file: {}", path.display());
            return Ok(IndexOutcome::Skipped {
                path,
                reason: "unsupported file type".to_string(),
            });
        }

        debug!("Loading {} document {}", document.kind, path.display());
        let loaded = self
            .loader
            .load(document)
            .await
            .map_err(|source| IndexingError::Load {
                path: path.clone(),
                source,
            })?;

        let source_path = document.display_path();
        let mut chunks = Vec::new();
        let mut pages = Vec::new();
        for unit in &loaded.units {
            let unit_chunks = self
                .splitter
                .split_from(&source_path, &unit.text, chunks.len());
            pages.extend(std::iter::repeat_n(unit.page, unit_chunks.len()));
            chunks.extend(unit_chunks);
        }

        if chunks.is_empty() {
            info!("No text found in {}, nothing to index", path.display());
            return Ok(IndexOutcome::Skipped {
                path,
                reason: "document contains no text".to_string(),
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.chunk_text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_texts(&texts)
            .await
            .map_err(|source| IndexingError::Embedding {
                path: path.clone(),
                source,
            })?;

        if embeddings.len() != chunks.len() {
            return Err(IndexingError::EmbeddingCountMismatch {
                path,
                expected: chunks.len(),
                actual: embeddings.len(),
            });
        }

        let chunks_created = chunks.len();
        let records: Vec<VectorRecord> = chunks
            .into_iter()
            .zip(pages)
            .zip(embeddings.embeddings)
            .map(|((chunk, page), embedding)| VectorRecord {
                id: None,
                source_path: chunk.source_path,
                page,
                sequence: chunk.sequence,
                char_start: chunk.char_start,
                char_end: chunk.char_end,
                content: chunk.chunk_text,
                embedding,
            })
            .collect();

        let document_record = DocumentRecord {
            source_path,
            content_hash: loaded.content_hash,
            size: loaded.size,
            kind: document.kind.as_str().to_string(),
        };

        let summary = self
            .store
            .upsert(&document_record, records, self.policy)
            .await
            .map_err(|source| IndexingError::Storage {
                path: path.clone(),
                source,
            })?;

        let result = FileProcessingResult {
            path,
            chunks_created,
            embeddings_generated: chunks_created,
            records_inserted: summary.inserted,
            processing_time: start_time.elapsed(),
        };

        info!(
            "Indexed {}: {} chunks, {} new records in {:?}",
            result.path.display(),
            result.chunks_created,
            result.records_inserted,
            result.processing_time
        );
        Ok(IndexOutcome::Indexed(result))
    }
}

#[async_trait]
impl Analyzer for IndexingPipeline {
    async fn analyze(&self, document: &Document) -> anyhow::Result<()> {
        self.index_document(document).await?;
        Ok(())
    }
}
