//! Process-wide services, created once at startup and passed to whatever needs them.
//!
//! ```text
//! AppConfig ──► IndexServices ──┬── embedder  (Arc<dyn EmbeddingProvider>)
//!                               ├── store     (Arc<SqliteStore>)
//!                               ├── pipeline()  → IndexingPipeline
//!                               ├── retriever() → Retriever
//!                               └── start_indexing() → IndexingRuntime (watcher + workers)
//! ```

use crate::config::AppConfig;
use crate::retrieval::directory_watcher::DirectoryWatcher;
use crate::retrieval::loader::DocumentLoader;
use crate::retrieval::pipeline::IndexingPipeline;
use crate::retrieval::retriever::Retriever;
use crate::retrieval::task_queue::{TaskQueue, WorkerPool};
use crate::retrieval::vector_index::{EmbeddingModelMetadata, VectorIndex};
use crate::storage::sqlite_store::SqliteStore;
use anyhow::{Context, Result};
use folio_embed::{EmbeddingProvider, create_provider};
use std::sync::Arc;
use tracing::info;

/// The embedder and vector index shared by the indexing and query paths.
#[derive(Clone)]
pub struct IndexServices {
    config: AppConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<SqliteStore>,
}

impl IndexServices {
    /// Load the configured embedding model and open the index. Fails if the
    /// index was built with a different model.
    pub async fn open(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let embedder = create_provider(&config.embed_config())
            .await
            .with_context(|| {
                format!(
                    "Failed to load embedding model '{}'",
                    config.index.embedding_model
                )
            })?;
        Self::with_embedder(config, embedder).await
    }

    /// Open the index with an already constructed embedder.
    pub async fn with_embedder(
        config: &AppConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let index = VectorIndex::open(&config.index.index_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to open index in {}",
                    config.index.index_dir.display()
                )
            })?;
        index
            .register_embedding_model(&EmbeddingModelMetadata::from_provider(embedder.as_ref()))
            .await?;

        info!(
            "Opened index {} with embedding model {}",
            config.index.index_dir.display(),
            embedder.model_id()
        );
        Ok(Self {
            config: config.clone(),
            embedder,
            store: Arc::new(SqliteStore::new(index)),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn embedder(&self) -> Arc<dyn EmbeddingProvider> {
        Arc::clone(&self.embedder)
    }

    pub fn store(&self) -> Arc<SqliteStore> {
        Arc::clone(&self.store)
    }

    pub fn index(&self) -> &VectorIndex {
        self.store.index()
    }

    pub fn pipeline(&self) -> Result<IndexingPipeline> {
        Ok(IndexingPipeline::new(
            DocumentLoader::new(),
            self.config.splitter()?,
            self.embedder(),
            self.store(),
            self.config.index.duplicate_policy,
        ))
    }

    pub fn retriever(&self) -> Retriever {
        Retriever::new(self.embedder(), self.store(), self.config.index.top_k)
    }

    /// Start the folder watcher and its workers, unless the configured mode is
    /// read-only. Failing to set up the watch aborts with an error.
    pub async fn start_indexing(&self) -> Result<Option<IndexingRuntime>> {
        let mode = self.config.watcher.mode;
        if !mode.watches() {
            info!("Indexing mode is {}, not watching for documents", mode);
            return Ok(None);
        }

        let pipeline = Arc::new(self.pipeline()?);
        let (queue, workers) = TaskQueue::start(self.config.task_queue_config(), pipeline.clone());
        let watcher = match DirectoryWatcher::start(self.config.watcher_settings(), queue).await {
            Ok(watcher) => watcher,
            Err(e) => {
                // The queue is gone with the failed watcher, so the workers exit
                workers.join().await;
                return Err(e);
            }
        };

        Ok(Some(IndexingRuntime {
            watcher,
            workers,
            pipeline,
        }))
    }

    pub async fn close(&self) {
        self.index().close().await;
    }
}

/// A running watcher with its worker pool.
pub struct IndexingRuntime {
    watcher: DirectoryWatcher,
    workers: WorkerPool,
    pipeline: Arc<IndexingPipeline>,
}

impl IndexingRuntime {
    pub fn pipeline(&self) -> &IndexingPipeline {
        &self.pipeline
    }

    /// Stop watching, then wait for files already queued or in progress.
    pub async fn shutdown(self) {
        self.watcher.shutdown().await;
        self.workers.join().await;
        let stats = self.pipeline.stats().await;
        info!(
            "Indexing stopped: {} files indexed, {} skipped, {} failed",
            stats.files_processed, stats.files_skipped, stats.errors
        );
    }
}
