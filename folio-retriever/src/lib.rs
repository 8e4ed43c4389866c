//! folio-retriever: document indexing and retrieval for question answering
//!
//! Documents dropped into a watched folder are loaded, split into overlapping
//! chunks, embedded, and stored in a persistent SQLite vector index. Questions
//! are answered from the same index by embedding them with the same model and
//! ranking stored chunks by cosine similarity.
//!
//! ## Key Modules
//!
//! - **[`retrieval`]**: Loader, indexing pipeline, task queue, folder watcher and retriever
//! - **[`storage`]**: Storage traits with the SQLite implementation
//! - **[`config`]**: `folio.toml` configuration shared by every binary
//! - **[`services`]**: The embedder and index, created once and passed to each component
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use folio_retriever::{config::AppConfig, services::IndexServices};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = AppConfig::load(None)?;
//! let services = IndexServices::open(&config).await?;
//!
//! // Watch the documents folder in the background
//! let runtime = services.start_indexing().await?;
//!
//! let result = services
//!     .retriever()
//!     .retrieve("What is the capital of France?", None)
//!     .await?;
//! for hit in &result.hits {
//!     println!("{:.3} {}", hit.score, hit.text);
//! }
//!
//! if let Some(runtime) = runtime {
//!     runtime.shutdown().await;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! documents/ → DirectoryWatcher → TaskQueue → IndexingPipeline → VectorIndex (SQLite)
//!                                  (workers)   load/split/embed        ↑
//! question ──────────────────────────────────→ Retriever ──── search ──┘
//! ```

pub mod config;
pub mod retrieval;
pub mod services;
pub mod storage;
