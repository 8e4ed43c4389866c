//! # folio-embed
//!
//! Text embedding providers for the folio indexing pipeline and retriever.
//! Designed for async operation, with one trait that every provider implements
//! so the rest of the system never depends on a concrete model.
//!
//! ## Features
//!
//! - **Local ONNX Models**: Run embedding models locally through FastEmbed
//! - **Offline Hashing Provider**: Deterministic feature hashing, no model files needed
//! - **Half-Precision**: Memory-efficient f16 embeddings
//! - **Configurable**: `derive_builder` configuration with sensible defaults
//!
//! ## Quick Start
//!
//! ```no_run
//! use folio_embed::{EmbedConfig, create_provider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = create_provider(&EmbedConfig::default()).await?;
//!
//! let texts = vec!["Hello world".to_string(), "How are you?".to_string()];
//! let result = provider.embed_texts(&texts).await?;
//!
//! println!("Generated {} embeddings of dimension {}",
//!          result.len(), result.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! ## Embedding-space identity
//!
//! Every provider reports a [`EmbeddingProvider::model_id`]. The vector index
//! records it on first use and refuses to open with a different one, because
//! vectors from two models are not comparable.

pub mod config;
pub mod error;
pub mod hashing;
pub mod provider;

use std::sync::Arc;

// Re-export main types for easy access
pub use config::{DEFAULT_MODEL, EmbedConfig, EmbedConfigBuilder, HASHING_MODEL};
pub use error::{EmbedError, Result};
pub use hashing::HashingProvider;
pub use provider::{EmbeddingProvider, EmbeddingResult, FastEmbedProvider};

/// Build the provider selected by `config.model_name`.
///
/// `hashing` selects [`HashingProvider`]; every other name must be one of the
/// FastEmbed models known to [`provider::resolve_model`].
pub async fn create_provider(config: &EmbedConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    config.validate()?;

    if config.is_hashing() {
        tracing::info!(
            "Using hashing embedder with dimension {}",
            config.hashing_dimension
        );
        let provider =
            HashingProvider::new(config.hashing_dimension)?.with_normalize(config.normalize);
        return Ok(Arc::new(provider));
    }

    let provider = FastEmbedProvider::create(config.clone()).await?;
    Ok(Arc::new(provider))
}
