//! Configuration for embedding models

use crate::error::{EmbedError, Result};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Model name that selects the model-free [`crate::HashingProvider`].
pub const HASHING_MODEL: &str = "hashing";

/// Configuration for embedding models
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq)]
#[builder(setter(into))]
pub struct EmbedConfig {
    /// Name of the embedding model to use
    #[builder(default = "DEFAULT_MODEL.to_string()")]
    pub model_name: String,
    /// Directory where downloaded model files are cached
    #[builder(default = r#"PathBuf::from(".folio/models")"#)]
    pub cache_dir: PathBuf,
    /// Maximum batch size for embedding generation
    #[builder(default = "32")]
    pub batch_size: usize,
    /// Whether to normalize embeddings
    #[builder(default = "true")]
    pub normalize: bool,
    /// Vector dimension produced by the hashing provider
    #[builder(default = "384")]
    pub hashing_dimension: usize,
    /// Print download progress while fetching a model for the first time
    #[builder(default = "false")]
    pub show_download_progress: bool,
}

impl EmbedConfig {
    /// Create a new embedding configuration using the builder
    pub fn builder() -> EmbedConfigBuilder {
        EmbedConfigBuilder::default()
    }

    /// Create a configuration for a named model, caching files under `cache_dir`
    pub fn new<P: AsRef<Path>>(model_name: impl Into<String>, cache_dir: P) -> Self {
        Self {
            model_name: model_name.into(),
            cache_dir: cache_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Configuration for the deterministic hashing provider
    pub fn hashing(dimension: usize) -> Self {
        Self {
            model_name: HASHING_MODEL.to_string(),
            hashing_dimension: dimension,
            ..Self::default()
        }
    }

    /// Set the batch size for embedding generation (builder style)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Set whether to normalize embeddings (builder style)
    pub fn with_normalize(self, normalize: bool) -> Self {
        Self { normalize, ..self }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Check if this configuration selects the hashing provider
    pub fn is_hashing(&self) -> bool {
        self.model_name.eq_ignore_ascii_case(HASHING_MODEL)
    }

    /// Reject settings no provider can work with
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(EmbedError::invalid_config("model name must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch size must be positive"));
        }
        if self.is_hashing() && self.hashing_dimension == 0 {
            return Err(EmbedError::invalid_config(
                "hashing dimension must be positive",
            ));
        }
        Ok(())
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL.to_string(),
            cache_dir: PathBuf::from(".folio/models"),
            batch_size: 32,
            normalize: true,
            hashing_dimension: 384,
            show_download_progress: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_creation() {
        let temp_dir = tempdir().unwrap();
        let config = EmbedConfig::new("bge-small-en-v1.5", temp_dir.path());

        assert_eq!(config.model_name, "bge-small-en-v1.5");
        assert_eq!(config.cache_dir, temp_dir.path());
        assert_eq!(config.batch_size, 32);
        assert!(config.normalize);
        assert!(!config.is_hashing());
    }

    #[test]
    fn test_builder_defaults_match_default() {
        let built = EmbedConfig::builder().build().unwrap();
        assert_eq!(built, EmbedConfig::default());
        assert_eq!(built.model_name, DEFAULT_MODEL);
        assert_eq!(built.cache_dir, PathBuf::from(".folio/models"));
    }

    #[test]
    fn test_derive_builder_pattern() {
        let temp_dir = tempdir().unwrap();
        let config = EmbedConfig::builder()
            .model_name("hashing")
            .cache_dir(temp_dir.path())
            .batch_size(128usize)
            .hashing_dimension(64usize)
            .build()
            .unwrap();

        assert!(config.is_hashing());
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.hashing_dimension, 64);
    }

    #[test]
    fn test_builder_methods() {
        let config = EmbedConfig::hashing(16)
            .with_batch_size(4)
            .with_normalize(false);

        assert_eq!(config.batch_size, 4);
        assert!(!config.normalize);
        assert_eq!(config.hashing_dimension, 16);
    }

    #[test]
    fn test_validate() {
        assert!(EmbedConfig::default().validate().is_ok());
        assert!(EmbedConfig::default().with_batch_size(0).validate().is_err());
        assert!(EmbedConfig::hashing(0).validate().is_err());
        assert!(EmbedConfig::new("  ", "/tmp").validate().is_err());
    }
}
