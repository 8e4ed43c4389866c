//! Application configuration loaded from `folio.toml`.
//!
//! Every field has a default, so an empty file (or no file at all) is a valid
//! configuration. Both binaries read the same file, which is what keeps the
//! indexing process and the query process on the same index directory and
//! embedding model.

use crate::retrieval::directory_watcher::WatcherSettings;
use crate::retrieval::indexing_mode::IndexingMode;
use crate::retrieval::task_queue::TaskQueueConfig;
use crate::retrieval::vector_index::DuplicatePolicy;
use folio_context::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, SplitError, TextSplitter};
use folio_embed::{DEFAULT_MODEL, EmbedConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File read when no `--config` path is given, if it exists.
pub const DEFAULT_CONFIG_FILE: &str = "folio.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid chunking settings: {0}")]
    Chunking(#[from] SplitError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete application configuration.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub index: IndexConfig,
    pub watcher: WatcherConfig,
    pub http: HttpConfig,
    pub completion: CompletionConfig,
}

/// Where the index lives and how documents are embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory holding the SQLite index file
    pub index_dir: PathBuf,
    /// Must be the same for indexing and querying
    pub embedding_model: String,
    pub model_cache_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Chunks returned per question unless the request asks otherwise
    pub top_k: usize,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("index"),
            embedding_model: DEFAULT_MODEL.to_string(),
            model_cache_dir: PathBuf::from(".folio/models"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            top_k: 4,
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub watch_dir: PathBuf,
    pub mode: IndexingMode,
    pub settle_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub queue_capacity: usize,
    pub max_workers: usize,
    pub file_timeout_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from("documents"),
            mode: IndexingMode::default(),
            settle_delay_ms: 500,
            poll_interval_ms: 100,
            queue_capacity: 128,
            max_workers: 4,
            file_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    /// `*` allows any origin
    pub cors_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            cors_origins: vec!["*".to_string()],
        }
    }
}

/// Remote text-completion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "mistral".to_string(),
            timeout_secs: 120,
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, or from `folio.toml` in the working
    /// directory when no path is given. A missing default file yields the
    /// defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.splitter()?;
        if self.index.top_k == 0 {
            return Err(ConfigError::Invalid("index.top_k must be positive".into()));
        }
        if self.index.embedding_model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "index.embedding_model must not be empty".into(),
            ));
        }
        if self.watcher.max_workers == 0 {
            return Err(ConfigError::Invalid(
                "watcher.max_workers must be positive".into(),
            ));
        }
        if self.watcher.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "watcher.queue_capacity must be positive".into(),
            ));
        }
        if self.watcher.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "watcher.poll_interval_ms must be positive".into(),
            ));
        }
        if self.completion.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "completion.timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn splitter(&self) -> Result<TextSplitter, SplitError> {
        TextSplitter::new(self.index.chunk_size, self.index.chunk_overlap)
    }

    pub fn embed_config(&self) -> EmbedConfig {
        EmbedConfig::new(&self.index.embedding_model, &self.index.model_cache_dir)
    }

    pub fn task_queue_config(&self) -> TaskQueueConfig {
        TaskQueueConfig {
            capacity: self.watcher.queue_capacity,
            max_workers: self.watcher.max_workers,
            file_timeout: Duration::from_secs(self.watcher.file_timeout_secs),
        }
    }

    pub fn watcher_settings(&self) -> WatcherSettings {
        WatcherSettings {
            watch_dir: self.watcher.watch_dir.clone(),
            settle_delay: Duration::from_millis(self.watcher.settle_delay_ms),
            poll_interval: Duration::from_millis(self.watcher.poll_interval_ms),
            scan_existing: self.watcher.mode.scans_existing_files(),
        }
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion.timeout_secs)
    }
}
