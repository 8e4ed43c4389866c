use serde::{Deserialize, Serialize};

/// Defines how the watcher treats the watched directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IndexingMode {
    /// Index every file already in the directory, then keep watching for new ones
    FullReindex,

    /// Only index files created after startup
    ContinuousMonitoring,

    /// No indexing at all
    /// The system can only serve queries from the existing index
    ReadOnly,
}

impl IndexingMode {
    /// Check if this mode indexes files that exist at startup
    pub fn scans_existing_files(&self) -> bool {
        matches!(self, IndexingMode::FullReindex)
    }

    /// Check if this mode runs the folder watcher
    pub fn watches(&self) -> bool {
        !self.is_read_only()
    }

    /// Check if this mode is read-only
    pub fn is_read_only(&self) -> bool {
        matches!(self, IndexingMode::ReadOnly)
    }
}

impl Default for IndexingMode {
    fn default() -> Self {
        Self::ContinuousMonitoring
    }
}

impl std::fmt::Display for IndexingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexingMode::FullReindex => write!(f, "full-reindex"),
            IndexingMode::ContinuousMonitoring => write!(f, "continuous-monitoring"),
            IndexingMode::ReadOnly => write!(f, "read-only"),
        }
    }
}

impl std::str::FromStr for IndexingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full-reindex" | "full_reindex" | "full" | "scan" => Ok(IndexingMode::FullReindex),
            "continuous-monitoring" | "continuous_monitoring" | "continuous" | "monitor"
            | "watch" => Ok(IndexingMode::ContinuousMonitoring),
            "read-only" | "read_only" | "readonly" | "read" => Ok(IndexingMode::ReadOnly),
            _ => Err(format!(
                "Invalid indexing mode: '{s}'. Valid values are: full-reindex, continuous-monitoring, read-only"
            )),
        }
    }
}

impl TryFrom<String> for IndexingMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IndexingMode> for String {
    fn from(mode: IndexingMode) -> Self {
        mode.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexing_mode_properties() {
        assert!(IndexingMode::FullReindex.scans_existing_files());
        assert!(IndexingMode::FullReindex.watches());
        assert!(!IndexingMode::FullReindex.is_read_only());

        assert!(!IndexingMode::ContinuousMonitoring.scans_existing_files());
        assert!(IndexingMode::ContinuousMonitoring.watches());
        assert!(!IndexingMode::ContinuousMonitoring.is_read_only());

        assert!(!IndexingMode::ReadOnly.scans_existing_files());
        assert!(!IndexingMode::ReadOnly.watches());
        assert!(IndexingMode::ReadOnly.is_read_only());

        assert_eq!(IndexingMode::default(), IndexingMode::ContinuousMonitoring);
    }

    #[test]
    fn test_from_str() {
        assert_eq!(
            "full-reindex".parse::<IndexingMode>().unwrap(),
            IndexingMode::FullReindex
        );
        assert_eq!(
            "continuous-monitoring".parse::<IndexingMode>().unwrap(),
            IndexingMode::ContinuousMonitoring
        );
        assert_eq!(
            "read-only".parse::<IndexingMode>().unwrap(),
            IndexingMode::ReadOnly
        );

        // Test case insensitive
        assert_eq!(
            "FULL".parse::<IndexingMode>().unwrap(),
            IndexingMode::FullReindex
        );
        assert_eq!(
            "Monitor".parse::<IndexingMode>().unwrap(),
            IndexingMode::ContinuousMonitoring
        );

        // Test invalid
        assert!("invalid".parse::<IndexingMode>().is_err());
    }

    #[test]
    fn test_serde_uses_the_same_names() {
        #[derive(Deserialize, Serialize)]
        struct Wrapper {
            mode: IndexingMode,
        }

        let parsed: Wrapper = toml::from_str("mode = \"ReadOnly\"").unwrap();
        assert_eq!(parsed.mode, IndexingMode::ReadOnly);

        let written = toml::to_string(&Wrapper {
            mode: IndexingMode::FullReindex,
        })
        .unwrap();
        assert_eq!(written.trim(), "mode = \"full-reindex\"");

        assert!(toml::from_str::<Wrapper>("mode = \"sometimes\"").is_err());
    }
}
