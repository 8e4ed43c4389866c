//! Reads recognised documents into text units.
//!
//! Plain text files become a single unit. PDFs become one unit per page, so a
//! page boundary is never merged across files and every chunk can report the
//! page it came from.

use std::path::{Path, PathBuf};

/// File types the loader understands, decided from the extension alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Text,
    Pdf,
    Unsupported,
}

impl DocumentKind {
    /// Classify a path by extension, ignoring case.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("txt") => DocumentKind::Text,
            Some("pdf") => DocumentKind::Pdf,
            _ => DocumentKind::Unsupported,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Text => "text",
            DocumentKind::Pdf => "pdf",
            DocumentKind::Unsupported => "unsupported",
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, DocumentKind::Unsupported)
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected source file. Content is read lazily by [`DocumentLoader::load`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Document {
    pub path: PathBuf,
    pub kind: DocumentKind,
}

impl Document {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let kind = DocumentKind::from_path(&path);
        Self { path, kind }
    }

    pub fn display_path(&self) -> String {
        self.path.to_string_lossy().to_string()
    }
}

/// A run of text from one document. `page` is 1-based and set only for PDFs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextUnit {
    pub page: Option<u32>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub path: PathBuf,
    /// blake3 hash of the raw file bytes
    pub content_hash: [u8; 32],
    pub size: u64,
    pub units: Vec<TextUnit>,
}

impl LoadedDocument {
    pub fn char_count(&self) -> usize {
        self.units.iter().map(|u| u.text.chars().count()).sum()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("unsupported file type: {path}")]
    Unsupported { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to extract text from PDF {path}: {message}")]
    Pdf { path: PathBuf, message: String },

    #[error("loader task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Loads [`Document`]s from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentLoader;

impl DocumentLoader {
    pub fn new() -> Self {
        Self
    }

    pub async fn load(&self, document: &Document) -> Result<LoadedDocument, LoadError> {
        let path = document.path.clone();
        if !document.kind.is_supported() {
            return Err(LoadError::Unsupported { path });
        }

        let bytes = tokio::fs::read(&path).await.map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;
        let content_hash = *blake3::hash(&bytes).as_bytes();
        let size = bytes.len() as u64;

        let units = match document.kind {
            DocumentKind::Text => vec![TextUnit {
                page: None,
                text: String::from_utf8_lossy(&bytes).into_owned(),
            }],
            DocumentKind::Pdf => extract_pdf_pages(path.clone(), bytes).await?,
            DocumentKind::Unsupported => return Err(LoadError::Unsupported { path }),
        };

        Ok(LoadedDocument {
            path,
            content_hash,
            size,
            units,
        })
    }
}

/// PDF parsing is CPU-bound and may panic on malformed input, so it runs on the
/// blocking pool where a panic surfaces as a join error.
async fn extract_pdf_pages(path: PathBuf, bytes: Vec<u8>) -> Result<Vec<TextUnit>, LoadError> {
    let extracted =
        tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem_by_pages(&bytes))
            .await;

    let pages = match extracted {
        Ok(Ok(pages)) => pages,
        Ok(Err(e)) => {
            return Err(LoadError::Pdf {
                path,
                message: e.to_string(),
            });
        }
        Err(e) if e.is_panic() => {
            return Err(LoadError::Pdf {
                path,
                message: "PDF parser panicked on malformed input".to_string(),
            });
        }
        Err(e) => return Err(LoadError::Join(e)),
    };

    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(idx, text)| TextUnit {
            page: Some(idx as u32 + 1),
            text,
        })
        .collect())
}
