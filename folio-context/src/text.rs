//! This module splits document text into the overlapping, fixed-size passages
//! that the indexing pipeline embeds and stores.
//!
//! The splitter works in Unicode scalar values (`char`s), never bytes, so a chunk
//! boundary can never fall inside a multi-byte character.
//!
//! The module defines two main structs:
//! - [`TextSplitter`]: Holds the chunk size and overlap and produces chunks.
//! - [`TextChunk`]: A single segment of text, with its source path, its sequence
//!   number and its character range in the unit it came from.
//!
//! # Chunk layout
//!
//! For a text of length `L`, chunk size `C` and overlap `O` (with `O < C`):
//!
//! * an empty text yields no chunks,
//! * a text with `L <= C` yields exactly one chunk,
//! * otherwise there are `ceil((L - O) / (C - O))` chunks; every chunk except the
//!   last is exactly `C` characters long and shares its last `O` characters with
//!   the start of its successor.
//!
//! ```
//! use folio_context::text::TextSplitter;
//!
//! let splitter = TextSplitter::new(10, 4).unwrap();
//! let chunks = splitter.split("notes/a.txt", "abcdefghijklmnop");
//!
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0].chunk_text, "abcdefghij");
//! assert_eq!(chunks[1].chunk_text, "ghijklmnop");
//! assert_eq!(chunks[1].char_start, 6);
//! ```
use serde::Serialize;
use thiserror::Error;

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default number of characters shared between consecutive chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Errors raised when a splitter is configured with impossible parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge { size: usize, overlap: usize },
}

/// Splits text into fixed-size chunks that overlap by a fixed amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

/// A single chunk of text, along with where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChunk {
    /// Path of the document the chunk was cut from.
    pub source_path: String,
    /// Position of this chunk within its document (0-indexed, increasing).
    pub sequence: usize,
    /// Start offset in characters within the text unit.
    pub char_start: usize,
    /// End offset in characters (exclusive).
    pub char_end: usize,
    /// The text content of this specific chunk.
    pub chunk_text: String,
}

impl TextSplitter {
    /// Creates a splitter, rejecting a zero chunk size or an overlap that is
    /// not strictly smaller than the chunk size.
    ///
    /// ```
    /// use folio_context::text::{SplitError, TextSplitter};
    ///
    /// assert!(TextSplitter::new(500, 100).is_ok());
    /// assert_eq!(TextSplitter::new(0, 0), Err(SplitError::ZeroChunkSize));
    /// assert!(TextSplitter::new(100, 100).is_err());
    /// ```
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, SplitError> {
        if chunk_size == 0 {
            return Err(SplitError::ZeroChunkSize);
        }
        if chunk_overlap >= chunk_size {
            return Err(SplitError::OverlapTooLarge {
                size: chunk_size,
                overlap: chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Number of characters the window advances between chunks.
    fn stride(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }

    /// Splits `text` into chunks whose sequence numbers start at zero.
    pub fn split(&self, source_path: &str, text: &str) -> Vec<TextChunk> {
        self.split_from(source_path, text, 0)
    }

    /// Splits `text` into chunks whose sequence numbers start at `first_sequence`.
    ///
    /// Multi-unit documents (one unit per PDF page) call this once per unit,
    /// passing the running count so that sequence numbers stay unique per file.
    pub fn split_from(
        &self,
        source_path: &str,
        text: &str,
        first_sequence: usize,
    ) -> Vec<TextChunk> {
        // Byte offset of every char boundary, plus the end of the string, so
        // char ranges can be sliced without re-walking the text.
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(idx, _)| idx)
            .chain(std::iter::once(text.len()))
            .collect();
        let len = boundaries.len() - 1;

        let mut chunks = Vec::new();
        if len == 0 {
            return chunks;
        }

        let mut start = 0;
        loop {
            let end = (start + self.chunk_size).min(len);
            chunks.push(TextChunk {
                source_path: source_path.to_string(),
                sequence: first_sequence + chunks.len(),
                char_start: start,
                char_end: end,
                chunk_text: text[boundaries[start]..boundaries[end]].to_string(),
            });
            if end == len {
                break;
            }
            start += self.stride();
        }

        chunks
    }

    /// Number of chunks [`TextSplitter::split`] produces for a text of `len` characters.
    pub fn expected_chunk_count(&self, len: usize) -> usize {
        if len == 0 {
            0
        } else if len <= self.chunk_size {
            1
        } else {
            (len - self.chunk_overlap).div_ceil(self.stride())
        }
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl TextChunk {
    /// Length of the chunk in characters.
    pub fn char_len(&self) -> usize {
        self.char_end - self.char_start
    }
}
