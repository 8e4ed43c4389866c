//! Top-k retrieval of stored chunks for a question.

use crate::storage::{ChunkId, SearchHit, VectorStore};
use anyhow::{Context, Result};
use folio_embed::EmbeddingProvider;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// One ranked chunk in a [`RetrievalResult`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub id: ChunkId,
    pub text: String,
    pub score: f32,
    pub source_path: String,
    pub page: Option<u32>,
    pub sequence: usize,
}

impl From<SearchHit> for RetrievedChunk {
    fn from(hit: SearchHit) -> Self {
        Self {
            id: hit.chunk.id,
            text: hit.chunk.content,
            score: hit.score,
            source_path: hit.chunk.source_path,
            page: hit.chunk.page,
            sequence: hit.chunk.sequence,
        }
    }
}

/// Chunks ordered by descending similarity, at most `k` of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub hits: Vec<RetrievedChunk>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.hits.iter().map(|hit| hit.text.as_str())
    }
}

/// Embeds questions with the same provider the index was built with and
/// searches the store. Holds no state of its own.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    default_k: usize,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        default_k: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            default_k,
        }
    }

    pub fn default_k(&self) -> usize {
        self.default_k
    }

    pub async fn retrieve(&self, question: &str, k: Option<usize>) -> Result<RetrievalResult> {
        let k = k.unwrap_or(self.default_k);
        if k == 0 {
            return Ok(RetrievalResult::default());
        }

        let query = self
            .embedder
            .embed_text(question)
            .await
            .context("Failed to embed question")?;

        let hits = self
            .store
            .search(&query, k)
            .await
            .context("Vector search failed")?;
        debug!("Retrieved {} chunks (k = {})", hits.len(), k);

        Ok(RetrievalResult {
            hits: hits.into_iter().map(RetrievedChunk::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::vector_index::{DocumentRecord, DuplicatePolicy, VectorIndex, VectorRecord};
    use crate::storage::sqlite_store::SqliteStore;
    use folio_context::TextSplitter;
    use folio_embed::HashingProvider;

    async fn index_texts(texts: &[(&str, &str)]) -> Result<Retriever> {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingProvider::new(256)?);
        let store = Arc::new(SqliteStore::new(VectorIndex::open_memory().await?));
        let splitter = TextSplitter::new(120, 20)?;

        for (path, text) in texts {
            let chunks = splitter.split(path, text);
            let contents: Vec<String> = chunks.iter().map(|c| c.chunk_text.clone()).collect();
            let embeddings = embedder.embed_texts(&contents).await?;
            let records = chunks
                .into_iter()
                .zip(embeddings.embeddings)
                .map(|(chunk, embedding)| VectorRecord {
                    id: None,
                    source_path: chunk.source_path,
                    page: None,
                    sequence: chunk.sequence,
                    char_start: chunk.char_start,
                    char_end: chunk.char_end,
                    content: chunk.chunk_text,
                    embedding,
                })
                .collect();
            let document = DocumentRecord {
                source_path: path.to_string(),
                content_hash: *blake3::hash(text.as_bytes()).as_bytes(),
                size: text.len() as u64,
                kind: "text".to_string(),
            };
            store
                .upsert(&document, records, DuplicatePolicy::Replace)
                .await?;
        }

        Ok(Retriever::new(embedder, store, 4))
    }

    #[tokio::test]
    async fn test_capital_question_finds_the_fact() -> Result<()> {
        let retriever = index_texts(&[
            ("france.txt", "The capital of France is Paris."),
            ("rust.txt", "Rust is a systems programming language focused on safety."),
            ("weather.txt", "Tomorrow will be rainy with strong winds along the coast."),
        ])
        .await?;

        let result = retriever
            .retrieve("What is the capital of France?", None)
            .await?;
        assert_eq!(result.hits[0].text, "The capital of France is Paris.");
        assert_eq!(result.hits[0].source_path, "france.txt");
        assert!(result.len() <= 4);
        assert!(result.hits.windows(2).all(|w| w[0].score >= w[1].score));
        Ok(())
    }

    #[tokio::test]
    async fn test_verbatim_substring_ranks_its_chunk_first() -> Result<()> {
        let long_text = "Ownership rules govern how memory is managed. \
            Each value has a single owner at any time. \
            When the owner goes out of scope the value is dropped. \
            Borrowing lets code refer to a value without taking ownership. \
            Lifetimes describe how long references stay valid. \
            Traits define shared behaviour across many types.";
        let retriever = index_texts(&[
            ("ownership.txt", long_text),
            ("other.txt", "Bread needs flour, water, salt and yeast to rise overnight."),
        ])
        .await?;

        let query = "Lifetimes describe how long references stay valid";
        for k in [1, 3] {
            let result = retriever.retrieve(query, Some(k)).await?;
            assert!(result.len() <= k);
            assert!(result.hits[0].text.contains(query), "got {:?}", result.hits[0]);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_zero_k_and_empty_index_return_nothing() -> Result<()> {
        let empty = index_texts(&[]).await?;
        assert!(empty.retrieve("anything", None).await?.is_empty());

        let retriever = index_texts(&[("a.txt", "some text")]).await?;
        assert!(retriever.retrieve("some text", Some(0)).await?.is_empty());
        Ok(())
    }
}
