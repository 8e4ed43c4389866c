//! Question answering over the index: retrieve, build a prompt, complete.

use crate::completion::{CompletionClient, CompletionError};
use folio_retriever::retrieval::retriever::{RetrievedChunk, Retriever};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

const INSTRUCTION: &str = "Use the following context to answer the question.";
const CHUNK_DELIMITER: &str = "\n\n---\n\n";

/// Non-fatal conditions noticed while answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerWarning {
    /// Retrieval found nothing, the question was sent without context
    EmptyContext,
}

impl std::fmt::Display for AnswerWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnswerWarning::EmptyContext => write!(f, "no indexed context matched the question"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnswerError {
    #[error("Retrieval failed: {0:#}")]
    Retrieval(#[source] anyhow::Error),

    #[error("Completion service call failed: {0}")]
    Upstream(#[from] CompletionError),
}

/// Generated answer with the context it was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub warnings: Vec<AnswerWarning>,
    pub context_chunks: Vec<RetrievedChunk>,
}

/// Assemble the single prompt sent for `question`, chunks in ranked order.
pub fn build_prompt<S: AsRef<str>>(question: &str, chunks: &[S]) -> String {
    let context = chunks
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(CHUNK_DELIMITER);
    format!("{INSTRUCTION}\n\nContext:\n{context}\n\nQuestion: {question}\nAnswer:")
}

/// One retrieval and one completion call per question. Keeps no history.
#[derive(Clone)]
pub struct AnswerService {
    retriever: Retriever,
    client: Arc<dyn CompletionClient>,
}

impl AnswerService {
    pub fn new(retriever: Retriever, client: Arc<dyn CompletionClient>) -> Self {
        Self { retriever, client }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub async fn answer(&self, question: &str) -> Result<Answer, AnswerError> {
        let retrieved = self
            .retriever
            .retrieve(question, None)
            .await
            .map_err(AnswerError::Retrieval)?;

        let mut warnings = Vec::new();
        if retrieved.is_empty() {
            warn!("No context found for question, asking without it: {question:?}");
            warnings.push(AnswerWarning::EmptyContext);
        }

        let prompt = build_prompt(question, &retrieved.texts().collect::<Vec<_>>());
        let text = self.client.complete(&prompt).await?;
        info!(
            "Answered question with {} context chunks using {}",
            retrieved.len(),
            self.client.model()
        );

        Ok(Answer {
            text,
            warnings,
            context_chunks: retrieved.hits,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use folio_embed::{EmbeddingProvider, HashingProvider};
    use folio_retriever::config::AppConfig;
    use folio_retriever::retrieval::loader::Document;
    use folio_retriever::services::IndexServices;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    /// Records every prompt and replies with a canned answer or error.
    pub(crate) struct ScriptedClient {
        pub prompts: Mutex<Vec<String>>,
        reply: Option<String>,
    }

    impl ScriptedClient {
        pub(crate) fn answering(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                prompts: Mutex::new(Vec::new()),
                reply: Some(reply.to_string()),
            })
        }

        pub(crate) fn timing_out() -> Arc<Self> {
            Arc::new(Self {
                prompts: Mutex::new(Vec::new()),
                reply: None,
            })
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().ok_or(CompletionError::Timeout {
                timeout: Duration::from_secs(1),
            })
        }
    }

    /// Index services over a fresh temp dir with `files` already indexed.
    pub(crate) async fn indexed_services(files: &[(&str, &str)]) -> (TempDir, IndexServices) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.index.index_dir = temp_dir.path().join("index");
        config.watcher.watch_dir = temp_dir.path().join("documents");

        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingProvider::new(384).unwrap());
        let services = IndexServices::with_embedder(&config, embedder).await.unwrap();
        let pipeline = services.pipeline().unwrap();
        for (name, text) in files {
            let path = temp_dir.path().join(name);
            std::fs::write(&path, text).unwrap();
            pipeline
                .index_document(&Document::from_path(&path))
                .await
                .unwrap();
        }
        (temp_dir, services)
    }

    #[test]
    fn test_prompt_layout() {
        let prompt = build_prompt("Why?", &["first chunk", "second chunk"]);
        assert_eq!(
            prompt,
            "Use the following context to answer the question.\n\n\
             Context:\nfirst chunk\n\n---\n\nsecond chunk\n\n\
             Question: Why?\nAnswer:"
        );

        let empty = build_prompt::<&str>("Why?", &[]);
        assert!(empty.contains("Context:\n\n\nQuestion: Why?"));
        assert!(empty.ends_with("Answer:"));
    }

    #[tokio::test]
    async fn test_prompt_carries_context_and_question() {
        let (_dir, services) = indexed_services(&[
            ("france.txt", "The capital of France is Paris."),
            ("bread.txt", "Bread needs flour, water, salt and yeast."),
        ])
        .await;
        let client = ScriptedClient::answering("Paris.");
        let service = AnswerService::new(services.retriever(), client.clone());

        let answer = service.answer("What is the capital of France?").await.unwrap();
        assert_eq!(answer.text, "Paris.");
        assert!(answer.warnings.is_empty());
        assert_eq!(answer.context_chunks[0].text, "The capital of France is Paris.");

        let prompts = client.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("The capital of France is Paris."));
        assert!(prompts[0].contains("Question: What is the capital of France?\nAnswer:"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_empty_index_still_asks() {
        let (_dir, services) = indexed_services(&[]).await;
        let client = ScriptedClient::answering("I don't know.");
        let service = AnswerService::new(services.retriever(), client.clone());

        let answer = service.answer("Anything?").await.unwrap();
        assert_eq!(answer.text, "I don't know.");
        assert_eq!(answer.warnings, vec![AnswerWarning::EmptyContext]);
        assert!(answer.context_chunks.is_empty());
        assert_eq!(client.prompts.lock().unwrap().len(), 1);
        assert!(logs_contain("No context found for question"));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_an_error() {
        let (_dir, services) = indexed_services(&[("a.txt", "some text")]).await;
        let service = AnswerService::new(services.retriever(), ScriptedClient::timing_out());

        let err = service.answer("some text").await.unwrap_err();
        assert!(matches!(
            err,
            AnswerError::Upstream(CompletionError::Timeout { .. })
        ));
        assert!(err.to_string().starts_with("Completion service call failed:"));
    }
}
