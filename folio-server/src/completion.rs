//! Client for the remote text-completion service.
//!
//! The service speaks the Ollama `/api/generate` protocol: one JSON request
//! carrying the model name, the prompt and `"stream": false`, answered by one
//! JSON object whose `response` field holds the generated text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Why a completion request produced no text.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("completion service at {url} is unreachable: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("completion service did not answer within {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("completion service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed completion response: {0}")]
    MalformedResponse(#[source] reqwest::Error),
}

/// Turns a prompt into generated text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Model identifier sent with every request
    fn model(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// [`CompletionClient`] for an Ollama-compatible server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaClient {
    /// Every request is abandoned after `timeout`, body included.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(CompletionError::Client)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            timeout,
        })
    }

    pub fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    fn classify(&self, url: &str, err: reqwest::Error) -> CompletionError {
        if err.is_timeout() {
            CompletionError::Timeout {
                timeout: self.timeout,
            }
        } else {
            CompletionError::Unreachable {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

#[async_trait]
impl CompletionClient for OllamaClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let url = self.generate_url();
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };
        debug!("Sending {} byte prompt to {} ({})", prompt.len(), url, self.model);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let generated = response.json::<GenerateResponse>().await.map_err(|e| {
            if e.is_timeout() {
                CompletionError::Timeout {
                    timeout: self.timeout,
                }
            } else {
                CompletionError::MalformedResponse(e)
            }
        })?;
        Ok(generated.response)
    }
}
