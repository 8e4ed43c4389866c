//! # folio-server
//!
//! Answers questions about the documents in a watched folder over HTTP.
//!
//! The server opens the same index the `folio-retriever` CLI uses, keeps the
//! folder watcher running in the background (unless the indexing mode is
//! `read-only`), and serves:
//!
//! - `POST /ask` with `{"question": "..."}`, answered as `{"answer": "..."}`
//! - `POST /retrieve` with `{"question": "...", "k": 4}`, returning the ranked chunks
//! - `GET /health`
//!
//! Answers come from an Ollama-compatible completion service; the prompt holds
//! the retrieved chunks and the literal question.
//!
//! ## Quick Start
//!
//! ```bash
//! ollama serve &
//! folio-server --bind 127.0.0.1:8000
//! cp notes.txt documents/
//! curl -s localhost:8000/ask -H 'content-type: application/json' \
//!      -d '{"question": "What do my notes say about lifetimes?"}'
//! ```
//!
//! ## Architecture
//!
//! ```text
//! documents/ ──► DirectoryWatcher ──► TaskQueue ──► IndexingPipeline ──┐
//!                                                                      ▼
//! POST /ask ──► routes ──► AnswerService ──► Retriever ──────────► VectorIndex
//!                               │
//!                               └──► CompletionClient ──► /api/generate
//! ```

pub mod answer;
pub mod completion;
pub mod routes;

use answer::AnswerService;
use anyhow::{Context, Result};
use completion::OllamaClient;
use folio_retriever::config::AppConfig;
use folio_retriever::services::IndexServices;
use routes::{AppState, cors_layer, router};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Run the server on the configured address until Ctrl-C.
///
/// # Errors
/// Startup failures are returned before anything is served: invalid
/// configuration, an index built with another embedding model, a model that
/// cannot be loaded, a folder that cannot be watched, or an address that
/// cannot be bound.
pub async fn run_server(config: AppConfig) -> Result<()> {
    let listener = TcpListener::bind(&config.http.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.http.bind))?;
    serve(config, listener, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` completes, then stop
/// the watcher and wait for in-flight indexing.
pub async fn serve(
    config: AppConfig,
    listener: TcpListener,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let services = IndexServices::open(&config).await?;
    let client = OllamaClient::new(
        &config.completion.base_url,
        &config.completion.model,
        config.completion_timeout(),
    )?;
    let state = AppState {
        answers: AnswerService::new(services.retriever(), Arc::new(client)),
        chunks: services.store(),
    };
    let app = router(state, cors_layer(&config.http.cors_origins));

    let runtime = services.start_indexing().await?;

    info!(
        "folio-server listening on http://{} (completion model {} at {})",
        listener.local_addr()?,
        config.completion.model,
        config.completion.base_url
    );
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    if let Some(runtime) = runtime {
        runtime.shutdown().await;
    }
    services.close().await;
    served.context("HTTP server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down, waiting for in-flight files...");
}
