//! HTTP route table. Handlers only translate between JSON and [`AnswerService`].

use crate::answer::{AnswerService, AnswerWarning};
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, StatusCode},
    routing::{get, post},
};
use folio_retriever::retrieval::retriever::RetrievedChunk;
use folio_retriever::storage::ChunkStore;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

#[derive(Clone)]
pub struct AppState {
    pub answers: AnswerService,
    pub chunks: Arc<dyn ChunkStore>,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<AnswerWarning>,
}

#[derive(Debug, Deserialize)]
pub struct RetrieveRequest {
    pub question: String,
    pub k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RetrieveResponse {
    pub chunks: Vec<RetrievedChunk>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub detail: String,
}

type ApiError = (StatusCode, Json<ErrorDetail>);

fn api_error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorDetail {
            detail: detail.into(),
        }),
    )
}

/// CORS layer for the configured origins. `*` anywhere in the list allows any
/// origin; entries that are not valid header values are logged and dropped.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|origin| origin.trim() == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {origin:?}");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

pub fn router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ask", post(ask))
        .route("/retrieve", post(retrieve))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let chunks = state.chunks.count_chunks().await.map_err(|e| {
        error!("Health check failed: {e:#}");
        api_error(StatusCode::SERVICE_UNAVAILABLE, format!("{e:#}"))
    })?;
    Ok(Json(json!({"status": "ok", "chunks": chunks})))
}

async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    if request.question.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "question cannot be empty"));
    }

    match state.answers.answer(&request.question).await {
        Ok(answer) => Ok(Json(AskResponse {
            answer: answer.text,
            warnings: answer.warnings,
        })),
        Err(e) => {
            error!("Answering failed: {e}");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

async fn retrieve(
    State(state): State<AppState>,
    Json(request): Json<RetrieveRequest>,
) -> Result<Json<RetrieveResponse>, ApiError> {
    if request.question.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "question cannot be empty"));
    }

    let result = state
        .answers
        .retriever()
        .retrieve(&request.question, request.k)
        .await
        .map_err(|e| {
            error!("Retrieval failed: {e:#}");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("Retrieval failed: {e:#}"))
        })?;
    Ok(Json(RetrieveResponse {
        chunks: result.hits,
    }))
}
