//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/documents` | Accept page layouts; ingestion runs in the background (202) |
//! | `GET`  | `/documents/{id}/progress` | Ingestion progress snapshot |
//! | `GET`  | `/documents/{id}/fragments` | Fragment count and pages stored so far |
//! | `POST` | `/chat` | Answer a question about one document |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `upstream_error` (502),
//! `internal` (500). Failed `/chat` calls also carry a `fallback` message
//! suitable for showing in a chat window.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use pagewise_core::models::PageLayout;
use pagewise_core::progress::{ProgressSnapshot, ProgressStore, ProgressTracker};

use crate::answer::{answer_question, ChatRequest};
use crate::config::Config;
use crate::error::{PagewiseError, CHAT_FALLBACK_MESSAGE};
use crate::ingest::{dedup_hash, ingest_registered, register_document, IngestRequest};
use crate::layout::StaticLayout;
use crate::services::Services;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    services: Services,
}

/// Starts the HTTP server on `[server].bind` and runs until the process ends.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Services::from_config(config).await?;
    spawn_progress_purge(
        services.progress.clone(),
        std::time::Duration::from_secs(config.progress.retention_secs.max(1) as u64),
    );
    let app = router(services);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodically drop completed progress entries nobody polled.
fn spawn_progress_purge(progress: Arc<dyn ProgressStore>, every: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let purged = progress.purge_expired(chrono::Utc::now());
            if purged > 0 {
                debug!(purged, "expired progress entries removed");
            }
        }
    });
}

/// Build the router over already constructed services.
pub fn router(services: Services) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/documents", post(handle_upload))
        .route("/documents/{id}/progress", get(handle_progress))
        .route("/documents/{id}/fragments", get(handle_fragments))
        .route("/chat", post(handle_chat))
        .layer(cors)
        .with_state(AppState { services })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
    #[serde(skip_serializing_if = "Option::is_none")]
    fallback: Option<&'static str>,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    fallback: Option<&'static str>,
}

impl ApiError {
    fn with_fallback(mut self) -> Self {
        self.fallback = Some(CHAT_FALLBACK_MESSAGE);
        self
    }
}

impl From<PagewiseError> for ApiError {
    fn from(err: PagewiseError) -> Self {
        let status = match &err {
            PagewiseError::InvalidInput(_) | PagewiseError::EmptyFragmentPool(_) => {
                StatusCode::BAD_REQUEST
            }
            PagewiseError::DocumentNotFound(_) => StatusCode::NOT_FOUND,
            PagewiseError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            PagewiseError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %err, "request failed");
        }
        ApiError {
            status,
            code: err.code(),
            message: err.to_string(),
            fallback: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
            fallback: self.fallback,
        };
        (self.status, Json(body)).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ POST /documents ============

#[derive(Deserialize)]
struct UploadRequest {
    #[serde(default)]
    title: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    pages: Vec<PageLayout>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    document_id: String,
}

/// Registers the document, records `uploading`, and hands the pages to a
/// background ingestion task.
///
/// Re-uploading a document whose ingestion is still running returns the
/// same id without starting a second ingestion.
async fn handle_upload(
    State(state): State<AppState>,
    Json(upload): Json<UploadRequest>,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let hash_input = serde_json::to_vec(&upload.pages)
        .map_err(|e| PagewiseError::Internal(e.into()))?;
    let layout = StaticLayout::new(upload.pages);
    let request = IngestRequest {
        source: upload.source.unwrap_or_else(|| "upload".to_string()),
        title: upload.title,
        dedup_hash: dedup_hash(&hash_input),
        layout: &layout,
    };
    let document = register_document(&state.services, &request).await?;
    let progress = state.services.progress.as_ref();
    if ProgressTracker::try_start(&document.id, progress, None).is_none() {
        info!(document_id = %document.id, "ingestion already in progress");
        return Ok((
            StatusCode::ACCEPTED,
            Json(UploadResponse {
                document_id: document.id,
            }),
        ));
    }

    let services = state.services.clone();
    let background = document.clone();
    tokio::spawn(async move {
        // Failures are logged and evict the progress entry.
        let _ = ingest_registered(&services, &background, &layout, None).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            document_id: document.id,
        }),
    ))
}

// ============ GET /documents/{id}/progress ============

async fn handle_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProgressSnapshot>, ApiError> {
    let snapshot = state
        .services
        .progress
        .get(&id)
        .map(|s| s.snapshot(chrono::Utc::now()))
        .ok_or(PagewiseError::DocumentNotFound(id))?;
    Ok(Json(snapshot))
}

// ============ GET /documents/{id}/fragments ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FragmentsResponse {
    document_id: String,
    title: String,
    count: usize,
    pages: Vec<u32>,
}

async fn handle_fragments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FragmentsResponse>, ApiError> {
    let store = &state.services.store;
    let document = store
        .get_document(&id)
        .await
        .map_err(|e| PagewiseError::upstream("storage", e))?
        .ok_or_else(|| PagewiseError::DocumentNotFound(id.clone()))?;
    let fragments = store
        .list_fragments(&document.id)
        .await
        .map_err(|e| PagewiseError::upstream("storage", e))?;

    let mut pages: Vec<u32> = fragments.iter().map(|f| f.page_number).collect();
    pages.dedup();

    Ok(Json(FragmentsResponse {
        document_id: document.id,
        title: document.title,
        count: fragments.len(),
        pages,
    }))
}

// ============ POST /chat ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatResponse {
    answer: String,
    pages: Vec<u32>,
    graph_intent: bool,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let answer = answer_question(&state.services, &request)
        .await
        .map_err(|e| ApiError::from(e).with_fallback())?;
    Ok(Json(ChatResponse {
        answer: answer.answer,
        pages: answer.pages,
        graph_intent: answer.graph_intent,
    }))
}
