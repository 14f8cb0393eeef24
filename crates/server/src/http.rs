//! HTTP Endpoints
//!
//! REST API for document upload and session queries.

use axum::{
    extract::{DefaultBodyLimit, Json, Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use docchat_core::{QueryResponse, SessionState};
use docchat_rag::{IngestReport, SourceFile};

use crate::metrics::{metrics_handler, record_ingest};
use crate::state::AppState;
use crate::ServerError;

const DEFAULT_ORIGIN: &str = "http://localhost:3000";

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(&state.config.server.cors_origins, state.config.server.cors_enabled);
    let timeout = Duration::from_secs(state.config.server.request_timeout_seconds);
    // JSON escaping can inflate document text, so the body limit sits above the upload limit
    let upload_limit = state.config.ingestion.max_total_bytes.saturating_mul(2);

    Router::new()
        .route("/", get(banner))
        // Documents
        .route(
            "/api/documents",
            post(upload_documents).layer(DefaultBodyLimit::max(upload_limit)),
        )
        // Sessions
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/query", post(query))
        .route("/api/sessions/:id/cancel", post(cancel))
        // Health check
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Prometheus metrics
        .route("/metrics", get(metrics_handler))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// Build the CORS layer from configured origins
///
/// - If cors_enabled is false, returns a permissive layer (for dev)
/// - If no configured origin parses, defaults to localhost:3000
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    if parsed_origins.is_empty() {
        tracing::info!("No valid CORS origins configured, defaulting to {}", DEFAULT_ORIGIN);
        return layer.allow_origin(HeaderValue::from_static(DEFAULT_ORIGIN));
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    layer.allow_origin(parsed_origins)
}

async fn banner() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "docchat",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Upload request
#[derive(Debug, Deserialize)]
struct UploadRequest {
    files: Vec<SourceFile>,
}

/// Replace the corpus with the uploaded documents
async fn upload_documents(
    State(state): State<AppState>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<IngestReport>, ServerError> {
    if request.files.is_empty() {
        return Err(ServerError::InvalidRequest("no files in upload".to_string()));
    }

    let report = state.ingestion.ingest(request.files).await?;
    record_ingest(&report);
    Ok(Json(report))
}

/// Allocate a fresh session id; the session itself starts with its first query
async fn create_session() -> (StatusCode, Json<serde_json::Value>) {
    let id = uuid::Uuid::new_v4().to_string();
    (StatusCode::CREATED, Json(serde_json::json!({ "session_id": id })))
}

async fn list_sessions(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sessions = state.sessions.list();
    Json(serde_json::json!({
        "sessions": sessions,
        "count": sessions.len(),
    }))
}

/// Session audit history
#[derive(Debug, Serialize)]
struct SessionResponse {
    session_id: String,
    busy: bool,
    history: Vec<SessionState>,
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ServerError> {
    let history = state.sessions.history(&id)?;
    Ok(Json(SessionResponse {
        busy: state.sessions.is_busy(&id),
        session_id: id,
        history,
    }))
}

async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    if state.sessions.remove(&id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Query request
#[derive(Debug, Deserialize)]
struct QueryRequest {
    question: String,
}

async fn query(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ServerError> {
    let response = state.sessions.submit(&id, &request.question).await?;
    Ok(Json(response))
}

async fn cancel(State(state): State<AppState>, Path(id): Path<String>) -> Json<serde_json::Value> {
    let cancelled = state.sessions.cancel(&id);
    Json(serde_json::json!({
        "session_id": id,
        "cancelled": cancelled,
    }))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Ready once a corpus is installed; inference reachability is reported but not required
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let version = state.store.current_version();
    let inference = tokio::time::timeout(Duration::from_secs(2), state.llm.is_available())
        .await
        .unwrap_or(false);

    let ready = version.is_some();
    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(serde_json::json!({
            "status": if ready { "ready" } else { "not_ready" },
            "checks": {
                "corpus": {
                    "status": if ready { "ok" } else { "missing" },
                    "version": version,
                },
                "inference": {
                    "status": if inference { "ok" } else { "unreachable" },
                    "model": state.llm.model_name(),
                },
                "sessions": {
                    "status": "ok",
                    "count": state.sessions.count(),
                },
            }
        })),
    )
}
