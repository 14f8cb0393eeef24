//! DocChat Server
//!
//! HTTP endpoints for document upload and session queries.

pub mod http;
pub mod metrics;
pub mod session;
pub mod state;

pub use http::create_router;
pub use metrics::{init_metrics, record_attempts, record_ingest, record_query_outcome};
pub use session::SessionManager;
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use docchat_agent::AgentError;
use docchat_rag::RagError;
use thiserror::Error;

/// Server errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServerError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<&ServerError> for StatusCode {
    fn from(err: &ServerError) -> Self {
        match err {
            ServerError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from(&self);
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<AgentError> for ServerError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::InvalidInput(msg) => ServerError::InvalidRequest(msg),
            AgentError::SessionNotFound(id) => ServerError::SessionNotFound(id),
            AgentError::NoCorpus | AgentError::SessionBusy(_) => {
                ServerError::Conflict(err.to_string())
            }
            AgentError::SessionLimit(_) => ServerError::Unavailable(err.to_string()),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<RagError> for ServerError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::UploadTooLarge { .. } => ServerError::PayloadTooLarge(err.to_string()),
            RagError::InvalidDocument(msg) => ServerError::InvalidRequest(msg),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_error_status() {
        let status = |e: AgentError| StatusCode::from(&ServerError::from(e));

        assert_eq!(status(AgentError::InvalidInput("empty".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(AgentError::NoCorpus), StatusCode::CONFLICT);
        assert_eq!(status(AgentError::SessionBusy("s1".into())), StatusCode::CONFLICT);
        assert_eq!(status(AgentError::SessionNotFound("s1".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(AgentError::SessionLimit(10)), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status(AgentError::Llm("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_rag_error_status() {
        let too_large = ServerError::from(RagError::UploadTooLarge { size: 10, limit: 5 });
        assert_eq!(StatusCode::from(&too_large), StatusCode::PAYLOAD_TOO_LARGE);

        let invalid = ServerError::from(RagError::InvalidDocument("no files".into()));
        assert_eq!(invalid, ServerError::InvalidRequest("no files".into()));
    }
}
