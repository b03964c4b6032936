//! Civic Q&A Server
//!
//! HTTP surface for the knowledge-base assistant: question search,
//! knowledge sync from the content-management backend, health probes.

pub mod bootstrap;
pub mod http;
pub mod state;

pub use bootstrap::build_state;
pub use http::create_router;
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use civic_qa_rag::RagError;
use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Rag(#[from] RagError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Error kind reported in the envelope
    pub fn kind(&self) -> &'static str {
        match self {
            ServerError::InvalidRequest(_) => "invalid_input",
            ServerError::Rag(e) => e.kind(),
            ServerError::Config(_) => "config",
            ServerError::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Rag(RagError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            ServerError::Rag(RagError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ServerError::Rag(_) | ServerError::Config(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }
}

impl From<civic_qa_config::ConfigError> for ServerError {
    fn from(err: civic_qa_config::ConfigError) -> Self {
        ServerError::Config(err.to_string())
    }
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        err.status_code()
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "status": "error",
            "kind": self.kind(),
            "message": self.to_string(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}
