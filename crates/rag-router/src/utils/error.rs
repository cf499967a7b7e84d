use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    /// Missing or invalid model / collection identifier. Fatal, never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Embedding or vector search failure. The retriever absorbs these, so they
    /// only surface from direct collaborator calls.
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl RagError {
    pub fn generation(err: impl std::fmt::Display) -> Self {
        RagError::Generation(err.to_string())
    }

    pub fn classification(err: impl std::fmt::Display) -> Self {
        RagError::Classification(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for RagError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, error_type) = match &self {
            RagError::BadRequest(_) => {
                tracing::warn!("Bad request: {}", message);
                (StatusCode::BAD_REQUEST, "BadRequest")
            }
            RagError::Configuration(_) => {
                tracing::error!("{}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, "ConfigurationError")
            }
            RagError::Retrieval(_) => {
                tracing::error!("{}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, "RetrievalError")
            }
            RagError::Generation(_) => {
                tracing::error!("{}", message);
                (StatusCode::SERVICE_UNAVAILABLE, "GenerationError")
            }
            RagError::Classification(_) => {
                tracing::error!("{}", message);
                (StatusCode::SERVICE_UNAVAILABLE, "ClassificationError")
            }
            RagError::Timeout(_) => {
                tracing::warn!("{}", message);
                (StatusCode::GATEWAY_TIMEOUT, "Timeout")
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}
