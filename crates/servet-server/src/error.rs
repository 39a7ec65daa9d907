//! Error types for the server.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use servet_session::SessionError;
use thiserror::Error;

/// Server error type.
///
/// Only failures land here. A duplicate or missing session is a normal
/// [`SessionResponse`](crate::routes::SessionResponse) with a 409 or 404
/// status, and throttling is answered by the rate guard middleware.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Session backend failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<SessionError> for ServerError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Configuration(msg) => ServerError::Config(msg),
            SessionError::Backend(msg) => ServerError::Storage(msg),
            SessionError::Serialization(e) => ServerError::Serialization(e),
            SessionError::Cipher(msg) => ServerError::Internal(format!("Cipher error: {}", msg)),
        }
    }
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            ServerError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            ServerError::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "serialization_error")
            }
            ServerError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
        };

        let message = self.to_string();

        tracing::error!(status = %status, code, error = %message, "Server error");

        let body = ErrorResponse {
            code: code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failures_are_server_errors() {
        let cases = [
            (ServerError::Storage("down".into()), "storage_error"),
            (ServerError::Internal("x".into()), "internal_error"),
            (ServerError::Config("x".into()), "config_error"),
        ];
        for (error, code) in cases {
            let response = error.into_response();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(body["code"], code);
        }
    }

    #[test]
    fn test_session_error_conversion() {
        let err: ServerError = SessionError::Backend("down".into()).into();
        assert!(matches!(err, ServerError::Storage(_)));

        let err: ServerError = SessionError::Configuration("bad".into()).into();
        assert!(matches!(err, ServerError::Config(_)));

        let err: ServerError = SessionError::Cipher("nonce".into()).into();
        assert!(matches!(err, ServerError::Internal(_)));
    }
}
