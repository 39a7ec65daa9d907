//! Session endpoints.
//!
//! The session is keyed by the caller's address, so none of these routes
//! take an id: each client only ever sees its own session.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use servet_session::SessionOutcome;
use utoipa::ToSchema;

use crate::client::ClientAddress;
use crate::error::ServerError;
use crate::state::AppState;

/// Result of a session operation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    /// Hex digest of the caller's address.
    pub identity_hash: String,
    pub success: bool,
    /// Stored payload (fetch only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Why the operation did not succeed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Into<Value>> From<SessionOutcome<T>> for SessionResponse {
    fn from(outcome: SessionOutcome<T>) -> Self {
        Self {
            identity_hash: outcome.identity_hash.into_string(),
            success: outcome.success,
            data: outcome.data.map(Into::into),
            error: outcome.error,
        }
    }
}

/// POST /api/v1/session - Create a session for the caller.
#[utoipa::path(
    post,
    path = "/api/v1/session",
    request_body = Object,
    responses(
        (status = 201, description = "Session created", body = SessionResponse),
        (status = 409, description = "Caller already owns a session", body = SessionResponse),
        (status = 429, description = "Rate limit exceeded"),
    ),
    tag = "sessions"
)]
pub async fn create_session_handler(
    State(state): State<AppState>,
    ClientAddress(address): ClientAddress,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<SessionResponse>), ServerError> {
    let outcome = state.sessions.new_session(&address, &payload).await?;

    let status = if outcome.success {
        StatusCode::CREATED
    } else {
        StatusCode::CONFLICT
    };
    Ok((status, Json(SessionResponse::from(outcome))))
}

/// GET /api/v1/session - Fetch the caller's session payload.
#[utoipa::path(
    get,
    path = "/api/v1/session",
    responses(
        (status = 200, description = "Session payload", body = SessionResponse),
        (status = 404, description = "No live session", body = SessionResponse),
        (status = 429, description = "Rate limit exceeded"),
    ),
    tag = "sessions"
)]
pub async fn get_session_handler(
    State(state): State<AppState>,
    ClientAddress(address): ClientAddress,
) -> Result<(StatusCode, Json<SessionResponse>), ServerError> {
    let outcome = state.sessions.fetch::<Value>(&address).await?;

    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    Ok((status, Json(SessionResponse::from(outcome))))
}

/// DELETE /api/v1/session - Drop the caller's session. Idempotent.
#[utoipa::path(
    delete,
    path = "/api/v1/session",
    responses(
        (status = 200, description = "Session removed (or none existed)", body = SessionResponse),
        (status = 429, description = "Rate limit exceeded"),
    ),
    tag = "sessions"
)]
pub async fn delete_session_handler(
    State(state): State<AppState>,
    ClientAddress(address): ClientAddress,
) -> Result<Json<SessionResponse>, ServerError> {
    let outcome = state.sessions.delete(&address).await?;
    Ok(Json(SessionResponse::from(outcome)))
}
