//! Liveness probe with a summary of the session engine.

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Session backend tag (`memory`, `document-store`, `embedded-relational`).
    pub backend: String,
    /// Sessions currently within their TTL.
    pub live_sessions: usize,
    /// Whether the per-client rate guard is active.
    pub rate_limiting: bool,
}

/// GET /health - Report liveness and engine state.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Server is up", body = HealthResponse),
    ),
    tag = "health"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.sessions.kind().to_string(),
        live_sessions: state.sessions.len(),
        rate_limiting: state.config.rate_limiting,
    })
}

/// Routes outside the versioned API.
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use servet_session::{ManagerConfig, RateGuard, RateGuardConfig, SessionManager};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_reports_engine_state() {
        let manager = SessionManager::new(ManagerConfig::new("secret")).await.unwrap();
        manager.new_session("10.0.0.9", "cart").await.unwrap();
        let guard = RateGuard::new(RateGuardConfig::default()).unwrap();
        let state = AppState::new(manager, guard, ServerConfig::new().with_rate_limiting(false));

        let response = health_routes()
            .with_state(state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();

        assert_eq!(health.status, "ok");
        assert_eq!(health.backend, "memory");
        assert_eq!(health.live_sessions, 1);
        assert!(!health.rate_limiting);
    }
}
