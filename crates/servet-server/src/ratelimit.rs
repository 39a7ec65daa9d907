//! Rate guard and request logging middleware.
//!
//! The guard counts every inbound request against the caller's identity
//! hash before routing and answers with a fixed denial once the caller's
//! window is exhausted.

use axum::{
    Json,
    body::Body,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use servet_session::{RateDecision, identity_hash};

use crate::client::client_address;
use crate::state::AppState;

/// Body of a throttled response.
#[derive(Debug, Serialize, Deserialize)]
pub struct RateLimitError {
    pub error: String,
    pub code: u16,
    pub retry_after_seconds: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Middleware
// ─────────────────────────────────────────────────────────────────────────────

/// Per-identity rate guard.
///
/// Runs before routing; throttled requests never reach a handler.
pub async fn rate_guard_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.rate_limiting {
        return next.run(request).await;
    }

    let address = client_address(request.extensions());
    match state.guard.check(&address) {
        RateDecision::Allowed { .. } => next.run(request).await,
        decision @ RateDecision::Throttled { .. } => {
            let retry_after = decision.retry_after_secs();

            tracing::warn!(
                identity = %identity_hash(&address),
                path = %request.uri().path(),
                retry_after_seconds = retry_after,
                "Rate limit exceeded"
            );

            throttled_response(&state.config.deny_message, retry_after)
        }
    }
}

fn throttled_response(deny_message: &str, retry_after: u64) -> Response {
    let error = RateLimitError {
        error: deny_message.to_string(),
        code: StatusCode::TOO_MANY_REQUESTS.as_u16(),
        retry_after_seconds: retry_after,
    };

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(error)).into_response();
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

// ─────────────────────────────────────────────────────────────────────────────
// Request Logging
// ─────────────────────────────────────────────────────────────────────────────

/// Structured request logging middleware.
///
/// Logs method, path, status and duration at a level chosen by status class.
pub async fn request_logging_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.request_logging {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    if status.is_server_error() {
        tracing::error!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        tracing::info!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed"
        );
    }

    response
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::{Router, extract::ConnectInfo, middleware, routing::get};
    use servet_session::{ManagerConfig, RateGuard, RateGuardConfig, SessionManager};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn state(threshold: u32, enabled: bool) -> AppState {
        let manager = SessionManager::new(ManagerConfig::new("secret")).await.unwrap();
        let guard =
            RateGuard::new(RateGuardConfig::new(threshold, Duration::from_secs(60))).unwrap();
        let config = ServerConfig::new()
            .with_rate_limiting(enabled)
            .with_deny_message("go away");
        AppState::new(manager, guard, config)
    }

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                rate_guard_middleware,
            ))
            .with_state(state)
    }

    fn request_from(ip: [u8; 4]) -> Request<Body> {
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((ip, 40000))));
        request
    }

    #[tokio::test]
    async fn test_throttles_after_threshold() {
        let app = app(state(2, true).await);

        for _ in 0..2 {
            let response = app.clone().oneshot(request_from([10, 0, 0, 1])).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.clone().oneshot(request_from([10, 0, 0, 1])).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = response
            .headers()
            .get(RETRY_AFTER)
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry_after > 0 && retry_after <= 60);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let error: RateLimitError = serde_json::from_slice(&body).unwrap();
        assert_eq!(error.error, "go away");
        assert_eq!(error.code, 429);
        assert_eq!(error.retry_after_seconds, retry_after);

        // Another client is unaffected.
        let response = app.oneshot(request_from([10, 0, 0, 2])).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_disabled_guard_passes_everything() {
        let app = app(state(1, false).await);
        for _ in 0..5 {
            let response = app.clone().oneshot(request_from([10, 0, 0, 1])).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_missing_connect_info_counts_as_unknown() {
        let state = state(1, true).await;
        let app = app(state.clone());

        let request = || Request::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(
            app.clone().oneshot(request()).await.unwrap().status(),
            StatusCode::OK
        );
        assert_eq!(
            app.oneshot(request()).await.unwrap().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(state.guard.count("unknown"), 1);
    }
}
