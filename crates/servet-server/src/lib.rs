//! HTTP server for Servet.
//!
//! This crate exposes the session engine over HTTP:
//!
//! - Per-client encrypted sessions keyed by the caller's address
//! - A per-identity rate guard in front of every route
//! - A SQL denylist inspection endpoint
//! - Request logging and an OpenAPI document
//!
//! # Example
//!
//! ```ignore
//! use servet_server::{AppState, Server, ServerConfig};
//! use servet_session::{ManagerConfig, RateGuard, RateGuardConfig, SessionManager};
//!
//! let manager = SessionManager::new(ManagerConfig::new("secret")).await?;
//! let guard = RateGuard::new(RateGuardConfig::default())?;
//! let config = ServerConfig::new().with_bind_address("127.0.0.1:8080".parse()?);
//!
//! Server::new(AppState::new(manager, guard, config)).run().await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod inspector;
pub mod ratelimit;
pub mod routes;
pub mod state;

pub use client::{ClientAddress, UNKNOWN_CLIENT};
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use inspector::{QueryDetails, QueryEnvelope, guard_query, inspect_query};
pub use ratelimit::{rate_guard_middleware, request_logging_middleware};
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;

use axum::http::{HeaderValue, Method, header::CONTENT_TYPE};
use axum::{Router, middleware};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// The Servet HTTP server.
pub struct Server {
    /// Application state.
    state: AppState,
}

impl Server {
    /// Create a server from a pre-built application state.
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes and middleware.
    ///
    /// Layer order, outermost first: trace, rate guard, request logging,
    /// CORS. Throttled requests are therefore traced but not logged as
    /// completed requests.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .merge(routes::health_routes())
            .nest("/api/v1", self.api_routes());

        if let Some(cors) = self.cors_layer() {
            router = router.layer(cors);
        }

        router
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(middleware::from_fn_with_state(
                        self.state.clone(),
                        ratelimit::rate_guard_middleware,
                    ))
                    .layer(middleware::from_fn_with_state(
                        self.state.clone(),
                        ratelimit::request_logging_middleware,
                    )),
            )
            .with_state(self.state.clone())
    }

    /// API routes (v1).
    fn api_routes(&self) -> Router<AppState> {
        use axum::routing::{get, post};

        Router::new()
            .route(
                "/session",
                post(routes::create_session_handler)
                    .get(routes::get_session_handler)
                    .delete(routes::delete_session_handler),
            )
            .route("/query/inspect", post(routes::inspect_query_handler))
            .route("/openapi.json", get(routes::openapi_handler))
    }

    fn cors_layer(&self) -> Option<CorsLayer> {
        let origins = &self.state.config.cors_origins;
        if origins.is_empty() {
            return None;
        }

        let layer = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([CONTENT_TYPE]);

        if origins.iter().any(|o| o == "*") {
            return Some(layer.allow_origin(Any));
        }

        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        Some(layer.allow_origin(AllowOrigin::list(values)))
    }

    /// Run the server on the configured address until ctrl-c.
    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.bind_address;
        self.run_on(addr).await
    }

    /// Run the server on a specific address until ctrl-c (useful for testing).
    pub async fn run_on(self, addr: SocketAddr) -> Result<()> {
        self.run_until(addr, shutdown_signal()).await
    }

    /// Run the server until `shutdown` resolves, then close the session manager.
    pub async fn run_until<F>(self, addr: SocketAddr, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to bind: {}", e)))?;

        info!("Starting server on {}", addr);

        let served = axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Internal(format!("Server error: {}", e)));

        self.state.sessions.close().await?;
        self.state.guard.shutdown();
        info!("Server stopped");

        served
    }

    /// Get the configured bind address.
    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }

    /// Shared application state.
    pub fn state(&self) -> &AppState {
        &self.state
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for ctrl-c; running until killed");
            std::future::pending::<()>().await;
        }
    }
}
