//! Application state shared across handlers.

use std::sync::Arc;

use servet_session::{RateGuard, SessionManager};

use crate::config::ServerConfig;

/// Application state shared across all handlers.
///
/// Built once by the caller and handed to [`Server`](crate::Server); this is
/// the only owner of the session manager and the rate guard.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Session manager over the configured backend.
    pub sessions: Arc<SessionManager>,

    /// Per-identity request throttle.
    pub guard: Arc<RateGuard>,

    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(sessions: SessionManager, guard: RateGuard, config: ServerConfig) -> Self {
        Self {
            sessions: Arc::new(sessions),
            guard: Arc::new(guard),
            config: Arc::new(config),
        }
    }
}
