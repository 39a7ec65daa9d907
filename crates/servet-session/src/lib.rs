//! Session lifecycle and abuse control for Servet.
//!
//! This crate provides:
//! - Identity hashing of client addresses into anonymized storage keys
//! - Authenticated encryption of session payloads at rest
//! - A shared expiry registry driving session TTLs and rate windows
//! - Session stores over memory, SQLite and MongoDB with one contract
//! - A per-identity fixed-window rate guard
//!
//! # Example
//!
//! ```rust,ignore
//! use servet_session::{ManagerConfig, SessionManager};
//!
//! let config = ManagerConfig::new("server-secret")
//!     .with_only_one(true)
//!     .with_ttl(3600);
//!
//! let manager = SessionManager::new(config).await?;
//! manager.new_session("203.0.113.7", &serde_json::json!({"cart": []})).await?;
//! ```

mod cipher;
mod config;
mod error;
mod guard;
mod hasher;
mod locks;
mod manager;
pub mod store;
mod ttl;

pub use cipher::PayloadCipher;
pub use config::{
    BackendKind, BackendTarget, ConnectionConfig, DEFAULT_TTL_SECS, ManagerConfig,
    SessionPolicy, ValidatedConfig,
};
pub use error::{DecryptionError, Result, SessionError};
pub use guard::{
    DEFAULT_DECAY_INTERVAL, DEFAULT_DENY_MESSAGE, DEFAULT_THRESHOLD, RateDecision, RateGuard,
    RateGuardConfig,
};
pub use hasher::{IdentityHash, identity_hash};
pub use manager::SessionManager;
pub use store::{
    DUPLICATE_SESSION, SESSION_NOT_FOUND, SessionBackend, SessionOutcome, SessionRecord,
    SessionStore,
};
pub use ttl::{MAX_TTL, Ticket, TtlRegistry};
