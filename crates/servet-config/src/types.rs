//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [server]                 # listener and middleware
//! [session]                # backend selection and secret
//! [session.connection]     # backend connection parameters
//! [session.policy]         # only_one and ttl
//! [rate_limit]             # per-identity throttling
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::interval::parse_interval;
use crate::{ConfigError, Result};

/// Environment variable holding the session secret. Wins over the file.
pub const SECRET_ENV: &str = "SERVET_SESSION_SECRET";

pub use servet_session::{DEFAULT_DENY_MESSAGE, DEFAULT_THRESHOLD, DEFAULT_TTL_SECS};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Written form of the engine's default rate window.
pub const DEFAULT_DECAY_INTERVAL: &str = "15m";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g. a project-local
/// override) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServetConfig {
    pub server: Option<ServerSection>,
    pub session: Option<SessionSection>,
    pub rate_limit: Option<RateLimitSection>,
}

impl ServetConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// A config with every section filled with defaults, for `config init`.
    pub fn starter() -> Self {
        Self {
            server: Some(ServerSection::default()),
            session: Some(SessionSection::default()),
            rate_limit: Some(RateLimitSection::default()),
        }
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced whole, not field by field.
    pub fn merge(&mut self, other: ServetConfig) {
        if other.server.is_some() {
            self.server = other.server;
        }

        if other.session.is_some() {
            self.session = other.session;
        }

        if other.rate_limit.is_some() {
            self.rate_limit = other.rate_limit;
        }
    }

    /// Server section or its defaults.
    pub fn server(&self) -> ServerSection {
        self.server.clone().unwrap_or_default()
    }

    /// Session section or its defaults.
    pub fn session(&self) -> SessionSection {
        self.session.clone().unwrap_or_default()
    }

    /// Rate limit section or its defaults.
    pub fn rate_limit(&self) -> RateLimitSection {
        self.rate_limit.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────────

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Address to bind to.
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
    /// Enable request logging.
    pub request_logging: bool,
    /// Allowed CORS origins. Empty disables CORS handling.
    pub cors_origins: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            request_logging: true,
            cors_origins: Vec::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Session engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Backend tag: `memory`, `document-store` or `embedded-relational`.
    pub connection_type: String,
    /// Payload encryption secret. Prefer the `SERVET_SESSION_SECRET` env var.
    pub secret: Option<String>,
    pub connection: ConnectionSection,
    pub policy: PolicySection,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            connection_type: "memory".to_string(),
            secret: None,
            connection: ConnectionSection::default(),
            policy: PolicySection::default(),
        }
    }
}

impl SessionSection {
    /// Resolve the secret: `SERVET_SESSION_SECRET` first, then the file.
    pub fn resolve_secret(&self) -> Result<String> {
        if let Ok(secret) = std::env::var(SECRET_ENV)
            && !secret.is_empty()
        {
            return Ok(secret);
        }
        self.secret
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingField {
                field: "secret".to_string(),
                context: format!("[session] (or set {})", SECRET_ENV),
            })
    }

    /// Whether the secret is written in the config file.
    pub fn has_plaintext_secret(&self) -> bool {
        self.secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Backend connection parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSection {
    /// Document store URI.
    pub uri: Option<String>,
    /// Document store database name.
    pub database: Option<String>,
    /// Embedded database file.
    pub path: Option<PathBuf>,
}

/// Session policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    /// Allow at most one live session per identity.
    pub only_one: bool,
    /// Session lifetime in whole seconds.
    pub ttl: i64,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            only_one: false,
            ttl: DEFAULT_TTL_SECS,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rate Limit
// ─────────────────────────────────────────────────────────────────────────────

/// A window length: integer milliseconds or an interval string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntervalSpec {
    Millis(u64),
    Text(String),
}

impl IntervalSpec {
    /// Resolve to a positive duration.
    pub fn to_duration(&self) -> Result<Duration> {
        match self {
            IntervalSpec::Millis(0) => Err(ConfigError::InvalidInterval("0".to_string())),
            IntervalSpec::Millis(ms) => Ok(Duration::from_millis(*ms)),
            IntervalSpec::Text(text) => parse_interval(text),
        }
    }
}

impl Default for IntervalSpec {
    fn default() -> Self {
        IntervalSpec::Text(DEFAULT_DECAY_INTERVAL.to_string())
    }
}

/// Per-identity request throttling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    /// Enable the rate guard.
    pub enabled: bool,
    /// Requests allowed per window.
    pub threshold: u32,
    /// Window length.
    pub decay_interval: IntervalSpec,
    /// Message returned with a throttled response.
    pub deny_message: String,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: DEFAULT_THRESHOLD,
            decay_interval: IntervalSpec::default(),
            deny_message: DEFAULT_DENY_MESSAGE.to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
