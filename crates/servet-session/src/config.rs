//! Configuration for the session manager.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};
use crate::ttl::MAX_TTL;

/// Default session lifetime in seconds.
pub const DEFAULT_TTL_SECS: i64 = 3600;

/// Supported storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Process-local map.
    Memory,
    /// MongoDB collection.
    DocumentStore,
    /// Single-file SQLite database.
    EmbeddedRelational,
}

impl BackendKind {
    /// Every supported backend, in tag order.
    pub const ALL: [BackendKind; 3] = [
        BackendKind::Memory,
        BackendKind::DocumentStore,
        BackendKind::EmbeddedRelational,
    ];

    /// The configuration tag for this backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::DocumentStore => "document-store",
            BackendKind::EmbeddedRelational => "embedded-relational",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                let supported: Vec<&str> = BackendKind::ALL.iter().map(|k| k.as_str()).collect();
                SessionError::Configuration(format!(
                    "unsupported connection type '{}' (expected one of: {})",
                    s,
                    supported.join(", ")
                ))
            })
    }
}

/// Backend-specific connection parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Document store connection URI.
    pub uri: Option<String>,
    /// Document store database name.
    pub database: Option<String>,
    /// Embedded database file path.
    pub path: Option<PathBuf>,
}

/// Per-session policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Allow at most one live session per identity.
    pub only_one: bool,
    /// Session lifetime in whole seconds. Must be positive.
    pub ttl: i64,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            only_one: false,
            ttl: DEFAULT_TTL_SECS,
        }
    }
}

/// Everything the manager needs to pick and open a store.
///
/// Kept in its raw, unvalidated form so that a bad tag or TTL from a
/// config file surfaces as a [`SessionError::Configuration`] from
/// [`SessionManager::new`](crate::SessionManager::new).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Backend tag: `memory`, `document-store` or `embedded-relational`.
    pub connection_type: String,
    pub connection: ConnectionConfig,
    pub session: SessionPolicy,
    /// Server secret used to derive the payload key.
    pub secret: String,
}

impl ManagerConfig {
    /// A memory-backed configuration with default policy.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            connection_type: BackendKind::Memory.as_str().to_string(),
            connection: ConnectionConfig::default(),
            session: SessionPolicy::default(),
            secret: secret.into(),
        }
    }

    /// Set the backend tag.
    pub fn with_connection_type(mut self, tag: impl Into<String>) -> Self {
        self.connection_type = tag.into();
        self
    }

    /// Use the embedded relational backend at `path`.
    pub fn with_sqlite_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.connection_type = BackendKind::EmbeddedRelational.as_str().to_string();
        self.connection.path = Some(path.into());
        self
    }

    /// Use the document store at `uri` / `database`.
    pub fn with_document_store(
        mut self,
        uri: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        self.connection_type = BackendKind::DocumentStore.as_str().to_string();
        self.connection.uri = Some(uri.into());
        self.connection.database = Some(database.into());
        self
    }

    /// Enforce a single live session per identity.
    pub fn with_only_one(mut self, only_one: bool) -> Self {
        self.session.only_one = only_one;
        self
    }

    /// Set the session lifetime in seconds.
    pub fn with_ttl(mut self, ttl: i64) -> Self {
        self.session.ttl = ttl;
        self
    }

    /// Check the configuration and resolve the backend.
    pub fn validate(&self) -> Result<ValidatedConfig> {
        let kind: BackendKind = self.connection_type.parse()?;

        if self.session.ttl <= 0 {
            return Err(SessionError::Configuration(format!(
                "session ttl must be a positive number of seconds, got {}",
                self.session.ttl
            )));
        }
        let max_ttl = MAX_TTL.as_secs();
        if self.session.ttl as u64 > max_ttl {
            return Err(SessionError::Configuration(format!(
                "session ttl must be at most {} seconds, got {}",
                max_ttl, self.session.ttl
            )));
        }

        if self.secret.is_empty() {
            return Err(SessionError::Configuration(
                "session secret must not be empty".to_string(),
            ));
        }

        let target = match kind {
            BackendKind::Memory => BackendTarget::Memory,
            BackendKind::EmbeddedRelational => {
                let path = self.connection.path.clone().ok_or_else(|| {
                    missing("connection.path", BackendKind::EmbeddedRelational)
                })?;
                BackendTarget::EmbeddedRelational { path }
            }
            BackendKind::DocumentStore => {
                let uri = non_empty(&self.connection.uri)
                    .ok_or_else(|| missing("connection.uri", BackendKind::DocumentStore))?;
                let database = non_empty(&self.connection.database)
                    .ok_or_else(|| missing("connection.database", BackendKind::DocumentStore))?;
                BackendTarget::DocumentStore { uri, database }
            }
        };

        Ok(ValidatedConfig {
            target,
            only_one: self.session.only_one,
            ttl: Duration::from_secs(self.session.ttl as u64),
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

fn missing(field: &str, kind: BackendKind) -> SessionError {
    SessionError::Configuration(format!("'{}' is required for the {} backend", field, kind))
}

/// Backend selection with its required parameters resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendTarget {
    Memory,
    EmbeddedRelational { path: PathBuf },
    DocumentStore { uri: String, database: String },
}

impl BackendTarget {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendTarget::Memory => BackendKind::Memory,
            BackendTarget::EmbeddedRelational { .. } => BackendKind::EmbeddedRelational,
            BackendTarget::DocumentStore { .. } => BackendKind::DocumentStore,
        }
    }
}

/// Output of [`ManagerConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedConfig {
    pub target: BackendTarget,
    pub only_one: bool,
    pub ttl: Duration,
}
