//! The session manager: one configured store behind a single façade.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::cipher::PayloadCipher;
use crate::config::{BackendKind, BackendTarget, ManagerConfig, SessionPolicy};
use crate::error::Result;
use crate::store::{MemoryBackend, SessionOutcome, SessionStore, SqliteBackend};

#[cfg(feature = "document-store")]
use crate::store::DocumentBackend;

/// The store chosen at construction.
#[derive(Debug, Clone)]
enum ActiveStore {
    Memory(SessionStore<MemoryBackend>),
    EmbeddedRelational(SessionStore<SqliteBackend>),
    #[cfg(feature = "document-store")]
    DocumentStore(SessionStore<DocumentBackend>),
}

macro_rules! dispatch {
    ($store:expr, $s:ident => $body:expr) => {
        match $store {
            ActiveStore::Memory($s) => $body,
            ActiveStore::EmbeddedRelational($s) => $body,
            #[cfg(feature = "document-store")]
            ActiveStore::DocumentStore($s) => $body,
        }
    };
}

/// Entry point for session operations.
///
/// Built once from a [`ManagerConfig`]; every later call goes to the same
/// backend with the configured policy.
#[derive(Debug, Clone)]
pub struct SessionManager {
    store: ActiveStore,
    policy: SessionPolicy,
}

impl SessionManager {
    /// Validate `config`, open the selected backend and return a manager.
    ///
    /// Fails with [`SessionError::Configuration`](crate::SessionError::Configuration)
    /// for an unknown backend tag, a TTL outside `1..=MAX_TTL`, an empty
    /// secret, or missing connection settings.
    pub async fn new(config: ManagerConfig) -> Result<Self> {
        let validated = config.validate()?;
        let cipher = PayloadCipher::new(&config.secret)?;
        let ttl = validated.ttl;

        let store = match validated.target {
            BackendTarget::Memory => {
                ActiveStore::Memory(SessionStore::open(MemoryBackend::new(), cipher, ttl).await?)
            }
            BackendTarget::EmbeddedRelational { path } => {
                let backend = SqliteBackend::open(&path)?;
                ActiveStore::EmbeddedRelational(SessionStore::open(backend, cipher, ttl).await?)
            }
            #[cfg(feature = "document-store")]
            BackendTarget::DocumentStore { uri, database } => {
                let backend = DocumentBackend::connect(&uri, &database).await?;
                ActiveStore::DocumentStore(SessionStore::open(backend, cipher, ttl).await?)
            }
            #[cfg(not(feature = "document-store"))]
            BackendTarget::DocumentStore { .. } => {
                return Err(crate::error::SessionError::Configuration(
                    "document-store backend is not compiled in (enable the 'document-store' feature)"
                        .to_string(),
                ));
            }
        };

        let manager = Self {
            store,
            policy: config.session,
        };
        info!(
            backend = %manager.kind(),
            ttl_secs = config.session.ttl,
            only_one = config.session.only_one,
            "Session manager ready"
        );
        Ok(manager)
    }

    /// Backend in use.
    pub fn kind(&self) -> BackendKind {
        dispatch!(&self.store, s => s.kind())
    }

    /// Configured policy.
    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        dispatch!(&self.store, s => s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create a session under the configured `only_one` policy.
    pub async fn new_session<T>(&self, address: &str, payload: &T) -> Result<SessionOutcome>
    where
        T: Serialize + ?Sized + Sync,
    {
        self.new_session_with(address, payload, self.policy.only_one)
            .await
    }

    /// Create a session, overriding the configured `only_one` policy.
    pub async fn new_session_with<T>(
        &self,
        address: &str,
        payload: &T,
        only_one: bool,
    ) -> Result<SessionOutcome>
    where
        T: Serialize + ?Sized + Sync,
    {
        dispatch!(&self.store, s => s.new_session(address, payload, only_one).await)
    }

    /// Fetch the session for `address`.
    pub async fn fetch<T>(&self, address: &str) -> Result<SessionOutcome<T>>
    where
        T: DeserializeOwned,
    {
        dispatch!(&self.store, s => s.fetch(address).await)
    }

    /// Delete the session for `address`.
    pub async fn delete(&self, address: &str) -> Result<SessionOutcome> {
        dispatch!(&self.store, s => s.delete(address).await)
    }

    /// Stop expiry timers and release the backend.
    pub async fn close(&self) -> Result<()> {
        dispatch!(&self.store, s => s.close().await)
    }
}
