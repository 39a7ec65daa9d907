//! Session stores.
//!
//! [`SessionStore`] carries the whole lifecycle: hashing, encryption,
//! expiry and the single-session policy. Backends only move opaque
//! ciphertext strings keyed by identity hash, so every variant behaves
//! the same from the caller's side.

mod memory;
mod sqlite;

#[cfg(feature = "document-store")]
mod document;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

#[cfg(feature = "document-store")]
pub use document::DocumentBackend;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::cipher::PayloadCipher;
use crate::config::BackendKind;
use crate::error::Result;
use crate::hasher::IdentityHash;
use crate::locks::KeyedLocks;
use crate::ttl::{Ticket, TtlRegistry, deadline_after};

/// Error message returned when `only_one` blocks a second session.
pub const DUPLICATE_SESSION: &str = "identity already owns a session";

/// Error message returned when no live session exists.
pub const SESSION_NOT_FOUND: &str = "no session found";

// ─────────────────────────────────────────────────────────────────────────────
// Records and outcomes
// ─────────────────────────────────────────────────────────────────────────────

/// A stored session as handed to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Hex digest of the client address. The storage key.
    pub identity_hash: IdentityHash,
    /// Nonce-prefixed hex ciphertext of the JSON payload.
    pub encrypted_payload: String,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// Lifetime fixed at creation.
    pub ttl_seconds: u64,
}

/// Uniform result of a session operation.
///
/// `success = false` covers the expected, recoverable cases: a duplicate
/// session under `only_one` and a fetch with nothing to return.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionOutcome<T = ()> {
    pub identity_hash: IdentityHash,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> SessionOutcome<T> {
    fn ok(identity_hash: IdentityHash, data: Option<T>) -> Self {
        Self {
            identity_hash,
            success: true,
            data,
            error: None,
        }
    }

    fn failed(identity_hash: IdentityHash, error: &str) -> Self {
        Self {
            identity_hash,
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }

    /// True when `only_one` refused a second session.
    pub fn is_duplicate(&self) -> bool {
        self.error.as_deref() == Some(DUPLICATE_SESSION)
    }

    /// True when a fetch found nothing.
    pub fn is_not_found(&self) -> bool {
        self.error.as_deref() == Some(SESSION_NOT_FOUND)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend seam
// ─────────────────────────────────────────────────────────────────────────────

/// Raw storage for session records.
///
/// Implementations persist `identity_hash -> encrypted_payload` and
/// nothing else; deadlines and policy live in [`SessionStore`].
#[async_trait]
pub trait SessionBackend: Send + Sync + 'static {
    /// Which variant this is.
    fn kind(&self) -> BackendKind;

    /// Insert a record, replacing any existing one for the same identity.
    async fn put(&self, record: &SessionRecord) -> Result<()>;

    /// Load the encrypted payload for an identity.
    async fn get(&self, identity: &IdentityHash) -> Result<Option<String>>;

    /// Remove a record. Returns whether one existed.
    async fn remove(&self, identity: &IdentityHash) -> Result<bool>;

    /// Every identity currently stored.
    async fn identities(&self) -> Result<Vec<IdentityHash>>;

    /// Release connections and file handles.
    async fn close(&self) -> Result<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

/// Live-record bookkeeping kept in process memory.
#[derive(Debug, Clone, Copy)]
struct Lease {
    ticket: Ticket,
    deadline: Instant,
}

impl Lease {
    fn is_live(&self, now: Instant) -> bool {
        self.deadline > now
    }
}

struct StoreInner<B> {
    backend: B,
    cipher: PayloadCipher,
    ttl: Duration,
    registry: TtlRegistry,
    leases: Mutex<HashMap<IdentityHash, Lease>>,
    locks: KeyedLocks,
}

/// Session store over a single backend.
///
/// All operations on one identity are serialized through a per-identity
/// lock, so `only_one` holds under concurrent `new_session` calls and a
/// `fetch` issued after `new_session` returns always sees the record.
pub struct SessionStore<B: SessionBackend> {
    inner: Arc<StoreInner<B>>,
}

impl<B: SessionBackend> SessionStore<B> {
    /// Open a store over `backend`.
    ///
    /// Records already present in the backend get a fresh full TTL, since
    /// their original deadlines did not survive the previous process.
    pub async fn open(backend: B, cipher: PayloadCipher, ttl: Duration) -> Result<Self> {
        let store = Self {
            inner: Arc::new(StoreInner {
                backend,
                cipher,
                ttl,
                registry: TtlRegistry::new(),
                leases: Mutex::new(HashMap::new()),
                locks: KeyedLocks::new(),
            }),
        };

        let existing = store.inner.backend.identities().await?;
        if !existing.is_empty() {
            for identity in &existing {
                let lease = StoreInner::arm(&store.inner, identity);
                store.inner.leases.lock().insert(identity.clone(), lease);
            }
            info!(
                backend = %store.inner.backend.kind(),
                count = existing.len(),
                ttl_secs = ttl.as_secs(),
                "Re-armed expiry for stored sessions"
            );
        }

        Ok(store)
    }

    /// Which backend this store runs on.
    pub fn kind(&self) -> BackendKind {
        self.inner.backend.kind()
    }

    /// Session lifetime.
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .leases
            .lock()
            .values()
            .filter(|lease| lease.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create a session for `address` holding `payload`.
    ///
    /// With `only_one`, a live session for the same identity makes this
    /// return `success = false` without touching the stored record.
    /// Without it, the new record replaces the old one and restarts the TTL.
    pub async fn new_session<T>(
        &self,
        address: &str,
        payload: &T,
        only_one: bool,
    ) -> Result<SessionOutcome>
    where
        T: Serialize + ?Sized,
    {
        let identity = IdentityHash::of(address);
        let _guard = self.inner.locks.acquire(identity.as_str()).await;

        if only_one && self.inner.is_live(&identity) {
            debug!(identity = %identity, "Session refused: identity already owns one");
            return Ok(SessionOutcome::failed(identity, DUPLICATE_SESSION));
        }

        let plaintext = serde_json::to_vec(payload)?;
        let record = SessionRecord {
            identity_hash: identity.clone(),
            encrypted_payload: self.inner.cipher.encrypt(&plaintext)?,
            created_at: Utc::now(),
            ttl_seconds: self.inner.ttl.as_secs(),
        };
        self.inner.backend.put(&record).await?;

        self.inner.registry.cancel(identity.as_str());
        let lease = StoreInner::arm(&self.inner, &identity);
        self.inner.leases.lock().insert(identity.clone(), lease);

        debug!(
            identity = %identity,
            backend = %self.inner.backend.kind(),
            ttl_secs = record.ttl_seconds,
            "Session created"
        );
        Ok(SessionOutcome::ok(identity, None))
    }

    /// Fetch and decrypt the session for `address`.
    ///
    /// A payload that fails to decrypt is reported as not found.
    pub async fn fetch<T>(&self, address: &str) -> Result<SessionOutcome<T>>
    where
        T: DeserializeOwned,
    {
        let identity = IdentityHash::of(address);
        let _guard = self.inner.locks.acquire(identity.as_str()).await;

        if !self.inner.is_live(&identity) {
            trace!(identity = %identity, "No live session");
            return Ok(SessionOutcome::failed(identity, SESSION_NOT_FOUND));
        }

        let Some(blob) = self.inner.backend.get(&identity).await? else {
            warn!(identity = %identity, "Lease without stored record, dropping lease");
            self.inner.drop_lease(&identity);
            return Ok(SessionOutcome::failed(identity, SESSION_NOT_FOUND));
        };

        let plaintext = match self.inner.cipher.decrypt(&blob) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                debug!(identity = %identity, error = %e, "Stored session could not be opened");
                return Ok(SessionOutcome::failed(identity, SESSION_NOT_FOUND));
            }
        };

        let data = serde_json::from_slice(&plaintext)?;
        Ok(SessionOutcome::ok(identity, Some(data)))
    }

    /// Delete the session for `address`. Deleting nothing still succeeds.
    pub async fn delete(&self, address: &str) -> Result<SessionOutcome> {
        let identity = IdentityHash::of(address);
        let _guard = self.inner.locks.acquire(identity.as_str()).await;

        // The lease stays armed until the row is gone, so a failed removal
        // is still expired later.
        let existed = self.inner.backend.remove(&identity).await?;
        self.inner.drop_lease(&identity);

        debug!(identity = %identity, existed, "Session deleted");
        Ok(SessionOutcome::ok(identity, None))
    }

    /// Disarm all expiries and release the backend.
    pub async fn close(&self) -> Result<()> {
        self.inner.registry.shutdown();
        self.inner.leases.lock().clear();
        self.inner.backend.close().await?;
        info!(backend = %self.inner.backend.kind(), "Session store closed");
        Ok(())
    }
}

impl<B: SessionBackend> StoreInner<B> {
    fn is_live(&self, identity: &IdentityHash) -> bool {
        let now = Instant::now();
        self.leases
            .lock()
            .get(identity)
            .is_some_and(|lease| lease.is_live(now))
    }

    /// Forget the lease and disarm its expiry.
    fn drop_lease(&self, identity: &IdentityHash) {
        self.leases.lock().remove(identity);
        self.registry.cancel(identity.as_str());
    }

    /// Arm an expiry for `identity`. The caller records the returned lease.
    fn arm(this: &Arc<Self>, identity: &IdentityHash) -> Lease {
        let weak: Weak<Self> = Arc::downgrade(this);
        let key = identity.clone();
        let ticket = this
            .registry
            .schedule(identity.as_str(), this.ttl, move |ticket| async move {
                if let Some(inner) = weak.upgrade() {
                    inner.expire(key, ticket).await;
                }
            });
        Lease {
            ticket,
            deadline: deadline_after(Instant::now(), this.ttl),
        }
    }

    /// Expiry callback. Only acts if `ticket` still names the current lease.
    async fn expire(&self, identity: IdentityHash, ticket: Ticket) {
        let _guard = self.locks.acquire(identity.as_str()).await;

        let current = self.leases.lock().get(&identity).map(|lease| lease.ticket);
        if current != Some(ticket) {
            trace!(identity = %identity, %ticket, "Ignoring stale expiry");
            return;
        }

        self.leases.lock().remove(&identity);
        match self.backend.remove(&identity).await {
            Ok(_) => debug!(identity = %identity, "Session expired"),
            Err(e) => warn!(
                identity = %identity,
                error = %e,
                "Failed to remove expired session from backend"
            ),
        }
    }
}

impl<B: SessionBackend> fmt::Debug for SessionStore<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("backend", &self.inner.backend.kind())
            .field("ttl", &self.inner.ttl)
            .field("live", &self.len())
            .finish()
    }
}

impl<B: SessionBackend> Clone for SessionStore<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use tokio::time::sleep;

    async fn memory_store(ttl: Duration) -> SessionStore<MemoryBackend> {
        let cipher = PayloadCipher::new("test-secret").unwrap();
        SessionStore::open(MemoryBackend::new(), cipher, ttl)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_new_then_fetch() {
        let store = memory_store(Duration::from_secs(60)).await;

        let created = store
            .new_session("1.2.3.4", &json!({"u": 1}), true)
            .await
            .unwrap();
        assert!(created.success);
        assert_eq!(created.identity_hash, IdentityHash::of("1.2.3.4"));

        let fetched: SessionOutcome<Value> = store.fetch("1.2.3.4").await.unwrap();
        assert!(fetched.success);
        assert_eq!(fetched.data, Some(json!({"u": 1})));
    }

    #[tokio::test]
    async fn test_only_one_refuses_second() {
        let store = memory_store(Duration::from_secs(60)).await;

        assert!(store.new_session("a", &json!(1), true).await.unwrap().success);
        let second = store.new_session("a", &json!(2), true).await.unwrap();
        assert!(!second.success);
        assert!(second.is_duplicate());

        // The original record is untouched.
        let fetched: SessionOutcome<Value> = store.fetch("a").await.unwrap();
        assert_eq!(fetched.data, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_non_exclusive_replaces() {
        let store = memory_store(Duration::from_secs(60)).await;

        assert!(store.new_session("a", &json!(1), false).await.unwrap().success);
        assert!(store.new_session("a", &json!(2), false).await.unwrap().success);

        let fetched: SessionOutcome<Value> = store.fetch("a").await.unwrap();
        assert_eq!(fetched.data, Some(json!(2)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_missing() {
        let store = memory_store(Duration::from_secs(60)).await;
        let fetched: SessionOutcome<Value> = store.fetch("nobody").await.unwrap();
        assert!(!fetched.success);
        assert!(fetched.is_not_found());
        assert_eq!(fetched.data, None);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = memory_store(Duration::from_secs(60)).await;

        assert!(store.delete("nobody").await.unwrap().success);

        store.new_session("a", &json!(1), true).await.unwrap();
        assert!(store.delete("a").await.unwrap().success);
        assert!(store.delete("a").await.unwrap().success);

        let fetched: SessionOutcome<Value> = store.fetch("a").await.unwrap();
        assert!(!fetched.success);
        assert!(store.is_empty());
    }

    /// Memory backend whose removals can be made to fail.
    #[derive(Default)]
    struct FailingRemoveBackend {
        records: MemoryBackend,
        fail_remove: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl SessionBackend for FailingRemoveBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Memory
        }

        async fn put(&self, record: &SessionRecord) -> Result<()> {
            self.records.put(record).await
        }

        async fn get(&self, identity: &IdentityHash) -> Result<Option<String>> {
            self.records.get(identity).await
        }

        async fn remove(&self, identity: &IdentityHash) -> Result<bool> {
            if self.fail_remove.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(crate::error::SessionError::Backend("remove failed".to_string()));
            }
            self.records.remove(identity).await
        }

        async fn identities(&self) -> Result<Vec<IdentityHash>> {
            self.records.identities().await
        }

        async fn close(&self) -> Result<()> {
            self.records.close().await
        }
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_session_and_expiry() {
        let cipher = PayloadCipher::new("test-secret").unwrap();
        let store = SessionStore::open(
            FailingRemoveBackend::default(),
            cipher,
            Duration::from_millis(300),
        )
        .await
        .unwrap();
        store.new_session("a", &json!(1), true).await.unwrap();

        store
            .inner
            .backend
            .fail_remove
            .store(true, std::sync::atomic::Ordering::SeqCst);
        assert!(store.delete("a").await.is_err());

        let fetched: SessionOutcome<Value> = store.fetch("a").await.unwrap();
        assert_eq!(fetched.data, Some(json!(1)));
        assert!(store.inner.registry.is_pending(IdentityHash::of("a").as_str()));

        store
            .inner
            .backend
            .fail_remove
            .store(false, std::sync::atomic::Ordering::SeqCst);
        sleep(Duration::from_millis(500)).await;
        assert!(store.inner.backend.records.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_ttl_does_not_overflow() {
        let store = memory_store(Duration::MAX).await;

        let created = store.new_session("a", &json!(1), true).await.unwrap();
        assert!(created.success);
        let fetched: SessionOutcome<Value> = store.fetch("a").await.unwrap();
        assert_eq!(fetched.data, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_delete_frees_only_one_slot() {
        let store = memory_store(Duration::from_secs(60)).await;

        store.new_session("a", &json!(1), true).await.unwrap();
        store.delete("a").await.unwrap();
        assert!(store.new_session("a", &json!(2), true).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_record_expires_after_ttl() {
        let store = memory_store(Duration::from_secs(1)).await;

        store.new_session("a", &json!({"u": 1}), true).await.unwrap();

        sleep(Duration::from_millis(500)).await;
        let before: SessionOutcome<Value> = store.fetch("a").await.unwrap();
        assert_eq!(before.data, Some(json!({"u": 1})));

        sleep(Duration::from_millis(800)).await;
        let after: SessionOutcome<Value> = store.fetch("a").await.unwrap();
        assert!(!after.success);
        assert_eq!(store.inner.backend.len(), 0);
    }

    #[tokio::test]
    async fn test_stale_timer_does_not_remove_recreated_record() {
        let store = memory_store(Duration::from_secs(1)).await;

        store.new_session("a", &json!(1), true).await.unwrap();
        sleep(Duration::from_millis(600)).await;

        // Delete and recreate: the first timer must not take the new record.
        store.delete("a").await.unwrap();
        store.new_session("a", &json!(2), true).await.unwrap();

        sleep(Duration::from_millis(600)).await;
        let fetched: SessionOutcome<Value> = store.fetch("a").await.unwrap();
        assert_eq!(fetched.data, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_only_one_scenario_with_expiry() {
        let store = memory_store(Duration::from_secs(2)).await;

        assert!(store.new_session("1.2.3.4", &json!({"u": 1}), true).await.unwrap().success);
        assert!(!store.new_session("1.2.3.4", &json!({"u": 2}), true).await.unwrap().success);

        sleep(Duration::from_millis(2500)).await;
        assert!(store.new_session("1.2.3.4", &json!({"u": 3}), true).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_concurrent_only_one_single_winner() {
        let store = memory_store(Duration::from_secs(60)).await;

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.new_session("race", &json!(i), true).await.unwrap().success
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_undecryptable_record_is_not_found() {
        let store = memory_store(Duration::from_secs(60)).await;
        store.new_session("a", &json!(1), true).await.unwrap();

        // Overwrite the stored blob with one sealed under another key.
        let other = PayloadCipher::new("other-secret").unwrap();
        let record = SessionRecord {
            identity_hash: IdentityHash::of("a"),
            encrypted_payload: other.encrypt(b"1").unwrap(),
            created_at: Utc::now(),
            ttl_seconds: 60,
        };
        store.inner.backend.put(&record).await.unwrap();

        let fetched: SessionOutcome<Value> = store.fetch("a").await.unwrap();
        assert!(fetched.is_not_found());
    }

    #[tokio::test]
    async fn test_close_disarms_expiry() {
        let store = memory_store(Duration::from_secs(60)).await;
        store.new_session("a", &json!(1), true).await.unwrap();
        store.close().await.unwrap();

        assert!(store.inner.registry.is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_outcome_serialization_skips_empty_fields() {
        let outcome: SessionOutcome = SessionOutcome::ok(IdentityHash::of("a"), None);
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["success"], json!(true));
        assert!(value.get("data").is_none());
        assert!(value.get("error").is_none());
    }
}
