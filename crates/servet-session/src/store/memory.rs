//! In-process backend. Nothing survives a restart.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::config::BackendKind;
use crate::error::Result;
use crate::hasher::IdentityHash;
use crate::store::{SessionBackend, SessionRecord};

/// Session records held in a map.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: RwLock<HashMap<IdentityHash, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, live or not.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl SessionBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn put(&self, record: &SessionRecord) -> Result<()> {
        self.records.write().insert(
            record.identity_hash.clone(),
            record.encrypted_payload.clone(),
        );
        Ok(())
    }

    async fn get(&self, identity: &IdentityHash) -> Result<Option<String>> {
        Ok(self.records.read().get(identity).cloned())
    }

    async fn remove(&self, identity: &IdentityHash) -> Result<bool> {
        Ok(self.records.write().remove(identity).is_some())
    }

    async fn identities(&self) -> Result<Vec<IdentityHash>> {
        Ok(self.records.read().keys().cloned().collect())
    }

    async fn close(&self) -> Result<()> {
        self.records.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(address: &str, payload: &str) -> SessionRecord {
        SessionRecord {
            identity_hash: IdentityHash::of(address),
            encrypted_payload: payload.to_string(),
            created_at: Utc::now(),
            ttl_seconds: 60,
        }
    }

    #[tokio::test]
    async fn test_put_get_remove() {
        let backend = MemoryBackend::new();
        backend.put(&record("a", "blob-1")).await.unwrap();

        let id = IdentityHash::of("a");
        assert_eq!(backend.get(&id).await.unwrap().as_deref(), Some("blob-1"));
        assert!(backend.remove(&id).await.unwrap());
        assert!(!backend.remove(&id).await.unwrap());
        assert_eq!(backend.get(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_replaces() {
        let backend = MemoryBackend::new();
        backend.put(&record("a", "blob-1")).await.unwrap();
        backend.put(&record("a", "blob-2")).await.unwrap();

        assert_eq!(backend.len(), 1);
        let id = IdentityHash::of("a");
        assert_eq!(backend.get(&id).await.unwrap().as_deref(), Some("blob-2"));
    }

    #[tokio::test]
    async fn test_close_drops_table() {
        let backend = MemoryBackend::new();
        backend.put(&record("a", "x")).await.unwrap();
        backend.put(&record("b", "y")).await.unwrap();
        assert_eq!(backend.identities().await.unwrap().len(), 2);

        backend.close().await.unwrap();
        assert!(backend.is_empty());
    }
}
