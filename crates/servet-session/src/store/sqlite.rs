//! Embedded single-file relational backend.
//!
//! Schema: `sessions(id TEXT PRIMARY KEY, data TEXT)` where `id` is the
//! identity hash and `data` the nonce-prefixed hex ciphertext.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::config::BackendKind;
use crate::error::{Result, SessionError};
use crate::hasher::IdentityHash;
use crate::store::{SessionBackend, SessionRecord};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS sessions (
    id   TEXT PRIMARY KEY,
    data TEXT NOT NULL
);";

/// SQLite-backed session table.
///
/// The connection is opened once and shared behind a mutex; queries run on
/// the blocking pool so callers on the async runtime never stall.
#[derive(Debug)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Option<Connection>>>,
    path: Option<PathBuf>,
}

impl SqliteBackend {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                SessionError::Backend(format!(
                    "failed to create directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        debug!(path = %path.display(), "Opened sqlite session store");

        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            path: None,
        })
    }

    /// Database file, if not in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            let conn = guard.as_ref().ok_or_else(|| {
                SessionError::Backend("sqlite session store is closed".to_string())
            })?;
            f(conn).map_err(SessionError::from)
        })
        .await?
    }
}

#[async_trait]
impl SessionBackend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::EmbeddedRelational
    }

    async fn put(&self, record: &SessionRecord) -> Result<()> {
        let id = record.identity_hash.as_str().to_string();
        let data = record.encrypted_payload.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, data) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET data = excluded.data",
                params![id, data],
            )
            .map(|_| ())
        })
        .await
    }

    async fn get(&self, identity: &IdentityHash) -> Result<Option<String>> {
        let id = identity.as_str().to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT data FROM sessions WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
        })
        .await
    }

    async fn remove(&self, identity: &IdentityHash) -> Result<bool> {
        let id = identity.as_str().to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])
                .map(|changed| changed > 0)
        })
        .await
    }

    async fn identities(&self) -> Result<Vec<IdentityHash>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM sessions")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.map(|r| r.map(IdentityHash::from_hex))
                .collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let conn = self.conn.lock().take();
        if let Some(conn) = conn {
            conn.close()
                .map_err(|(_, e)| SessionError::Backend(format!("sqlite: {}", e)))?;
            debug!("Closed sqlite session store");
        }
        Ok(())
    }
}
