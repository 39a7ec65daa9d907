//! Error types for session engine operations.

/// Error type for session engine operations.
///
/// Duplicate sessions and missing records are not errors: they come back
/// as unsuccessful [`SessionOutcome`](crate::SessionOutcome) values.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Invalid manager configuration. Fatal at construction time.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The storage backend failed. Not retried by the engine.
    #[error("Backend error: {0}")]
    Backend(String),

    /// The payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Encryption failed.
    #[error("Cipher error: {0}")]
    Cipher(String),
}

impl From<rusqlite::Error> for SessionError {
    fn from(e: rusqlite::Error) -> Self {
        SessionError::Backend(format!("sqlite: {}", e))
    }
}

#[cfg(feature = "document-store")]
impl From<mongodb::error::Error> for SessionError {
    fn from(e: mongodb::error::Error) -> Self {
        SessionError::Backend(format!("mongodb: {}", e))
    }
}

impl From<tokio::task::JoinError> for SessionError {
    fn from(e: tokio::task::JoinError) -> Self {
        SessionError::Backend(format!("blocking task failed: {}", e))
    }
}

/// A ciphertext could not be opened.
///
/// Raised for malformed blobs and for key mismatches alike. Stores fold it
/// into "no session found" so callers never learn which one happened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecryptionError {
    /// The blob is not valid hex.
    #[error("ciphertext is not valid hex")]
    Encoding,

    /// The blob is shorter than a nonce plus tag.
    #[error("ciphertext too short: {0} bytes")]
    Truncated(usize),

    /// Authentication failed (wrong key or tampered data).
    #[error("ciphertext failed authentication")]
    Authentication,
}

/// Result type for session engine operations.
pub type Result<T> = std::result::Result<T, SessionError>;
