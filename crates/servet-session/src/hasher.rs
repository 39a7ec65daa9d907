//! Client address hashing.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of a client address.
///
/// Used as the storage key for sessions and rate counters. No salt is
/// mixed in, so the same address maps to the same key in every process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityHash(String);

impl IdentityHash {
    /// Hash a raw client address.
    pub fn of(address: &str) -> Self {
        let digest = Sha256::digest(address.as_bytes());
        Self(hex::encode(digest))
    }

    /// Wrap an already-computed digest (e.g. a key read back from storage).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for IdentityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IdentityHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Hash a client address. Shorthand for [`IdentityHash::of`].
pub fn identity_hash(address: &str) -> IdentityHash {
    IdentityHash::of(address)
}
