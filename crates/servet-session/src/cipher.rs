//! At-rest encryption for session payloads.
//!
//! Blobs are `hex(nonce || ciphertext || tag)` under ChaCha20-Poly1305.
//! A fresh 12-byte nonce is drawn for every call, so two records holding
//! the same payload never share a ciphertext.

use std::fmt;

use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{DecryptionError, Result, SessionError};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Symmetric cipher keyed by the server secret.
#[derive(Clone)]
pub struct PayloadCipher {
    aead: ChaCha20Poly1305,
}

impl PayloadCipher {
    /// Build a cipher from a server secret.
    ///
    /// The secret is stretched to 32 bytes with SHA-256, so any non-empty
    /// string is accepted and the same secret always yields the same key.
    pub fn new(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(SessionError::Configuration(
                "session secret must not be empty".to_string(),
            ));
        }
        let key: [u8; 32] = Sha256::digest(secret.as_bytes()).into();
        Ok(Self {
            aead: ChaCha20Poly1305::new(Key::from_slice(&key)),
        })
    }

    /// Encrypt `plaintext` and return the hex blob with the nonce prepended.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .aead
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| SessionError::Cipher(format!("encryption failure: {}", e)))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(hex::encode(blob))
    }

    /// Open a blob produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, blob: &str) -> std::result::Result<Vec<u8>, DecryptionError> {
        let raw = hex::decode(blob).map_err(|_| DecryptionError::Encoding)?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(DecryptionError::Truncated(raw.len()));
        }

        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        self.aead
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| DecryptionError::Authentication)
    }
}

impl fmt::Debug for PayloadCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadCipher")
            .field("algorithm", &"ChaCha20-Poly1305")
            .finish_non_exhaustive()
    }
}
