//! Encrypted credential vault
//!
//! Holds exactly one client ID/secret pair, encrypted at rest in process
//! memory with AES-256-GCM. The key is generated from the OS RNG at
//! construction and never persisted — credentials are intentionally lost on
//! restart. A fresh random nonce is generated for every encryption and
//! stored with the blob, so rotating credentials never reuses a nonce under
//! the same key.
//!
//! Every successful write bumps a generation counter. The token cache
//! compares generations at read time, which is what invalidates a token
//! cached under rotated-away credentials.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Nonce length in bytes (96 bits, the GCM standard)
const NONCE_LEN: usize = 12;

/// GCM authentication tag length in bytes
const TAG_LEN: usize = 16;

/// A decrypted client ID/secret pair.
///
/// Transient: exists in memory only between `Vault::reveal()` and the token
/// exchange that consumes it. Serialized as `{"clientId","clientSecret"}`
/// inside the encrypted blob.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Single-slot in-memory credential vault.
///
/// The stored blob is `base64(nonce || ciphertext || tag)`. At most one
/// credential pair is stored; a successful write replaces the slot whole.
pub struct Vault {
    cipher: Aes256Gcm,
    slot: RwLock<Option<String>>,
    generation: AtomicU64,
}

impl Vault {
    /// Create an empty vault with a fresh process-lifetime key.
    pub fn new() -> Self {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        Self {
            cipher: Aes256Gcm::new(&key),
            slot: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Encrypt and store a credential pair, replacing any previous one.
    ///
    /// Both fields must be non-blank. On success the generation counter is
    /// bumped, which makes any bearer token cached under the previous
    /// credentials unservable. A failed call leaves the slot untouched.
    pub async fn set_credentials(&self, client_id: &str, client_secret: &str) -> Result<()> {
        if client_id.trim().is_empty() {
            return Err(Error::Validation("clientId is required".into()));
        }
        if client_secret.trim().is_empty() {
            return Err(Error::Validation("clientSecret is required".into()));
        }

        let credential = Credential {
            client_id: client_id.to_owned(),
            client_secret: client_secret.to_owned(),
        };
        let plaintext =
            serde_json::to_vec(&credential).map_err(|e| Error::Encryption(e.to_string()))?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|e| Error::Encryption(e.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(nonce.as_slice());
        blob.extend_from_slice(&ciphertext);

        *self.slot.write().await = Some(BASE64.encode(blob));
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(client_id, generation, "credentials stored");
        Ok(())
    }

    /// Decrypt and return the stored credential pair.
    ///
    /// `NotConfigured` when no credentials have been set. `Decryption` when
    /// the blob is malformed or the authentication tag does not verify —
    /// corrupted data is never returned.
    pub async fn reveal(&self) -> Result<Credential> {
        let blob = {
            let slot = self.slot.read().await;
            slot.clone().ok_or(Error::NotConfigured)?
        };

        let bytes = BASE64
            .decode(&blob)
            .map_err(|e| Error::Decryption(format!("invalid base64: {e}")))?;
        if bytes.len() < NONCE_LEN + TAG_LEN {
            return Err(Error::Decryption(format!(
                "blob too short: {} bytes",
                bytes.len()
            )));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::Decryption("authentication tag mismatch".into()))?;

        let credential: Credential = serde_json::from_slice(&plaintext)
            .map_err(|e| Error::Decryption(format!("invalid credential JSON: {e}")))?;
        debug!(client_id = %credential.client_id, "credentials revealed");
        Ok(credential)
    }

    /// Whether a credential pair is currently stored.
    pub async fn is_configured(&self) -> bool {
        self.slot.read().await.is_some()
    }

    /// Current write generation. Starts at 0 (nothing stored); each
    /// successful `set_credentials` increments it.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) async fn raw_blob(&self) -> Option<String> {
        self.slot.read().await.clone()
    }

    #[cfg(test)]
    pub(crate) async fn overwrite_blob(&self, blob: String) {
        *self.slot.write().await = Some(blob);
    }
}

impl Default for Vault {
    fn default() -> Self {
        Self::new()
    }
}
