//! Cryptographic primitives for secrets at rest.
//!
//! Uses:
//! - a 32-byte root key drawn from the OS RNG
//! - ChaCha20-Poly1305 for authenticated encryption
//!
//! Sealed blobs are laid out as `version || nonce || ciphertext+tag`. The
//! caller supplies associated data that binds the blob to its purpose.

use crate::error::AppError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Root key length in bytes.
pub const ROOT_KEY_LEN: usize = 32;

/// ChaCha20-Poly1305 nonce length.
pub const NONCE_LEN: usize = 12;

/// Current sealed blob layout.
pub const BLOB_VERSION: u8 = 1;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid base64 encoding: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Invalid root key length")]
    InvalidKey,

    #[error("Unsupported blob version {0}")]
    UnsupportedVersion(u8),

    #[error("Sealed blob too short")]
    Truncated,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed - invalid ciphertext or wrong key")]
    DecryptionFailed,
}

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;

impl From<CryptoError> for AppError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::EncryptionFailed => AppError::internal(err.to_string()),
            // Anything wrong with stored material reads as corruption
            _ => AppError::Decryption,
        }
    }
}

/// Symmetric root key protecting every stored secret.
///
/// Wiped from memory on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct RootKey([u8; ROOT_KEY_LEN]);

impl RootKey {
    /// Generate a fresh key from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; ROOT_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Parse the on-disk base64 form.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = Zeroizing::new(BASE64.decode(encoded.trim())?);
        if bytes.len() != ROOT_KEY_LEN {
            return Err(CryptoError::InvalidKey);
        }
        let mut arr = [0u8; ROOT_KEY_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Base64 form written to the key file.
    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(BASE64.encode(self.0))
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }
}

impl std::fmt::Debug for RootKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RootKey(<redacted>)")
    }
}

/// Encrypt `plaintext` under `key`, binding `aad`.
pub fn seal(key: &RootKey, aad: &[u8], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    // Fresh random nonce per write
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = key
        .cipher()
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut blob = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
    blob.push(BLOB_VERSION);
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Decrypt a blob produced by [`seal`]. Fails closed on any mismatch.
pub fn open(key: &RootKey, aad: &[u8], blob: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let (&version, rest) = blob.split_first().ok_or(CryptoError::Truncated)?;
    if version != BLOB_VERSION {
        return Err(CryptoError::UnsupportedVersion(version));
    }
    if rest.len() < NONCE_LEN {
        return Err(CryptoError::Truncated);
    }

    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    key.cipher()
        .decrypt(nonce, Payload { msg: ciphertext, aad })
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_key_base64_roundtrip() {
        let key = RootKey::generate();
        let encoded = key.to_base64();
        let parsed = RootKey::from_base64(&format!("{}\n", encoded.as_str())).unwrap();
        assert_eq!(parsed.0, key.0);
    }

    #[test]
    fn test_root_key_rejects_wrong_length() {
        let short = BASE64.encode([7u8; 16]);
        assert!(matches!(RootKey::from_base64(&short), Err(CryptoError::InvalidKey)));
        assert!(matches!(RootKey::from_base64("%%%"), Err(CryptoError::Base64(_))));
    }

    #[test]
    fn test_seal_open() {
        let key = RootKey::generate();
        let blob = seal(&key, b"passphrase", b"hunter2").unwrap();
        assert_eq!(blob[0], BLOB_VERSION);
        assert_eq!(blob.len(), 1 + NONCE_LEN + 7 + 16);

        let plaintext = open(&key, b"passphrase", &blob).unwrap();
        assert_eq!(plaintext.as_slice(), b"hunter2");
    }

    #[test]
    fn test_nonce_is_fresh_per_seal() {
        let key = RootKey::generate();
        let a = seal(&key, b"", b"same").unwrap();
        let b = seal(&key, b"", b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_open_rejects_wrong_aad_and_key() {
        let key = RootKey::generate();
        let blob = seal(&key, b"passphrase", b"secret").unwrap();

        assert!(matches!(
            open(&key, b"certificate", &blob),
            Err(CryptoError::DecryptionFailed)
        ));
        assert!(matches!(
            open(&RootKey::generate(), b"passphrase", &blob),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_open_rejects_malformed_blobs() {
        let key = RootKey::generate();
        assert!(matches!(open(&key, b"", &[]), Err(CryptoError::Truncated)));
        assert!(matches!(open(&key, b"", &[BLOB_VERSION, 1, 2]), Err(CryptoError::Truncated)));
        assert!(matches!(
            open(&key, b"", &[9u8; 40]),
            Err(CryptoError::UnsupportedVersion(9))
        ));
    }
}
