//! In-memory signing material with secure memory handling.
//!
//! Decrypted credentials are held only in RAM and are zeroized on drop to
//! minimize the exposure window. Never persisted to disk.

use crate::error::{AppError, AppResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Serialize;
use zeroize::Zeroize;

/// Certificate container and passphrase in the encoding the signing service expects.
pub struct SigningMaterial {
    /// Base64 of the PKCS#12 container
    key_base64: String,
    /// Passphrase unlocking the container
    password: String,
}

impl SigningMaterial {
    /// Build from decrypted vault secrets.
    pub fn from_secrets(certificate: &[u8], passphrase: &[u8]) -> AppResult<Self> {
        let password = std::str::from_utf8(passphrase)
            .map_err(|_| AppError::internal("stored passphrase is not valid UTF-8"))?
            .to_string();

        Ok(Self {
            key_base64: BASE64.encode(certificate),
            password,
        })
    }

    /// Borrowed signer entry for a request body.
    pub fn signer(&self) -> SignerEntry<'_> {
        SignerEntry {
            key: &self.key_base64,
            password: &self.password,
        }
    }
}

impl Drop for SigningMaterial {
    fn drop(&mut self) {
        self.key_base64.zeroize();
        self.password.zeroize();
    }
}

impl std::fmt::Debug for SigningMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningMaterial")
            .field("key_len", &self.key_base64.len())
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One signer as serialized into signing-service requests.
#[derive(Serialize)]
pub struct SignerEntry<'a> {
    pub key: &'a str,
    pub password: &'a str,
}
