//! Encrypted storage for the signing credential.
//!
//! Two secrets live in the keys directory, each sealed under a single root
//! key:
//!
//! - the signing passphrase (`ecp_password.enc`)
//! - the signing certificate container (`ecp.p12.enc`)
//!
//! ## Security Model
//!
//! - The root key (`master.key`) is generated once and never overwritten
//! - All three files are owner-only (`0o600`), the directory `0o700`
//! - Ciphertext is authenticated and bound to its secret kind
//! - Plaintext exists only in zeroizing memory buffers
//!
//! A compromise of the root key exposes both secrets; there is no per-kind key.

pub mod crypto;

use crate::error::{AppError, AppResult};
use crate::fsutil::{self, PRIVATE_DIR_MODE, PRIVATE_FILE_MODE};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

pub use crypto::{CryptoError, RootKey};

/// Root key file name inside the keys directory.
pub const ROOT_KEY_FILE: &str = "master.key";

/// The two secrets held by the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    /// Passphrase unlocking the certificate container
    Passphrase,
    /// PKCS#12 certificate container bytes
    Certificate,
}

impl SecretKind {
    pub const ALL: [SecretKind; 2] = [SecretKind::Passphrase, SecretKind::Certificate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passphrase => "passphrase",
            Self::Certificate => "certificate",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Passphrase => "ecp_password.enc",
            Self::Certificate => "ecp.p12.enc",
        }
    }
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-secret snapshot of the vault layout, safe to print or export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultStatus {
    pub keys_directory: PathBuf,
    pub setup_complete: bool,
    pub master_key_exists: bool,
    pub ecp_encrypted_exists: bool,
    pub password_encrypted_exists: bool,
}

/// File-backed secret vault rooted at a keys directory.
#[derive(Debug, Clone)]
pub struct SecretVault {
    keys_dir: PathBuf,
}

impl SecretVault {
    pub fn new(keys_dir: impl Into<PathBuf>) -> Self {
        Self {
            keys_dir: keys_dir.into(),
        }
    }

    pub fn keys_dir(&self) -> &Path {
        &self.keys_dir
    }

    pub fn root_key_path(&self) -> PathBuf {
        self.keys_dir.join(ROOT_KEY_FILE)
    }

    pub fn secret_path(&self, kind: SecretKind) -> PathBuf {
        self.keys_dir.join(kind.file_name())
    }

    /// Create the root key if absent. Returns `true` when a key was generated.
    ///
    /// Never overwrites an existing key, even when two initializers race.
    pub fn initialize(&self) -> AppResult<bool> {
        fsutil::ensure_dir(&self.keys_dir, PRIVATE_DIR_MODE)?;

        let path = self.root_key_path();
        let key = RootKey::generate();
        let encoded = key.to_base64();
        let contents = Zeroizing::new(format!("{}\n", encoded.as_str()));

        match fsutil::create_exclusive(&path, contents.as_bytes(), PRIVATE_FILE_MODE) {
            Ok(()) => {
                info!(path = %path.display(), "Generated new root key");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if !is_empty_file(&path)? {
                    debug!(path = %path.display(), "Root key already present");
                    return Ok(false);
                }

                // An empty file holds no key, so it is not an overwrite
                warn!(path = %path.display(), "Replacing empty root key file");
                fs::remove_file(&path)?;
                match fsutil::create_exclusive(&path, contents.as_bytes(), PRIVATE_FILE_MODE) {
                    Ok(()) => {
                        info!(path = %path.display(), "Generated new root key");
                        Ok(true)
                    }
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Encrypt and store a secret, replacing any previous value of that kind.
    pub fn store_secret(&self, kind: SecretKind, plaintext: &[u8]) -> AppResult<()> {
        let key = self.load_root_key()?;
        let blob = crypto::seal(&key, kind.as_str().as_bytes(), plaintext)?;

        let path = self.secret_path(kind);
        fsutil::write_atomic(&path, &blob, PRIVATE_FILE_MODE)?;
        info!(kind = %kind, path = %path.display(), "Stored encrypted secret");
        Ok(())
    }

    /// Read a file (e.g. a `.p12` container) and store its bytes.
    ///
    /// The source file is left in place; once this returns it can be deleted.
    pub fn store_secret_from_file(&self, kind: SecretKind, source: &Path) -> AppResult<()> {
        let bytes = Zeroizing::new(fs::read(source)?);
        self.store_secret(kind, &bytes)
    }

    /// Decrypt a secret into memory.
    pub fn retrieve_secret(&self, kind: SecretKind) -> AppResult<Zeroizing<Vec<u8>>> {
        let key = self.load_root_key()?;

        let path = self.secret_path(kind);
        let blob = read_required(&path)?;
        let plaintext = crypto::open(&key, kind.as_str().as_bytes(), &blob)?;
        debug!(kind = %kind, "Decrypted secret");
        Ok(plaintext)
    }

    /// True iff the root key and both secrets exist on disk.
    pub fn verify_complete(&self) -> bool {
        self.missing_files().is_empty()
    }

    /// Vault files that do not exist yet, root key first.
    pub fn missing_files(&self) -> Vec<PathBuf> {
        std::iter::once(self.root_key_path())
            .chain(SecretKind::ALL.iter().map(|kind| self.secret_path(*kind)))
            .filter(|path| !path.is_file())
            .collect()
    }

    pub fn status(&self) -> VaultStatus {
        VaultStatus {
            keys_directory: self.keys_dir.clone(),
            setup_complete: self.verify_complete(),
            master_key_exists: self.root_key_path().is_file(),
            ecp_encrypted_exists: self.secret_path(SecretKind::Certificate).is_file(),
            password_encrypted_exists: self.secret_path(SecretKind::Passphrase).is_file(),
        }
    }

    fn load_root_key(&self) -> AppResult<RootKey> {
        let raw = Zeroizing::new(read_required(&self.root_key_path())?);
        let text = std::str::from_utf8(&raw).map_err(|_| AppError::Decryption)?;
        Ok(RootKey::from_base64(text)?)
    }
}

fn is_empty_file(path: &Path) -> io::Result<bool> {
    Ok(fs::metadata(path)?.len() == 0)
}

fn read_required(path: &Path) -> AppResult<Vec<u8>> {
    fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => AppError::VaultNotInitialized(path.to_path_buf()),
        _ => AppError::Io(e),
    })
}
