use std::path::PathBuf;
use thiserror::Error;

/// Application-wide error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Vault not initialized: {} is missing (run `tenderwatch-admin init`)", .0.display())]
    VaultNotInitialized(PathBuf),

    #[error("Decryption failed - ciphertext tampered, corrupted or wrong root key")]
    Decryption,

    #[error("Signing credentials not loaded")]
    CredentialsNotLoaded,

    #[error("Signing service error: {0}")]
    SigningService(String),

    #[error("Collector error: {0}")]
    Collector(String),

    #[error("Application artifact already exists: {}", .0.display())]
    ArtifactExists(PathBuf),

    #[error("Application is not signed")]
    Unsigned,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn signing<S: Into<String>>(msg: S) -> Self {
        Self::SigningService(msg.into())
    }

    pub fn collector<S: Into<String>>(msg: S) -> Self {
        Self::Collector(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error must stop the process before scheduling begins.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::VaultNotInitialized(_)
                | Self::Decryption
                | Self::CredentialsNotLoaded
        )
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
