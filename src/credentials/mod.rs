//! Signing credentials and the signing-service exchange.
//!
//! [`CredentialProvider`] decrypts the vault once at startup and keeps the
//! material in memory for the process lifetime. Every signing call sends that
//! material to the signing service alongside the payload; nothing decrypted is
//! ever written back to disk.

pub mod client;
pub mod secrets;

use crate::config::SigningConfig;
use crate::error::{AppError, AppResult};
use crate::vault::{SecretKind, SecretVault};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tenderwatch_types::SignatureFormat;
use tracing::{info, warn};

pub use client::{ServiceResponse, SigningClient};
pub use secrets::SigningMaterial;

use client::{CmsSignRequest, CmsVerifyRequest, XmlSignRequest};

/// Result of the startup key check.
#[derive(Debug, Clone)]
pub struct KeyInfo {
    /// Fields reported by the service about the loaded key
    pub details: serde_json::Map<String, serde_json::Value>,
}

/// Result of a CMS verification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmsVerification {
    pub valid: bool,
    pub message: Option<String>,
}

/// Something that can sign canonical payloads.
///
/// The application assembler signs through this seam.
#[async_trait]
pub trait SigningBackend: Send + Sync {
    /// Sign `payload` and return the signature artifact.
    async fn sign(&self, payload: &[u8], format: SignatureFormat) -> AppResult<String>;

    /// Verify a CMS artifact produced by [`SigningBackend::sign`].
    async fn verify(&self, cms: &str) -> AppResult<CmsVerification>;
}

/// Owns the decrypted signing material and talks to the signing service.
pub struct CredentialProvider {
    vault: SecretVault,
    client: SigningClient,
    material: Option<SigningMaterial>,
}

impl std::fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialProvider")
            .field("keys_dir", &self.vault.keys_dir())
            .field("client", &self.client)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl CredentialProvider {
    pub fn new(vault: SecretVault, config: &SigningConfig) -> AppResult<Self> {
        Ok(Self {
            vault,
            client: SigningClient::new(config)?,
            material: None,
        })
    }

    /// Decrypt both secrets and keep them for the rest of the process.
    pub fn load(&mut self) -> AppResult<()> {
        if let Some(missing) = self.vault.missing_files().into_iter().next() {
            return Err(AppError::VaultNotInitialized(missing));
        }

        let certificate = self.vault.retrieve_secret(SecretKind::Certificate)?;
        let passphrase = self.vault.retrieve_secret(SecretKind::Passphrase)?;
        self.material = Some(SigningMaterial::from_secrets(&certificate, &passphrase)?);

        info!("Signing credentials loaded from vault");
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.material.is_some()
    }

    fn material(&self) -> AppResult<&SigningMaterial> {
        self.material.as_ref().ok_or(AppError::CredentialsNotLoaded)
    }

    /// Sign `payload` with the loaded credential in the requested encoding.
    pub async fn request_signature(&self, payload: &[u8], format: SignatureFormat) -> AppResult<String> {
        let material = self.material()?;

        match format {
            SignatureFormat::Cms => {
                let request = CmsSignRequest {
                    data: BASE64.encode(payload),
                    signers: [material.signer()],
                };
                let response = self.client.post("/cms/sign", &request).await?;
                response
                    .cms
                    .ok_or_else(|| AppError::signing("response is missing the cms field"))
            }
            SignatureFormat::Xml => {
                let request = XmlSignRequest {
                    xml: wrap_xml(payload)?,
                    signers: [material.signer()],
                };
                let response = self.client.post("/xmldsig/sign", &request).await?;
                response
                    .xml
                    .ok_or_else(|| AppError::signing("response is missing the xml field"))
            }
        }
    }

    /// Ask the service to open the loaded key; fails if it rejects the material.
    pub async fn request_key_info(&self) -> AppResult<KeyInfo> {
        let material = self.material()?;
        let response = self.client.post("/key/info", &material.signer()).await?;
        Ok(KeyInfo {
            details: response.details,
        })
    }

    /// Verify a CMS signature. Needs no credentials.
    pub async fn verify_cms(&self, cms: &str) -> AppResult<CmsVerification> {
        let response = self.client.post("/cms/verify", &CmsVerifyRequest { cms }).await?;
        let valid = response.valid.unwrap_or(false);
        if !valid {
            warn!("Signing service reports CMS signature as invalid");
        }
        Ok(CmsVerification {
            valid,
            message: response.message.filter(|m| !m.is_empty()),
        })
    }
}

#[async_trait]
impl SigningBackend for CredentialProvider {
    async fn sign(&self, payload: &[u8], format: SignatureFormat) -> AppResult<String> {
        self.request_signature(payload, format).await
    }

    async fn verify(&self, cms: &str) -> AppResult<CmsVerification> {
        self.verify_cms(cms).await
    }
}

/// XML document the XML-DSig endpoint signs: the payload as escaped text.
fn wrap_xml(payload: &[u8]) -> AppResult<String> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| AppError::signing("XML signing needs a UTF-8 payload"))?;

    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }

    Ok(format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><application><payload>{}</payload></application>",
        escaped
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn provider(dir: &TempDir) -> CredentialProvider {
        let vault = SecretVault::new(dir.path().join("keys"));
        CredentialProvider::new(vault, &SigningConfig::default()).unwrap()
    }

    #[test]
    fn test_load_requires_complete_vault() {
        let dir = TempDir::new().unwrap();
        let mut provider = provider(&dir);
        let err = provider.load().unwrap_err();
        assert!(matches!(err, AppError::VaultNotInitialized(p) if p.ends_with("master.key")));
        assert!(!provider.is_loaded());
    }

    #[test]
    fn test_load_reports_missing_secret() {
        let dir = TempDir::new().unwrap();
        let vault = SecretVault::new(dir.path().join("keys"));
        vault.initialize().unwrap();
        vault.store_secret(SecretKind::Passphrase, b"pw").unwrap();

        let mut provider = provider(&dir);
        let err = provider.load().unwrap_err();
        assert!(matches!(err, AppError::VaultNotInitialized(p) if p.ends_with("ecp.p12.enc")));
    }

    #[test]
    fn test_load_with_complete_vault() {
        let dir = TempDir::new().unwrap();
        let vault = SecretVault::new(dir.path().join("keys"));
        vault.initialize().unwrap();
        vault.store_secret(SecretKind::Passphrase, b"pw").unwrap();
        vault.store_secret(SecretKind::Certificate, b"p12").unwrap();

        let mut provider = provider(&dir);
        provider.load().unwrap();
        assert!(provider.is_loaded());
        assert!(!format!("{:?}", provider).contains("pw\""));
    }

    #[tokio::test]
    async fn test_sign_without_load_fails() {
        let dir = TempDir::new().unwrap();
        let provider = provider(&dir);
        let err = provider
            .request_signature(b"{}", SignatureFormat::Cms)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CredentialsNotLoaded));

        let err = provider.request_key_info().await.unwrap_err();
        assert!(matches!(err, AppError::CredentialsNotLoaded));
    }

    #[test]
    fn test_wrap_xml_escapes() {
        let xml = wrap_xml(br#"{"title":"a<b & c>"}"#).unwrap();
        assert!(xml.contains("a&lt;b &amp; c&gt;"));
        assert!(xml.starts_with("<?xml"));
        assert!(wrap_xml(&[0xff]).is_err());
    }
}
