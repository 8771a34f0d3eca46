use crate::config::{endpoint, SigningConfig};
use crate::credentials::secrets::SignerEntry;
use crate::error::{AppError, AppResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// Status value the signing service reports on success
pub const STATUS_OK: u16 = 200;

/// Request body for CMS signing
#[derive(Serialize)]
pub struct CmsSignRequest<'a> {
    /// Base64 of the bytes to sign
    pub data: String,
    pub signers: [SignerEntry<'a>; 1],
}

/// Request body for XML-DSig signing
#[derive(Serialize)]
pub struct XmlSignRequest<'a> {
    pub xml: String,
    pub signers: [SignerEntry<'a>; 1],
}

/// Request body for CMS verification
#[derive(Debug, Serialize)]
pub struct CmsVerifyRequest<'a> {
    pub cms: &'a str,
}

/// Response envelope shared by every signing-service endpoint
#[derive(Debug, Deserialize)]
pub struct ServiceResponse {
    pub status: u16,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub cms: Option<String>,
    #[serde(default)]
    pub xml: Option<String>,
    #[serde(default)]
    pub valid: Option<bool>,
    /// Everything else the service returned (key details, signer info)
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

/// HTTP client for the signing service
pub struct SigningClient {
    http: Client,
    base_url: String,
}

impl std::fmt::Debug for SigningClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl SigningClient {
    /// Create a new signing client from config
    pub fn new(config: &SigningConfig) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST a JSON body and unwrap the service envelope.
    ///
    /// Any transport failure, non-2xx HTTP status or non-200 body status is a
    /// `SigningService` error carrying the service message when there is one.
    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> AppResult<ServiceResponse> {
        let url = endpoint(&self.base_url, path);
        debug!("Calling signing service at {}", url);

        let response = self.http.post(&url).json(body).send().await.map_err(|e| {
            error!("Signing service request to {} failed: {}", path, e);
            AppError::signing(format!("request to {} failed: {}", path, e))
        })?;

        let http_status = response.status();
        let text = response.text().await.map_err(|e| {
            error!("Failed to read signing service response: {}", e);
            AppError::signing(format!("failed to read response from {}: {}", path, e))
        })?;

        let parsed: ServiceResponse = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!("Signing service returned {} with unparseable body: {}", http_status, e);
                return Err(AppError::signing(format!(
                    "{} returned {}: {}",
                    path,
                    http_status,
                    text.chars().take(200).collect::<String>()
                )));
            }
        };

        if !http_status.is_success() || parsed.status != STATUS_OK {
            let message = parsed
                .message
                .clone()
                .unwrap_or_else(|| format!("status {}", parsed.status));
            error!("Signing service rejected {} (http {}): {}", path, http_status, message);
            return Err(AppError::SigningService(message));
        }

        Ok(parsed)
    }
}
