//! Boundary to the page driver that browses the procurement portal.
//!
//! The browser automation itself lives in a sidecar; this crate only sees
//! the [`Collector`] trait. [`HttpCollector`] speaks the sidecar's JSON API.

use crate::config::{endpoint, CollectorConfig};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tenderwatch_types::{ApplicationRecord, OpportunityRecord};
use tracing::{debug, error, warn};

/// Listing filter forwarded to the page driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateQuery {
    pub category: String,
    pub max_pages: u32,
}

impl From<&CollectorConfig> for CandidateQuery {
    fn from(config: &CollectorConfig) -> Self {
        Self {
            category: config.category.clone(),
            max_pages: config.max_pages,
        }
    }
}

/// Discovers opportunities and submits signed applications.
///
/// Calls block the monitor until they return; failures are transport errors.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Current listing of candidate opportunities.
    async fn fetch_candidates(&self, query: &CandidateQuery) -> AppResult<Vec<OpportunityRecord>>;

    /// Navigate to an opportunity's detail page.
    async fn open_detail(&self, identifier: &str) -> AppResult<()>;

    /// Submit a signed application. `Ok(false)` means the portal refused it.
    async fn submit(&self, application: &ApplicationRecord) -> AppResult<bool>;
}

#[derive(Debug, Serialize)]
struct DetailRequest<'a> {
    identifier: &'a str,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    application: &'a ApplicationRecord,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

/// Client for the page driver sidecar
pub struct HttpCollector {
    http: Client,
    base_url: String,
}

impl std::fmt::Debug for HttpCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCollector")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpCollector {
    pub fn new(config: &CollectorConfig) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> AppResult<reqwest::Response> {
        let url = endpoint(&self.base_url, path);
        debug!("Calling page driver at {}", url);

        let response = self.http.post(&url).json(body).send().await.map_err(|e| {
            error!("Page driver request to {} failed: {}", path, e);
            AppError::collector(format!("request to {} failed: {}", path, e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Page driver {} failed with status {}: {}", path, status, body);
            return Err(AppError::collector(format!("{} returned {}: {}", path, status, body)));
        }

        Ok(response)
    }
}

#[async_trait]
impl Collector for HttpCollector {
    async fn fetch_candidates(&self, query: &CandidateQuery) -> AppResult<Vec<OpportunityRecord>> {
        let response = self.post("/candidates", query).await?;
        let cards: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| AppError::collector(format!("invalid candidate list: {}", e)))?;

        // Cards that fail extraction are skipped, not fatal
        let mut records = Vec::with_capacity(cards.len());
        for card in cards {
            match serde_json::from_value::<OpportunityRecord>(card) {
                Ok(record) if !record.identifier.trim().is_empty() => records.push(record),
                Ok(_) => warn!("Skipping card without identifier"),
                Err(e) => warn!("Skipping malformed card: {}", e),
            }
        }
        Ok(records)
    }

    async fn open_detail(&self, identifier: &str) -> AppResult<()> {
        self.post("/detail", &DetailRequest { identifier }).await?;
        Ok(())
    }

    async fn submit(&self, application: &ApplicationRecord) -> AppResult<bool> {
        let response = self.post("/submit", &SubmitRequest { application }).await?;
        let result: SubmitResponse = response
            .json()
            .await
            .map_err(|e| AppError::collector(format!("invalid submit response: {}", e)))?;

        if !result.success {
            warn!(
                "Page driver reports submission refused: {}",
                result.message.as_deref().unwrap_or("no reason given")
            );
        }
        Ok(result.success)
    }
}
