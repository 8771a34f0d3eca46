//! Scripted collaborators shared by unit tests.

use crate::collector::{CandidateQuery, Collector};
use crate::credentials::{CmsVerification, SigningBackend};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tenderwatch_types::{ApplicationRecord, CompanyProfile, OpportunityRecord, SignatureFormat};
use tokio::time::Instant;

pub fn company() -> CompanyProfile {
    CompanyProfile {
        name: "ACME LLP".to_string(),
        bin: "123456789012".to_string(),
        address: "Astana, Example st. 1".to_string(),
        contact_person: "Ivanov Ivan".to_string(),
        phone: "+7 701 234 56 78".to_string(),
        email: "acme@example.kz".to_string(),
        delivery_terms: "Supplier pays delivery".to_string(),
    }
}

pub fn opportunity(number: &str, deadline: &str) -> OpportunityRecord {
    OpportunityRecord {
        identifier: format!("https://portal/announce/{}", number),
        title: format!("Tender {}", number),
        reference_number: number.to_string(),
        customer: "Ministry".to_string(),
        deadline: deadline.to_string(),
        amount: "1000000".to_string(),
    }
}

/// Signing backend that returns a fixed signature or a fixed error.
pub struct ScriptedSigner {
    signature: Result<String, String>,
    verification_valid: bool,
    payloads: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedSigner {
    pub fn ok(signature: &str) -> Self {
        Self {
            signature: Ok(signature.to_string()),
            verification_valid: true,
            payloads: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            signature: Err(message.to_string()),
            verification_valid: true,
            payloads: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting_verification(mut self) -> Self {
        self.verification_valid = false;
        self
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl SigningBackend for ScriptedSigner {
    async fn sign(&self, payload: &[u8], _format: SignatureFormat) -> AppResult<String> {
        self.payloads.lock().unwrap().push(payload.to_vec());
        self.signature.clone().map_err(AppError::SigningService)
    }

    async fn verify(&self, _cms: &str) -> AppResult<CmsVerification> {
        Ok(CmsVerification {
            valid: self.verification_valid,
            message: None,
        })
    }
}

/// Collector that serves queued batches and records every call.
pub struct ScriptedCollector {
    batches: Mutex<VecDeque<AppResult<Vec<OpportunityRecord>>>>,
    accept_submissions: bool,
    opened: Mutex<Vec<String>>,
    submitted: Mutex<Vec<ApplicationRecord>>,
    fetched_at: Mutex<Vec<Instant>>,
}

impl ScriptedCollector {
    pub fn new(accept_submissions: bool) -> Self {
        Self {
            batches: Mutex::new(VecDeque::new()),
            accept_submissions,
            opened: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            fetched_at: Mutex::new(Vec::new()),
        }
    }

    pub fn push_batch(&self, batch: Vec<OpportunityRecord>) {
        self.batches.lock().unwrap().push_back(Ok(batch));
    }

    pub fn push_failure(&self, message: &str) {
        self.batches
            .lock()
            .unwrap()
            .push_back(Err(AppError::collector(message)));
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub fn submitted(&self) -> Vec<ApplicationRecord> {
        self.submitted.lock().unwrap().clone()
    }

    /// Tokio clock reading at each `fetch_candidates` call
    pub fn fetched_at(&self) -> Vec<Instant> {
        self.fetched_at.lock().unwrap().clone()
    }
}

#[async_trait]
impl Collector for ScriptedCollector {
    async fn fetch_candidates(&self, _query: &CandidateQuery) -> AppResult<Vec<OpportunityRecord>> {
        self.fetched_at.lock().unwrap().push(Instant::now());
        self.batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn open_detail(&self, identifier: &str) -> AppResult<()> {
        self.opened.lock().unwrap().push(identifier.to_string());
        Ok(())
    }

    async fn submit(&self, application: &ApplicationRecord) -> AppResult<bool> {
        self.submitted.lock().unwrap().push(application.clone());
        Ok(self.accept_submissions)
    }
}
