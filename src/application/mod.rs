//! Building, signing and storing tender applications.

pub mod canonical;

use crate::config::SigningConfig;
use crate::credentials::SigningBackend;
use crate::error::{AppError, AppResult};
use crate::fsutil::{self, PUBLIC_FILE_MODE};
use chrono::Utc;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tenderwatch_types::{ApplicationRecord, CompanyProfile, OpportunityRecord, SignatureFormat};
use tracing::{info, warn};

pub use canonical::canonical_bytes;

/// Artifact name collisions tolerated before giving up.
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Assembles applications and signs them through a [`SigningBackend`].
pub struct ApplicationAssembler {
    signer: Arc<dyn SigningBackend>,
    company: CompanyProfile,
    output_dir: PathBuf,
    format: SignatureFormat,
    verify_after_sign: bool,
}

impl std::fmt::Debug for ApplicationAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationAssembler")
            .field("company", &self.company.name)
            .field("output_dir", &self.output_dir)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl ApplicationAssembler {
    pub fn new(
        signer: Arc<dyn SigningBackend>,
        company: CompanyProfile,
        output_dir: impl Into<PathBuf>,
        signing: &SigningConfig,
    ) -> Self {
        Self {
            signer,
            company,
            output_dir: output_dir.into(),
            format: signing.format,
            verify_after_sign: signing.verify_after_sign,
        }
    }

    pub fn company(&self) -> &CompanyProfile {
        &self.company
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Build an unsigned application. Pure apart from reading the clock.
    pub fn create(opportunity: &OpportunityRecord, company: &CompanyProfile) -> ApplicationRecord {
        ApplicationRecord {
            tender_number: opportunity.reference_number.clone(),
            tender_title: opportunity.title.clone(),
            tender_link: opportunity.identifier.clone(),
            applicant: company.clone(),
            proposed_price: opportunity.amount.clone(),
            created_at: Utc::now(),
            signature: None,
            signed_at: None,
        }
    }

    /// Sign the canonical form of `record` and attach the signature.
    pub async fn sign(&self, mut record: ApplicationRecord) -> AppResult<ApplicationRecord> {
        if record.is_signed() {
            return Err(AppError::internal("application is already signed"));
        }

        let payload = canonical_bytes(&record)?;
        let signature = self.signer.sign(&payload, self.format).await?;

        if self.verify_after_sign && self.format == SignatureFormat::Cms {
            let verification = self.signer.verify(&signature).await?;
            if !verification.valid {
                return Err(AppError::signing(
                    verification
                        .message
                        .unwrap_or_else(|| "signature failed verification".to_string()),
                ));
            }
        }

        record.signature = Some(signature);
        record.signed_at = Some(Utc::now());
        info!(tender = %record.tender_number, format = %self.format, "Application signed");
        Ok(record)
    }

    /// Write a signed application to the output directory.
    ///
    /// Returns the artifact path. Existing files are never replaced; a numeric
    /// suffix is added on a name collision.
    pub fn persist(&self, record: &ApplicationRecord) -> AppResult<PathBuf> {
        let signed_at = match (&record.signature, record.signed_at) {
            (Some(_), Some(at)) => at,
            _ => return Err(AppError::Unsigned),
        };

        std::fs::create_dir_all(&self.output_dir)?;
        let contents = serde_json::to_vec_pretty(record)?;
        let stem = artifact_stem(record, &signed_at.format("%Y%m%d_%H%M%S").to_string());

        let mut path = self.output_dir.join(format!("{}.json", stem));
        for attempt in 1..=MAX_NAME_ATTEMPTS {
            match fsutil::create_exclusive(&path, &contents, PUBLIC_FILE_MODE) {
                Ok(()) => {
                    info!(path = %path.display(), "Application saved");
                    return Ok(path);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    warn!(path = %path.display(), "Artifact name taken, trying next suffix");
                    path = self.output_dir.join(format!("{}_{}.json", stem, attempt));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::ArtifactExists(path))
    }
}

/// `application_<slug>_<hash8>_<timestamp>`, where the hash is over the identifier.
fn artifact_stem(record: &ApplicationRecord, timestamp: &str) -> String {
    let source = if record.tender_number.trim().is_empty() {
        &record.tender_link
    } else {
        &record.tender_number
    };
    let slug: String = source
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .take(48)
        .collect();
    let slug = slug.trim_matches('_');
    let slug = if slug.is_empty() { "unknown" } else { slug };

    let hash = blake3::hash(record.tender_link.as_bytes()).to_hex();
    format!("application_{}_{}_{}", slug, &hash.as_str()[..8], timestamp)
}
