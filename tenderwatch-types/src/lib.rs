//! Shared record types for tenderwatch.
//!
//! These are the plain data shapes exchanged between the page driver, the
//! scheduler, the application assembler and the admin CLI. They carry no
//! behavior beyond serde and a few accessors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A tender announcement as extracted by the page driver.
///
/// Immutable once created; a fresh batch is fetched every poll cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpportunityRecord {
    /// Stable unique identifier (the canonical announcement link)
    #[serde(alias = "link")]
    pub identifier: String,
    pub title: String,
    /// Announcement number as shown on the portal
    #[serde(default, alias = "number")]
    pub reference_number: String,
    #[serde(default)]
    pub customer: String,
    /// Raw deadline text, parsed by the scheduler
    #[serde(default)]
    pub deadline: String,
    /// Monetary amount as displayed by the portal
    #[serde(default)]
    pub amount: String,
}

impl OpportunityRecord {
    /// Title truncated for log lines.
    pub fn short_title(&self) -> String {
        self.title.chars().take(60).collect()
    }
}

/// Applicant details attached to every application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub name: String,
    /// Business identification number
    pub bin: String,
    pub address: String,
    pub contact_person: String,
    pub phone: String,
    pub email: String,
    pub delivery_terms: String,
}

/// An application for a single opportunity.
///
/// `signature` and `signed_at` stay `None` until the record has been signed;
/// the unsigned fields are what the signature covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub tender_number: String,
    pub tender_title: String,
    pub tender_link: String,
    pub applicant: CompanyProfile,
    pub proposed_price: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_at: Option<DateTime<Utc>>,
}

impl ApplicationRecord {
    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }
}

/// Encoding requested from the signing service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureFormat {
    /// Detached CMS over the raw payload bytes
    #[default]
    Cms,
    /// Enveloped XML-DSig over an XML document wrapping the payload
    Xml,
}

impl fmt::Display for SignatureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cms => write!(f, "cms"),
            Self::Xml => write!(f, "xml"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opportunity_accepts_portal_field_names() {
        let json = r#"{
            "link": "https://portal/announce/42",
            "title": "Supply of uniforms",
            "number": "42-1",
            "deadline": "01.02.2030 10:00"
        }"#;
        let record: OpportunityRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.identifier, "https://portal/announce/42");
        assert_eq!(record.reference_number, "42-1");
        assert!(record.customer.is_empty());
        assert!(record.amount.is_empty());
    }

    #[test]
    fn test_unsigned_application_omits_signature_fields() {
        let record = ApplicationRecord {
            tender_number: "1".to_string(),
            tender_title: "t".to_string(),
            tender_link: "l".to_string(),
            applicant: CompanyProfile {
                name: "n".to_string(),
                bin: "b".to_string(),
                address: "a".to_string(),
                contact_person: "c".to_string(),
                phone: "p".to_string(),
                email: "e".to_string(),
                delivery_terms: "d".to_string(),
            },
            proposed_price: "100".to_string(),
            created_at: Utc::now(),
            signature: None,
            signed_at: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("signature"));
        assert!(!json.contains("signed_at"));
        assert!(!record.is_signed());
    }

    #[test]
    fn test_signature_format_serde() {
        let format: SignatureFormat = serde_json::from_str("\"xml\"").unwrap();
        assert_eq!(format, SignatureFormat::Xml);
        assert_eq!(SignatureFormat::default().to_string(), "cms");
    }
}
