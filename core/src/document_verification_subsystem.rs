//! Document verification subsystem: deterministic checks of an identity
//! document against the customer profile.
//!
//! Confidence starts at 100 and loses a fixed amount per issue:
//!   invalid type 50, no data 60, name mismatch 30, date of birth
//!   mismatch 40, expired 50, malformed number 20.
//! RULE: A document is valid only with confidence >= 60 and no issues.

use crate::{
    clock::Clock,
    error::{AmlError, AmlResult},
    model::{ComplianceFlag, Customer, FlagCategory, IdentificationType, RiskLevel},
    types::EntityId,
};
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ── Constants ────────────────────────────────────────────────────────────────

const INVALID_TYPE_PENALTY: u32 = 50;
const NO_DATA_PENALTY: u32 = 60;
const NAME_MISMATCH_PENALTY: u32 = 30;
const DOB_MISMATCH_PENALTY: u32 = 40;
const EXPIRED_PENALTY: u32 = 50;
const BAD_FORMAT_PENALTY: u32 = 20;

const VALID_CONFIDENCE: u8 = 60;
const HIGH_SEVERITY_BELOW: u8 = 40;

// ── Types ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentData {
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub nationality: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentVerificationRequest {
    pub customer_id: EntityId,
    /// `passport`, `national_id` or `drivers_license`; anything else is an issue.
    pub document_type: String,
    #[serde(default)]
    pub document_image: Option<Vec<u8>>,
    #[serde(default)]
    pub document_data: Option<DocumentData>,
}

/// Fields read from the document, with gaps filled from the profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub document_number: Option<String>,
    pub full_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub nationality: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentVerificationResult {
    pub customer_id: EntityId,
    pub is_valid: bool,
    /// 0..=100
    pub confidence: u8,
    pub extracted: ExtractedDocument,
    pub issues: Vec<String>,
    pub verified_at: DateTime<Utc>,
}

impl DocumentVerificationResult {
    /// A `document` flag for an invalid result: HIGH below 40 confidence,
    /// MEDIUM otherwise. Valid results raise nothing.
    pub fn to_flag(&self) -> Option<ComplianceFlag> {
        if self.is_valid {
            return None;
        }
        let severity = if self.confidence < HIGH_SEVERITY_BELOW {
            RiskLevel::High
        } else {
            RiskLevel::Medium
        };
        Some(ComplianceFlag {
            category: FlagCategory::Document,
            severity,
            description: format!("Document verification failed: {}", self.issues.join("; ")),
            details: serde_json::json!({
                "customer_id": self.customer_id,
                "confidence": self.confidence,
                "issues": self.issues,
            }),
            flagged_at: self.verified_at,
        })
    }
}

// ── Verifier ─────────────────────────────────────────────────────────────────

pub struct DocumentVerifier {
    clock: Arc<dyn Clock>,
}

impl DocumentVerifier {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn verify(
        &self,
        request: &DocumentVerificationRequest,
        customer: &Customer,
    ) -> AmlResult<DocumentVerificationResult> {
        if request.customer_id != customer.id {
            return Err(AmlError::DocumentVerification(format!(
                "request for customer '{}' checked against profile '{}'",
                request.customer_id, customer.id
            )));
        }

        let now = self.clock.now();
        let mut issues = Vec::new();
        let mut penalty = 0u32;
        let mut issue = |text: String, cost: u32| {
            issues.push(text);
            penalty += cost;
        };

        let id_type = IdentificationType::parse(&request.document_type);
        if id_type.is_none() {
            issue(format!("Invalid document type: {}", request.document_type), INVALID_TYPE_PENALTY);
        }
        if request.document_image.is_none() && request.document_data.is_none() {
            issue("No document data provided".to_string(), NO_DATA_PENALTY);
        }

        let extracted = match &request.document_data {
            Some(data) => ExtractedDocument {
                document_number: data.number.clone(),
                full_name: data.name.clone().or_else(|| Some(customer.name.clone())),
                date_of_birth: data.date_of_birth.or(customer.date_of_birth),
                nationality: data.nationality.clone().or_else(|| customer.nationality.clone()),
                expiry_date: data.expiry_date,
            },
            None => ExtractedDocument::default(),
        };

        if let Some(name) = &extracted.full_name {
            if name.to_lowercase() != customer.name.to_lowercase() {
                issue("Name mismatch between document and customer profile".to_string(), NAME_MISMATCH_PENALTY);
            }
        }
        if let (Some(doc_dob), Some(profile_dob)) = (extracted.date_of_birth, customer.date_of_birth) {
            if doc_dob != profile_dob {
                issue("Date of birth mismatch".to_string(), DOB_MISMATCH_PENALTY);
            }
        }
        if extracted.expiry_date.is_some_and(|expiry| expiry < now.date_naive()) {
            issue("Document has expired".to_string(), EXPIRED_PENALTY);
        }
        if let (Some(id_type), Some(number)) = (id_type, extracted.document_number.as_deref()) {
            if !validate_document_format(id_type, number)? {
                issue(format!("Document number '{number}' has an invalid format"), BAD_FORMAT_PENALTY);
            }
        }

        let confidence = 100u32.saturating_sub(penalty) as u8;
        let is_valid = confidence >= VALID_CONFIDENCE && issues.is_empty();
        if !is_valid {
            log::warn!(
                "customer={} document check failed (confidence {confidence}): {}",
                customer.id,
                issues.join("; ")
            );
        }

        Ok(DocumentVerificationResult {
            customer_id: customer.id.clone(),
            is_valid,
            confidence,
            extracted,
            issues,
            verified_at: now,
        })
    }
}

static PASSPORT_FORMAT: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]{6,9}$"));
static NATIONAL_ID_FORMAT: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]{8,12}$"));
static DRIVERS_LICENSE_FORMAT: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]{8,15}$"));

/// Whether `number` has the shape expected for the document type.
pub fn validate_document_format(id_type: IdentificationType, number: &str) -> AmlResult<bool> {
    let format = match id_type {
        IdentificationType::Passport       => &*PASSPORT_FORMAT,
        IdentificationType::NationalId     => &*NATIONAL_ID_FORMAT,
        IdentificationType::DriversLicense => &*DRIVERS_LICENSE_FORMAT,
    };
    match format {
        Ok(re) => Ok(re.is_match(number)),
        Err(e) => Err(AmlError::DocumentVerification(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_number_formats() {
        assert!(validate_document_format(IdentificationType::Passport, "AB123456").unwrap());
        assert!(!validate_document_format(IdentificationType::Passport, "ab123456").unwrap());
        assert!(!validate_document_format(IdentificationType::Passport, "A1234").unwrap());
        assert!(validate_document_format(IdentificationType::NationalId, "123456789012").unwrap());
        assert!(!validate_document_format(IdentificationType::NationalId, "1234567").unwrap());
        assert!(validate_document_format(IdentificationType::DriversLicense, "D1234567").unwrap());
    }

    #[test]
    fn format_patterns_are_compiled_once() {
        for _ in 0..3 {
            validate_document_format(IdentificationType::Passport, "AB123456").unwrap();
        }
        let first = PASSPORT_FORMAT.as_ref().unwrap() as *const Regex;
        let second = PASSPORT_FORMAT.as_ref().unwrap() as *const Regex;
        assert_eq!(first, second);
        assert!(NATIONAL_ID_FORMAT.is_ok());
        assert!(DRIVERS_LICENSE_FORMAT.is_ok());
    }

    #[test]
    fn valid_result_raises_no_flag() {
        let result = DocumentVerificationResult {
            customer_id: "c1".into(),
            is_valid: true,
            confidence: 100,
            extracted: ExtractedDocument::default(),
            issues: Vec::new(),
            verified_at: Utc::now(),
        };
        assert!(result.to_flag().is_none());
    }

    #[test]
    fn low_confidence_is_high_severity() {
        let result = DocumentVerificationResult {
            customer_id: "c1".into(),
            is_valid: false,
            confidence: 0,
            extracted: ExtractedDocument::default(),
            issues: vec!["No document data provided".into()],
            verified_at: Utc::now(),
        };
        assert_eq!(result.to_flag().unwrap().severity, RiskLevel::High);
    }
}
