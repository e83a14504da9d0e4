//! Document verification and its effect on an assessment.

use aml_core::{
    clock::FixedClock,
    config::AmlConfig,
    document_verification_subsystem::{DocumentData, DocumentVerificationRequest},
    engine::ComplianceOrchestrator,
    model::{
        Customer, FlagCategory, Recommendation, RiskLevel, Transaction, TransactionParty,
        TransferType,
    },
    types::Stage,
    AmlError,
};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal_macros::dec;
use std::sync::Arc;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, 5, 10, 0, 0).unwrap()
}

fn orchestrator_with(config: AmlConfig) -> ComplianceOrchestrator {
    ComplianceOrchestrator::with_clock(config, Arc::new(FixedClock::new(now())))
}

fn orchestrator() -> ComplianceOrchestrator {
    orchestrator_with(AmlConfig::default_test())
}

fn customer() -> Customer {
    Customer {
        id: "cust-doc".into(),
        name: "Helen Ortiz".into(),
        date_of_birth: NaiveDate::from_ymd_opt(1979, 9, 30),
        nationality: Some("MX".into()),
        address: None,
        identification: None,
        account_created_at: now() - Duration::days(900),
    }
}

fn passport(data: DocumentData) -> DocumentVerificationRequest {
    DocumentVerificationRequest {
        customer_id: "cust-doc".into(),
        document_type: "passport".into(),
        document_image: None,
        document_data: Some(data),
    }
}

fn matching_data() -> DocumentData {
    DocumentData {
        number: Some("G1234567".into()),
        name: Some("HELEN ORTIZ".into()),
        date_of_birth: NaiveDate::from_ymd_opt(1979, 9, 30),
        nationality: Some("MX".into()),
        expiry_date: NaiveDate::from_ymd_opt(2029, 1, 1),
    }
}

fn payment() -> Transaction {
    Transaction {
        id: "tx-doc".into(),
        amount: dec!(800),
        currency: "MXN".into(),
        sender: TransactionParty::new("Helen Ortiz", "acct-ho").in_country("MX"),
        receiver: TransactionParty::new("Ivan Cruz", "acct-ic").in_country("MX"),
        description: Some("Rent".into()),
        timestamp: now() - Duration::hours(1),
        transfer_type: TransferType::Debit,
    }
}

#[test]
fn matching_document_is_valid() {
    let o = orchestrator();
    let result = o.verify_document(&passport(matching_data()), &customer()).unwrap();
    assert!(result.is_valid);
    assert_eq!(result.confidence, 100);
    assert!(result.issues.is_empty());
    assert_eq!(result.extracted.document_number.as_deref(), Some("G1234567"));
    assert_eq!(result.verified_at, now());
    assert!(result.to_flag().is_none());
}

#[test]
fn expired_document_is_a_medium_concern() {
    let o = orchestrator();
    let data = DocumentData { expiry_date: NaiveDate::from_ymd_opt(2024, 11, 4), ..matching_data() };
    let result = o.verify_document(&passport(data), &customer()).unwrap();
    assert!(!result.is_valid);
    assert_eq!(result.confidence, 50);
    assert_eq!(result.issues, ["Document has expired"]);

    let assessment = o.perform_compliance_check(&payment(), &customer(), None).unwrap();
    let before = assessment.recommendation;
    let after = o.apply_document_result(assessment, &result);
    assert_eq!(after.flags.len(), 1);
    assert_eq!(after.flags[0].category, FlagCategory::Document);
    assert_eq!(after.flags[0].severity, RiskLevel::Medium);
    assert_eq!(after.recommendation, before);
}

#[test]
fn expiring_today_is_still_valid() {
    let data = DocumentData { expiry_date: NaiveDate::from_ymd_opt(2024, 11, 5), ..matching_data() };
    let result = orchestrator().verify_document(&passport(data), &customer()).unwrap();
    assert!(result.is_valid);
}

#[test]
fn several_issues_escalate_to_review() {
    let o = orchestrator();
    let data = DocumentData {
        name: Some("Helena Ortega".into()),
        expiry_date: NaiveDate::from_ymd_opt(2020, 1, 1),
        ..matching_data()
    };
    let result = o.verify_document(&passport(data), &customer()).unwrap();
    assert_eq!(result.confidence, 20);
    assert_eq!(result.issues.len(), 2);

    let assessment = o.perform_compliance_check(&payment(), &customer(), None).unwrap();
    assert_eq!(assessment.recommendation, Recommendation::Approved);

    let after = o.apply_document_result(assessment, &result);
    assert_eq!(after.flags[0].severity, RiskLevel::High);
    assert_eq!(after.risk_level, RiskLevel::High);
    assert_eq!(after.recommendation, Recommendation::PendingReview);
    assert!(after.audit_trail.iter().any(|e| e.stage() == Stage::DocumentVerification));
}

#[test]
fn malformed_number_and_dob_mismatch() {
    let data = DocumentData {
        number: Some("g-12".into()),
        date_of_birth: NaiveDate::from_ymd_opt(1980, 9, 30),
        ..matching_data()
    };
    let result = orchestrator().verify_document(&passport(data), &customer()).unwrap();
    // 100 − 40 − 20
    assert_eq!(result.confidence, 40);
    assert!(!result.is_valid);
    assert_eq!(result.to_flag().unwrap().severity, RiskLevel::Medium);
}

#[test]
fn unsupported_type_without_data_bottoms_out() {
    let request = DocumentVerificationRequest {
        customer_id: "cust-doc".into(),
        document_type: "library_card".into(),
        document_image: None,
        document_data: None,
    };
    let result = orchestrator().verify_document(&request, &customer()).unwrap();
    assert_eq!(result.confidence, 0);
    assert_eq!(result.issues.len(), 2);
    assert_eq!(result.to_flag().unwrap().severity, RiskLevel::High);
}

#[test]
fn image_only_request_has_nothing_to_contradict() {
    let request = DocumentVerificationRequest {
        customer_id: "cust-doc".into(),
        document_type: "national_id".into(),
        document_image: Some(vec![0xFF, 0xD8, 0xFF]),
        document_data: None,
    };
    let result = orchestrator().verify_document(&request, &customer()).unwrap();
    assert!(result.is_valid);
}

#[test]
fn request_for_another_customer_is_an_error() {
    let mut request = passport(matching_data());
    request.customer_id = "someone-else".into();
    let err = orchestrator().verify_document(&request, &customer()).unwrap_err();
    assert!(matches!(err, AmlError::DocumentVerification(_)));
}

#[test]
fn disabled_verification_is_an_error() {
    let config = AmlConfig { document_verification_enabled: false, ..AmlConfig::default_test() };
    let err = orchestrator_with(config)
        .verify_document(&passport(matching_data()), &customer())
        .unwrap_err();
    assert!(matches!(err, AmlError::DocumentVerification(_)));
    assert_eq!(err.stage(), Some(Stage::DocumentVerification));
}
