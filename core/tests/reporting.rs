//! Compliance reporting: period filtering, aggregates and exports.

use aml_core::{
    clock::FixedClock,
    compliance_reporting_subsystem::{ComplianceReport, ComplianceReporter, ExportFormat},
    model::{
        Assessor, ComplianceFlag, FactorCategory, FlagCategory, Recommendation, RiskAssessment,
        RiskFactor, RiskLevel,
    },
    AmlError,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, d, 12, 0, 0).unwrap()
}

fn reporter() -> ComplianceReporter {
    ComplianceReporter::new(Arc::new(FixedClock::new(day(30))))
}

fn assessment(
    id: &str,
    score: u8,
    recommendation: Recommendation,
    assessed_at: DateTime<Utc>,
    factors: &[FactorCategory],
) -> RiskAssessment {
    RiskAssessment {
        transaction_id: id.into(),
        customer_id: "cust-r".into(),
        risk_level: RiskLevel::from_score(score),
        risk_score: score,
        factors: factors
            .iter()
            .map(|&category| RiskFactor {
                category,
                description: String::new(),
                impact: 10,
                weight: 0.1,
            })
            .collect(),
        flags: Vec::new(),
        recommendation,
        assessed_at,
        assessed_by: Assessor::Automated,
        audit_trail: Vec::new(),
    }
}

fn sanctioned(mut a: RiskAssessment) -> RiskAssessment {
    a.flags.push(ComplianceFlag {
        category: FlagCategory::Sanctions,
        severity: RiskLevel::Critical,
        description: "Sanctions match found: John Restricted".into(),
        details: serde_json::Value::Null,
        flagged_at: a.assessed_at,
    });
    a
}

fn seeded() -> ComplianceReporter {
    use FactorCategory::*;
    let r = reporter();
    r.record_assessment(assessment("a", 10, Recommendation::Approved, day(1), &[Amount, Frequency]));
    r.record_assessment(assessment("b", 40, Recommendation::PendingReview, day(2), &[Amount, Geographic, Frequency]));
    r.record_assessment(sanctioned(assessment("c", 95, Recommendation::Rejected, day(3), &[Amount, Frequency])));
    r.record_assessment(assessment("d", 60, Recommendation::PendingReview, day(3), &[Amount, Behavioral]));
    r.record_assessment(assessment("e", 5, Recommendation::Approved, day(20), &[Amount]));
    r
}

#[test]
fn report_aggregates_the_period() {
    let report = seeded().generate_report(day(1), day(3)).unwrap();
    let s = &report.statistics;
    assert_eq!(s.total_transactions, 4);
    assert_eq!(s.approved_transactions, 1);
    assert_eq!(s.flagged_transactions, 2);
    assert_eq!(s.rejected_transactions, 1);
    // (10 + 40 + 95 + 60) / 4 = 51.25
    assert_eq!(s.average_risk_score, 51);
    assert_eq!(report.sanction_matches, 1);
    assert_eq!(report.generated_at, day(30));
    assert_eq!(report.period.start, day(1));
}

#[test]
fn period_bounds_are_inclusive() {
    let r = seeded();
    assert_eq!(r.generate_report(day(3), day(3)).unwrap().statistics.total_transactions, 2);
    assert_eq!(
        r.generate_report(day(1) + Duration::seconds(1), day(3) - Duration::seconds(1))
            .unwrap()
            .statistics
            .total_transactions,
        1
    );
}

#[test]
fn top_factors_sorted_by_count_then_name() {
    let report = seeded().generate_report(day(1), day(31)).unwrap();
    let top: Vec<(&str, usize)> = report
        .top_risk_factors
        .iter()
        .map(|f| (f.factor.as_str(), f.count))
        .collect();
    assert_eq!(
        top,
        [("amount", 5), ("frequency", 3), ("behavioral", 1), ("geographic", 1)]
    );
}

#[test]
fn empty_period_yields_zeroes() {
    let report = seeded().generate_report(day(10), day(11)).unwrap();
    assert_eq!(report.statistics.total_transactions, 0);
    assert_eq!(report.statistics.average_risk_score, 0);
    assert!(report.top_risk_factors.is_empty());
    assert_eq!(report.sanction_matches, 0);
}

#[test]
fn inverted_period_is_rejected() {
    let err = seeded().generate_report(day(5), day(4)).unwrap_err();
    assert!(matches!(err, AmlError::ReportGeneration(_)));
}

#[test]
fn each_report_gets_a_fresh_id() {
    let r = seeded();
    let a = r.generate_report(day(1), day(3)).unwrap();
    let b = r.generate_report(day(1), day(3)).unwrap();
    assert_ne!(a.id, b.id);
    assert_eq!(a.statistics, b.statistics);
}

#[test]
fn summary_counts_by_level() {
    let summary = seeded().compliance_summary();
    assert_eq!(summary.total_assessments, 5);
    // 60 → high, 95 → critical
    assert_eq!(summary.high_risk_count, 2);
    assert_eq!(summary.medium_risk_count, 1);
    assert_eq!(summary.low_risk_count, 2);
    // (10 + 40 + 95 + 60 + 5) / 5
    assert_eq!(summary.average_risk_score, 42);
}

#[test]
fn json_export_round_trips() {
    let r = seeded();
    let report = r.generate_report(day(1), day(31)).unwrap();
    let json = r.export(&report, ExportFormat::Json).unwrap();
    let back: ComplianceReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back, report);
}

#[test]
fn csv_export_lists_metrics_then_factors() {
    let r = seeded();
    let report = r.generate_report(day(1), day(3)).unwrap();
    let csv = r.export(&report, ExportFormat::Csv).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "Metric,Value");
    assert_eq!(lines[1], "Total Transactions,4");
    assert_eq!(lines[5], "Average Risk Score,51");
    assert_eq!(lines[6], "Sanction Matches,1");
    assert_eq!(lines[7], "");
    assert_eq!(lines[8], "Top Risk Factors");
    assert_eq!(lines[9], "Factor,Count");
    assert_eq!(lines[10], "amount,4");
}

#[test]
fn clear_drops_everything() {
    let r = seeded();
    r.clear();
    assert_eq!(r.assessment_count(), 0);
    assert_eq!(r.compliance_summary().total_assessments, 0);
}

#[test]
fn export_format_names() {
    assert_eq!(serde_json::to_string(&ExportFormat::Csv).unwrap(), "\"csv\"");
    let f: ExportFormat = serde_json::from_str("\"json\"").unwrap();
    assert_eq!(f, ExportFormat::Json);
}
