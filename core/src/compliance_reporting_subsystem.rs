//! Compliance reporting subsystem: accumulates finished assessments and
//! produces period reports.
//!
//! RULE: Appends are serialised behind a write lock; report generation
//! works from a read lock and never blocks other readers.

use crate::{
    clock::Clock,
    error::{AmlError, AmlResult},
    model::{FlagCategory, Recommendation, RiskAssessment, RiskLevel, Transaction},
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;

const TOP_FACTOR_LIMIT: usize = 10;

// ── Types ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportStatistics {
    pub total_transactions: usize,
    /// Assessments left pending review.
    pub flagged_transactions: usize,
    pub approved_transactions: usize,
    pub rejected_transactions: usize,
    pub average_risk_score: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorCount {
    pub factor: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub id: Uuid,
    pub period: ReportPeriod,
    pub statistics: ReportStatistics,
    pub top_risk_factors: Vec<FactorCount>,
    /// Assessments carrying at least one sanctions flag.
    pub sanction_matches: usize,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceSummary {
    pub total_assessments: usize,
    /// High and critical together.
    pub high_risk_count: usize,
    pub medium_risk_count: usize,
    pub low_risk_count: usize,
    pub average_risk_score: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

#[derive(Default)]
struct Records {
    assessments:  Vec<RiskAssessment>,
    transactions: Vec<Transaction>,
}

// ── Reporter ─────────────────────────────────────────────────────────────────

pub struct ComplianceReporter {
    records: RwLock<Records>,
    clock:   Arc<dyn Clock>,
}

impl ComplianceReporter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { records: RwLock::new(Records::default()), clock }
    }

    pub fn record_assessment(&self, assessment: RiskAssessment) {
        self.records.write().assessments.push(assessment);
    }

    pub fn record_transaction(&self, transaction: Transaction) {
        self.records.write().transactions.push(transaction);
    }

    /// Aggregate the assessments made in `[start, end]`.
    pub fn generate_report(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> AmlResult<ComplianceReport> {
        if start > end {
            return Err(AmlError::ReportGeneration(format!(
                "period start {start} is after end {end}"
            )));
        }

        let records = self.records.read();
        let period: Vec<&RiskAssessment> = records
            .assessments
            .iter()
            .filter(|a| a.assessed_at >= start && a.assessed_at <= end)
            .collect();

        let count_rec = |r: Recommendation| period.iter().filter(|a| a.recommendation == r).count();
        let statistics = ReportStatistics {
            total_transactions: period.len(),
            flagged_transactions: count_rec(Recommendation::PendingReview),
            approved_transactions: count_rec(Recommendation::Approved),
            rejected_transactions: count_rec(Recommendation::Rejected),
            average_risk_score: average_score(&period),
        };
        let sanction_matches = period
            .iter()
            .filter(|a| a.has_flag_in(FlagCategory::Sanctions))
            .count();

        let mut counts: HashMap<&'static str, usize> = HashMap::new();
        for factor in period.iter().flat_map(|a| &a.factors) {
            *counts.entry(factor.category.as_str()).or_default() += 1;
        }
        let mut top_risk_factors: Vec<FactorCount> = counts
            .into_iter()
            .map(|(factor, count)| FactorCount { factor: factor.to_string(), count })
            .collect();
        top_risk_factors.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.factor.cmp(&b.factor)));
        top_risk_factors.truncate(TOP_FACTOR_LIMIT);

        log::info!(
            "report {start}..{end}: {} assessments, {} sanction matches",
            statistics.total_transactions,
            sanction_matches
        );

        Ok(ComplianceReport {
            id: Uuid::new_v4(),
            period: ReportPeriod { start, end },
            statistics,
            top_risk_factors,
            sanction_matches,
            generated_at: self.clock.now(),
        })
    }

    /// Counts by risk level over everything recorded so far.
    pub fn compliance_summary(&self) -> ComplianceSummary {
        let records = self.records.read();
        let all: Vec<&RiskAssessment> = records.assessments.iter().collect();
        let count_level = |levels: &[RiskLevel]| all.iter().filter(|a| levels.contains(&a.risk_level)).count();
        ComplianceSummary {
            total_assessments: all.len(),
            high_risk_count: count_level(&[RiskLevel::High, RiskLevel::Critical]),
            medium_risk_count: count_level(&[RiskLevel::Medium]),
            low_risk_count: count_level(&[RiskLevel::Low]),
            average_risk_score: average_score(&all),
        }
    }

    pub fn assessment_count(&self) -> usize {
        self.records.read().assessments.len()
    }

    pub fn transaction_count(&self) -> usize {
        self.records.read().transactions.len()
    }

    pub fn clear(&self) {
        let mut records = self.records.write();
        records.assessments.clear();
        records.transactions.clear();
    }

    pub fn export(&self, report: &ComplianceReport, format: ExportFormat) -> AmlResult<String> {
        match format {
            ExportFormat::Json => export_json(report),
            ExportFormat::Csv  => export_csv(report),
        }
    }
}

fn average_score(assessments: &[&RiskAssessment]) -> u8 {
    if assessments.is_empty() {
        return 0;
    }
    let sum: u64 = assessments.iter().map(|a| u64::from(a.risk_score)).sum();
    (sum as f64 / assessments.len() as f64).round() as u8
}

// ── Export ───────────────────────────────────────────────────────────────────

pub fn export_json(report: &ComplianceReport) -> AmlResult<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// `Metric,Value` rows, a blank line, then the `Factor,Count` table.
pub fn export_csv(report: &ComplianceReport) -> AmlResult<String> {
    let s = &report.statistics;
    let metrics = csv_section(vec![
        vec!["Metric".to_string(), "Value".to_string()],
        vec!["Total Transactions".to_string(), s.total_transactions.to_string()],
        vec!["Flagged Transactions".to_string(), s.flagged_transactions.to_string()],
        vec!["Approved Transactions".to_string(), s.approved_transactions.to_string()],
        vec!["Rejected Transactions".to_string(), s.rejected_transactions.to_string()],
        vec!["Average Risk Score".to_string(), s.average_risk_score.to_string()],
        vec!["Sanction Matches".to_string(), report.sanction_matches.to_string()],
    ])?;

    let mut factor_rows = vec![
        vec!["Top Risk Factors".to_string()],
        vec!["Factor".to_string(), "Count".to_string()],
    ];
    factor_rows.extend(
        report
            .top_risk_factors
            .iter()
            .map(|f| vec![f.factor.clone(), f.count.to_string()]),
    );
    let factors = csv_section(factor_rows)?;

    Ok(format!("{metrics}\n{factors}"))
}

fn csv_section(rows: Vec<Vec<String>>) -> AmlResult<String> {
    let mut wtr = csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    for row in rows {
        wtr.write_record(&row)?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| AmlError::ReportGeneration(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| AmlError::ReportGeneration(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_layout_has_metric_and_factor_sections() {
        let at = Utc::now();
        let report = ComplianceReport {
            id: Uuid::nil(),
            period: ReportPeriod { start: at, end: at },
            statistics: ReportStatistics {
                total_transactions: 3,
                flagged_transactions: 1,
                approved_transactions: 1,
                rejected_transactions: 1,
                average_risk_score: 42,
            },
            top_risk_factors: vec![
                FactorCount { factor: "amount".into(), count: 3 },
                FactorCount { factor: "frequency".into(), count: 3 },
            ],
            sanction_matches: 1,
            generated_at: at,
        };
        let csv = export_csv(&report).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines,
            [
                "Metric,Value",
                "Total Transactions,3",
                "Flagged Transactions,1",
                "Approved Transactions,1",
                "Rejected Transactions,1",
                "Average Risk Score,42",
                "Sanction Matches,1",
                "",
                "Top Risk Factors",
                "Factor,Count",
                "amount,3",
                "frequency,3",
            ]
        );
    }
}
