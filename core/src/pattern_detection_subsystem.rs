//! Pattern detection subsystem: suspicious-activity heuristics over a
//! transaction and the customer's recent history.
//!
//! Each pattern names one built-in detector and a confidence threshold.
//! A detector sums independent indicator increments; the pattern is
//! reported only when that sum reaches the threshold.
//!
//! RULE: A pattern is never reported below its declared threshold.
//! RULE: Time windows end at the transaction timestamp.

use crate::{
    catalog::{Catalog, CatalogEntry},
    config::AmlConfig,
    error::{AmlError, AmlResult},
    model::{ComplianceFlag, Customer, FlagCategory, RiskAssessment, RiskLevel, Transaction},
    stage::{ComplianceStage, StageInput},
    types::{EntityId, Score, Stage},
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

/// Added to the score when any pattern fires.
pub const PATTERN_SCORE_BUMP: Score = 20;

const STRUCTURING_BAND_FLOOR: Decimal = Decimal::from_parts(8, 0, 0, false, 1); // 0.8
const SIMILAR_AMOUNT_RATIO: Decimal = Decimal::from_parts(1, 0, 0, false, 1);   // 0.1
const STRUCTURING_MIN_HISTORY: usize = 5;
const STRUCTURING_MIN_SIMILAR: usize = 3;

const LAYERING_MIN_HISTORY: usize = 10;

const VELOCITY_WINDOW_HOURS: i64 = 24;
const VELOCITY_HIGH_COUNT: usize = 10;
const VELOCITY_NEW_ACCOUNT_COUNT: usize = 5;
const NEW_ACCOUNT_DAYS: f64 = 30.0;

const DORMANT_ACCOUNT_DAYS: f64 = 180.0;
const DORMANT_MAX_HISTORY: usize = 2;
const DORMANCY_LARGE_AMOUNT: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

// ── Types ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Suspicious,
    Normal,
}

/// The built-in heuristics a pattern can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Structuring,
    RoundTripping,
    Layering,
    Velocity,
    DormancyBreak,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: EntityId,
    pub name: String,
    pub description: String,
    pub kind: PatternKind,
    pub indicators: Vec<String>,
    /// 0.0..=1.0
    pub threshold: f64,
    pub detector: DetectorKind,
}

impl CatalogEntry for Pattern {
    fn key(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub pattern: Pattern,
    /// 0..=100
    pub confidence: Score,
    pub matched_indicators: Vec<String>,
    /// This transaction first, then the history entries that supported the match.
    pub transactions: Vec<EntityId>,
}

/// What one detector found.
#[derive(Debug, Default)]
struct Evidence {
    confidence: f64,
    indicators: Vec<String>,
    supporting: Vec<EntityId>,
}

impl Evidence {
    fn add(&mut self, increment: f64, indicator: &str) {
        self.confidence += increment;
        self.indicators.push(indicator.to_string());
    }
}

// ── Detector ─────────────────────────────────────────────────────────────────

pub struct PatternDetector {
    patterns: Catalog<Pattern>,
    /// The reporting threshold structuring tries to stay under.
    structuring_threshold: Decimal,
}

impl PatternDetector {
    pub fn new(config: &AmlConfig) -> Self {
        Self {
            patterns: Catalog::new("pattern", default_patterns()),
            structuring_threshold: config.transaction_thresholds.low,
        }
    }

    pub fn detect_patterns(
        &self,
        transaction: &Transaction,
        customer: &Customer,
        history: Option<&[Transaction]>,
    ) -> AmlResult<Vec<PatternMatch>> {
        let snapshot = self.patterns.snapshot();
        let mut matches = Vec::new();
        for pattern in snapshot.iter() {
            let evidence = self.run_detector(pattern.detector, transaction, customer, history);
            if evidence.confidence >= pattern.threshold {
                let mut transactions = vec![transaction.id.clone()];
                transactions.extend(evidence.supporting);
                matches.push(PatternMatch {
                    pattern: pattern.clone(),
                    confidence: (evidence.confidence * 100.0).round().clamp(0.0, 100.0) as Score,
                    matched_indicators: evidence.indicators,
                    transactions,
                });
            } else if evidence.confidence > 0.0 {
                log::debug!(
                    "tx={} pattern '{}' below threshold ({:.2} < {:.2})",
                    transaction.id,
                    pattern.id,
                    evidence.confidence,
                    pattern.threshold
                );
            }
        }
        Ok(matches)
    }

    fn run_detector(
        &self,
        detector: DetectorKind,
        tx: &Transaction,
        customer: &Customer,
        history: Option<&[Transaction]>,
    ) -> Evidence {
        match detector {
            DetectorKind::Structuring   => self.detect_structuring(tx, history),
            DetectorKind::RoundTripping => detect_round_tripping(tx, history),
            DetectorKind::Layering      => detect_layering(tx, history),
            DetectorKind::Velocity      => detect_velocity(tx, customer, history),
            DetectorKind::DormancyBreak => detect_dormancy_break(tx, customer, history),
        }
    }

    fn detect_structuring(&self, tx: &Transaction, history: Option<&[Transaction]>) -> Evidence {
        let mut ev = Evidence::default();
        let threshold = self.structuring_threshold;
        if tx.amount >= threshold * STRUCTURING_BAND_FLOOR && tx.amount < threshold {
            ev.add(0.4, "amounts_below_threshold");
        }
        if let Some(history) = history.filter(|h| h.len() > STRUCTURING_MIN_HISTORY) {
            let similar: Vec<EntityId> = history
                .iter()
                .filter(|h| is_similar_amount(h.amount, tx.amount))
                .map(|h| h.id.clone())
                .collect();
            if similar.len() >= STRUCTURING_MIN_SIMILAR {
                ev.add(0.4, "multiple_small_transactions");
                ev.supporting = similar;
            }
        }
        ev
    }

    // ── Administration ───────────────────────────────────────────────────────

    /// Add a pattern or replace the one with the same id.
    pub fn register_pattern(&self, pattern: Pattern) -> AmlResult<()> {
        validate_pattern(&pattern)?;
        log::info!("pattern '{}' registered ({:?}, threshold {:.2})", pattern.id, pattern.detector, pattern.threshold);
        self.patterns.upsert(pattern);
        Ok(())
    }

    pub fn remove_pattern(&self, id: &str) -> AmlResult<Pattern> {
        self.patterns.remove(id)
    }

    pub fn pattern(&self, id: &str) -> Option<Pattern> {
        self.patterns.get(id)
    }

    pub fn patterns(&self) -> Vec<Pattern> {
        self.patterns.snapshot().to_vec()
    }

    pub fn replace_patterns(&self, patterns: Vec<Pattern>) -> AmlResult<()> {
        for p in &patterns {
            validate_pattern(p)?;
        }
        self.patterns.replace_all(patterns);
        Ok(())
    }
}

impl ComplianceStage for PatternDetector {
    fn stage(&self) -> Stage {
        Stage::PatternDetection
    }

    fn apply(&self, input: &StageInput<'_>, assessment: RiskAssessment) -> AmlResult<RiskAssessment> {
        let matches = self.detect_patterns(input.transaction, input.customer, input.history)?;
        if matches.is_empty() {
            return Ok(assessment);
        }

        let names: Vec<&str> = matches.iter().map(|m| m.pattern.name.as_str()).collect();
        log::warn!("tx={} suspicious patterns: {}", input.transaction.id, names.join(", "));

        let flag = ComplianceFlag {
            category: FlagCategory::TransactionMonitoring,
            severity: RiskLevel::High,
            description: format!("Suspicious patterns detected: {}", names.join(", ")),
            details: serde_json::json!({ "patterns": serde_json::to_value(&matches)? }),
            flagged_at: input.now,
        };
        let bumped = assessment.risk_score.saturating_add(PATTERN_SCORE_BUMP);
        Ok(assessment
            .with_flag(flag, Stage::PatternDetection)
            .raise_score(bumped, Stage::PatternDetection, "suspicious pattern"))
    }
}

// ── Heuristics ───────────────────────────────────────────────────────────────

/// Within 10% of `reference`. A difference too large for `Decimal` is
/// never similar.
fn is_similar_amount(amount: Decimal, reference: Decimal) -> bool {
    let tolerance = reference * SIMILAR_AMOUNT_RATIO;
    amount
        .checked_sub(reference)
        .is_some_and(|d| d.abs() < tolerance)
}

fn detect_round_tripping(tx: &Transaction, history: Option<&[Transaction]>) -> Evidence {
    let mut ev = Evidence::default();
    let Some(history) = history else { return ev };
    let reciprocal = history.iter().find(|h| {
        h.sender.account_id == tx.receiver.account_id
            && h.receiver.account_id == tx.sender.account_id
            && is_similar_amount(h.amount, tx.amount)
    });
    if let Some(r) = reciprocal {
        ev.add(0.6, "reciprocal_transactions");
        if r.timestamp.date_naive() == tx.timestamp.date_naive() {
            ev.add(0.2, "same_day_reversal");
        }
        ev.supporting.push(r.id.clone());
    }
    ev
}

fn detect_layering(tx: &Transaction, history: Option<&[Transaction]>) -> Evidence {
    let mut ev = Evidence::default();
    if history.is_some_and(|h| h.len() > LAYERING_MIN_HISTORY) {
        ev.add(0.3, "multiple_intermediaries");
    }
    if tx.is_cross_border() {
        ev.add(0.2, "cross_border_chains");
    }
    ev
}

fn detect_velocity(tx: &Transaction, customer: &Customer, history: Option<&[Transaction]>) -> Evidence {
    let mut ev = Evidence::default();
    let Some(history) = history else { return ev };
    let recent = within_window(history, tx.timestamp, Duration::hours(VELOCITY_WINDOW_HOURS));
    if recent.len() > VELOCITY_HIGH_COUNT {
        ev.add(0.5, "high_frequency");
    }
    if customer.account_age_days(tx.timestamp) < NEW_ACCOUNT_DAYS && recent.len() > VELOCITY_NEW_ACCOUNT_COUNT {
        ev.add(0.3, "new_account");
    }
    if !ev.indicators.is_empty() {
        ev.supporting = recent;
    }
    ev
}

fn detect_dormancy_break(tx: &Transaction, customer: &Customer, history: Option<&[Transaction]>) -> Evidence {
    let mut ev = Evidence::default();
    let Some(history) = history.filter(|h| !h.is_empty()) else { return ev };
    if customer.account_age_days(tx.timestamp) > DORMANT_ACCOUNT_DAYS && history.len() < DORMANT_MAX_HISTORY {
        ev.add(0.5, "long_inactive_period");
        if tx.amount > DORMANCY_LARGE_AMOUNT {
            ev.add(0.3, "sudden_large_transaction");
        }
        ev.supporting = history.iter().map(|h| h.id.clone()).collect();
    }
    ev
}

/// Ids of history entries in `(as_of - window, as_of]`.
fn within_window(history: &[Transaction], as_of: DateTime<Utc>, window: Duration) -> Vec<EntityId> {
    let start = as_of - window;
    history
        .iter()
        .filter(|h| h.timestamp > start && h.timestamp <= as_of)
        .map(|h| h.id.clone())
        .collect()
}

fn validate_pattern(pattern: &Pattern) -> AmlResult<()> {
    if pattern.id.trim().is_empty() {
        return Err(AmlError::PatternDetection("pattern id is blank".into()));
    }
    if !(pattern.threshold > 0.0 && pattern.threshold <= 1.0) {
        return Err(AmlError::PatternDetection(format!(
            "pattern '{}' threshold {} outside (0, 1]",
            pattern.id, pattern.threshold
        )));
    }
    Ok(())
}

fn default_patterns() -> Vec<Pattern> {
    let pattern = |id: &str, name: &str, description: &str, indicators: [&str; 3], threshold: f64, detector| Pattern {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        kind: PatternKind::Suspicious,
        indicators: indicators.iter().map(|s| s.to_string()).collect(),
        threshold,
        detector,
    };
    vec![
        pattern(
            "structuring",
            "Structuring/Smurfing",
            "Multiple transactions just below reporting threshold",
            ["multiple_small_transactions", "amounts_below_threshold", "short_time_window"],
            0.70,
            DetectorKind::Structuring,
        ),
        pattern(
            "round_tripping",
            "Round Tripping",
            "Funds transferred out and returned quickly",
            ["reciprocal_transactions", "same_day_reversal", "similar_amounts"],
            0.75,
            DetectorKind::RoundTripping,
        ),
        pattern(
            "layering",
            "Layering",
            "Complex series of transactions to obscure origin",
            ["multiple_intermediaries", "cross_border_chains", "rapid_movement"],
            0.65,
            DetectorKind::Layering,
        ),
        pattern(
            "velocity",
            "Rapid Velocity",
            "Unusually high transaction frequency",
            ["high_frequency", "above_normal_volume", "new_account"],
            0.60,
            DetectorKind::Velocity,
        ),
        pattern(
            "dormancy_break",
            "Dormancy Break",
            "Sudden activity after long dormancy",
            ["long_inactive_period", "sudden_large_transaction", "pattern_change"],
            0.70,
            DetectorKind::DormancyBreak,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TransactionParty, TransferType};
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, h, 0, 0).unwrap()
    }

    fn tx(id: &str, amount: i64, from: &str, to: &str, ts: DateTime<Utc>) -> Transaction {
        Transaction {
            id: id.to_string(),
            amount: Decimal::from(amount),
            currency: "USD".to_string(),
            sender: TransactionParty::new("Sender", from),
            receiver: TransactionParty::new("Receiver", to),
            description: None,
            timestamp: ts,
            transfer_type: TransferType::Transfer,
        }
    }

    #[test]
    fn default_catalog_has_five_patterns_in_order() {
        let ids: Vec<String> = default_patterns().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, ["structuring", "round_tripping", "layering", "velocity", "dormancy_break"]);
    }

    #[test]
    fn round_trip_same_day_reaches_threshold() {
        let current = tx("t2", 1_000, "A", "B", at(15));
        let history = vec![tx("t1", 1_050, "B", "A", at(9))];
        let ev = detect_round_tripping(&current, Some(&history));
        assert!((ev.confidence - 0.8).abs() < 1e-9);
        assert_eq!(ev.indicators, ["reciprocal_transactions", "same_day_reversal"]);
        assert_eq!(ev.supporting, ["t1"]);
    }

    #[test]
    fn round_trip_needs_amount_within_ten_percent() {
        let current = tx("t2", 1_000, "A", "B", at(15));
        let history = vec![tx("t1", 1_100, "B", "A", at(9))];
        assert_eq!(detect_round_tripping(&current, Some(&history)).confidence, 0.0);
    }

    #[test]
    fn window_is_half_open_at_the_start() {
        let history = vec![
            tx("old", 1, "A", "B", at(23) - Duration::hours(30)),
            tx("edge", 1, "A", "B", at(23) - Duration::hours(24)),
            tx("in", 1, "A", "B", at(22)),
            tx("future", 1, "A", "B", at(23) + Duration::minutes(1)),
        ];
        assert_eq!(within_window(&history, at(23), Duration::hours(24)), ["in"]);
    }

    #[test]
    fn rejects_threshold_outside_unit_interval() {
        let mut p = default_patterns().remove(0);
        p.threshold = 1.5;
        assert!(validate_pattern(&p).is_err());
        p.threshold = 0.0;
        assert!(validate_pattern(&p).is_err());
    }
}
