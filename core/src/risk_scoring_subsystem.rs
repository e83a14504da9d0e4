//! Risk scoring: the first stage of every compliance check.
//!
//! Five independent factors, each an impact in 0..=100 with a fixed weight:
//!   1. Amount            (0.30)
//!   2. Geographic        (0.25)
//!   3. Frequency         (0.20)
//!   4. Customer profile  (0.15)
//!   5. Behavioral        (0.10)
//!
//! Only factors with impact > 0 are kept. The composite score is the
//! weighted average over the kept factors, rounded to an integer.
//! Account age and velocity windows end at the transaction timestamp.
//! Frequency comes from the supplied history when there is one, and from
//! the velocity source otherwise.

use crate::{
    clock::Clock,
    config::AmlConfig,
    error::{AmlError, AmlResult},
    model::{
        Assessor, Customer, FactorCategory, Recommendation, RiskAssessment, RiskFactor,
        RiskLevel, Transaction,
    },
    types::Score,
    velocity::{count_in_window, VelocitySource},
};
use rust_decimal::Decimal;
use std::sync::Arc;

// ── Constants ────────────────────────────────────────────────────────────────

const AMOUNT_WEIGHT: f64 = 0.30;
const GEOGRAPHIC_WEIGHT: f64 = 0.25;
const FREQUENCY_WEIGHT: f64 = 0.20;
const PROFILE_WEIGHT: f64 = 0.15;
const BEHAVIORAL_WEIGHT: f64 = 0.10;

const HIGH_RISK_COUNTRY_IMPACT: u32 = 60;
const CROSS_BORDER_IMPACT: u32 = 15;

const VERY_NEW_ACCOUNT_DAYS: f64 = 7.0;
const NEW_ACCOUNT_DAYS: f64 = 30.0;

const STRUCTURING_BAND_FLOOR: Decimal = Decimal::from_parts(9, 0, 0, false, 1); // 0.9

pub const SUSPICIOUS_KEYWORDS: &[&str] = &["cash", "urgent", "secret", "offshore", "anonymous"];

// ── Scorer ───────────────────────────────────────────────────────────────────

pub struct RiskScorer {
    config:   Arc<AmlConfig>,
    velocity: Arc<dyn VelocitySource>,
    clock:    Arc<dyn Clock>,
}

impl RiskScorer {
    pub fn new(
        config: Arc<AmlConfig>,
        velocity: Arc<dyn VelocitySource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { config, velocity, clock }
    }

    /// Score a transaction. Either a complete assessment or an error;
    /// never a partial result.
    pub fn assess_risk(
        &self,
        transaction: &Transaction,
        customer: &Customer,
    ) -> AmlResult<RiskAssessment> {
        self.assess_risk_with_history(transaction, customer, None)
    }

    /// As `assess_risk`. When `history` is given, the frequency factor
    /// counts its in-window entries and the velocity source is not asked.
    pub fn assess_risk_with_history(
        &self,
        transaction: &Transaction,
        customer: &Customer,
        history: Option<&[Transaction]>,
    ) -> AmlResult<RiskAssessment> {
        validate_inputs(transaction, customer)?;

        let candidates = [
            self.assess_amount_risk(transaction),
            self.assess_geographic_risk(transaction, customer),
            self.assess_frequency_risk(transaction, customer, history)?,
            self.assess_customer_profile_risk(transaction, customer),
            self.assess_behavioral_risk(transaction),
        ];

        let factors: Vec<RiskFactor> = candidates.into_iter().filter(|f| f.impact > 0).collect();
        for factor in &factors {
            log::debug!(
                "tx={} factor={} impact={} weight={:.2}: {}",
                transaction.id,
                factor.category.as_str(),
                factor.impact,
                factor.weight,
                factor.description
            );
        }

        let risk_score = composite_score(&factors);
        Ok(RiskAssessment {
            transaction_id: transaction.id.clone(),
            customer_id: customer.id.clone(),
            risk_level: RiskLevel::from_score(risk_score),
            risk_score,
            factors,
            flags: Vec::new(),
            recommendation: self.recommendation_for(risk_score),
            assessed_at: self.clock.now(),
            assessed_by: Assessor::Automated,
            audit_trail: Vec::new(),
        })
    }

    /// ≥ auto-rejection → rejected, ≥ auto-approval → review, else approved.
    pub fn recommendation_for(&self, score: Score) -> Recommendation {
        if score >= self.config.auto_rejection_threshold {
            Recommendation::Rejected
        } else if score >= self.config.auto_approval_threshold {
            Recommendation::PendingReview
        } else {
            Recommendation::Approved
        }
    }

    fn assess_amount_risk(&self, tx: &Transaction) -> RiskFactor {
        let t = &self.config.transaction_thresholds;
        let money = format!("{} {}", tx.amount, tx.currency);
        let (impact, description) = if tx.amount >= t.high {
            (80, format!("Very high transaction amount: {money}"))
        } else if tx.amount >= t.medium {
            (50, format!("High transaction amount: {money}"))
        } else if tx.amount >= t.low {
            (25, format!("Moderate transaction amount: {money}"))
        } else {
            (5, format!("Normal transaction amount: {money}"))
        };
        RiskFactor {
            category: FactorCategory::Amount,
            description,
            impact,
            weight: AMOUNT_WEIGHT,
        }
    }

    fn assess_geographic_risk(&self, tx: &Transaction, customer: &Customer) -> RiskFactor {
        let sender_country = tx
            .sender
            .country
            .as_deref()
            .or_else(|| customer.address.as_ref().map(|a| a.country.as_str()));
        let receiver_country = tx.receiver.country.as_deref();

        let mut impact = 0;
        let mut notes = Vec::new();
        if let Some(c) = sender_country.filter(|c| self.config.is_high_risk_country(c)) {
            impact += HIGH_RISK_COUNTRY_IMPACT;
            notes.push(format!("Sender from high-risk country: {c}."));
        }
        if let Some(c) = receiver_country.filter(|c| self.config.is_high_risk_country(c)) {
            impact += HIGH_RISK_COUNTRY_IMPACT;
            notes.push(format!("Receiver in high-risk country: {c}."));
        }
        if let (Some(s), Some(r)) = (sender_country, receiver_country) {
            if !s.eq_ignore_ascii_case(r) {
                impact += CROSS_BORDER_IMPACT;
                notes.push("Cross-border transaction.".to_string());
            }
        }

        RiskFactor {
            category: FactorCategory::Geographic,
            description: describe(notes, "No geographic risk detected"),
            impact: impact.min(100),
            weight: GEOGRAPHIC_WEIGHT,
        }
    }

    fn assess_frequency_risk(
        &self,
        tx: &Transaction,
        customer: &Customer,
        history: Option<&[Transaction]>,
    ) -> AmlResult<RiskFactor> {
        let freq = &self.config.frequency;
        let count = match history {
            Some(history) => count_in_window(history, &tx.id, tx.timestamp, freq.window()),
            None => self
                .velocity
                .count_recent(&customer.id, tx.timestamp, freq.window())
                .map_err(|e| AmlError::RiskAssessment(format!("velocity lookup failed: {e}")))?,
        };

        let (impact, description) = if count >= freq.high_count {
            (70, format!("Unusually high transaction frequency: {count} in {}h", freq.window_hours))
        } else if count >= freq.elevated_count {
            (40, format!("Above average transaction frequency: {count} in {}h", freq.window_hours))
        } else {
            (10, "Normal transaction frequency".to_string())
        };
        Ok(RiskFactor {
            category: FactorCategory::Frequency,
            description,
            impact,
            weight: FREQUENCY_WEIGHT,
        })
    }

    fn assess_customer_profile_risk(&self, tx: &Transaction, customer: &Customer) -> RiskFactor {
        let age_days = customer.account_age_days(tx.timestamp);
        let mut impact = 0;
        let mut notes = Vec::new();

        if age_days < VERY_NEW_ACCOUNT_DAYS {
            impact += 50;
            notes.push("Very new account (< 7 days).");
        } else if age_days < NEW_ACCOUNT_DAYS {
            impact += 30;
            notes.push("New account (< 30 days).");
        }
        if customer.address.is_none() {
            impact += 20;
            notes.push("Missing address information.");
        }
        if customer.identification.is_none() {
            impact += 30;
            notes.push("Missing identification.");
        }

        RiskFactor {
            category: FactorCategory::CustomerProfile,
            description: describe(notes, "Customer profile appears normal"),
            impact: impact.min(100),
            weight: PROFILE_WEIGHT,
        }
    }

    fn assess_behavioral_risk(&self, tx: &Transaction) -> RiskFactor {
        let low = self.config.transaction_thresholds.low;
        let mut impact = 0;
        let mut notes = Vec::new();

        if tx.amount >= low * STRUCTURING_BAND_FLOOR && tx.amount < low {
            impact += 40;
            notes.push("Possible structuring behavior detected.");
        }
        if contains_suspicious_keyword(tx.description.as_deref()) {
            impact += 50;
            notes.push("Suspicious keywords in description.");
        }

        RiskFactor {
            category: FactorCategory::Behavioral,
            description: describe(notes, "No behavioral anomalies detected"),
            impact: impact.min(100),
            weight: BEHAVIORAL_WEIGHT,
        }
    }
}

/// round(Σ impact·weight / Σ weight), 0 when there are no factors.
pub fn composite_score(factors: &[RiskFactor]) -> Score {
    let (weighted, total) = factors.iter().fold((0.0, 0.0), |(ws, tw), f| {
        (ws + f.impact as f64 * f.weight, tw + f.weight)
    });
    if total <= 0.0 {
        return 0;
    }
    (weighted / total).round().clamp(0.0, 100.0) as Score
}

fn contains_suspicious_keyword(description: Option<&str>) -> bool {
    let desc = description.unwrap_or_default().to_lowercase();
    SUSPICIOUS_KEYWORDS.iter().any(|k| desc.contains(k))
}

fn describe<S: AsRef<str>>(notes: Vec<S>, fallback: &str) -> String {
    if notes.is_empty() {
        fallback.to_string()
    } else {
        notes.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(" ")
    }
}

fn validate_inputs(tx: &Transaction, customer: &Customer) -> AmlResult<()> {
    if tx.id.trim().is_empty() {
        return Err(AmlError::RiskAssessment("transaction id is blank".into()));
    }
    if customer.id.trim().is_empty() {
        return Err(AmlError::RiskAssessment("customer id is blank".into()));
    }
    if tx.amount.is_sign_negative() && !tx.amount.is_zero() {
        return Err(AmlError::RiskAssessment(format!(
            "transaction {} has negative amount {}",
            tx.id, tx.amount
        )));
    }
    if customer.account_created_at > tx.timestamp {
        return Err(AmlError::RiskAssessment(format!(
            "customer {} account created after transaction {}",
            customer.id, tx.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factor(impact: u32, weight: f64) -> RiskFactor {
        RiskFactor {
            category: FactorCategory::Amount,
            description: String::new(),
            impact,
            weight,
        }
    }

    #[test]
    fn composite_of_nothing_is_zero() {
        assert_eq!(composite_score(&[]), 0);
    }

    #[test]
    fn composite_is_weighted_average_over_included_factors() {
        // (80*0.3 + 10*0.2) / 0.5 = 52
        assert_eq!(composite_score(&[factor(80, 0.30), factor(10, 0.20)]), 52);
        // (5*0.3 + 10*0.2) / 0.5 = 7
        assert_eq!(composite_score(&[factor(5, 0.30), factor(10, 0.20)]), 7);
    }

    #[test]
    fn composite_rounds_half_up() {
        // (25*0.5 + 50*0.5) / 1.0 = 37.5 -> 38
        assert_eq!(composite_score(&[factor(25, 0.5), factor(50, 0.5)]), 38);
    }

    #[test]
    fn keyword_match_is_case_insensitive_substring() {
        assert!(contains_suspicious_keyword(Some("URGENT payment")));
        assert!(contains_suspicious_keyword(Some("cashback")));
        assert!(!contains_suspicious_keyword(Some("rent for May")));
        assert!(!contains_suspicious_keyword(None));
    }

    #[test]
    fn structuring_band_floor_is_ninety_percent() {
        assert_eq!(STRUCTURING_BAND_FLOOR, Decimal::new(9, 1));
    }
}
