//! The engine's data model: transactions and customers coming in,
//! risk assessments going out.
//!
//! RULE: Transaction and Customer are never mutated by the engine.
//! RiskAssessment is only changed through the consuming adjustment
//! methods below, each of which appends to the audit trail.

use crate::{
    event::AssessmentEvent,
    types::{EntityId, Score, Stage},
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Inputs ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionParty {
    pub name: String,
    pub account_id: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub bank_id: Option<String>,
}

impl TransactionParty {
    pub fn new(name: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            account_id: account_id.into(),
            country: None,
            bank_id: None,
        }
    }

    pub fn in_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferType {
    Credit,
    Debit,
    Transfer,
}

impl TransferType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit   => "credit",
            Self::Debit    => "debit",
            Self::Transfer => "transfer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: EntityId,
    pub amount: Decimal,
    pub currency: String,
    pub sender: TransactionParty,
    pub receiver: TransactionParty,
    #[serde(default)]
    pub description: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub transfer_type: TransferType,
}

impl Transaction {
    pub fn is_cross_border(&self) -> bool {
        matches!(
            (&self.sender.country, &self.receiver.country),
            (Some(s), Some(r)) if s != r
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    pub country: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentificationType {
    Passport,
    NationalId,
    DriversLicense,
}

impl IdentificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passport       => "passport",
            Self::NationalId     => "national_id",
            Self::DriversLicense => "drivers_license",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "passport"        => Some(Self::Passport),
            "national_id"     => Some(Self::NationalId),
            "drivers_license" => Some(Self::DriversLicense),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identification {
    pub id_type: IdentificationType,
    pub number: String,
    pub issuing_country: String,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub nationality: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub identification: Option<Identification>,
    pub account_created_at: DateTime<Utc>,
}

impl Customer {
    /// Whole days between account creation and `as_of`, floored at zero.
    pub fn account_age_days(&self, as_of: DateTime<Utc>) -> f64 {
        let secs = (as_of - self.account_created_at).num_seconds().max(0);
        secs as f64 / 86_400.0
    }
}

// ── Levels and outcomes ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// ≥75 critical, ≥50 high, ≥25 medium, else low.
    pub fn from_score(score: Score) -> Self {
        match score {
            75.. => Self::Critical,
            50.. => Self::High,
            25.. => Self::Medium,
            _    => Self::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low      => "low",
            Self::Medium   => "medium",
            Self::High     => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Approved,
    PendingReview,
    Rejected,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved      => "approved",
            Self::PendingReview => "pending_review",
            Self::Rejected      => "rejected",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assessor {
    Automated,
    Manual,
    Hybrid,
}

// ── Factors and flags ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorCategory {
    Amount,
    Geographic,
    Frequency,
    CustomerProfile,
    Behavioral,
}

impl FactorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amount          => "amount",
            Self::Geographic      => "geographic",
            Self::Frequency       => "frequency",
            Self::CustomerProfile => "customer_profile",
            Self::Behavioral      => "behavioral",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub category: FactorCategory,
    pub description: String,
    /// 0..=100
    pub impact: u32,
    /// 0.0..=1.0
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagCategory {
    Sanctions,
    TransactionMonitoring,
    RuleTriggered,
    Document,
}

impl FlagCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sanctions             => "sanctions",
            Self::TransactionMonitoring => "transaction_monitoring",
            Self::RuleTriggered         => "rule_triggered",
            Self::Document              => "document",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceFlag {
    pub category: FlagCategory,
    pub severity: RiskLevel,
    pub description: String,
    #[serde(default)]
    pub details: serde_json::Value,
    pub flagged_at: DateTime<Utc>,
}

// ── Assessment ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub transaction_id: EntityId,
    pub customer_id: EntityId,
    pub risk_level: RiskLevel,
    pub risk_score: Score,
    pub factors: Vec<RiskFactor>,
    pub flags: Vec<ComplianceFlag>,
    pub recommendation: Recommendation,
    pub assessed_at: DateTime<Utc>,
    pub assessed_by: Assessor,
    /// Every adjustment made after the scorer returned, in order.
    #[serde(default)]
    pub audit_trail: Vec<AssessmentEvent>,
}

impl RiskAssessment {
    /// Raise the score to `to`. Never lowers it; a lower target is a no-op.
    pub fn raise_score(mut self, to: Score, stage: Stage, reason: impl Into<String>) -> Self {
        let to = to.min(100);
        if to > self.risk_score {
            self.audit_trail.push(AssessmentEvent::ScoreRaised {
                stage,
                from: self.risk_score,
                to,
                reason: reason.into(),
            });
            self.risk_score = to;
        }
        self
    }

    pub fn force_recommendation(
        mut self,
        recommendation: Recommendation,
        stage: Stage,
        reason: impl Into<String>,
    ) -> Self {
        if recommendation != self.recommendation {
            self.audit_trail.push(AssessmentEvent::RecommendationChanged {
                stage,
                from: self.recommendation,
                to: recommendation,
                reason: reason.into(),
            });
            self.recommendation = recommendation;
        }
        self
    }

    pub fn set_risk_level(mut self, level: RiskLevel, stage: Stage) -> Self {
        if level != self.risk_level {
            self.audit_trail.push(AssessmentEvent::LevelChanged {
                stage,
                from: self.risk_level,
                to: level,
            });
            self.risk_level = level;
        }
        self
    }

    pub fn with_flag(mut self, flag: ComplianceFlag, stage: Stage) -> Self {
        self.audit_trail.push(AssessmentEvent::FlagRaised {
            stage,
            category: flag.category,
            severity: flag.severity,
        });
        self.flags.push(flag);
        self
    }

    pub fn has_flag_with_severity(&self, severity: RiskLevel) -> bool {
        self.flags.iter().any(|f| f.severity == severity)
    }

    pub fn has_flag_in(&self, category: FlagCategory) -> bool {
        self.flags.iter().any(|f| f.category == category)
    }

    pub fn factor(&self, category: FactorCategory) -> Option<&RiskFactor> {
        self.factors.iter().find(|f| f.category == category)
    }
}
