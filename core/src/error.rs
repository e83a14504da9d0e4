use crate::types::Stage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AmlError {
    #[error("Risk assessment failed: {0}")]
    RiskAssessment(String),

    #[error("Sanctions check failed: {0}")]
    SanctionsCheck(String),

    #[error("Pattern detection failed: {0}")]
    PatternDetection(String),

    #[error("Rule evaluation failed: {0}")]
    RuleEvaluation(String),

    #[error("Report generation failed: {0}")]
    ReportGeneration(String),

    #[error("Document verification failed: {0}")]
    DocumentVerification(String),

    #[error("Invalid rule '{rule_id}': {reason}")]
    InvalidRule { rule_id: String, reason: String },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Stage '{stage}' exceeded its {budget_ms}ms budget")]
    StageTimeout { stage: Stage, budget_ms: u64 },

    #[error("Stage '{stage}' was cancelled")]
    Cancelled { stage: Stage },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AmlError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    pub fn invalid_rule(rule_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRule { rule_id: rule_id.into(), reason: reason.into() }
    }

    /// The pipeline stage this failure belongs to, if it has one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::RiskAssessment(_)        => Some(Stage::RiskScoring),
            Self::SanctionsCheck(_)        => Some(Stage::SanctionsScreening),
            Self::PatternDetection(_)      => Some(Stage::PatternDetection),
            Self::RuleEvaluation(_)
            | Self::InvalidRule { .. }     => Some(Stage::RuleEvaluation),
            Self::ReportGeneration(_)      => Some(Stage::Reporting),
            Self::DocumentVerification(_)  => Some(Stage::DocumentVerification),
            Self::StageTimeout { stage, .. }
            | Self::Cancelled { stage }    => Some(*stage),
            _ => None,
        }
    }
}

pub type AmlResult<T> = Result<T, AmlError>;
