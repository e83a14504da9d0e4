//! Shared primitive types used across the compliance engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable, unique identifier for any entity the engine sees
/// (transaction, customer, rule, pattern, sanctions list).
pub type EntityId = String;

/// An integer risk score in 0..=100.
pub type Score = u8;

/// The pipeline stage an adjustment or failure originated from.
/// Variants are listed in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    RiskScoring,
    SanctionsScreening,
    PatternDetection,
    RuleEvaluation,
    SeverityResolution,
    Reporting,
    DocumentVerification,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RiskScoring          => "risk_scoring",
            Self::SanctionsScreening   => "sanctions_screening",
            Self::PatternDetection     => "pattern_detection",
            Self::RuleEvaluation       => "rule_evaluation",
            Self::SeverityResolution   => "severity_resolution",
            Self::Reporting            => "reporting",
            Self::DocumentVerification => "document_verification",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
