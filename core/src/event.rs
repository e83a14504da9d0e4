//! The assessment audit trail.
//!
//! RULE: Every change a stage makes to an assessment after the scorer
//! returned it is recorded here, tagged with the stage that made it.
//! Variants are only ever appended, never removed or reordered.

use crate::{
    model::{FlagCategory, Recommendation, RiskLevel},
    types::{Score, Stage},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssessmentEvent {
    ScoreRaised {
        stage: Stage,
        from: Score,
        to: Score,
        reason: String,
    },
    RecommendationChanged {
        stage: Stage,
        from: Recommendation,
        to: Recommendation,
        reason: String,
    },
    LevelChanged {
        stage: Stage,
        from: RiskLevel,
        to: RiskLevel,
    },
    FlagRaised {
        stage: Stage,
        category: FlagCategory,
        severity: RiskLevel,
    },
}

impl AssessmentEvent {
    pub fn stage(&self) -> Stage {
        match self {
            Self::ScoreRaised { stage, .. }
            | Self::RecommendationChanged { stage, .. }
            | Self::LevelChanged { stage, .. }
            | Self::FlagRaised { stage, .. } => *stage,
        }
    }

    /// Stable name, used as the event_type column in the audit store.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ScoreRaised { .. }           => "score_raised",
            Self::RecommendationChanged { .. } => "recommendation_changed",
            Self::LevelChanged { .. }          => "level_changed",
            Self::FlagRaised { .. }            => "flag_raised",
        }
    }
}
