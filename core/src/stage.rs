//! Pipeline stage trait, per-call budget and cancellation.
//!
//! RULE: Every stage after risk scoring implements ComplianceStage.
//! The orchestrator calls apply() on each enabled stage in the order
//! documented in engine.rs. A stage receives the assessment by value
//! and returns the adjusted one; it never touches shared state.

use crate::{
    error::{AmlError, AmlResult},
    model::{Customer, RiskAssessment, Transaction},
    types::Stage,
};
use chrono::{DateTime, Utc};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// The contract every post-scoring stage must fulfil.
pub trait ComplianceStage: Send + Sync {
    fn stage(&self) -> Stage;

    /// - `input`:      the immutable inputs of this check
    /// - `assessment`: the assessment as left by earlier stages
    ///
    /// Returns the assessment with this stage's adjustments applied.
    fn apply(&self, input: &StageInput<'_>, assessment: RiskAssessment) -> AmlResult<RiskAssessment>;
}

/// Everything a stage may read during one check.
pub struct StageInput<'a> {
    pub transaction: &'a Transaction,
    pub customer:    &'a Customer,
    pub history:     Option<&'a [Transaction]>,
    pub budget:      &'a StageBudget,
    /// Stamp for flags raised in this check.
    pub now:         DateTime<Utc>,
}

/// A cancellation handle shared between a caller and an in-flight check.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Caller-supplied limits for one compliance check.
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// Wall-clock budget for the whole check.
    pub deadline: Option<Duration>,
    pub cancel:   Option<CancelToken>,
}

impl CheckOptions {
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// The running budget of one check. Expiry and cancellation are stage
/// failures, never "no match".
#[derive(Debug)]
pub struct StageBudget {
    started:  Instant,
    deadline: Option<Duration>,
    cancel:   Option<CancelToken>,
}

impl StageBudget {
    pub fn start(options: &CheckOptions) -> Self {
        Self {
            started:  Instant::now(),
            deadline: options.deadline,
            cancel:   options.cancel.clone(),
        }
    }

    pub fn unlimited() -> Self {
        Self::start(&CheckOptions::default())
    }

    pub fn check(&self, stage: Stage) -> AmlResult<()> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(AmlError::Cancelled { stage });
        }
        if let Some(deadline) = self.deadline {
            if self.started.elapsed() >= deadline {
                return Err(AmlError::StageTimeout {
                    stage,
                    budget_ms: deadline.as_millis() as u64,
                });
            }
        }
        Ok(())
    }
}
