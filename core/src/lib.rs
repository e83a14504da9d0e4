//! aml-core: transaction compliance risk assessment.
//!
//! A transaction and its parties go through risk scoring, sanctions
//! screening, pattern detection and rule evaluation, in that order, and
//! come out as one RiskAssessment with a score, flags and a
//! recommendation. See engine.rs for the pipeline contract.

pub mod catalog;
pub mod clock;
pub mod command;
pub mod compliance_reporting_subsystem;
pub mod config;
pub mod document_verification_subsystem;
pub mod engine;
pub mod error;
pub mod event;
pub mod model;
pub mod name_generator;
pub mod pattern_detection_subsystem;
pub mod risk_scoring_subsystem;
pub mod rng;
pub mod rule_engine_subsystem;
pub mod sanctions_screening_subsystem;
pub mod snapshot;
pub mod stage;
pub mod store;
pub mod synthetic;
pub mod types;
pub mod velocity;

pub use config::AmlConfig;
pub use engine::ComplianceOrchestrator;
pub use error::{AmlError, AmlResult};
pub use model::{
    Customer, Recommendation, RiskAssessment, RiskLevel, Transaction, TransactionParty,
};
