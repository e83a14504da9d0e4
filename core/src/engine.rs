//! The compliance orchestrator: one end-to-end assessment per call.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Risk scoring        (always)
//!   2. Sanctions screening (if sanctions_check_enabled)
//!   3. Pattern detection   (if transaction_monitoring_enabled)
//!   4. Rule evaluation     (always)
//!   5. Severity resolution (always)
//!   6. Reporting           (only after 1-5 succeeded)
//!
//! RULES:
//!   - Stages run sequentially; flags are appended in stage order.
//!   - A stage failure aborts the call. Nothing is recorded and no
//!     partial assessment is returned.
//!   - The budget is checked before every stage; expiry or cancellation
//!     is a failure, never "no match".
//!   - Severity resolution is decided by the flags alone: any CRITICAL
//!     flag gives critical / rejected; otherwise any HIGH flag gives
//!     high / pending review, replacing the scorer's level and verdict.

use crate::{
    clock::{Clock, SystemClock},
    command::{AdminCommand, AdminOutcome},
    compliance_reporting_subsystem::{ComplianceReport, ComplianceReporter, ComplianceSummary, ExportFormat},
    config::AmlConfig,
    document_verification_subsystem::{DocumentVerificationRequest, DocumentVerificationResult, DocumentVerifier},
    error::{AmlError, AmlResult},
    model::{Customer, Recommendation, RiskAssessment, RiskLevel, Transaction},
    pattern_detection_subsystem::PatternDetector,
    risk_scoring_subsystem::RiskScorer,
    rule_engine_subsystem::RuleEngine,
    sanctions_screening_subsystem::SanctionsMatcher,
    snapshot::{CatalogExport, EXPORT_FORMAT_VERSION},
    stage::{CheckOptions, ComplianceStage, StageBudget, StageInput},
    types::Stage,
    velocity::{TransactionLog, VelocitySource},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct ComplianceOrchestrator {
    config:    Arc<AmlConfig>,
    clock:     Arc<dyn Clock>,
    /// Fed after every completed check when the orchestrator owns the
    /// velocity data; None when an external source was supplied.
    velocity_log: Option<Arc<TransactionLog>>,
    scorer:    RiskScorer,
    sanctions: SanctionsMatcher,
    patterns:  PatternDetector,
    rules:     RuleEngine,
    documents: DocumentVerifier,
    reporter:  ComplianceReporter,
}

impl ComplianceOrchestrator {
    /// Wall-clock stamps, in-memory velocity log, default catalogs.
    pub fn new(config: AmlConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: AmlConfig, clock: Arc<dyn Clock>) -> Self {
        let log = Arc::new(TransactionLog::new(config.frequency.window()));
        let velocity: Arc<dyn VelocitySource> = log.clone();
        Self::build(config, clock, velocity, Some(log))
    }

    /// Use an external velocity source. The orchestrator does not feed it.
    pub fn with_parts(config: AmlConfig, clock: Arc<dyn Clock>, velocity: Arc<dyn VelocitySource>) -> Self {
        Self::build(config, clock, velocity, None)
    }

    fn build(
        config: AmlConfig,
        clock: Arc<dyn Clock>,
        velocity: Arc<dyn VelocitySource>,
        velocity_log: Option<Arc<TransactionLog>>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            scorer:    RiskScorer::new(config.clone(), velocity, clock.clone()),
            sanctions: SanctionsMatcher::new(clock.clone()),
            patterns:  PatternDetector::new(&config),
            rules:     RuleEngine::new(&config),
            documents: DocumentVerifier::new(clock.clone()),
            reporter:  ComplianceReporter::new(clock.clone()),
            config,
            clock,
            velocity_log,
        }
    }

    // ── Checks ───────────────────────────────────────────────────────────────

    pub fn perform_compliance_check(
        &self,
        transaction: &Transaction,
        customer: &Customer,
        history: Option<&[Transaction]>,
    ) -> AmlResult<RiskAssessment> {
        self.perform_compliance_check_with(transaction, customer, history, &CheckOptions::default())
    }

    pub fn perform_compliance_check_with(
        &self,
        transaction: &Transaction,
        customer: &Customer,
        history: Option<&[Transaction]>,
        options: &CheckOptions,
    ) -> AmlResult<RiskAssessment> {
        let budget = StageBudget::start(options);
        let assessment = match self.run_pipeline(transaction, customer, history, &budget) {
            Ok(a) => a,
            Err(e) => {
                let stage = e.stage().map_or("unknown", |s| s.name());
                log::error!("tx={} check aborted in {stage}: {e}", transaction.id);
                return Err(e);
            }
        };

        log::info!(
            "tx={} score={} level={} recommendation={} flags={}",
            transaction.id,
            assessment.risk_score,
            assessment.risk_level,
            assessment.recommendation,
            assessment.flags.len()
        );

        if let Some(velocity_log) = &self.velocity_log {
            velocity_log.record(&customer.id, transaction);
        }
        self.reporter.record_transaction(transaction.clone());
        self.reporter.record_assessment(assessment.clone());
        Ok(assessment)
    }

    fn run_pipeline(
        &self,
        transaction: &Transaction,
        customer: &Customer,
        history: Option<&[Transaction]>,
        budget: &StageBudget,
    ) -> AmlResult<RiskAssessment> {
        budget.check(Stage::RiskScoring)?;
        let mut assessment = self.scorer.assess_risk_with_history(transaction, customer, history)?;

        let input = StageInput {
            transaction,
            customer,
            history,
            budget,
            now: self.clock.now(),
        };
        for stage in self.enabled_stages() {
            budget.check(stage.stage())?;
            assessment = stage.apply(&input, assessment)?;
        }

        budget.check(Stage::SeverityResolution)?;
        Ok(resolve_severity(assessment))
    }

    /// Stages 2-4 in execution order, honouring the feature toggles.
    fn enabled_stages(&self) -> Vec<&dyn ComplianceStage> {
        let mut stages: Vec<&dyn ComplianceStage> = Vec::with_capacity(3);
        if self.config.sanctions_check_enabled {
            stages.push(&self.sanctions);
        }
        if self.config.transaction_monitoring_enabled {
            stages.push(&self.patterns);
        }
        stages.push(&self.rules);
        stages
    }

    // ── Documents ────────────────────────────────────────────────────────────

    pub fn verify_document(
        &self,
        request: &DocumentVerificationRequest,
        customer: &Customer,
    ) -> AmlResult<DocumentVerificationResult> {
        if !self.config.document_verification_enabled {
            return Err(AmlError::DocumentVerification("document verification is disabled".into()));
        }
        self.documents.verify(request, customer)
    }

    /// Attach a failed document check to an assessment and re-run
    /// severity resolution. Valid documents leave it unchanged.
    pub fn apply_document_result(
        &self,
        assessment: RiskAssessment,
        result: &DocumentVerificationResult,
    ) -> RiskAssessment {
        match result.to_flag() {
            Some(flag) => resolve_severity(assessment.with_flag(flag, Stage::DocumentVerification)),
            None => assessment,
        }
    }

    // ── Reporting ────────────────────────────────────────────────────────────

    pub fn generate_compliance_report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AmlResult<ComplianceReport> {
        self.reporter.generate_report(start, end)
    }

    pub fn export_report(&self, report: &ComplianceReport, format: ExportFormat) -> AmlResult<String> {
        self.reporter.export(report, format)
    }

    pub fn compliance_summary(&self) -> ComplianceSummary {
        self.reporter.compliance_summary()
    }

    // ── Administration ───────────────────────────────────────────────────────

    pub fn apply_command(&self, command: AdminCommand) -> AmlResult<AdminOutcome> {
        log::info!("admin command: {}", command.name());
        let outcome = match command {
            AdminCommand::AddSanctionsList { list } => {
                self.sanctions.add_list(list.clone());
                AdminOutcome::SanctionsList { list }
            }
            AdminCommand::UpdateSanctionsList { list_id, entities } => AdminOutcome::SanctionsList {
                list: self.sanctions.update_list(&list_id, entities)?,
            },
            AdminCommand::RemoveSanctionsList { list_id } => AdminOutcome::SanctionsList {
                list: self.sanctions.remove_list(&list_id)?,
            },
            AdminCommand::ImportSanctionsCsv { path, list_id, source } => AdminOutcome::Imported {
                count: self.sanctions.import_csv(&path, &list_id, &source)?,
            },
            AdminCommand::AddRule { rule } => {
                self.rules.add_rule(rule.clone())?;
                AdminOutcome::Rule { rule }
            }
            AdminCommand::UpdateRule { rule_id, update } => AdminOutcome::Rule {
                rule: self.rules.update_rule(&rule_id, update)?,
            },
            AdminCommand::SetRuleEnabled { rule_id, enabled } => AdminOutcome::Rule {
                rule: self.rules.set_rule_enabled(&rule_id, enabled)?,
            },
            AdminCommand::DeleteRule { rule_id } => AdminOutcome::Rule {
                rule: self.rules.delete_rule(&rule_id)?,
            },
            AdminCommand::RegisterPattern { pattern } => {
                self.patterns.register_pattern(pattern.clone())?;
                AdminOutcome::Pattern { pattern }
            }
            AdminCommand::RemovePattern { pattern_id } => AdminOutcome::Pattern {
                pattern: self.patterns.remove_pattern(&pattern_id)?,
            },
            AdminCommand::ImportCatalogs { catalogs } => {
                self.import_catalogs(catalogs)?;
                AdminOutcome::Applied
            }
        };
        Ok(outcome)
    }

    pub fn export_catalogs(&self) -> CatalogExport {
        CatalogExport {
            format_version:  EXPORT_FORMAT_VERSION,
            exported_at:     self.clock.now(),
            sanctions_lists: self.sanctions.lists(),
            rules:           self.rules.rules(),
            patterns:        self.patterns.patterns(),
        }
    }

    /// Replace all three catalogs. Rules and patterns are validated first;
    /// if either is rejected, no catalog changes.
    pub fn import_catalogs(&self, export: CatalogExport) -> AmlResult<()> {
        if export.format_version != EXPORT_FORMAT_VERSION {
            return Err(AmlError::Other(anyhow::anyhow!(
                "unsupported catalog export version {}",
                export.format_version
            )));
        }
        let previous_rules = self.rules.rules();
        self.rules.replace_rules(export.rules)?;
        if let Err(e) = self.patterns.replace_patterns(export.patterns) {
            self.rules.replace_rules(previous_rules)?;
            return Err(e);
        }
        self.sanctions.replace_lists(export.sanctions_lists);
        Ok(())
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn config(&self) -> &AmlConfig {
        &self.config
    }

    pub fn sanctions(&self) -> &SanctionsMatcher {
        &self.sanctions
    }

    pub fn patterns(&self) -> &PatternDetector {
        &self.patterns
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn reporter(&self) -> &ComplianceReporter {
        &self.reporter
    }

    pub fn scorer(&self) -> &RiskScorer {
        &self.scorer
    }
}

/// A CRITICAL flag sets critical / rejected. Otherwise a HIGH flag sets
/// high / pending review, overriding what scoring decided. Without either,
/// the assessment passes through unchanged.
pub fn resolve_severity(assessment: RiskAssessment) -> RiskAssessment {
    let stage = Stage::SeverityResolution;
    if assessment.has_flag_with_severity(RiskLevel::Critical) {
        log::warn!("tx={} escalated: critical flag", assessment.transaction_id);
        assessment
            .set_risk_level(RiskLevel::Critical, stage)
            .force_recommendation(Recommendation::Rejected, stage, "critical flag")
    } else if assessment.has_flag_with_severity(RiskLevel::High) {
        log::warn!("tx={} held for review: high flag", assessment.transaction_id);
        assessment
            .set_risk_level(RiskLevel::High, stage)
            .force_recommendation(Recommendation::PendingReview, stage, "high flag")
    } else {
        assessment
    }
}
