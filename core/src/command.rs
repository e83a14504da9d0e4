use crate::{
    pattern_detection_subsystem::Pattern,
    rule_engine_subsystem::{AmlRule, RuleUpdate},
    sanctions_screening_subsystem::{SanctionedEntity, SanctionsList},
    snapshot::CatalogExport,
};
use serde::{Deserialize, Serialize};

/// All administrative catalog operations.
/// Each takes effect atomically for checks that start after it returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    // ── Sanctions lists ───────────────────────────
    AddSanctionsList { list: SanctionsList },
    UpdateSanctionsList { list_id: String, entities: Vec<SanctionedEntity> },
    RemoveSanctionsList { list_id: String },
    ImportSanctionsCsv { path: String, list_id: String, source: String },

    // ── Rules ─────────────────────────────────────
    AddRule { rule: AmlRule },
    UpdateRule { rule_id: String, update: RuleUpdate },
    SetRuleEnabled { rule_id: String, enabled: bool },
    DeleteRule { rule_id: String },

    // ── Patterns ──────────────────────────────────
    RegisterPattern { pattern: Pattern },
    RemovePattern { pattern_id: String },

    // ── Whole catalogs ────────────────────────────
    ImportCatalogs { catalogs: CatalogExport },
}

impl AdminCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddSanctionsList { .. }    => "add_sanctions_list",
            Self::UpdateSanctionsList { .. } => "update_sanctions_list",
            Self::RemoveSanctionsList { .. } => "remove_sanctions_list",
            Self::ImportSanctionsCsv { .. }  => "import_sanctions_csv",
            Self::AddRule { .. }             => "add_rule",
            Self::UpdateRule { .. }          => "update_rule",
            Self::SetRuleEnabled { .. }      => "set_rule_enabled",
            Self::DeleteRule { .. }          => "delete_rule",
            Self::RegisterPattern { .. }     => "register_pattern",
            Self::RemovePattern { .. }       => "remove_pattern",
            Self::ImportCatalogs { .. }      => "import_catalogs",
        }
    }
}

/// What an administrative command changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdminOutcome {
    SanctionsList { list: SanctionsList },
    Rule { rule: AmlRule },
    Pattern { pattern: Pattern },
    Imported { count: usize },
    Applied,
}
