//! Catalog export: sanctions lists, rules and patterns to/from JSON.
//!
//! An export captures the complete administrative state of an
//! orchestrator. Importing it into another orchestrator reproduces the
//! same screening, detection and rule outcomes.

use crate::{
    pattern_detection_subsystem::Pattern,
    rule_engine_subsystem::AmlRule,
    sanctions_screening_subsystem::SanctionsList,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const EXPORT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogExport {
    pub format_version: u32,
    pub exported_at: DateTime<Utc>,
    pub sanctions_lists: Vec<SanctionsList>,
    pub rules: Vec<AmlRule>,
    pub patterns: Vec<Pattern>,
}

impl CatalogExport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
