//! Sanctions screening subsystem: watchlist matching for every party of a
//! transaction.
//!
//! Matching precedence per entity (first rule that applies wins, all
//! comparisons case-insensitive):
//!   1. Exact name                       → 100, field `name`
//!   2. Alias substring, either way      → 80,  field `alias`
//!   3. Levenshtein similarity > 0.80    → round(sim × 70), field `name_fuzzy`
//!   4. Equal dates of birth             → +20 (cap 100), field `dateOfBirth`
//!
//! Only candidates scoring above 70 are reported.
//!
//! RULE: Lists live in a copy-on-write catalog. A check reads one snapshot
//! from start to finish, so an administrative swap mid-check is invisible
//! to it.

use crate::{
    catalog::{Catalog, CatalogEntry},
    clock::Clock,
    error::{AmlError, AmlResult},
    model::{ComplianceFlag, Customer, FlagCategory, Recommendation, RiskAssessment, RiskLevel},
    stage::{ComplianceStage, StageBudget, StageInput},
    types::{EntityId, Score, Stage},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{io::Read, sync::Arc};

// ── Constants ────────────────────────────────────────────────────────────────

const EXACT_MATCH_SCORE: u32 = 100;
const ALIAS_MATCH_SCORE: u32 = 80;
const FUZZY_SCALE: f64 = 70.0;
const FUZZY_MIN_SIMILARITY: f64 = 0.80;
const DOB_BONUS: u32 = 20;
const REPORT_ABOVE: Score = 70;

/// Score forced onto an assessment with any sanctions hit.
pub const SANCTIONS_SCORE_FLOOR: Score = 95;

pub const DEFAULT_LIST_ID: &str = "default";

// ── Types ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Individual,
    Organization,
}

impl EntityType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "individual"   => Some(Self::Individual),
            "organization" => Some(Self::Organization),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanctionedEntity {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub nationality: Option<String>,
    pub entity_type: EntityType,
    pub sanction_type: String,
    pub added_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanctionsList {
    pub id: EntityId,
    pub source: String,
    pub entities: Vec<SanctionedEntity>,
    pub last_updated: DateTime<Utc>,
}

impl CatalogEntry for SanctionsList {
    fn key(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Alias,
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanctionMatch {
    pub list_id: EntityId,
    pub entity: SanctionedEntity,
    pub match_score: Score,
    pub match_type: MatchType,
    pub matched_fields: Vec<String>,
}

// ── Matcher ──────────────────────────────────────────────────────────────────

pub struct SanctionsMatcher {
    lists: Catalog<SanctionsList>,
    clock: Arc<dyn Clock>,
}

impl SanctionsMatcher {
    /// A matcher seeded with the default consolidated list.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let seed = default_list(clock.now());
        Self {
            lists: Catalog::new("sanctions list", [seed]),
            clock,
        }
    }

    /// A matcher with no lists loaded.
    pub fn empty(clock: Arc<dyn Clock>) -> Self {
        Self {
            lists: Catalog::new("sanctions list", Vec::new()),
            clock,
        }
    }

    pub fn check_party(&self, name: &str, date_of_birth: Option<NaiveDate>) -> AmlResult<Vec<SanctionMatch>> {
        self.check_party_within(name, date_of_birth, &StageBudget::unlimited())
    }

    /// Screen one name against every entity of every loaded list. The
    /// budget is checked between entities.
    pub fn check_party_within(
        &self,
        name: &str,
        date_of_birth: Option<NaiveDate>,
        budget: &StageBudget,
    ) -> AmlResult<Vec<SanctionMatch>> {
        if name.trim().is_empty() {
            return Ok(Vec::new());
        }
        let snapshot = self.lists.snapshot();
        let mut matches = Vec::new();
        for list in snapshot.iter() {
            for entity in &list.entities {
                budget.check(Stage::SanctionsScreening)?;
                if let Some(m) = score_entity(name, date_of_birth, entity) {
                    if m.match_score > REPORT_ABOVE {
                        matches.push(SanctionMatch { list_id: list.id.clone(), ..m });
                    }
                }
            }
        }
        Ok(matches)
    }

    pub fn check_customer(&self, customer: &Customer) -> AmlResult<Vec<SanctionMatch>> {
        self.check_party(&customer.name, customer.date_of_birth)
    }

    // ── Administration ───────────────────────────────────────────────────────

    /// Add a list, replacing any list with the same id.
    pub fn add_list(&self, list: SanctionsList) {
        log::info!(
            "sanctions list '{}' loaded from {} ({} entities)",
            list.id,
            list.source,
            list.entities.len()
        );
        self.lists.upsert(list);
    }

    /// Replace the entities of an existing list and refresh its timestamp.
    pub fn update_list(&self, id: &str, entities: Vec<SanctionedEntity>) -> AmlResult<SanctionsList> {
        let now = self.clock.now();
        self.lists.update(id, move |existing| {
            Ok(SanctionsList {
                id: existing.id.clone(),
                source: existing.source.clone(),
                entities,
                last_updated: now,
            })
        })
    }

    pub fn remove_list(&self, id: &str) -> AmlResult<SanctionsList> {
        self.lists.remove(id)
    }

    pub fn list(&self, id: &str) -> Option<SanctionsList> {
        self.lists.get(id)
    }

    pub fn lists(&self) -> Vec<SanctionsList> {
        self.lists.snapshot().to_vec()
    }

    pub fn replace_lists(&self, lists: Vec<SanctionsList>) {
        self.lists.replace_all(lists);
    }

    /// Load a list from a CSV file; see [`parse_entities_csv`] for the layout.
    /// Returns the number of entities loaded.
    pub fn import_csv(&self, path: &str, list_id: &str, source: &str) -> AmlResult<usize> {
        let file = std::fs::File::open(path)?;
        let entities = parse_entities_csv(file)?;
        let count = entities.len();
        self.add_list(SanctionsList {
            id: list_id.to_string(),
            source: source.to_string(),
            entities,
            last_updated: self.clock.now(),
        });
        Ok(count)
    }
}

impl ComplianceStage for SanctionsMatcher {
    fn stage(&self) -> Stage {
        Stage::SanctionsScreening
    }

    /// Customer (with date of birth), then sender, then receiver.
    fn apply(&self, input: &StageInput<'_>, assessment: RiskAssessment) -> AmlResult<RiskAssessment> {
        let tx = input.transaction;
        let mut matches = self.check_party_within(
            &input.customer.name,
            input.customer.date_of_birth,
            input.budget,
        )?;
        matches.extend(self.check_party_within(&tx.sender.name, None, input.budget)?);
        matches.extend(self.check_party_within(&tx.receiver.name, None, input.budget)?);

        if matches.is_empty() {
            return Ok(assessment);
        }

        for m in &matches {
            log::warn!(
                "tx={} sanctions hit: '{}' ({:?}, score {}) on list '{}'",
                tx.id,
                m.entity.name,
                m.match_type,
                m.match_score,
                m.list_id
            );
        }

        let names: Vec<&str> = matches.iter().map(|m| m.entity.name.as_str()).collect();
        let flag = ComplianceFlag {
            category: FlagCategory::Sanctions,
            severity: RiskLevel::Critical,
            description: format!("Sanctions match found: {}", names.join(", ")),
            details: serde_json::json!({ "matches": serde_json::to_value(&matches)? }),
            flagged_at: input.now,
        };

        Ok(assessment
            .with_flag(flag, Stage::SanctionsScreening)
            .raise_score(SANCTIONS_SCORE_FLOOR, Stage::SanctionsScreening, "sanctions match")
            .force_recommendation(Recommendation::Rejected, Stage::SanctionsScreening, "sanctions match"))
    }
}

// ── Matching ─────────────────────────────────────────────────────────────────

/// Score `name` against one entity, before the report cutoff is applied.
/// `list_id` of the result is left empty.
pub fn score_entity(
    name: &str,
    date_of_birth: Option<NaiveDate>,
    entity: &SanctionedEntity,
) -> Option<SanctionMatch> {
    let name_l = name.trim().to_lowercase();
    let entity_l = entity.name.trim().to_lowercase();
    if name_l.is_empty() {
        return None;
    }

    let (base, match_type, field) = if name_l == entity_l {
        (EXACT_MATCH_SCORE, MatchType::Exact, "name")
    } else if entity.aliases.iter().any(|a| alias_matches(&name_l, a)) {
        (ALIAS_MATCH_SCORE, MatchType::Alias, "alias")
    } else {
        let sim = similarity(&name_l, &entity_l);
        if sim <= FUZZY_MIN_SIMILARITY {
            return None;
        }
        ((sim * FUZZY_SCALE).round() as u32, MatchType::Fuzzy, "name_fuzzy")
    };

    let mut score = base;
    let mut matched_fields = vec![field.to_string()];
    if let (Some(given), Some(listed)) = (date_of_birth, entity.date_of_birth) {
        if given == listed {
            score = (score + DOB_BONUS).min(100);
            matched_fields.push("dateOfBirth".to_string());
        }
    }

    Some(SanctionMatch {
        list_id: String::new(),
        entity: entity.clone(),
        match_score: score as Score,
        match_type,
        matched_fields,
    })
}

fn alias_matches(name_l: &str, alias: &str) -> bool {
    let alias_l = alias.trim().to_lowercase();
    !alias_l.is_empty() && (name_l.contains(&alias_l) || alias_l.contains(name_l))
}

/// 1 − levenshtein(a, b) / max(len a, len b), compared lowercase.
/// Two empty strings are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / longest as f64
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            cur[j + 1] = substitution.min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

// ── Seed data / CSV ──────────────────────────────────────────────────────────

fn default_list(now: DateTime<Utc>) -> SanctionsList {
    let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default();
    SanctionsList {
        id: DEFAULT_LIST_ID.to_string(),
        source: "OFAC/UN/EU Consolidated".to_string(),
        entities: vec![
            SanctionedEntity {
                name: "Restricted Entity Alpha".to_string(),
                aliases: vec!["REA".to_string(), "Entity A".to_string()],
                date_of_birth: None,
                nationality: None,
                entity_type: EntityType::Organization,
                sanction_type: "Financial sanctions".to_string(),
                added_date: date(2020, 1, 1),
            },
            SanctionedEntity {
                name: "John Restricted".to_string(),
                aliases: Vec::new(),
                date_of_birth: Some(date(1970, 1, 1)),
                nationality: Some("XX".to_string()),
                entity_type: EntityType::Individual,
                sanction_type: "Asset freeze".to_string(),
                added_date: date(2019, 6, 15),
            },
        ],
        last_updated: now,
    }
}

#[derive(Debug, Deserialize)]
struct EntityRow {
    name: String,
    aliases: Option<String>,
    date_of_birth: Option<String>,
    nationality: Option<String>,
    entity_type: String,
    sanction_type: Option<String>,
    added_date: String,
}

/// Parse watchlist entities from CSV with the header
/// `name,aliases,date_of_birth,nationality,entity_type,sanction_type,added_date`.
/// Aliases are `;`-separated; dates are `YYYY-MM-DD`.
pub fn parse_entities_csv<R: Read>(reader: R) -> AmlResult<Vec<SanctionedEntity>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut entities = Vec::new();
    for (i, row) in rdr.deserialize::<EntityRow>().enumerate() {
        let row = row?;
        let line = i + 2;
        if row.name.is_empty() {
            return Err(AmlError::SanctionsCheck(format!("row {line}: empty name")));
        }
        let entity_type = EntityType::parse(&row.entity_type).ok_or_else(|| {
            AmlError::SanctionsCheck(format!("row {line}: unknown entity type '{}'", row.entity_type))
        })?;
        let date_of_birth = match row.date_of_birth.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => Some(parse_date(s, line)?),
            None => None,
        };
        entities.push(SanctionedEntity {
            name: row.name,
            aliases: row
                .aliases
                .unwrap_or_default()
                .split(';')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(String::from)
                .collect(),
            date_of_birth,
            nationality: row.nationality.filter(|n| !n.is_empty()),
            entity_type,
            sanction_type: row.sanction_type.unwrap_or_default(),
            added_date: parse_date(&row.added_date, line)?,
        });
    }
    Ok(entities)
}

fn parse_date(s: &str, line: usize) -> AmlResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| AmlError::SanctionsCheck(format!("row {line}: bad date '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str, aliases: &[&str]) -> SanctionedEntity {
        SanctionedEntity {
            name: name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            date_of_birth: None,
            nationality: None,
            entity_type: EntityType::Individual,
            sanction_type: "Asset freeze".to_string(),
            added_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        }
    }

    #[test]
    fn levenshtein_distances() {
        let d = |a: &str, b: &str| {
            levenshtein(&a.chars().collect::<Vec<_>>(), &b.chars().collect::<Vec<_>>())
        };
        assert_eq!(d("kitten", "sitting"), 3);
        assert_eq!(d("", "abc"), 3);
        assert_eq!(d("same", "same"), 0);
    }

    #[test]
    fn similarity_is_case_insensitive_and_handles_empty() {
        assert_eq!(similarity("ABC", "abc"), 1.0);
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", ""), 0.0);
    }

    #[test]
    fn exact_beats_alias() {
        let e = entity("Acme Trading", &["Acme"]);
        let m = score_entity("acme trading", None, &e).unwrap();
        assert_eq!(m.match_type, MatchType::Exact);
        assert_eq!(m.match_score, 100);
    }

    #[test]
    fn alias_substring_matches_either_direction() {
        let e = entity("Acme Trading", &["Acme Intl"]);
        assert_eq!(score_entity("acme intl ltd", None, &e).unwrap().match_type, MatchType::Alias);
        assert_eq!(score_entity("Acme", None, &e).unwrap().match_score, 80);
    }

    #[test]
    fn fuzzy_at_or_below_cutoff_is_rejected() {
        // 2 edits over 10 chars: similarity exactly 0.80
        let e = entity("abcdefghij", &[]);
        assert!(score_entity("abcdefghXY", None, &e).is_none());
    }

    #[test]
    fn fuzzy_above_cutoff_scores_seventy_scale() {
        // 1 edit over 10 chars: similarity 0.90 -> 63
        let e = entity("abcdefghij", &[]);
        let m = score_entity("abcdefghiX", None, &e).unwrap();
        assert_eq!(m.match_type, MatchType::Fuzzy);
        assert_eq!(m.match_score, 63);
        assert_eq!(m.matched_fields, vec!["name_fuzzy"]);
    }

    #[test]
    fn date_of_birth_adds_twenty() {
        let mut e = entity("abcdefghij", &[]);
        let dob = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        e.date_of_birth = Some(dob);
        let m = score_entity("abcdefghiX", Some(dob), &e).unwrap();
        assert_eq!(m.match_score, 83);
        assert_eq!(m.matched_fields, vec!["name_fuzzy", "dateOfBirth"]);
    }

    #[test]
    fn csv_parses_aliases_and_optional_fields() {
        let data = "name,aliases,date_of_birth,nationality,entity_type,sanction_type,added_date\n\
                    Evil Corp,EC;E Corp,,,organization,Trade embargo,2021-03-04\n\
                    Jane Doe,,1980-02-03,ZZ,individual,Asset freeze,2022-01-01\n";
        let entities = parse_entities_csv(data.as_bytes()).unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].aliases, vec!["EC", "E Corp"]);
        assert_eq!(entities[0].date_of_birth, None);
        assert_eq!(entities[1].nationality.as_deref(), Some("ZZ"));
        assert_eq!(entities[1].entity_type, EntityType::Individual);
    }

    #[test]
    fn csv_rejects_unknown_entity_type() {
        let data = "name,aliases,date_of_birth,nationality,entity_type,sanction_type,added_date\n\
                    X,,,,vessel,,2021-01-01\n";
        assert!(matches!(
            parse_entities_csv(data.as_bytes()),
            Err(AmlError::SanctionsCheck(_))
        ));
    }
}
