//! Rule engine subsystem: an interpreter for declarative AML rules.
//!
//! A rule is an AND-list of conditions plus an optional action. Enabled
//! rules are visited in descending priority (ties keep catalog order);
//! a rule fires only when every condition holds.
//!
//! RULE: Field paths are parsed into a closed set at registration time.
//! An unknown path, a bad regex or an operator/value mismatch is
//! rejected with InvalidRule and never reaches the catalog.
//! RULE: An absent field fails every operator.

use crate::{
    catalog::{Catalog, CatalogEntry},
    config::AmlConfig,
    error::{AmlError, AmlResult},
    model::{ComplianceFlag, Customer, FlagCategory, RiskAssessment, RiskLevel, Transaction},
    stage::{ComplianceStage, StageInput},
    types::{EntityId, Stage},
};
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};

/// Context key the orchestrator fills with the history length.
pub const CONTEXT_TRANSACTION_COUNT_24H: &str = "transactionCount24h";

// ── Rule data ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    GreaterThan,
    LessThan,
    Contains,
    MatchesPattern,
}

/// A comparison value as written in rule configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<RuleValue>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmlCondition {
    pub field: String,
    pub operator: Operator,
    pub value: RuleValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Flag,
    Reject,
    Review,
    Approve,
}

/// `action_type` is recorded on the flag but does not itself force a
/// recommendation; escalation is driven by `severity` alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub severity: Option<RiskLevel>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmlRule {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
    pub conditions: Vec<AmlCondition>,
    #[serde(default)]
    pub action: Option<RuleAction>,
    pub priority: i32,
}

/// Partial update for [`RuleEngine::update_rule`]; `None` keeps the field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub conditions: Option<Vec<AmlCondition>>,
    #[serde(default)]
    pub action: Option<RuleAction>,
    #[serde(default)]
    pub priority: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleEvaluation {
    pub rule: AmlRule,
    pub action: Option<RuleAction>,
}

// ── Field paths ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartySide {
    Sender,
    Receiver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyField {
    Name,
    AccountId,
    Country,
    BankId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomerField {
    Id,
    Name,
    DateOfBirth,
    Nationality,
    AccountCreatedAt,
    AddressCountry,
    AddressCity,
    IdentificationType,
    IdentificationIssuingCountry,
}

/// Every field a condition may read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPath {
    Id,
    Amount,
    Currency,
    Description,
    TransferType,
    Timestamp,
    Party(PartySide, PartyField),
    Customer(CustomerField),
    Context(String),
}

impl FieldPath {
    pub fn parse(path: &str) -> Option<Self> {
        if let Some(key) = path.strip_prefix("context.") {
            return (!key.is_empty()).then(|| Self::Context(key.to_string()));
        }
        if let Some(rest) = path.strip_prefix("customer.") {
            let field = match rest {
                "id"                            => CustomerField::Id,
                "name"                          => CustomerField::Name,
                "dateOfBirth"                   => CustomerField::DateOfBirth,
                "nationality"                   => CustomerField::Nationality,
                "accountCreatedAt"              => CustomerField::AccountCreatedAt,
                "address.country"               => CustomerField::AddressCountry,
                "address.city"                  => CustomerField::AddressCity,
                "identification.type"           => CustomerField::IdentificationType,
                "identification.issuingCountry" => CustomerField::IdentificationIssuingCountry,
                _ => return None,
            };
            return Some(Self::Customer(field));
        }
        let party = |rest: &str| match rest {
            "name"      => Some(PartyField::Name),
            "accountId" => Some(PartyField::AccountId),
            "country"   => Some(PartyField::Country),
            "bankId"    => Some(PartyField::BankId),
            _ => None,
        };
        if let Some(rest) = path.strip_prefix("sender.") {
            return party(rest).map(|f| Self::Party(PartySide::Sender, f));
        }
        if let Some(rest) = path.strip_prefix("receiver.") {
            return party(rest).map(|f| Self::Party(PartySide::Receiver, f));
        }
        match path {
            "id"          => Some(Self::Id),
            "amount"      => Some(Self::Amount),
            "currency"    => Some(Self::Currency),
            "description" => Some(Self::Description),
            "type"        => Some(Self::TransferType),
            "timestamp"   => Some(Self::Timestamp),
            _ => None,
        }
    }

    /// Whether the field can ever hold a number.
    fn may_be_numeric(&self) -> bool {
        matches!(self, Self::Amount | Self::Context(_))
    }

    /// Whether the field can ever hold text.
    fn may_be_text(&self) -> bool {
        !matches!(self, Self::Amount)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id           => write!(f, "id"),
            Self::Amount       => write!(f, "amount"),
            Self::Currency     => write!(f, "currency"),
            Self::Description  => write!(f, "description"),
            Self::TransferType => write!(f, "type"),
            Self::Timestamp    => write!(f, "timestamp"),
            Self::Party(side, field) => {
                let side = match side {
                    PartySide::Sender   => "sender",
                    PartySide::Receiver => "receiver",
                };
                let field = match field {
                    PartyField::Name      => "name",
                    PartyField::AccountId => "accountId",
                    PartyField::Country   => "country",
                    PartyField::BankId    => "bankId",
                };
                write!(f, "{side}.{field}")
            }
            Self::Customer(field) => {
                let field = match field {
                    CustomerField::Id                           => "id",
                    CustomerField::Name                         => "name",
                    CustomerField::DateOfBirth                  => "dateOfBirth",
                    CustomerField::Nationality                  => "nationality",
                    CustomerField::AccountCreatedAt             => "accountCreatedAt",
                    CustomerField::AddressCountry               => "address.country",
                    CustomerField::AddressCity                  => "address.city",
                    CustomerField::IdentificationType           => "identification.type",
                    CustomerField::IdentificationIssuingCountry => "identification.issuingCountry",
                };
                write!(f, "customer.{field}")
            }
            Self::Context(key) => write!(f, "context.{key}"),
        }
    }
}

/// A resolved field or context value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Bool(bool),
}

pub type EvaluationContext = HashMap<String, FieldValue>;

fn resolve(
    path: &FieldPath,
    tx: &Transaction,
    customer: &Customer,
    context: &EvaluationContext,
) -> Option<FieldValue> {
    let text = |s: &str| Some(FieldValue::Text(s.to_string()));
    match path {
        FieldPath::Id           => text(&tx.id),
        FieldPath::Amount       => tx.amount.to_f64().map(FieldValue::Number),
        FieldPath::Currency     => text(&tx.currency),
        FieldPath::Description  => tx.description.as_deref().and_then(text),
        FieldPath::TransferType => text(tx.transfer_type.as_str()),
        FieldPath::Timestamp    => text(&tx.timestamp.to_rfc3339()),
        FieldPath::Party(side, field) => {
            let party = match side {
                PartySide::Sender   => &tx.sender,
                PartySide::Receiver => &tx.receiver,
            };
            match field {
                PartyField::Name      => text(&party.name),
                PartyField::AccountId => text(&party.account_id),
                PartyField::Country   => party.country.as_deref().and_then(text),
                PartyField::BankId    => party.bank_id.as_deref().and_then(text),
            }
        }
        FieldPath::Customer(field) => match field {
            CustomerField::Id               => text(&customer.id),
            CustomerField::Name             => text(&customer.name),
            CustomerField::DateOfBirth      => customer.date_of_birth.and_then(|d| text(&d.to_string())),
            CustomerField::Nationality      => customer.nationality.as_deref().and_then(text),
            CustomerField::AccountCreatedAt => text(&customer.account_created_at.to_rfc3339()),
            CustomerField::AddressCountry   => customer.address.as_ref().and_then(|a| text(&a.country)),
            CustomerField::AddressCity => customer
                .address
                .as_ref()
                .and_then(|a| a.city.as_deref())
                .and_then(text),
            CustomerField::IdentificationType => customer
                .identification
                .as_ref()
                .and_then(|i| text(i.id_type.as_str())),
            CustomerField::IdentificationIssuingCountry => customer
                .identification
                .as_ref()
                .and_then(|i| text(&i.issuing_country)),
        },
        FieldPath::Context(key) => context.get(key).cloned(),
    }
}

// ── Compiled rules ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct CompiledCondition {
    path: FieldPath,
    operator: Operator,
    value: RuleValue,
    regex: Option<Regex>,
}

impl CompiledCondition {
    fn holds(&self, tx: &Transaction, customer: &Customer, context: &EvaluationContext) -> bool {
        let Some(field) = resolve(&self.path, tx, customer, context) else {
            return false;
        };
        match self.operator {
            Operator::Equals => match &self.value {
                RuleValue::List(items) => items.iter().any(|v| value_equals(&field, v)),
                v => value_equals(&field, v),
            },
            Operator::GreaterThan => numeric_pair(&field, &self.value).is_some_and(|(a, b)| a > b),
            Operator::LessThan    => numeric_pair(&field, &self.value).is_some_and(|(a, b)| a < b),
            Operator::Contains => {
                let FieldValue::Text(s) = &field else { return false };
                let haystack = s.to_lowercase();
                let needle_in = |v: &RuleValue| match v {
                    RuleValue::Text(n) => haystack.contains(&n.to_lowercase()),
                    _ => false,
                };
                match &self.value {
                    RuleValue::List(items) => items.iter().any(needle_in),
                    v => needle_in(v),
                }
            }
            Operator::MatchesPattern => match (&field, &self.regex) {
                (FieldValue::Text(s), Some(re)) => re.is_match(s),
                _ => false,
            },
        }
    }
}

fn value_equals(field: &FieldValue, value: &RuleValue) -> bool {
    match (field, value) {
        (FieldValue::Number(a), RuleValue::Number(b)) => a == b,
        (FieldValue::Text(a), RuleValue::Text(b))     => a == b,
        (FieldValue::Bool(a), RuleValue::Bool(b))     => a == b,
        _ => false,
    }
}

fn numeric_pair(field: &FieldValue, value: &RuleValue) -> Option<(f64, f64)> {
    match (field, value) {
        (FieldValue::Number(a), RuleValue::Number(b)) => Some((*a, *b)),
        _ => None,
    }
}

/// A validated rule together with its parsed conditions.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    rule: AmlRule,
    conditions: Vec<CompiledCondition>,
}

impl CompiledRule {
    pub fn compile(rule: AmlRule) -> AmlResult<Self> {
        if rule.id.trim().is_empty() {
            return Err(AmlError::invalid_rule(&rule.id, "rule id is blank"));
        }
        if rule.conditions.is_empty() {
            return Err(AmlError::invalid_rule(&rule.id, "rule has no conditions"));
        }
        let conditions = rule
            .conditions
            .iter()
            .map(|c| compile_condition(&rule.id, c))
            .collect::<AmlResult<Vec<_>>>()?;
        Ok(Self { rule, conditions })
    }

    pub fn rule(&self) -> &AmlRule {
        &self.rule
    }

    fn matches(&self, tx: &Transaction, customer: &Customer, context: &EvaluationContext) -> bool {
        self.conditions.iter().all(|c| c.holds(tx, customer, context))
    }
}

impl CatalogEntry for CompiledRule {
    fn key(&self) -> &str {
        &self.rule.id
    }
}

fn compile_condition(rule_id: &str, c: &AmlCondition) -> AmlResult<CompiledCondition> {
    let path = FieldPath::parse(&c.field)
        .ok_or_else(|| AmlError::invalid_rule(rule_id, format!("unknown field path '{}'", c.field)))?;
    let mismatch = |what: &str| {
        AmlError::invalid_rule(rule_id, format!("{:?} on '{}' {what}", c.operator, c.field))
    };

    let mut regex = None;
    match c.operator {
        Operator::Equals => {}
        Operator::GreaterThan | Operator::LessThan => {
            if !matches!(c.value, RuleValue::Number(_)) {
                return Err(mismatch("needs a numeric value"));
            }
            if !path.may_be_numeric() {
                return Err(mismatch("needs a numeric field"));
            }
        }
        Operator::Contains => {
            let texts = match &c.value {
                RuleValue::Text(_) => true,
                RuleValue::List(items) => items.iter().all(|v| matches!(v, RuleValue::Text(_))),
                _ => false,
            };
            if !texts {
                return Err(mismatch("needs a text value or a list of text"));
            }
            if !path.may_be_text() {
                return Err(mismatch("needs a text field"));
            }
        }
        Operator::MatchesPattern => {
            let RuleValue::Text(pattern) = &c.value else {
                return Err(mismatch("needs a regex string"));
            };
            if !path.may_be_text() {
                return Err(mismatch("needs a text field"));
            }
            regex = Some(Regex::new(pattern).map_err(|e| {
                AmlError::invalid_rule(rule_id, format!("invalid regex '{pattern}': {e}"))
            })?);
        }
    }
    Ok(CompiledCondition {
        path,
        operator: c.operator,
        value: c.value.clone(),
        regex,
    })
}

// ── Engine ───────────────────────────────────────────────────────────────────

pub struct RuleEngine {
    rules: Catalog<CompiledRule>,
}

impl RuleEngine {
    /// An engine loaded with the default rule set.
    pub fn new(config: &AmlConfig) -> Self {
        let compiled = default_rules(config)
            .into_iter()
            .filter_map(|rule| match CompiledRule::compile(rule) {
                Ok(c) => Some(c),
                Err(e) => {
                    log::error!("default rule skipped: {e}");
                    None
                }
            });
        Self { rules: Catalog::new("rule", compiled) }
    }

    pub fn empty() -> Self {
        Self { rules: Catalog::new("rule", Vec::new()) }
    }

    pub fn evaluate(
        &self,
        transaction: &Transaction,
        customer: &Customer,
        context: &EvaluationContext,
    ) -> AmlResult<Vec<RuleEvaluation>> {
        let snapshot = self.rules.snapshot();
        let mut enabled: Vec<&CompiledRule> = snapshot.iter().filter(|r| r.rule.enabled).collect();
        enabled.sort_by(|a, b| b.rule.priority.cmp(&a.rule.priority));

        let mut fired = Vec::new();
        for compiled in enabled {
            let matched = compiled.matches(transaction, customer, context);
            log::debug!(
                "tx={} rule '{}' (priority {}) matched={matched}",
                transaction.id,
                compiled.rule.id,
                compiled.rule.priority
            );
            if matched {
                fired.push(RuleEvaluation {
                    rule: compiled.rule.clone(),
                    action: compiled.rule.action.clone(),
                });
            }
        }
        Ok(fired)
    }

    // ── Administration ───────────────────────────────────────────────────────

    /// Add a rule or replace the one with the same id.
    pub fn add_rule(&self, rule: AmlRule) -> AmlResult<()> {
        let compiled = CompiledRule::compile(rule)?;
        log::info!("rule '{}' registered (priority {})", compiled.rule.id, compiled.rule.priority);
        self.rules.upsert(compiled);
        Ok(())
    }

    pub fn update_rule(&self, id: &str, update: RuleUpdate) -> AmlResult<AmlRule> {
        let updated = self.rules.update(id, move |existing| {
            let mut rule = existing.rule.clone();
            if let Some(name) = update.name {
                rule.name = name;
            }
            if let Some(description) = update.description {
                rule.description = description;
            }
            if let Some(enabled) = update.enabled {
                rule.enabled = enabled;
            }
            if let Some(conditions) = update.conditions {
                rule.conditions = conditions;
            }
            if let Some(action) = update.action {
                rule.action = Some(action);
            }
            if let Some(priority) = update.priority {
                rule.priority = priority;
            }
            CompiledRule::compile(rule)
        })?;
        Ok(updated.rule)
    }

    pub fn set_rule_enabled(&self, id: &str, enabled: bool) -> AmlResult<AmlRule> {
        self.update_rule(id, RuleUpdate { enabled: Some(enabled), ..RuleUpdate::default() })
    }

    pub fn delete_rule(&self, id: &str) -> AmlResult<AmlRule> {
        self.rules.remove(id).map(|c| c.rule)
    }

    pub fn rule(&self, id: &str) -> Option<AmlRule> {
        self.rules.get(id).map(|c| c.rule)
    }

    pub fn rules(&self) -> Vec<AmlRule> {
        self.rules.snapshot().iter().map(|c| c.rule.clone()).collect()
    }

    /// Replace the whole rule set. Nothing changes unless every rule compiles.
    pub fn replace_rules(&self, rules: Vec<AmlRule>) -> AmlResult<()> {
        let compiled = rules
            .into_iter()
            .map(CompiledRule::compile)
            .collect::<AmlResult<Vec<_>>>()?;
        self.rules.replace_all(compiled);
        Ok(())
    }
}

impl ComplianceStage for RuleEngine {
    fn stage(&self) -> Stage {
        Stage::RuleEvaluation
    }

    fn apply(&self, input: &StageInput<'_>, assessment: RiskAssessment) -> AmlResult<RiskAssessment> {
        let count = input.history.map_or(0, <[Transaction]>::len);
        let context = EvaluationContext::from([(
            CONTEXT_TRANSACTION_COUNT_24H.to_string(),
            FieldValue::Number(count as f64),
        )]);

        let mut assessment = assessment;
        for evaluation in self.evaluate(input.transaction, input.customer, &context)? {
            let Some(action) = evaluation.action else { continue };
            let rule = &evaluation.rule;
            log::warn!("tx={} rule '{}' fired ({:?})", input.transaction.id, rule.id, action.action_type);
            let flag = ComplianceFlag {
                category: FlagCategory::RuleTriggered,
                severity: action.severity.unwrap_or(RiskLevel::Medium),
                description: action
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("Rule triggered: {}", rule.name)),
                details: serde_json::json!({
                    "rule_id": rule.id,
                    "rule_name": rule.name,
                    "priority": rule.priority,
                    "action": serde_json::to_value(&action)?,
                }),
                flagged_at: input.now,
            };
            assessment = assessment.with_flag(flag, Stage::RuleEvaluation);
        }
        Ok(assessment)
    }
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_rules(config: &AmlConfig) -> Vec<AmlRule> {
    let condition = |field: &str, operator, value| AmlCondition {
        field: field.to_string(),
        operator,
        value,
    };
    let action = |action_type, severity, message: &str| {
        Some(RuleAction {
            action_type,
            severity: Some(severity),
            message: Some(message.to_string()),
        })
    };
    let texts = |items: &[&str]| RuleValue::List(items.iter().map(|s| RuleValue::Text(s.to_string())).collect());
    let countries: Vec<&str> = config.high_risk_countries.iter().map(String::as_str).collect();

    vec![
        AmlRule {
            id: "large_transaction".to_string(),
            name: "Large Transaction Alert".to_string(),
            description: "Flag transactions above 50,000".to_string(),
            enabled: true,
            conditions: vec![condition("amount", Operator::GreaterThan, RuleValue::Number(50_000.0))],
            action: action(ActionType::Flag, RiskLevel::High, "Large transaction requires review"),
            priority: 8,
        },
        AmlRule {
            id: "high_risk_country".to_string(),
            name: "High Risk Country".to_string(),
            description: "Flag transactions involving high-risk countries".to_string(),
            enabled: true,
            conditions: vec![condition("receiver.country", Operator::Equals, texts(&countries))],
            action: action(ActionType::Review, RiskLevel::High, "Transaction involves high-risk country"),
            priority: 9,
        },
        AmlRule {
            id: "suspicious_description".to_string(),
            name: "Suspicious Description Keywords".to_string(),
            description: "Flag transactions with suspicious keywords".to_string(),
            enabled: true,
            conditions: vec![condition(
                "description",
                Operator::Contains,
                texts(&["cash", "bitcoin", "crypto", "offshore"]),
            )],
            action: action(ActionType::Flag, RiskLevel::Medium, "Suspicious keywords detected in description"),
            priority: 6,
        },
        AmlRule {
            id: "rapid_succession".to_string(),
            name: "Rapid Transaction Succession".to_string(),
            description: "Flag multiple transactions in short time".to_string(),
            enabled: true,
            conditions: vec![condition(
                "context.transactionCount24h",
                Operator::GreaterThan,
                RuleValue::Number(10.0),
            )],
            action: action(ActionType::Flag, RiskLevel::Medium, "Unusual transaction frequency detected"),
            priority: 7,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_paths_parse_and_print_back() {
        for path in [
            "amount",
            "type",
            "sender.accountId",
            "receiver.country",
            "customer.address.country",
            "customer.identification.issuingCountry",
            "context.transactionCount24h",
        ] {
            let parsed = FieldPath::parse(path).unwrap();
            assert_eq!(parsed.to_string(), path);
        }
    }

    #[test]
    fn unknown_paths_are_rejected() {
        assert_eq!(FieldPath::parse("sender.iban"), None);
        assert_eq!(FieldPath::parse("customer.address"), None);
        assert_eq!(FieldPath::parse("context."), None);
        assert_eq!(FieldPath::parse("transactionCount24h"), None);
    }

    #[test]
    fn rule_values_deserialize_untagged() {
        let v: RuleValue = serde_json::from_str(r#"["a", 1, true]"#).unwrap();
        assert_eq!(
            v,
            RuleValue::List(vec![
                RuleValue::Text("a".into()),
                RuleValue::Number(1.0),
                RuleValue::Bool(true),
            ])
        );
    }

    #[test]
    fn numeric_operator_needs_numeric_value_and_field() {
        let rule = |field: &str, value| AmlRule {
            id: "r".into(),
            name: "r".into(),
            description: String::new(),
            enabled: true,
            conditions: vec![AmlCondition { field: field.into(), operator: Operator::GreaterThan, value }],
            action: None,
            priority: 1,
        };
        assert!(CompiledRule::compile(rule("amount", RuleValue::Number(1.0))).is_ok());
        assert!(CompiledRule::compile(rule("context.n", RuleValue::Number(1.0))).is_ok());
        assert!(matches!(
            CompiledRule::compile(rule("amount", RuleValue::Text("1".into()))),
            Err(AmlError::InvalidRule { .. })
        ));
        assert!(matches!(
            CompiledRule::compile(rule("currency", RuleValue::Number(1.0))),
            Err(AmlError::InvalidRule { .. })
        ));
    }

    #[test]
    fn default_rules_all_compile() {
        let config = AmlConfig::default();
        for rule in default_rules(&config) {
            CompiledRule::compile(rule).unwrap();
        }
    }
}
