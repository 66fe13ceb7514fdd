use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::RecommendedAction;

/// Fields a rule may reference: the union of track and album projections.
pub const RULE_FIELDS: &[&str] = &[
    "path",
    "is_best",
    "quality_score",
    "format",
    "codec",
    "bitrate",
    "sample_rate",
    "bit_depth",
    "is_lossless",
    "file_size",
    "similarity_to_best",
    "match_percentage",
    "match_method",
    "track_count",
    "album_identifier",
    "album_name",
    "artist_name",
];

/// A field value projected from a scan-result item. Fields missing from the
/// projection are absent, which is distinct from any value here.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Num(f64),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    In,
    NotIn,
    Contains,
    MatchesRegex,
}

impl TryFrom<String> for Operator {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "==" => Ok(Operator::Eq),
            "!=" => Ok(Operator::Ne),
            "<" => Ok(Operator::Lt),
            ">" => Ok(Operator::Gt),
            "<=" => Ok(Operator::Le),
            ">=" => Ok(Operator::Ge),
            "in" => Ok(Operator::In),
            "not-in" | "not in" => Ok(Operator::NotIn),
            "contains" => Ok(Operator::Contains),
            "matches-regex" | "matches" => Ok(Operator::MatchesRegex),
            other => Err(format!("unknown operator: {other}")),
        }
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> String {
        let s = match op {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::In => "in",
            Operator::NotIn => "not-in",
            Operator::Contains => "contains",
            Operator::MatchesRegex => "matches-regex",
        };
        s.to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleCondition {
    pub field: String,
    pub operator: Operator,
    pub value: serde_json::Value,
}

impl RuleCondition {
    pub fn new(field: &str, operator: Operator, value: serde_json::Value) -> Self {
        RuleCondition {
            field: field.to_string(),
            operator,
            value,
        }
    }

    fn validate(&self) -> Result<()> {
        if !RULE_FIELDS.contains(&self.field.as_str()) {
            return Err(Error::Rules(format!("unknown field: {}", self.field)));
        }
        match self.operator {
            Operator::MatchesRegex => {
                let pattern = self.value.as_str().ok_or_else(|| {
                    Error::Rules(format!(
                        "matches-regex on '{}' requires a string pattern",
                        self.field
                    ))
                })?;
                Regex::new(pattern).map_err(|e| {
                    Error::Rules(format!("invalid regex for '{}': {e}", self.field))
                })?;
            }
            Operator::In | Operator::NotIn => {
                if !self.value.is_array() {
                    return Err(Error::Rules(format!(
                        "in/not-in on '{}' requires a list value",
                        self.field
                    )));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Evaluate against an item projection. Absent fields: equality with a
    /// non-null value is false, `!=` with a non-null value is true,
    /// membership and comparison are false.
    pub fn evaluate(&self, item: &HashMap<&'static str, FieldValue>) -> bool {
        let field_value = item.get(self.field.as_str());

        let field_value = match field_value {
            Some(value) => value,
            None => {
                return match self.operator {
                    Operator::Eq => self.value.is_null(),
                    Operator::Ne => !self.value.is_null(),
                    _ => false,
                };
            }
        };

        match self.operator {
            Operator::Eq => values_equal(field_value, &self.value),
            Operator::Ne => !values_equal(field_value, &self.value),
            Operator::Lt => compare(field_value, &self.value).map(|o| o.is_lt()).unwrap_or(false),
            Operator::Gt => compare(field_value, &self.value).map(|o| o.is_gt()).unwrap_or(false),
            Operator::Le => compare(field_value, &self.value).map(|o| o.is_le()).unwrap_or(false),
            Operator::Ge => compare(field_value, &self.value).map(|o| o.is_ge()).unwrap_or(false),
            Operator::In => self
                .value
                .as_array()
                .map(|list| list.iter().any(|v| values_equal(field_value, v)))
                .unwrap_or(false),
            Operator::NotIn => self
                .value
                .as_array()
                .map(|list| !list.iter().any(|v| values_equal(field_value, v)))
                .unwrap_or(false),
            Operator::Contains => match (field_value, self.value.as_str()) {
                (FieldValue::Str(haystack), Some(needle)) => haystack.contains(needle),
                _ => false,
            },
            Operator::MatchesRegex => match (field_value, self.value.as_str()) {
                (FieldValue::Str(text), Some(pattern)) => Regex::new(pattern)
                    .map(|re| re.is_match(text))
                    .unwrap_or(false),
                _ => false,
            },
        }
    }
}

fn values_equal(field: &FieldValue, value: &serde_json::Value) -> bool {
    match (field, value) {
        (FieldValue::Str(a), serde_json::Value::String(b)) => a == b,
        (FieldValue::Bool(a), serde_json::Value::Bool(b)) => a == b,
        (FieldValue::Num(a), serde_json::Value::Number(b)) => {
            b.as_f64().map(|b| (a - b).abs() < f64::EPSILON).unwrap_or(false)
        }
        _ => false,
    }
}

fn compare(field: &FieldValue, value: &serde_json::Value) -> Option<std::cmp::Ordering> {
    match (field, value) {
        (FieldValue::Num(a), serde_json::Value::Number(b)) => a.partial_cmp(&b.as_f64()?),
        (FieldValue::Str(a), serde_json::Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Logic {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub action: RecommendedAction,
    #[serde(default = "default_logic")]
    pub logic: Logic,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default)]
    pub conditions: Vec<RuleCondition>,
}

fn default_logic() -> Logic {
    Logic::And
}

fn default_priority() -> i64 {
    50
}

impl Rule {
    /// A rule with no conditions never matches.
    pub fn evaluate(&self, item: &HashMap<&'static str, FieldValue>) -> bool {
        if self.conditions.is_empty() {
            return false;
        }
        match self.logic {
            Logic::And => self.conditions.iter().all(|c| c.evaluate(item)),
            Logic::Or => self.conditions.iter().any(|c| c.evaluate(item)),
        }
    }
}

/// Priority-ordered rule evaluation: the first rule that matches assigns
/// its action; otherwise the default action applies.
pub struct RuleEngine {
    rules: Vec<Rule>,
    default_action: RecommendedAction,
}

impl RuleEngine {
    pub fn new(default_action: RecommendedAction) -> Self {
        RuleEngine {
            rules: Vec::new(),
            default_action,
        }
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
        self.rules.sort_by_key(|r| std::cmp::Reverse(r.priority));
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Reject unknown fields, malformed list values and invalid regexes
    /// before any evaluation runs.
    pub fn validate(&self) -> Result<()> {
        for rule in &self.rules {
            for condition in &rule.conditions {
                condition.validate()?;
            }
        }
        Ok(())
    }

    pub fn evaluate(&self, item: &HashMap<&'static str, FieldValue>) -> RecommendedAction {
        for rule in &self.rules {
            if rule.evaluate(item) {
                return rule.action;
            }
        }
        self.default_action
    }

    /// Built-in strategies. `custom` yields an empty engine; the caller
    /// loads rules from a config file.
    pub fn strategy(strategy: &str, format_param: Option<&str>) -> Result<RuleEngine> {
        let mut engine = RuleEngine::new(RecommendedAction::Keep);

        match strategy {
            "eliminate-duplicates" => {
                engine.add_rule(Rule {
                    name: "Keep best quality".to_string(),
                    action: RecommendedAction::Keep,
                    logic: Logic::And,
                    priority: 100,
                    conditions: vec![RuleCondition::new(
                        "is_best",
                        Operator::Eq,
                        serde_json::json!(true),
                    )],
                });
                engine.add_rule(Rule {
                    name: "Delete non-best".to_string(),
                    action: RecommendedAction::Delete,
                    logic: Logic::And,
                    priority: 10,
                    conditions: vec![RuleCondition::new(
                        "is_best",
                        Operator::Eq,
                        serde_json::json!(false),
                    )],
                });
            }
            "keep-lossless" => {
                engine.add_rule(Rule {
                    name: "Keep lossless files".to_string(),
                    action: RecommendedAction::Keep,
                    logic: Logic::And,
                    priority: 100,
                    conditions: vec![RuleCondition::new(
                        "is_lossless",
                        Operator::Eq,
                        serde_json::json!(true),
                    )],
                });
                engine.add_rule(Rule {
                    name: "Delete lossy files".to_string(),
                    action: RecommendedAction::Delete,
                    logic: Logic::And,
                    priority: 10,
                    conditions: vec![RuleCondition::new(
                        "is_lossless",
                        Operator::Eq,
                        serde_json::json!(false),
                    )],
                });
            }
            "keep-format" => {
                let format = format_param
                    .ok_or_else(|| Error::Rules("--format required for keep-format".to_string()))?
                    .to_uppercase();
                engine.add_rule(Rule {
                    name: format!("Keep {format} files"),
                    action: RecommendedAction::Keep,
                    logic: Logic::And,
                    priority: 100,
                    conditions: vec![RuleCondition::new(
                        "format",
                        Operator::Eq,
                        serde_json::json!(format),
                    )],
                });
                engine.add_rule(Rule {
                    name: format!("Delete non-{format} files"),
                    action: RecommendedAction::Delete,
                    logic: Logic::And,
                    priority: 10,
                    conditions: vec![RuleCondition::new(
                        "format",
                        Operator::Ne,
                        serde_json::json!(format),
                    )],
                });
            }
            "custom" => {}
            other => return Err(Error::Rules(format!("unknown strategy: {other}"))),
        }

        Ok(engine)
    }

    /// Load rules from a JSON config:
    /// `{"default_action": "keep", "rules": [{name, action, priority,
    /// logic, conditions: [{field, operator, value}]}]}`.
    pub fn load_from_config(config_path: &Path) -> Result<RuleEngine> {
        let raw = std::fs::read_to_string(config_path)?;
        let config: RulesConfig = serde_json::from_str(&raw)
            .map_err(|e| Error::Rules(format!("{}: {e}", config_path.display())))?;

        let mut engine = RuleEngine::new(config.default_action);
        for rule in config.rules {
            engine.add_rule(rule);
        }
        engine.validate()?;
        Ok(engine)
    }
}

#[derive(Debug, Deserialize)]
struct RulesConfig {
    #[serde(default = "default_action_keep")]
    default_action: RecommendedAction,
    #[serde(default)]
    rules: Vec<Rule>,
}

fn default_action_keep() -> RecommendedAction {
    RecommendedAction::Keep
}
