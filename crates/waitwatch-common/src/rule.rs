//! Rule catalog types.
//!
//! Conditions are a tagged union keyed by rule kind, so a threshold rule
//! always carries threshold fields and a malformed rule is rejected when it
//! is deserialized or validated rather than when it is evaluated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::types::{parse_numeric, RecommendedAction, Severity};

/// Evaluator family a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Threshold,
    Trend,
    Anomaly,
    Comparison,
    Opportunity,
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Threshold => write!(f, "threshold"),
            Self::Trend => write!(f, "trend"),
            Self::Anomaly => write!(f, "anomaly"),
            Self::Comparison => write!(f, "comparison"),
            Self::Opportunity => write!(f, "opportunity"),
        }
    }
}

impl FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "threshold" => Ok(Self::Threshold),
            "trend" => Ok(Self::Trend),
            "anomaly" => Ok(Self::Anomaly),
            "comparison" => Ok(Self::Comparison),
            "opportunity" => Ok(Self::Opportunity),
            _ => Err(format!("unknown rule kind: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    Equal,
}

/// Tolerance for `==` on floating point values.
pub const EQUAL_EPSILON: f64 = 0.001;

impl FromStr for CompareOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ">" | "gt" | "greater_than" => Ok(Self::GreaterThan),
            "<" | "lt" | "less_than" => Ok(Self::LessThan),
            ">=" | "gte" | "greater_equal" => Ok(Self::GreaterEqual),
            "<=" | "lte" | "less_equal" => Ok(Self::LessEqual),
            "==" | "eq" | "equal" => Ok(Self::Equal),
            _ => Err(format!("unknown compare operator: {s}")),
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GreaterThan => write!(f, ">"),
            Self::LessThan => write!(f, "<"),
            Self::GreaterEqual => write!(f, ">="),
            Self::LessEqual => write!(f, "<="),
            Self::Equal => write!(f, "=="),
        }
    }
}

impl Serialize for CompareOp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CompareOp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl CompareOp {
    pub fn check(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::LessThan => value < threshold,
            Self::GreaterEqual => value >= threshold,
            Self::LessEqual => value <= threshold,
            Self::Equal => (value - threshold).abs() < EQUAL_EPSILON,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendType {
    Increase,
    Decrease,
    Stable,
}

impl std::fmt::Display for TrendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Increase => write!(f, "increase"),
            Self::Decrease => write!(f, "decrease"),
            Self::Stable => write!(f, "stable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConditions {
    pub field: String,
    pub operator: CompareOp,
    #[serde(deserialize_with = "de_numeric")]
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendConditions {
    pub field: String,
    #[serde(default = "default_trend_type")]
    pub trend_type: TrendType,
    #[serde(default = "default_period_days")]
    pub period_days: u32,
    #[serde(default = "default_min_change_percent")]
    pub min_change_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonConditions {
    pub field: String,
    #[serde(default = "default_comparison_type")]
    pub comparison_type: String,
    #[serde(default = "default_min_improvement")]
    pub min_improvement: f64,
}

fn default_trend_type() -> TrendType {
    TrendType::Increase
}

fn default_period_days() -> u32 {
    7
}

fn default_min_change_percent() -> f64 {
    5.0
}

fn default_comparison_type() -> String {
    "regional".to_string()
}

fn default_min_improvement() -> f64 {
    20.0
}

fn de_numeric<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    parse_numeric(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected a numeric value, got {value}")))
}

/// Kind-specific rule configuration.
///
/// Serialized with an inline `kind` tag:
/// `{"kind": "threshold", "field": "wait_weeks", "operator": ">", "threshold": 12}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleConditions {
    Threshold(ThresholdConditions),
    Trend(TrendConditions),
    Comparison(ComparisonConditions),
    /// Open configuration for a custom anomaly evaluator.
    Anomaly(Map<String, Value>),
    /// Open configuration for a custom opportunity evaluator.
    Opportunity(Map<String, Value>),
}

impl RuleConditions {
    pub fn kind(&self) -> RuleKind {
        match self {
            Self::Threshold(_) => RuleKind::Threshold,
            Self::Trend(_) => RuleKind::Trend,
            Self::Comparison(_) => RuleKind::Comparison,
            Self::Anomaly(_) => RuleKind::Anomaly,
            Self::Opportunity(_) => RuleKind::Opportunity,
        }
    }

    /// The watched metric, for kinds that name one.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Threshold(c) => Some(&c.field),
            Self::Trend(c) => Some(&c.field),
            Self::Comparison(c) => Some(&c.field),
            Self::Anomaly(m) | Self::Opportunity(m) => m.get("field").and_then(Value::as_str),
        }
    }
}

/// Inclusive numeric range; a missing bound is unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RangeBound {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

/// A single target criterion against one subject attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Criterion {
    /// Attribute must be one of the listed values.
    OneOf(Vec<Value>),
    /// Attribute must be numeric and fall inside the range.
    Range(RangeBound),
    /// Attribute must equal the value.
    Equals(Value),
}

/// Attribute matcher deciding which subjects a rule applies to.
/// Empty criteria match every subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetCriteria(pub BTreeMap<String, Criterion>);

impl TargetCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, attribute: impl Into<String>, criterion: Criterion) -> Self {
        self.0.insert(attribute.into(), criterion);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Criterion)> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommunicationStyle {
    #[default]
    Formal,
    Casual,
    Urgent,
}

impl FromStr for CommunicationStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "formal" => Ok(Self::Formal),
            "casual" => Ok(Self::Casual),
            "urgent" => Ok(Self::Urgent),
            _ => Err(format!("unknown communication style: {s}")),
        }
    }
}

/// An action appended when the subject's attributes match `when`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalAction {
    #[serde(default)]
    pub when: TargetCriteria,
    pub action: RecommendedAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalizationConfig {
    /// Forces a tone regardless of the subject's `communication_style`.
    #[serde(default)]
    pub style: Option<CommunicationStyle>,
    /// Offer private/local care options based on the subject profile.
    #[serde(default = "default_true")]
    pub suggest_care_options: bool,
    #[serde(default)]
    pub extra_actions: Vec<ConditionalAction>,
}

impl Default for PersonalizationConfig {
    fn default() -> Self {
        Self {
            style: None,
            suggest_care_options: default_true(),
            extra_actions: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cooldown_minutes() -> u32 {
    60
}

fn default_max_triggers_per_day() -> u32 {
    5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub conditions: RuleConditions,
    pub severity: Severity,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub target_criteria: TargetCriteria,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u32,
    #[serde(default = "default_max_triggers_per_day")]
    pub max_triggers_per_day: u32,
    #[serde(default)]
    pub personalization: PersonalizationConfig,
    /// When set, only subjects whose `ab_test_group` attribute equals this
    /// value receive the rule.
    #[serde(default)]
    pub ab_test_group: Option<String>,
    /// `None` marks a global rule.
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    pub fn kind(&self) -> RuleKind {
        self.conditions.kind()
    }

    pub fn is_global(&self) -> bool {
        self.tenant_id.is_none()
    }

    /// Checks the configuration for values no evaluator could act on.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("rule id must not be empty".into());
        }
        if self.name.trim().is_empty() {
            return Err("rule name must not be empty".into());
        }
        match &self.conditions {
            RuleConditions::Threshold(c) => {
                require_field(&c.field)?;
                if !c.threshold.is_finite() {
                    return Err(format!("threshold must be finite, got {}", c.threshold));
                }
            }
            RuleConditions::Trend(c) => {
                require_field(&c.field)?;
                if c.period_days == 0 {
                    return Err("period_days must be at least 1".into());
                }
                if !(c.min_change_percent >= 0.0) {
                    return Err(format!(
                        "min_change_percent must be non-negative, got {}",
                        c.min_change_percent
                    ));
                }
            }
            RuleConditions::Comparison(c) => {
                require_field(&c.field)?;
                if !(c.min_improvement >= 0.0) {
                    return Err(format!(
                        "min_improvement must be non-negative, got {}",
                        c.min_improvement
                    ));
                }
            }
            RuleConditions::Anomaly(_) | RuleConditions::Opportunity(_) => {}
        }
        let criteria = self
            .target_criteria
            .iter()
            .chain(self.personalization.extra_actions.iter().flat_map(|a| a.when.iter()));
        for (attribute, criterion) in criteria {
            if let Criterion::Range(RangeBound {
                min: Some(min),
                max: Some(max),
            }) = criterion
            {
                if min > max {
                    return Err(format!(
                        "range for '{attribute}' has min {min} greater than max {max}"
                    ));
                }
            }
        }
        Ok(())
    }
}

fn require_field(field: &str) -> Result<(), String> {
    if field.trim().is_empty() {
        Err("conditions.field must not be empty".into())
    } else {
        Ok(())
    }
}

/// Input for creating a rule. A missing `id` is generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRule {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub conditions: RuleConditions,
    pub severity: Severity,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub target_criteria: TargetCriteria,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u32,
    #[serde(default = "default_max_triggers_per_day")]
    pub max_triggers_per_day: u32,
    #[serde(default)]
    pub personalization: PersonalizationConfig,
    #[serde(default)]
    pub ab_test_group: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

impl NewRule {
    pub fn new(name: impl Into<String>, severity: Severity, conditions: RuleConditions) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: String::new(),
            conditions,
            severity,
            enabled: true,
            target_criteria: TargetCriteria::default(),
            cooldown_minutes: default_cooldown_minutes(),
            max_triggers_per_day: default_max_triggers_per_day(),
            personalization: PersonalizationConfig::default(),
            ab_test_group: None,
            tenant_id: None,
        }
    }

    pub fn into_rule(self, now: DateTime<Utc>) -> Rule {
        Rule {
            id: self.id.unwrap_or_else(crate::id::next_id),
            name: self.name,
            description: self.description,
            conditions: self.conditions,
            severity: self.severity,
            enabled: self.enabled,
            target_criteria: self.target_criteria,
            cooldown_minutes: self.cooldown_minutes,
            max_triggers_per_day: self.max_triggers_per_day,
            personalization: self.personalization,
            ab_test_group: self.ab_test_group,
            tenant_id: self.tenant_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update; `None` leaves the field untouched.
///
/// `ab_test_group` and `tenant_id` are nullable, so they take
/// `Some(None)` to clear them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RulePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub conditions: Option<RuleConditions>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub target_criteria: Option<TargetCriteria>,
    #[serde(default)]
    pub cooldown_minutes: Option<u32>,
    #[serde(default)]
    pub max_triggers_per_day: Option<u32>,
    #[serde(default)]
    pub personalization: Option<PersonalizationConfig>,
    #[serde(default, deserialize_with = "double_option")]
    pub ab_test_group: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub tenant_id: Option<Option<String>>,
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl RulePatch {
    /// Merges the set fields into `rule` and bumps `updated_at`.
    pub fn apply(self, rule: &mut Rule, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            rule.name = name;
        }
        if let Some(description) = self.description {
            rule.description = description;
        }
        if let Some(conditions) = self.conditions {
            rule.conditions = conditions;
        }
        if let Some(severity) = self.severity {
            rule.severity = severity;
        }
        if let Some(enabled) = self.enabled {
            rule.enabled = enabled;
        }
        if let Some(target_criteria) = self.target_criteria {
            rule.target_criteria = target_criteria;
        }
        if let Some(cooldown_minutes) = self.cooldown_minutes {
            rule.cooldown_minutes = cooldown_minutes;
        }
        if let Some(max_triggers_per_day) = self.max_triggers_per_day {
            rule.max_triggers_per_day = max_triggers_per_day;
        }
        if let Some(personalization) = self.personalization {
            rule.personalization = personalization;
        }
        if let Some(ab_test_group) = self.ab_test_group {
            rule.ab_test_group = ab_test_group;
        }
        if let Some(tenant_id) = self.tenant_id {
            rule.tenant_id = tenant_id;
        }
        rule.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conditions_deserialize_with_inline_kind() {
        let conditions: RuleConditions = serde_json::from_value(json!({
            "kind": "threshold",
            "field": "wait_weeks",
            "operator": "gt",
            "threshold": "1,200"
        }))
        .unwrap();
        assert_eq!(conditions.kind(), RuleKind::Threshold);
        match conditions {
            RuleConditions::Threshold(c) => {
                assert_eq!(c.operator, CompareOp::GreaterThan);
                assert_eq!(c.threshold, 1200.0);
            }
            other => panic!("unexpected conditions: {other:?}"),
        }
    }

    #[test]
    fn unparsable_threshold_is_rejected() {
        let err = serde_json::from_value::<RuleConditions>(json!({
            "kind": "threshold",
            "field": "wait_weeks",
            "operator": ">",
            "threshold": "soon"
        }));
        assert!(err.is_err());
    }

    #[test]
    fn trend_conditions_fill_defaults() {
        let conditions: RuleConditions =
            serde_json::from_value(json!({"kind": "trend", "field": "wait_weeks"})).unwrap();
        let RuleConditions::Trend(c) = conditions else {
            panic!("expected trend conditions");
        };
        assert_eq!(c.trend_type, TrendType::Increase);
        assert_eq!(c.period_days, 7);
        assert_eq!(c.min_change_percent, 5.0);
    }

    #[test]
    fn criteria_parse_each_shape() {
        let criteria: TargetCriteria = serde_json::from_value(json!({
            "region": ["north", "south"],
            "age": {"min": 18, "max": 65},
            "specialty": "cardiology"
        }))
        .unwrap();
        assert!(matches!(criteria.0["region"], Criterion::OneOf(_)));
        assert!(matches!(criteria.0["age"], Criterion::Range(_)));
        assert!(matches!(criteria.0["specialty"], Criterion::Equals(_)));
    }

    #[test]
    fn validate_rejects_inverted_range() {
        let mut rule = NewRule::new(
            "Long wait",
            Severity::High,
            RuleConditions::Threshold(ThresholdConditions {
                field: "wait_weeks".into(),
                operator: CompareOp::GreaterThan,
                threshold: 12.0,
            }),
        )
        .into_rule(Utc::now());
        rule.target_criteria = TargetCriteria::new().with(
            "age",
            Criterion::Range(RangeBound {
                min: Some(65.0),
                max: Some(18.0),
            }),
        );
        assert!(rule.validate().unwrap_err().contains("age"));
    }

    #[test]
    fn patch_merges_only_set_fields() {
        let mut rule = NewRule::new(
            "Long wait",
            Severity::High,
            RuleConditions::Threshold(ThresholdConditions {
                field: "wait_weeks".into(),
                operator: CompareOp::GreaterThan,
                threshold: 12.0,
            }),
        )
        .into_rule(Utc::now() - chrono::Duration::hours(1));
        rule.tenant_id = Some("trust-a".into());
        let before = rule.updated_at;

        let patch: RulePatch =
            serde_json::from_value(json!({"severity": "critical", "tenant_id": null})).unwrap();
        patch.apply(&mut rule, Utc::now());

        assert_eq!(rule.severity, Severity::Critical);
        assert_eq!(rule.name, "Long wait");
        assert!(rule.tenant_id.is_none());
        assert!(rule.updated_at > before);
    }
}
