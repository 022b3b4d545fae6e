use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::rule::RuleKind;

/// Alert severity level, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use waitwatch_common::types::Severity;
///
/// let sev: Severity = "high".parse().unwrap();
/// assert_eq!(sev, Severity::High);
/// assert_eq!(sev.to_string(), "high");
/// assert!(Severity::Critical > Severity::Low);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// One timestamped snapshot of a subject's metrics.
///
/// The snapshot has the same shape as [`EvaluationContext::current_values`];
/// the timestamp sits alongside the values when serialized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoricalSample {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub values: HashMap<String, Value>,
}

impl HistoricalSample {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp: Some(timestamp),
            values: HashMap::new(),
        }
    }

    pub fn with_value(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }
}

/// An alternative entity offered to the comparison evaluator, carrying its
/// own value for the compared field (e.g. another hospital's wait).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonCandidate {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub distance: Option<String>,
    #[serde(flatten)]
    pub values: HashMap<String, Value>,
}

impl ComparisonCandidate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: None,
            distance: None,
            values: HashMap::new(),
        }
    }

    pub fn with_value(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }
}

/// Per-subject snapshot handed to the engine for one evaluation pass.
///
/// The caller assembles this before invoking the engine; the engine never
/// fetches data itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationContext {
    pub subject_id: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Attributes used for target matching and personalization
    /// (e.g. region, language, communication_style).
    #[serde(default)]
    pub subject_attributes: HashMap<String, Value>,
    /// Latest observed metrics.
    #[serde(default)]
    pub current_values: HashMap<String, Value>,
    /// Snapshots in chronological order.
    #[serde(default)]
    pub historical_values: Vec<HistoricalSample>,
    /// Comparison candidates keyed by comparison type
    /// (`regional`, `national`, `peer`, ...).
    #[serde(default)]
    pub comparison_candidates: HashMap<String, Vec<ComparisonCandidate>>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl EvaluationContext {
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            tenant_id: None,
            subject_attributes: HashMap::new(),
            current_values: HashMap::new(),
            historical_values: Vec::new(),
            comparison_candidates: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.subject_attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_current_value(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.current_values.insert(field.into(), value.into());
        self
    }

    pub fn with_sample(mut self, sample: HistoricalSample) -> Self {
        self.historical_values.push(sample);
        self
    }

    pub fn with_candidates(
        mut self,
        comparison_type: impl Into<String>,
        candidates: Vec<ComparisonCandidate>,
    ) -> Self {
        self.comparison_candidates
            .insert(comparison_type.into(), candidates);
        self
    }

    /// Preferred locale from the `language` attribute, if any.
    pub fn language(&self) -> Option<&str> {
        self.subject_attributes.get("language").and_then(Value::as_str)
    }

    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.subject_attributes.get(key).and_then(Value::as_str)
    }
}

/// A follow-up suggested to the subject alongside an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendedAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub label: String,
    pub target: String,
}

impl RecommendedAction {
    pub fn new(
        action_type: impl Into<String>,
        label: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            action_type: action_type.into(),
            label: label.into(),
            target: target.into(),
        }
    }
}

/// A triggered alert. Non-triggers never leave the engine, so `triggered`
/// is always true on a returned value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertResult {
    pub id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub kind: RuleKind,
    pub subject_id: String,
    pub tenant_id: Option<String>,
    pub triggered: bool,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    /// Tone-adjusted rewrite of `message`; `message` itself is never altered.
    pub personalized_message: Option<String>,
    /// Evaluator-specific evidence.
    pub data: Value,
    pub recommended_actions: Vec<RecommendedAction>,
    pub created_at: DateTime<Utc>,
}

impl AlertResult {
    /// The message a delivery channel should send.
    pub fn display_message(&self) -> &str {
        self.personalized_message.as_deref().unwrap_or(&self.message)
    }
}

/// Coerce a loosely typed metric value to `f64`.
///
/// Strings have thousands separators stripped and may carry a trailing
/// `weeks` unit, matching how upstream feeds publish waiting times.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use waitwatch_common::types::parse_numeric;
///
/// assert_eq!(parse_numeric(&json!(16)), Some(16.0));
/// assert_eq!(parse_numeric(&json!("1,250.5")), Some(1250.5));
/// assert_eq!(parse_numeric(&json!("18 weeks")), Some(18.0));
/// assert_eq!(parse_numeric(&json!("n/a")), None);
/// assert_eq!(parse_numeric(&json!(null)), None);
/// ```
pub fn parse_numeric(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned = s.replace(',', "");
            let cleaned = cleaned.trim();
            let cleaned = cleaned.strip_suffix("weeks").unwrap_or(cleaned);
            let cleaned = cleaned.strip_suffix('周').unwrap_or(cleaned);
            cleaned.trim().parse::<f64>().ok()
        }
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}
