//! Built-in evaluators and the helpers they share.

pub mod comparison;
pub mod threshold;
pub mod trend;

pub use comparison::{CandidateProvider, ComparisonEvaluator, ContextCandidates};
pub use threshold::ThresholdEvaluator;
pub use trend::TrendEvaluator;

use chrono::{DateTime, Utc};
use serde_json::Value;
use waitwatch_common::i18n::{normalize_locale, DEFAULT_LOCALE};
use waitwatch_common::rule::Rule;
use waitwatch_common::types::{AlertResult, EvaluationContext, RecommendedAction};

/// Locale for subject-facing text, from the `language` attribute.
pub fn locale_for(context: &EvaluationContext) -> &str {
    normalize_locale(context.language().unwrap_or(DEFAULT_LOCALE))
}

/// Builds a triggered result carrying the rule's identity and severity.
pub(crate) fn triggered_result(
    rule: &Rule,
    context: &EvaluationContext,
    message: String,
    data: Value,
    recommended_actions: Vec<RecommendedAction>,
    now: DateTime<Utc>,
) -> AlertResult {
    AlertResult {
        id: waitwatch_common::id::next_id(),
        rule_id: rule.id.clone(),
        rule_name: rule.name.clone(),
        kind: rule.kind(),
        subject_id: context.subject_id.clone(),
        tenant_id: context.tenant_id.clone(),
        triggered: true,
        severity: rule.severity,
        title: rule.name.clone(),
        message,
        personalized_message: None,
        data,
        recommended_actions,
        created_at: now,
    }
}
