use crate::evaluators::{locale_for, triggered_result};
use crate::RuleEvaluator;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use waitwatch_common::i18n::TRANSLATIONS;
use waitwatch_common::rule::{Rule, RuleConditions, RuleKind};
use waitwatch_common::types::{
    parse_numeric, AlertResult, ComparisonCandidate, EvaluationContext, RecommendedAction,
};

/// Maximum number of alternatives reported per trigger.
pub const MAX_ALTERNATIVES: usize = 3;

/// Supplies the alternatives a subject is compared against.
///
/// Region, locale and peer-group filtering belong to the provider; the
/// evaluator only ranks what it is given.
pub trait CandidateProvider: Send + Sync {
    fn candidates(
        &self,
        context: &EvaluationContext,
        comparison_type: &str,
        field: &str,
    ) -> Vec<ComparisonCandidate>;
}

/// Reads candidates the caller attached to the context under the rule's
/// comparison type.
pub struct ContextCandidates;

impl CandidateProvider for ContextCandidates {
    fn candidates(
        &self,
        context: &EvaluationContext,
        comparison_type: &str,
        _field: &str,
    ) -> Vec<ComparisonCandidate> {
        context
            .comparison_candidates
            .get(comparison_type)
            .cloned()
            .unwrap_or_default()
    }
}

/// An alternative that beats the subject's current value by at least the
/// rule's `min_improvement` percent.
#[derive(Debug, Clone, Serialize)]
pub struct BetterOption {
    pub name: String,
    pub value: f64,
    pub improvement: f64,
    pub distance: Option<String>,
    pub location: Option<String>,
}

/// Fires when some alternative entity offers a sufficiently lower value
/// (e.g. a shorter wait) than the subject's own.
pub struct ComparisonEvaluator {
    provider: Arc<dyn CandidateProvider>,
}

impl ComparisonEvaluator {
    pub fn new() -> Self {
        Self::with_provider(Arc::new(ContextCandidates))
    }

    pub fn with_provider(provider: Arc<dyn CandidateProvider>) -> Self {
        Self { provider }
    }
}

impl Default for ComparisonEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEvaluator for ComparisonEvaluator {
    fn supports(&self, kind: RuleKind) -> bool {
        kind == RuleKind::Comparison
    }

    fn evaluate(
        &self,
        rule: &Rule,
        context: &EvaluationContext,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<AlertResult>> {
        let RuleConditions::Comparison(cond) = &rule.conditions else {
            anyhow::bail!("comparison evaluator cannot evaluate a {} rule", rule.kind());
        };

        let Some(current) = context.current_values.get(&cond.field).and_then(parse_numeric) else {
            return Ok(None);
        };
        // No meaningful improvement percentage against a zero baseline.
        if current.abs() < f64::EPSILON {
            return Ok(None);
        }

        let candidates = self
            .provider
            .candidates(context, &cond.comparison_type, &cond.field);
        let options = rank_alternatives(current, &cond.field, candidates, cond.min_improvement);
        let Some(best) = options.first() else {
            return Ok(None);
        };

        let locale = locale_for(context);
        let current_str = current.to_string();
        let best_str = best.value.to_string();
        let mut message = TRANSLATIONS.render(
            locale,
            "alert.comparison.best",
            &[
                ("field", cond.field.as_str()),
                ("value", current_str.as_str()),
                ("name", best.name.as_str()),
                ("best", best_str.as_str()),
            ],
        );
        if options.len() > 1 {
            let count = (options.len() - 1).to_string();
            message.push_str(&TRANSLATIONS.render(
                locale,
                "alert.comparison.more",
                &[("count", count.as_str())],
            ));
        }

        let actions = options
            .iter()
            .map(|option| {
                RecommendedAction::new(
                    "transfer",
                    TRANSLATIONS.render(locale, "action.transfer", &[("name", option.name.as_str())]),
                    format!("/transfer?to={}", option.name),
                )
            })
            .collect();

        Ok(Some(triggered_result(
            rule,
            context,
            message,
            json!({
                "field": cond.field,
                "current_value": current,
                "comparison_type": cond.comparison_type,
                "better_options": options,
            }),
            actions,
            now,
        )))
    }
}

/// Keeps candidates whose improvement over `current` reaches
/// `min_improvement`, best first, capped at [`MAX_ALTERNATIVES`].
/// Candidates without a numeric value for `field` are ignored.
pub fn rank_alternatives(
    current: f64,
    field: &str,
    candidates: Vec<ComparisonCandidate>,
    min_improvement: f64,
) -> Vec<BetterOption> {
    let mut options: Vec<BetterOption> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let value = candidate.values.get(field).and_then(parse_numeric)?;
            let improvement = (current - value) / current * 100.0;
            (improvement >= min_improvement).then(|| BetterOption {
                name: candidate.name,
                value,
                improvement,
                distance: candidate.distance,
                location: candidate.location,
            })
        })
        .collect();

    options.sort_by(|a, b| b.improvement.total_cmp(&a.improvement));
    options.truncate(MAX_ALTERNATIVES);
    options
}
