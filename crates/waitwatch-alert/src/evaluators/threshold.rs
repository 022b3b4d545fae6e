use crate::evaluators::{locale_for, triggered_result};
use crate::RuleEvaluator;
use chrono::{DateTime, Utc};
use serde_json::json;
use waitwatch_common::i18n::TRANSLATIONS;
use waitwatch_common::rule::{CompareOp, Rule, RuleConditions, RuleKind};
use waitwatch_common::types::{parse_numeric, AlertResult, EvaluationContext};

/// Fires when the subject's current value for a field crosses a fixed
/// threshold.
pub struct ThresholdEvaluator;

impl RuleEvaluator for ThresholdEvaluator {
    fn supports(&self, kind: RuleKind) -> bool {
        kind == RuleKind::Threshold
    }

    fn evaluate(
        &self,
        rule: &Rule,
        context: &EvaluationContext,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<AlertResult>> {
        let RuleConditions::Threshold(cond) = &rule.conditions else {
            anyhow::bail!("threshold evaluator cannot evaluate a {} rule", rule.kind());
        };

        let Some(raw) = context.current_values.get(&cond.field) else {
            tracing::debug!(
                rule_id = %rule.id,
                subject_id = %context.subject_id,
                field = %cond.field,
                "Field missing from current values"
            );
            return Ok(None);
        };
        let Some(value) = parse_numeric(raw) else {
            tracing::debug!(
                rule_id = %rule.id,
                subject_id = %context.subject_id,
                field = %cond.field,
                raw = %raw,
                "Current value is not numeric"
            );
            return Ok(None);
        };

        if !cond.operator.check(value, cond.threshold) {
            return Ok(None);
        }

        let value_str = value.to_string();
        let threshold_str = cond.threshold.to_string();
        let message = TRANSLATIONS.render(
            locale_for(context),
            message_key(cond.operator),
            &[
                ("field", cond.field.as_str()),
                ("value", value_str.as_str()),
                ("threshold", threshold_str.as_str()),
            ],
        );

        Ok(Some(triggered_result(
            rule,
            context,
            message,
            json!({
                "field": cond.field,
                "current_value": value,
                "threshold": cond.threshold,
                "operator": cond.operator.to_string(),
            }),
            Vec::new(),
            now,
        )))
    }
}

fn message_key(op: CompareOp) -> &'static str {
    match op {
        CompareOp::GreaterThan | CompareOp::GreaterEqual => "alert.threshold.above",
        CompareOp::LessThan | CompareOp::LessEqual => "alert.threshold.below",
        CompareOp::Equal => "alert.threshold.equal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use waitwatch_common::rule::{NewRule, ThresholdConditions};
    use waitwatch_common::types::Severity;

    fn rule(field: &str, operator: CompareOp, threshold: f64) -> Rule {
        NewRule::new(
            "Threshold",
            Severity::High,
            RuleConditions::Threshold(ThresholdConditions {
                field: field.into(),
                operator,
                threshold,
            }),
        )
        .into_rule(Utc::now())
    }

    fn evaluate(rule: &Rule, field: &str, value: impl Into<Value>) -> Option<AlertResult> {
        let context = EvaluationContext::new("s-1").with_current_value(field, value);
        ThresholdEvaluator
            .evaluate(rule, &context, Utc::now())
            .unwrap()
    }

    #[test]
    fn equal_matches_within_epsilon() {
        let rule = rule("wait_weeks", CompareOp::Equal, 12.0);

        let hit = evaluate(&rule, "wait_weeks", 12.0005).unwrap();
        assert_eq!(hit.message, "wait_weeks is 12.0005, matching threshold 12");
        assert!(evaluate(&rule, "wait_weeks", 11.9995).is_some());

        assert!(evaluate(&rule, "wait_weeks", 12.002).is_none());
        assert!(evaluate(&rule, "wait_weeks", 11.998).is_none());
    }

    #[test]
    fn thousands_separator_is_parsed() {
        let rule = rule("queue_size", CompareOp::GreaterThan, 1000.0);

        let hit = evaluate(&rule, "queue_size", "1,200").unwrap();
        assert_eq!(hit.data["current_value"], json!(1200.0));
        assert_eq!(hit.message, "queue_size reached 1200, above threshold 1000");
        assert!(evaluate(&rule, "queue_size", "1,000").is_none());
    }

    #[test]
    fn below_operators_use_below_message() {
        let rule = rule("wait_weeks", CompareOp::LessEqual, 4.0);

        let hit = evaluate(&rule, "wait_weeks", 4).unwrap();
        assert_eq!(hit.message, "wait_weeks fell to 4, below threshold 4");
        assert_eq!(hit.data["operator"], json!("<="));
    }

    #[test]
    fn missing_or_non_numeric_value_does_not_trigger() {
        let rule = rule("wait_weeks", CompareOp::GreaterThan, 12.0);
        assert!(evaluate(&rule, "other", 20).is_none());
        assert!(evaluate(&rule, "wait_weeks", "soon").is_none());
        assert!(evaluate(&rule, "wait_weeks", Value::Null).is_none());
    }
}
