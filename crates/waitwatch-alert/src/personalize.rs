//! Subject-tailored wording and follow-up actions for triggered alerts.
//!
//! This stage only adds: the base `message`, `severity` and evaluator
//! actions are left as they are.

use serde_json::Value;
use waitwatch_common::i18n::TRANSLATIONS;
use waitwatch_common::rule::{CommunicationStyle, Rule};
use waitwatch_common::types::{AlertResult, EvaluationContext, RecommendedAction};

use crate::evaluators::locale_for;
use crate::targeting::matches_target_criteria;

pub fn personalize(result: &mut AlertResult, rule: &Rule, context: &EvaluationContext) {
    let locale = locale_for(context);

    let style = rule.personalization.style.unwrap_or_else(|| {
        context
            .attribute_str("communication_style")
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    });
    result.personalized_message = match style {
        CommunicationStyle::Formal => None,
        CommunicationStyle::Casual => Some(TRANSLATIONS.render(
            locale,
            "style.casual",
            &[("message", result.message.as_str())],
        )),
        CommunicationStyle::Urgent => Some(TRANSLATIONS.render(
            locale,
            "style.urgent",
            &[("message", result.message.as_str())],
        )),
    };

    if rule.personalization.suggest_care_options {
        let attributes = &context.subject_attributes;
        if attributes.get("has_private_insurance").and_then(Value::as_bool) == Some(true) {
            push_action(
                &mut result.recommended_actions,
                RecommendedAction::new(
                    "private_consultation",
                    TRANSLATIONS.get(locale, "action.private_consultation", "View private care options"),
                    "/private-options",
                ),
            );
        }
        if context.attribute_str("mobility") == Some("limited") {
            push_action(
                &mut result.recommended_actions,
                RecommendedAction::new(
                    "local_options",
                    TRANSLATIONS.get(locale, "action.local_options", "Find nearby care options"),
                    "/nearby-options",
                ),
            );
        }
    }

    for extra in &rule.personalization.extra_actions {
        if matches_target_criteria(&extra.when, &context.subject_attributes) {
            push_action(&mut result.recommended_actions, extra.action.clone());
        }
    }
}

/// Appends unless an action with the same type and target is present.
fn push_action(actions: &mut Vec<RecommendedAction>, action: RecommendedAction) {
    let duplicate = actions
        .iter()
        .any(|a| a.action_type == action.action_type && a.target == action.target);
    if !duplicate {
        actions.push(action);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use waitwatch_common::rule::{
        CompareOp, ConditionalAction, Criterion, NewRule, RuleConditions, TargetCriteria,
        ThresholdConditions,
    };
    use waitwatch_common::types::Severity;

    fn rule() -> Rule {
        NewRule::new(
            "Long wait",
            Severity::High,
            RuleConditions::Threshold(ThresholdConditions {
                field: "wait_weeks".into(),
                operator: CompareOp::GreaterThan,
                threshold: 12.0,
            }),
        )
        .into_rule(Utc::now())
    }

    fn alert(rule: &Rule, context: &EvaluationContext) -> AlertResult {
        crate::evaluators::triggered_result(
            rule,
            context,
            "wait_weeks reached 16, above threshold 12".into(),
            json!({}),
            vec![RecommendedAction::new("transfer", "Consider switching", "/transfer?to=A")],
            Utc::now(),
        )
    }

    #[test]
    fn formal_style_leaves_message_alone() {
        let rule = rule();
        let context = EvaluationContext::new("s-1");
        let mut result = alert(&rule, &context);

        personalize(&mut result, &rule, &context);

        assert!(result.personalized_message.is_none());
        assert_eq!(result.display_message(), result.message);
        assert_eq!(result.recommended_actions.len(), 1);
    }

    #[test]
    fn rule_style_overrides_subject_preference() {
        let mut rule = rule();
        rule.personalization.style = Some(CommunicationStyle::Urgent);
        let context = EvaluationContext::new("s-1").with_attribute("communication_style", "casual");
        let mut result = alert(&rule, &context);

        personalize(&mut result, &rule, &context);

        assert_eq!(
            result.personalized_message.as_deref(),
            Some("🚨 Urgent: wait_weeks reached 16, above threshold 12")
        );
    }

    #[test]
    fn care_options_can_be_disabled() {
        let mut rule = rule();
        rule.personalization.suggest_care_options = false;
        let context = EvaluationContext::new("s-1").with_attribute("has_private_insurance", true);
        let mut result = alert(&rule, &context);

        personalize(&mut result, &rule, &context);

        assert_eq!(result.recommended_actions.len(), 1);
    }

    #[test]
    fn extra_actions_are_conditional_and_deduplicated() {
        let mut rule = rule();
        rule.personalization.extra_actions = vec![
            ConditionalAction {
                when: TargetCriteria::new().with("specialty", Criterion::Equals(json!("orthopedics"))),
                action: RecommendedAction::new("physio", "Book physiotherapy", "/physio"),
            },
            ConditionalAction {
                when: TargetCriteria::new(),
                action: RecommendedAction::new("transfer", "Switch", "/transfer?to=A"),
            },
            ConditionalAction {
                when: TargetCriteria::new().with("specialty", Criterion::Equals(json!("cardiology"))),
                action: RecommendedAction::new("cardio", "Cardiology hotline", "/cardio"),
            },
        ];
        let context = EvaluationContext::new("s-1").with_attribute("specialty", "orthopedics");
        let mut result = alert(&rule, &context);

        personalize(&mut result, &rule, &context);

        let types: Vec<&str> = result
            .recommended_actions
            .iter()
            .map(|a| a.action_type.as_str())
            .collect();
        assert_eq!(types, vec!["transfer", "physio"]);
        assert_eq!(result.severity, Severity::High);
    }
}
