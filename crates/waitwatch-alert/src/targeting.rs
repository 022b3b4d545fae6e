//! Matching of rule target criteria against subject attributes.

use serde_json::Value;
use std::collections::HashMap;
use waitwatch_common::rule::{Criterion, RangeBound, Rule, TargetCriteria};
use waitwatch_common::types::parse_numeric;

/// Whether `rule` should be evaluated for a subject with `attributes`.
///
/// Disabled rules never apply. A rule pinned to an A/B group applies only
/// to subjects whose `ab_test_group` attribute names that group.
pub fn rule_applies(rule: &Rule, attributes: &HashMap<String, Value>) -> bool {
    if !rule.enabled {
        return false;
    }
    if let Some(group) = &rule.ab_test_group {
        if attributes.get("ab_test_group").and_then(Value::as_str) != Some(group.as_str()) {
            return false;
        }
    }
    matches_target_criteria(&rule.target_criteria, attributes)
}

/// Every criterion must hold; empty criteria match everyone.
pub fn matches_target_criteria(criteria: &TargetCriteria, attributes: &HashMap<String, Value>) -> bool {
    criteria.iter().all(|(key, criterion)| {
        let actual = attributes.get(key).unwrap_or(&Value::Null);
        matches_criterion(criterion, actual)
    })
}

fn matches_criterion(criterion: &Criterion, actual: &Value) -> bool {
    match criterion {
        Criterion::OneOf(allowed) => allowed.iter().any(|v| values_equal(v, actual)),
        Criterion::Range(RangeBound { min, max }) => {
            // A range needs a numeric attribute to compare against
            let Some(value) = parse_numeric(actual) else {
                return false;
            };
            min.map_or(true, |min| value >= min) && max.map_or(true, |max| value <= max)
        }
        Criterion::Equals(expected) => values_equal(expected, actual),
    }
}

/// JSON equality that treats `3` and `3.0` as the same number.
fn values_equal(expected: &Value, actual: &Value) -> bool {
    match (expected.as_f64(), actual.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => expected == actual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn criteria(value: Value) -> TargetCriteria {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn empty_criteria_match_everyone() {
        assert!(matches_target_criteria(&TargetCriteria::new(), &HashMap::new()));
    }

    #[test]
    fn set_membership() {
        let c = criteria(json!({"region": ["north", "south"]}));
        assert!(matches_target_criteria(&c, &attrs(&[("region", json!("north"))])));
        assert!(!matches_target_criteria(&c, &attrs(&[("region", json!("east"))])));
        assert!(!matches_target_criteria(&c, &HashMap::new()));
    }

    #[test]
    fn range_with_open_bounds() {
        let c = criteria(json!({"age": {"min": 18}}));
        assert!(matches_target_criteria(&c, &attrs(&[("age", json!(90))])));
        assert!(matches_target_criteria(&c, &attrs(&[("age", json!("18"))])));
        assert!(!matches_target_criteria(&c, &attrs(&[("age", json!(17))])));
        assert!(!matches_target_criteria(&c, &HashMap::new()));
    }

    #[test]
    fn scalar_equality_is_numeric_aware() {
        let c = criteria(json!({"priority": 3, "specialty": "cardiology"}));
        let subject = attrs(&[("priority", json!(3.0)), ("specialty", json!("cardiology"))]);
        assert!(matches_target_criteria(&c, &subject));

        let other = attrs(&[("priority", json!(3)), ("specialty", json!("oncology"))]);
        assert!(!matches_target_criteria(&c, &other));
    }
}
