use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use waitwatch_alert::batch::{BatchRunner, CancellationToken, SubjectStatus};
use waitwatch_alert::config::EngineConfig;
use waitwatch_alert::engine::{AlertEngine, RuleStatus};
use waitwatch_alert::store::InMemoryRuleStore;
use waitwatch_common::rule::NewRule;
use waitwatch_common::types::EvaluationContext;

fn catalog() -> Vec<NewRule> {
    serde_json::from_value(json!([
        {
            "id": "long-wait",
            "name": "Long wait",
            "severity": "high",
            "conditions": {"kind": "threshold", "field": "wait_weeks", "operator": ">", "threshold": 12},
            "target_criteria": {"region": ["north", "south"], "age": {"min": 18}},
            "cooldown_minutes": 60,
            "max_triggers_per_day": 2,
            "personalization": {
                "extra_actions": [{
                    "when": {"specialty": "orthopedics"},
                    "action": {"type": "physio", "label": "Book physiotherapy", "target": "/physio"}
                }]
            }
        },
        {
            "id": "cheaper-nearby",
            "name": "Shorter wait nearby",
            "severity": "medium",
            "tenant_id": "nhs-north",
            "conditions": {"kind": "comparison", "field": "wait_weeks"}
        },
        {
            "id": "pilot-only",
            "name": "Pilot alert",
            "severity": "low",
            "ab_test_group": "pilot",
            "conditions": {"kind": "threshold", "field": "wait_weeks", "operator": "gte", "threshold": "1"}
        }
    ]))
    .unwrap()
}

fn subject(id: &str) -> EvaluationContext {
    serde_json::from_value(json!({
        "subject_id": id,
        "tenant_id": "nhs-north",
        "subject_attributes": {"region": "north", "age": 44, "specialty": "orthopedics"},
        "current_values": {"wait_weeks": "18 weeks"},
        "comparison_candidates": {
            "regional": [
                {"name": "Leeds General", "wait_weeks": 9, "distance": "12 km"},
                {"name": "St James", "wait_weeks": "17"}
            ]
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn json_catalog_end_to_end() {
    let engine = Arc::new(AlertEngine::new(
        Arc::new(InMemoryRuleStore::new()),
        EngineConfig::default(),
    ));
    for rule in catalog() {
        engine.create_rule(rule).await.unwrap();
    }

    let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    let report = engine
        .evaluate_subject_alerts_at("p-1", &subject("p-1"), now)
        .await
        .unwrap();

    // pilot-only is filtered out by its A/B group
    let ids: Vec<&str> = report.outcomes.iter().map(|o| o.rule_id.as_str()).collect();
    assert_eq!(ids, vec!["long-wait", "cheaper-nearby"]);
    assert_eq!(report.alerts.len(), 2);

    let long_wait = &report.alerts[0];
    assert_eq!(long_wait.data["current_value"], json!(18.0));
    assert!(long_wait
        .recommended_actions
        .iter()
        .any(|a| a.action_type == "physio"));

    let comparison = &report.alerts[1];
    assert_eq!(comparison.recommended_actions.len(), 1);
    assert_eq!(
        comparison.recommended_actions[0].target,
        "/transfer?to=Leeds General"
    );

    let serialized = serde_json::to_value(&report).unwrap();
    assert_eq!(serialized["outcomes"][0]["status"], "triggered");

    let later = engine
        .evaluate_subject_alerts_at("p-1", &subject("p-1"), now + Duration::minutes(10))
        .await
        .unwrap();
    assert!(later.alerts.is_empty());
    let status = serde_json::to_value(&later.outcomes[0]).unwrap();
    assert_eq!(status["status"], "suppressed");
    assert_eq!(status["reason"], "cooldown");
    assert!(matches!(
        later.outcomes[1].status,
        RuleStatus::Suppressed(_)
    ));
}

#[tokio::test]
async fn batch_over_many_subjects() {
    let engine = Arc::new(AlertEngine::new(
        Arc::new(InMemoryRuleStore::new()),
        EngineConfig {
            max_concurrent: 3,
            ..EngineConfig::default()
        },
    ));
    for rule in catalog() {
        engine.create_rule(rule).await.unwrap();
    }

    let contexts = (0..10).map(|i| subject(&format!("p-{i}"))).collect();
    let report = BatchRunner::new(engine.clone())
        .run(contexts, &CancellationToken::new())
        .await;

    assert_eq!(report.completed, 10);
    assert_eq!(report.alerts_triggered, 20);
    assert!(report
        .subjects
        .iter()
        .all(|run| matches!(run.status, SubjectStatus::Completed { .. })));

    let stats = engine.get_stats();
    assert_eq!(stats.alerts_triggered, 20);
    assert_eq!(stats.cached_entries, 10);
    assert_eq!(stats.cached_tenants, 1);
}
