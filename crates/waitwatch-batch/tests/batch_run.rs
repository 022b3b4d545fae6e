use serde_json::{json, Value};
use std::path::Path;
use tempfile::TempDir;
use waitwatch_alert::batch::CancellationToken;
use waitwatch_batch::config::{read_json, BatchConfig, RulesSeedFile};
use waitwatch_batch::run_batch;

fn write_files(dir: &Path, rules: Value, contexts: Value) -> BatchConfig {
    let rules_path = dir.join("rules.json");
    let contexts_path = dir.join("contexts.json");
    std::fs::write(&rules_path, rules.to_string()).unwrap();
    std::fs::write(&contexts_path, contexts.to_string()).unwrap();

    let config_path = dir.join("batch.toml");
    std::fs::write(
        &config_path,
        format!(
            "rules_path = {:?}\ncontexts_path = {:?}\n\n[engine]\nmax_concurrent = 2\n",
            rules_path.to_str().unwrap(),
            contexts_path.to_str().unwrap()
        ),
    )
    .unwrap();
    BatchConfig::load(config_path.to_str().unwrap()).unwrap()
}

fn seed() -> Value {
    json!({
        "rules": [
            {
                "name": "Long wait",
                "severity": "high",
                "conditions": {"kind": "threshold", "field": "wait_weeks", "operator": ">", "threshold": 12}
            },
            {
                "name": "Long wait",
                "severity": "low",
                "conditions": {"kind": "threshold", "field": "wait_weeks", "operator": ">", "threshold": 20}
            },
            {
                "name": "Broken",
                "severity": "low",
                "conditions": {"kind": "trend", "field": "wait_weeks", "period_days": 0}
            }
        ]
    })
}

#[tokio::test]
async fn writes_one_line_per_subject() {
    let dir = TempDir::new().unwrap();
    let config = write_files(
        dir.path(),
        seed(),
        json!({
            "contexts": [
                {"subject_id": "p-1", "current_values": {"wait_weeks": 16}},
                {"subject_id": "p-2", "current_values": {"wait_weeks": 3}},
                {"subject_id": "p-3", "current_values": {"wait_weeks": "n/a"}}
            ]
        }),
    );
    assert_eq!(config.engine.max_concurrent, 2);
    assert_eq!(config.engine.cache_ttl_secs, 1800);

    let mut out = Vec::new();
    let report = run_batch(&config, &CancellationToken::new(), &mut out)
        .await
        .unwrap();

    assert_eq!(report.completed, 3);
    assert_eq!(report.alerts_triggered, 1);

    let lines: Vec<Value> = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["subject_id"], "p-1");
    assert_eq!(lines[0]["status"], "completed");
    assert_eq!(lines[0]["report"]["alerts"][0]["severity"], "high");
    // Duplicate name and invalid rule were not seeded
    assert_eq!(lines[0]["report"]["outcomes"].as_array().unwrap().len(), 1);
    assert_eq!(lines[2]["report"]["outcomes"][0]["status"], "not_triggered");
}

#[tokio::test]
async fn cancelled_run_evaluates_nothing() {
    let dir = TempDir::new().unwrap();
    let config = write_files(
        dir.path(),
        seed(),
        json!({"contexts": [{"subject_id": "p-1", "current_values": {"wait_weeks": 16}}]}),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut out = Vec::new();
    let report = run_batch(&config, &cancel, &mut out).await.unwrap();

    assert_eq!(report.cancelled, 1);
    let line: Value = serde_json::from_slice(out.trim_ascii_end()).unwrap();
    assert_eq!(line["status"], "cancelled");
}

#[test]
fn missing_config_is_an_error() {
    let err = BatchConfig::load("/nonexistent/batch.toml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn shipped_demo_files_parse() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config");
    let config = BatchConfig::load(root.join("batch.toml").to_str().unwrap()).unwrap();
    assert_eq!(config.engine.max_concurrent, 8);

    let seed: RulesSeedFile = read_json(root.join("rules.seed.json").to_str().unwrap()).unwrap();
    assert_eq!(seed.rules.len(), 3);
}
