//! Batch driver: loads a rule catalog and subject contexts from disk,
//! fans the evaluations out over the alert engine and writes one JSON line
//! per subject.

pub mod config;
pub mod rule_seed;

use std::io::Write;
use std::sync::Arc;
use waitwatch_alert::batch::{BatchReport, BatchRunner, CancellationToken};
use waitwatch_alert::engine::AlertEngine;
use waitwatch_alert::store::InMemoryRuleStore;

use crate::config::{read_json, BatchConfig, ContextsFile, RulesSeedFile};

/// Runs one batch pass described by `config`, writing each subject's
/// outcome to `out` as a JSON line.
pub async fn run_batch<W: Write>(
    config: &BatchConfig,
    cancel: &CancellationToken,
    out: &mut W,
) -> anyhow::Result<BatchReport> {
    let engine = Arc::new(AlertEngine::new(
        Arc::new(InMemoryRuleStore::new()),
        config.engine.clone(),
    ));

    let seed: RulesSeedFile = read_json(&config.rules_path)?;
    rule_seed::seed_rules(&engine, seed).await?;

    let contexts: ContextsFile = read_json(&config.contexts_path)?;
    let report = BatchRunner::new(engine.clone())
        .run(contexts.contexts, cancel)
        .await;

    for run in &report.subjects {
        serde_json::to_writer(&mut *out, run)?;
        writeln!(out)?;
    }
    out.flush()?;

    let stats = engine.get_stats();
    tracing::info!(
        rules_evaluated = stats.rules_evaluated,
        alerts_triggered = stats.alerts_triggered,
        alerts_suppressed = stats.alerts_suppressed,
        evaluation_failures = stats.evaluation_failures,
        rules_skipped = stats.rules_skipped,
        "Engine stats"
    );

    Ok(report)
}
