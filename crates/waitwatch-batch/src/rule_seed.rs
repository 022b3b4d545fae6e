use std::collections::HashSet;
use waitwatch_alert::engine::AlertEngine;

use crate::config::RulesSeedFile;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Creates the seed's rules through the engine. Rules whose name already
/// exists in their tenant's catalog are skipped; invalid rules are logged
/// and counted without stopping the seed.
pub async fn seed_rules(engine: &AlertEngine, seed: RulesSeedFile) -> anyhow::Result<SeedSummary> {
    let mut summary = SeedSummary::default();

    for rule in seed.rules {
        let existing: HashSet<String> = engine
            .list_rules(rule.tenant_id.as_deref())
            .await?
            .into_iter()
            .filter(|r| r.tenant_id == rule.tenant_id)
            .map(|r| r.name)
            .collect();
        if existing.contains(&rule.name) {
            tracing::warn!(name = %rule.name, "Alert rule already exists, skipping");
            summary.skipped += 1;
            continue;
        }

        let name = rule.name.clone();
        match engine.create_rule(rule).await {
            Ok(created) => {
                tracing::info!(name = %name, id = %created.id, kind = %created.kind(), "Seeded alert rule");
                summary.created += 1;
            }
            Err(e) => {
                tracing::error!(name = %name, error = %e, "Failed to seed alert rule");
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        created = summary.created,
        skipped = summary.skipped,
        failed = summary.failed,
        "Rule seed completed"
    );
    Ok(summary)
}
