use crate::cache::{partition_key, RuleCache};
use crate::config::EngineConfig;
use crate::error::{AlertError, Result};
use crate::evaluators::{ComparisonEvaluator, ThresholdEvaluator, TrendEvaluator};
use crate::frequency::{FrequencyController, Suppression, DAILY_WINDOW_HOURS};
use crate::personalize::personalize;
use crate::store::RuleStore;
use crate::targeting::rule_applies;
use crate::RuleEvaluator;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use waitwatch_common::rule::{NewRule, Rule, RuleKind, RulePatch};
use waitwatch_common::types::{AlertResult, EvaluationContext};

/// What happened to one applicable rule during a subject's pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RuleStatus {
    Triggered { alert_id: String },
    NotTriggered,
    Suppressed(Suppression),
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleOutcome {
    pub rule_id: String,
    pub rule_name: String,
    pub kind: RuleKind,
    #[serde(flatten)]
    pub status: RuleStatus,
}

/// Result of one `evaluate_subject_alerts` call.
#[derive(Debug, Clone, Serialize)]
pub struct SubjectReport {
    pub subject_id: String,
    pub tenant_id: Option<String>,
    pub evaluated_at: DateTime<Utc>,
    /// Triggered alerts in catalog order.
    pub alerts: Vec<AlertResult>,
    /// One entry per applicable rule, in catalog order.
    pub outcomes: Vec<RuleOutcome>,
}

impl SubjectReport {
    pub fn outcome(&self, rule_id: &str) -> Option<&RuleOutcome> {
        self.outcomes.iter().find(|o| o.rule_id == rule_id)
    }

    pub fn failures(&self) -> impl Iterator<Item = &RuleOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, RuleStatus::Failed { .. }))
    }
}

/// Diagnostic snapshot for dashboards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub rules_evaluated: u64,
    pub alerts_triggered: u64,
    pub alerts_suppressed: u64,
    pub evaluation_failures: u64,
    pub rules_skipped: u64,
    pub cached_entries: usize,
    /// Applicable rules summed over all cached subjects.
    pub active_rules_count: usize,
    pub cached_tenants: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub alert_history_entries: usize,
}

#[derive(Default)]
struct Counters {
    rules_evaluated: AtomicU64,
    alerts_triggered: AtomicU64,
    alerts_suppressed: AtomicU64,
    evaluation_failures: AtomicU64,
    rules_skipped: AtomicU64,
}

pub struct AlertEngine {
    store: Arc<dyn RuleStore>,
    config: EngineConfig,
    evaluators: RwLock<HashMap<RuleKind, Arc<dyn RuleEvaluator>>>,
    cache: RuleCache,
    frequency: FrequencyController,
    longest_cooldown_minutes: AtomicU32,
    counters: Counters,
}

impl AlertEngine {
    /// Creates an engine over `store` with the built-in threshold, trend
    /// and comparison evaluators registered.
    pub fn new(store: Arc<dyn RuleStore>, config: EngineConfig) -> Self {
        let mut evaluators: HashMap<RuleKind, Arc<dyn RuleEvaluator>> = HashMap::new();
        evaluators.insert(RuleKind::Threshold, Arc::new(ThresholdEvaluator));
        evaluators.insert(RuleKind::Trend, Arc::new(TrendEvaluator));
        evaluators.insert(RuleKind::Comparison, Arc::new(ComparisonEvaluator::new()));

        Self {
            store,
            cache: RuleCache::new(config.cache_ttl_secs),
            config,
            evaluators: RwLock::new(evaluators),
            frequency: FrequencyController::new(),
            longest_cooldown_minutes: AtomicU32::new(0),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registers or replaces the evaluator for `kind`.
    pub fn register_evaluator(&self, kind: RuleKind, evaluator: Arc<dyn RuleEvaluator>) -> Result<()> {
        if !evaluator.supports(kind) {
            return Err(AlertError::UnsupportedKind(kind));
        }
        let replaced = self.evaluators.write().insert(kind, evaluator).is_some();
        tracing::info!(%kind, replaced, "Evaluator registered");
        Ok(())
    }

    fn evaluator_for(&self, kind: RuleKind) -> Option<Arc<dyn RuleEvaluator>> {
        self.evaluators.read().get(&kind).cloned()
    }

    /// Validates and persists a new rule, then drops the cached rule sets
    /// it could affect.
    pub async fn create_rule(&self, new_rule: NewRule) -> Result<Rule> {
        let rule = new_rule.into_rule(Utc::now());
        rule.validate().map_err(|reason| AlertError::InvalidRule {
            rule_id: rule.id.clone(),
            reason,
        })?;

        self.store.insert_rule(&rule).await?;
        self.invalidate_for(rule.tenant_id.as_deref());

        tracing::info!(
            rule_id = %rule.id,
            kind = %rule.kind(),
            tenant_id = partition_key(rule.tenant_id.as_deref()),
            "Rule created"
        );
        Ok(rule)
    }

    /// Merges `patch` into the stored rule and bumps `updated_at`.
    ///
    /// Both the rule's current and previous tenant partitions are
    /// invalidated, so the next evaluation sees the change.
    pub async fn update_rule(&self, id: &str, patch: RulePatch) -> Result<Rule> {
        let mut rule = self
            .store
            .get_rule(id)
            .await?
            .ok_or_else(|| AlertError::RuleNotFound(id.to_string()))?;
        let previous_tenant = rule.tenant_id.clone();

        patch.apply(&mut rule, Utc::now());
        rule.validate().map_err(|reason| AlertError::InvalidRule {
            rule_id: rule.id.clone(),
            reason,
        })?;

        self.store.update_rule(&rule).await?;
        self.invalidate_for(rule.tenant_id.as_deref());
        if previous_tenant != rule.tenant_id {
            self.invalidate_for(previous_tenant.as_deref());
        }

        tracing::info!(
            rule_id = %rule.id,
            tenant_id = partition_key(rule.tenant_id.as_deref()),
            "Rule updated"
        );
        Ok(rule)
    }

    pub async fn get_rule(&self, id: &str) -> Result<Option<Rule>> {
        self.store.get_rule(id).await
    }

    /// Global rules plus the rules of `tenant_id`.
    pub async fn list_rules(&self, tenant_id: Option<&str>) -> Result<Vec<Rule>> {
        self.store.list_rules(tenant_id).await
    }

    /// Drops cached rule sets. `None` clears every partition.
    pub fn invalidate_cache(&self, tenant_id: Option<&str>) {
        match tenant_id {
            Some(tenant) => self.cache.invalidate_tenant(Some(tenant)),
            None => self.cache.invalidate_all(),
        }
    }

    fn invalidate_for(&self, tenant_id: Option<&str>) {
        // Global rules reach every tenant
        if tenant_id.is_none() {
            self.cache.invalidate_all();
        } else {
            self.cache.invalidate_tenant(tenant_id);
        }
    }

    /// Removes expired cache entries and trigger histories that can no
    /// longer suppress anything. Returns the number of cache entries removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let cooldown = Duration::minutes(i64::from(
            self.longest_cooldown_minutes.load(Ordering::Relaxed),
        ));
        let horizon = cooldown.max(Duration::hours(DAILY_WINDOW_HOURS));
        self.frequency.purge_older_than(horizon, now);

        let purged = self.cache.purge_expired(now);
        if purged > 0 {
            tracing::debug!(purged, "Expired rule sets purged");
        }
        purged
    }

    pub fn get_stats(&self) -> EngineStats {
        let occupancy = self.cache.occupancy();
        EngineStats {
            rules_evaluated: self.counters.rules_evaluated.load(Ordering::Relaxed),
            alerts_triggered: self.counters.alerts_triggered.load(Ordering::Relaxed),
            alerts_suppressed: self.counters.alerts_suppressed.load(Ordering::Relaxed),
            evaluation_failures: self.counters.evaluation_failures.load(Ordering::Relaxed),
            rules_skipped: self.counters.rules_skipped.load(Ordering::Relaxed),
            cached_entries: occupancy.entries,
            active_rules_count: occupancy.rules,
            cached_tenants: occupancy.tenants,
            cache_hits: occupancy.hits,
            cache_misses: occupancy.misses,
            alert_history_entries: self.frequency.entries(),
        }
    }

    /// Trigger timestamps currently tracked for one (subject, rule) pair.
    pub fn trigger_history(&self, subject_id: &str, rule_id: &str) -> Vec<DateTime<Utc>> {
        self.frequency.history(subject_id, rule_id)
    }

    pub async fn evaluate_subject_alerts(
        &self,
        subject_id: &str,
        context: &EvaluationContext,
    ) -> Result<SubjectReport> {
        self.evaluate_subject_alerts_at(subject_id, context, Utc::now())
            .await
    }

    /// Runs every applicable rule for one subject at `now`.
    ///
    /// Only a rule store failure is returned as `Err`; the subject then
    /// receives no alerts for this pass. Per-rule problems are reported as
    /// outcomes and never stop the remaining rules.
    pub async fn evaluate_subject_alerts_at(
        &self,
        subject_id: &str,
        context: &EvaluationContext,
        now: DateTime<Utc>,
    ) -> Result<SubjectReport> {
        let context = if context.subject_id == subject_id {
            Cow::Borrowed(context)
        } else {
            tracing::warn!(
                subject_id,
                context_subject_id = %context.subject_id,
                "Context subject differs from requested subject, using requested id"
            );
            let mut owned = context.clone();
            owned.subject_id = subject_id.to_string();
            Cow::Owned(owned)
        };

        let rules = self.applicable_rules(&context, now).await.map_err(|e| {
            tracing::error!(
                subject_id,
                tenant_id = partition_key(context.tenant_id.as_deref()),
                error = %e,
                "Failed to resolve applicable rules"
            );
            e
        })?;

        let mut report = SubjectReport {
            subject_id: subject_id.to_string(),
            tenant_id: context.tenant_id.clone(),
            evaluated_at: now,
            alerts: Vec::new(),
            outcomes: Vec::with_capacity(rules.len()),
        };

        for rule in rules.iter() {
            let (status, alert) = self.evaluate_rule(rule, &context, now);
            if let Some(alert) = alert {
                report.alerts.push(alert);
            }
            report.outcomes.push(RuleOutcome {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                kind: rule.kind(),
                status,
            });
        }

        Ok(report)
    }

    async fn applicable_rules(
        &self,
        context: &EvaluationContext,
        now: DateTime<Utc>,
    ) -> Result<Arc<Vec<Rule>>> {
        let tenant_id = context.tenant_id.as_deref();
        if let Some(rules) = self.cache.get(tenant_id, &context.subject_id, now) {
            return Ok(rules);
        }

        let generation = self.cache.generation(tenant_id);
        let catalog = self.store.list_rules(tenant_id).await?;
        let rules: Vec<Rule> = catalog
            .into_iter()
            .filter(|rule| rule_applies(rule, &context.subject_attributes))
            .collect();

        tracing::debug!(
            subject_id = %context.subject_id,
            tenant_id = partition_key(tenant_id),
            count = rules.len(),
            "Applicable rules resolved"
        );

        let rules = Arc::new(rules);
        self.cache
            .insert(tenant_id, &context.subject_id, rules.clone(), generation, now);
        Ok(rules)
    }

    fn evaluate_rule(
        &self,
        rule: &Rule,
        context: &EvaluationContext,
        now: DateTime<Utc>,
    ) -> (RuleStatus, Option<AlertResult>) {
        let subject_id = context.subject_id.as_str();
        self.longest_cooldown_minutes
            .fetch_max(rule.cooldown_minutes, Ordering::Relaxed);

        if let Err(reason) = rule.validate() {
            return (self.skip(rule, subject_id, reason), None);
        }

        if let Some(suppression) = self.frequency.check(subject_id, rule, now) {
            return (self.suppress(rule, subject_id, suppression), None);
        }

        let kind = rule.kind();
        let Some(evaluator) = self.evaluator_for(kind) else {
            return (
                self.skip(rule, subject_id, format!("no evaluator registered for kind '{kind}'")),
                None,
            );
        };

        self.counters.rules_evaluated.fetch_add(1, Ordering::Relaxed);
        let outcome = catch_unwind(AssertUnwindSafe(|| evaluator.evaluate(rule, context, now)));
        let mut alert = match outcome {
            Ok(Ok(Some(alert))) if alert.triggered => alert,
            Ok(Ok(_)) => return (RuleStatus::NotTriggered, None),
            Ok(Err(e)) => return (self.fail(rule, subject_id, format!("{e:#}")), None),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "evaluator panicked".to_string());
                return (self.fail(rule, subject_id, message), None);
            }
        };

        personalize(&mut alert, rule, context);

        if let Err(suppression) = self.frequency.record(subject_id, rule, now) {
            // A concurrent pass for the same pair recorded first
            return (self.suppress(rule, subject_id, suppression), None);
        }

        self.counters.alerts_triggered.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            rule_id = %rule.id,
            subject_id,
            severity = %alert.severity,
            alert_id = %alert.id,
            "Alert triggered"
        );
        (
            RuleStatus::Triggered {
                alert_id: alert.id.clone(),
            },
            Some(alert),
        )
    }

    fn skip(&self, rule: &Rule, subject_id: &str, reason: String) -> RuleStatus {
        self.counters.rules_skipped.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(rule_id = %rule.id, subject_id, reason = %reason, "Rule skipped");
        RuleStatus::Skipped { reason }
    }

    fn suppress(&self, rule: &Rule, subject_id: &str, suppression: Suppression) -> RuleStatus {
        self.counters.alerts_suppressed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(rule_id = %rule.id, subject_id, ?suppression, "Alert suppressed");
        RuleStatus::Suppressed(suppression)
    }

    fn fail(&self, rule: &Rule, subject_id: &str, error: String) -> RuleStatus {
        self.counters.evaluation_failures.fetch_add(1, Ordering::Relaxed);
        tracing::error!(
            rule_id = %rule.id,
            kind = %rule.kind(),
            subject_id,
            error = %error,
            "Rule evaluation failed"
        );
        RuleStatus::Failed { error }
    }
}
