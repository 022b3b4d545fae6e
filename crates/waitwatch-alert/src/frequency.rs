use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;
use waitwatch_common::rule::Rule;

/// Key: (subject_id, rule_id)
type HistoryKey = (String, String);

/// Rolling window for the daily cap.
pub const DAILY_WINDOW_HOURS: i64 = 24;

/// Why a rule was held back for a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Suppression {
    /// Last trigger is still inside the rule's cooldown.
    Cooldown { until: DateTime<Utc> },
    /// The trailing 24 hours already hold `limit` triggers.
    DailyCap { count: usize, limit: u32 },
}

/// Tracks recent trigger times per (subject, rule) and decides suppression.
///
/// Histories live in a sharded map, so evaluations for different subjects
/// never contend on a common lock.
#[derive(Default)]
pub struct FrequencyController {
    history: DashMap<HistoryKey, VecDeque<DateTime<Utc>>>,
}

impl FrequencyController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the suppression that currently applies, pruning stale
    /// timestamps on the way. Never records anything.
    pub fn check(&self, subject_id: &str, rule: &Rule, now: DateTime<Utc>) -> Option<Suppression> {
        let key = (subject_id.to_string(), rule.id.clone());
        match self.history.get_mut(&key) {
            Some(mut times) => {
                prune(&mut times, rule, now);
                gate(&times, rule, now)
            }
            None => gate(&VecDeque::new(), rule, now),
        }
    }

    /// Records a trigger at `now`.
    ///
    /// The gate is re-applied under the key's lock; if another evaluation
    /// of the same pair recorded in the meantime the slot is already taken
    /// and the suppression is returned instead.
    pub fn record(&self, subject_id: &str, rule: &Rule, now: DateTime<Utc>) -> Result<(), Suppression> {
        let key = (subject_id.to_string(), rule.id.clone());
        let mut times = self.history.entry(key).or_default();
        prune(&mut times, rule, now);
        if let Some(suppression) = gate(&times, rule, now) {
            return Err(suppression);
        }
        // Kept ascending so pruning from the front stays correct
        let pos = times.partition_point(|t| *t <= now);
        times.insert(pos, now);
        Ok(())
    }

    /// Trigger timestamps currently held for one pair.
    pub fn history(&self, subject_id: &str, rule_id: &str) -> Vec<DateTime<Utc>> {
        let key = (subject_id.to_string(), rule_id.to_string());
        self.history
            .get(&key)
            .map(|times| times.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Total number of tracked timestamps across all pairs.
    pub fn entries(&self) -> usize {
        self.history.iter().map(|times| times.len()).sum()
    }

    /// Drops pairs whose newest trigger is older than `horizon`.
    pub fn purge_older_than(&self, horizon: Duration, now: DateTime<Utc>) {
        let cutoff = now - horizon;
        self.history
            .retain(|_, times| times.back().is_some_and(|last| *last >= cutoff));
    }

    pub fn clear(&self) {
        self.history.clear();
    }
}

fn retention(rule: &Rule) -> Duration {
    Duration::minutes(i64::from(rule.cooldown_minutes)).max(Duration::hours(DAILY_WINDOW_HOURS))
}

fn prune(times: &mut VecDeque<DateTime<Utc>>, rule: &Rule, now: DateTime<Utc>) {
    let cutoff = now - retention(rule);
    while let Some(front) = times.front() {
        if *front < cutoff {
            times.pop_front();
        } else {
            break;
        }
    }
}

fn gate(times: &VecDeque<DateTime<Utc>>, rule: &Rule, now: DateTime<Utc>) -> Option<Suppression> {
    if rule.cooldown_minutes > 0 {
        let cooldown = Duration::minutes(i64::from(rule.cooldown_minutes));
        if let Some(last) = times.iter().max() {
            if now - *last < cooldown {
                return Some(Suppression::Cooldown {
                    until: *last + cooldown,
                });
            }
        }
    }

    let daily_cutoff = now - Duration::hours(DAILY_WINDOW_HOURS);
    let count = times.iter().filter(|t| **t > daily_cutoff).count();
    if count >= rule.max_triggers_per_day as usize {
        return Some(Suppression::DailyCap {
            count,
            limit: rule.max_triggers_per_day,
        });
    }

    None
}
