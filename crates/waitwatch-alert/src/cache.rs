//! Tenant-scoped cache of the rules applicable to each subject.
//!
//! Entries expire lazily on read. Invalidation is coarse: a rule change
//! drops every entry of the rule's tenant, and a change to a global rule
//! drops everything. Each entry remembers the generation it was computed
//! under, so a lookup that raced an invalidation can never be served.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use waitwatch_common::rule::Rule;

/// Log label for the partition of subjects without a tenant.
pub const GLOBAL_PARTITION: &str = "global";

/// Default time-to-live for a cached rule set.
pub const DEFAULT_TTL_SECS: u64 = 30 * 60;

/// Upper bound on a configured TTL.
const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Key: (tenant_id, subject_id). `None` is the tenant-less partition and
/// never collides with a tenant of any name.
type CacheKey = (Option<String>, String);

/// Snapshot of the invalidation counters a population was computed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation {
    global: u64,
    tenant: u64,
}

struct CachedRules {
    rules: Arc<Vec<Rule>>,
    expires_at: DateTime<Utc>,
    generation: Generation,
}

pub struct RuleCache {
    ttl: Duration,
    entries: DashMap<CacheKey, CachedRules>,
    global_generation: AtomicU64,
    tenant_generations: DashMap<Option<String>, u64>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Point-in-time cache occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOccupancy {
    pub entries: usize,
    pub rules: usize,
    pub tenants: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Display label for a tenant partition.
pub fn partition_key(tenant_id: Option<&str>) -> &str {
    tenant_id.unwrap_or(GLOBAL_PARTITION)
}

impl RuleCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs.min(MAX_TTL_SECS) as i64),
            entries: DashMap::new(),
            global_generation: AtomicU64::new(0),
            tenant_generations: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Current generation for a tenant partition. Read this before loading
    /// from the store and hand it back to [`RuleCache::insert`].
    pub fn generation(&self, tenant_id: Option<&str>) -> Generation {
        Generation {
            global: self.global_generation.load(Ordering::Acquire),
            tenant: self
                .tenant_generations
                .get(&tenant_id.map(str::to_string))
                .map(|g| *g)
                .unwrap_or(0),
        }
    }

    pub fn get(
        &self,
        tenant_id: Option<&str>,
        subject_id: &str,
        now: DateTime<Utc>,
    ) -> Option<Arc<Vec<Rule>>> {
        let key = cache_key(tenant_id, subject_id);
        let current = self.generation(tenant_id);

        let fresh = self.entries.get(&key).and_then(|entry| {
            (entry.expires_at > now && entry.generation == current).then(|| entry.rules.clone())
        });

        match fresh {
            Some(rules) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(rules)
            }
            None => {
                self.entries
                    .remove_if(&key, |_, entry| entry.expires_at <= now || entry.generation != current);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores a rule set unless the partition was invalidated after
    /// `generation` was read.
    pub fn insert(
        &self,
        tenant_id: Option<&str>,
        subject_id: &str,
        rules: Arc<Vec<Rule>>,
        generation: Generation,
        now: DateTime<Utc>,
    ) -> bool {
        if self.generation(tenant_id) != generation {
            tracing::debug!(
                tenant_id = partition_key(tenant_id),
                subject_id,
                "Discarding rule set computed before an invalidation"
            );
            return false;
        }
        let key = cache_key(tenant_id, subject_id);
        self.entries.insert(
            key,
            CachedRules {
                rules,
                expires_at: now + self.ttl,
                generation,
            },
        );
        true
    }

    /// Drops every entry of one tenant partition.
    pub fn invalidate_tenant(&self, tenant_id: Option<&str>) {
        *self
            .tenant_generations
            .entry(tenant_id.map(str::to_string))
            .or_insert(0) += 1;
        self.entries.retain(|(p, _), _| p.as_deref() != tenant_id);
        tracing::debug!(
            tenant_id = partition_key(tenant_id),
            "Rule cache partition invalidated"
        );
    }

    /// Drops every entry in every partition.
    pub fn invalidate_all(&self) {
        self.global_generation.fetch_add(1, Ordering::AcqRel);
        self.entries.clear();
        tracing::debug!("Rule cache cleared");
    }

    /// Removes expired entries; reads already ignore them.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn occupancy(&self) -> CacheOccupancy {
        let mut rules = 0;
        let mut tenants = HashSet::new();
        for entry in self.entries.iter() {
            rules += entry.rules.len();
            tenants.insert(entry.key().0.clone());
        }
        CacheOccupancy {
            entries: self.entries.len(),
            rules,
            tenants: tenants.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

fn cache_key(tenant_id: Option<&str>, subject_id: &str) -> CacheKey {
    (tenant_id.map(str::to_string), subject_id.to_string())
}

impl Default for RuleCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_SECS)
    }
}
