//! Boundary to the external rule catalog.

use async_trait::async_trait;
use parking_lot::RwLock;
use waitwatch_common::rule::Rule;

use crate::error::{AlertError, Result};

/// Persistent catalog of rules. The engine creates, reads and updates
/// rules through this trait but never deletes them.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Persists a new rule.
    ///
    /// # Errors
    ///
    /// [`AlertError::DuplicateRule`] if the id is taken, [`AlertError::Store`]
    /// if the backend fails.
    async fn insert_rule(&self, rule: &Rule) -> Result<()>;

    /// Replaces a stored rule with the same id.
    async fn update_rule(&self, rule: &Rule) -> Result<()>;

    async fn get_rule(&self, id: &str) -> Result<Option<Rule>>;

    /// Global rules plus the rules of `tenant_id`, in catalog order.
    /// With `None` only global rules are returned.
    async fn list_rules(&self, tenant_id: Option<&str>) -> Result<Vec<Rule>>;
}

/// Process-local store, kept in insertion order.
#[derive(Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<Vec<Rule>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn insert_rule(&self, rule: &Rule) -> Result<()> {
        let mut rules = self.rules.write();
        if rules.iter().any(|r| r.id == rule.id) {
            return Err(AlertError::DuplicateRule(rule.id.clone()));
        }
        rules.push(rule.clone());
        Ok(())
    }

    async fn update_rule(&self, rule: &Rule) -> Result<()> {
        let mut rules = self.rules.write();
        let slot = rules
            .iter_mut()
            .find(|r| r.id == rule.id)
            .ok_or_else(|| AlertError::RuleNotFound(rule.id.clone()))?;
        *slot = rule.clone();
        Ok(())
    }

    async fn get_rule(&self, id: &str) -> Result<Option<Rule>> {
        Ok(self.rules.read().iter().find(|r| r.id == id).cloned())
    }

    async fn list_rules(&self, tenant_id: Option<&str>) -> Result<Vec<Rule>> {
        Ok(self
            .rules
            .read()
            .iter()
            .filter(|r| r.tenant_id.is_none() || r.tenant_id.as_deref() == tenant_id)
            .cloned()
            .collect())
    }
}
