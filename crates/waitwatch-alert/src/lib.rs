//! Rule-based alert evaluation engine.
//!
//! The engine resolves the rules applicable to a subject (through a
//! tenant-scoped cache over an external [`store::RuleStore`]), gates each
//! rule through per-(subject, rule) cooldown and daily-cap tracking, and
//! runs the survivors through registered [`RuleEvaluator`]s. Built-in
//! evaluators cover threshold, trend and best-alternative comparison rules.
//! Triggered results are personalized for the subject before they are
//! returned.

pub mod batch;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluators;
pub mod frequency;
pub mod personalize;
pub mod store;
pub mod targeting;


use chrono::{DateTime, Utc};
use waitwatch_common::rule::{Rule, RuleKind};
use waitwatch_common::types::{AlertResult, EvaluationContext};

/// Decides whether a rule fires for one subject.
///
/// Implementations are registered in the [`engine::AlertEngine`] by
/// [`RuleKind`] and must be pure: the same rule, context and clock always
/// produce the same answer. Missing or unparsable data is a quiet
/// `Ok(None)`; `Err` is reserved for faults inside the evaluator and is
/// reported as a failed outcome without aborting the subject's pass.
pub trait RuleEvaluator: Send + Sync {
    /// Whether this evaluator can handle rules of `kind`.
    fn supports(&self, kind: RuleKind) -> bool;

    /// Evaluates `rule` against `context` and returns an alert if the rule
    /// condition is met, or `None` otherwise.
    fn evaluate(
        &self,
        rule: &Rule,
        context: &EvaluationContext,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<AlertResult>>;
}
