use waitwatch_common::rule::RuleKind;

/// Errors surfaced by the alert engine.
///
/// Per-rule evaluation failures are not errors at this level: they are
/// reported as outcomes in the subject report so one bad rule cannot fail
/// a subject's pass. Only rule-store failures and invalid CRUD input reach
/// the caller as `Err`.
///
/// # Examples
///
/// ```rust
/// use waitwatch_alert::error::AlertError;
///
/// let err = AlertError::RuleNotFound("rule-99".to_string());
/// assert!(err.to_string().contains("rule-99"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    /// The rule store could not be reached or returned a failure.
    #[error("Alert: rule store error: {0}")]
    Store(String),

    /// No rule with this id exists in the store.
    #[error("Alert: rule '{0}' not found")]
    RuleNotFound(String),

    /// A rule with this id already exists.
    #[error("Alert: rule '{0}' already exists")]
    DuplicateRule(String),

    /// The rule configuration failed validation.
    #[error("Alert: invalid rule '{rule_id}': {reason}")]
    InvalidRule { rule_id: String, reason: String },

    /// An evaluator was registered for a kind it does not support.
    #[error("Alert: evaluator does not support rule kind '{0}'")]
    UnsupportedKind(RuleKind),
}

/// Convenience `Result` alias for engine operations.
pub type Result<T> = std::result::Result<T, AlertError>;
