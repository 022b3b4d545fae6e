//! Shared value types for the waitwatch alert engine: rule catalog
//! entries, evaluation contexts, alert results, id generation and message
//! translations.

pub mod i18n;
pub mod id;
pub mod rule;
pub mod types;
