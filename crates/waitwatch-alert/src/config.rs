use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_TTL_SECS;

/// Engine tuning, typically read from the `[engine]` table of a TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Lifetime of a cached applicable-rule set.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Subjects evaluated at once by the batch runner.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}

fn default_max_concurrent() -> usize {
    8
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            max_concurrent: default_max_concurrent(),
        }
    }
}
