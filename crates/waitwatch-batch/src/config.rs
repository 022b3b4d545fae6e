use serde::{Deserialize, Serialize};
use waitwatch_alert::config::EngineConfig;
use waitwatch_common::rule::NewRule;
use waitwatch_common::types::EvaluationContext;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// JSON rules seed loaded into the in-memory catalog at startup.
    #[serde(default = "default_rules_path")]
    pub rules_path: String,
    /// JSON file with one evaluation context per subject.
    #[serde(default = "default_contexts_path")]
    pub contexts_path: String,
    #[serde(default)]
    pub id: IdConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Snowflake generator coordinates for alert and rule ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdConfig {
    #[serde(default = "default_id_part")]
    pub machine_id: i32,
    #[serde(default = "default_id_part")]
    pub node_id: i32,
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            machine_id: default_id_part(),
            node_id: default_id_part(),
        }
    }
}

fn default_rules_path() -> String {
    "config/rules.seed.json".to_string()
}

fn default_contexts_path() -> String {
    "config/contexts.json".to_string()
}

fn default_id_part() -> i32 {
    1
}

impl BatchConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path, e))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path, e))?;
        if !(0..32).contains(&config.id.machine_id) || !(0..32).contains(&config.id.node_id) {
            anyhow::bail!("id.machine_id and id.node_id must be within 0-31");
        }
        Ok(config)
    }
}

// ---- Input files ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesSeedFile {
    #[serde(default)]
    pub rules: Vec<NewRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextsFile {
    #[serde(default)]
    pub contexts: Vec<EvaluationContext>,
}

pub fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read file '{}': {}", path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse file '{}': {}", path, e))
}
