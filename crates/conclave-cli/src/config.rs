//! `conclave.toml` loading.

use conclave_oracle::{ModelConfig, RetrievalConfig};
use conclave_orchestrator::OrchestratorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable overriding `[model].api_key`.
pub const API_KEY_ENV: &str = "CONCLAVE_API_KEY";

#[derive(Debug, Deserialize)]
pub struct ConclaveConfig {
    pub model: ModelConfig,
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl ConclaveConfig {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse `path`, then apply the environment override.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {e}", path.display())
        })?;
        let mut config = Self::parse(&text)?;
        config.apply_api_key(std::env::var(API_KEY_ENV).ok());
        Ok(config)
    }

    fn apply_api_key(&mut self, key: Option<String>) {
        if let Some(key) = key.filter(|k| !k.is_empty()) {
            self.model.api_key = key;
        }
    }
}
