//! Worker binary configuration

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

use tabcast_core::WorkerConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Token presented to the proxy on connect; deployments that mint
    /// JWTs per session leave this unset and pass one at runtime.
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
