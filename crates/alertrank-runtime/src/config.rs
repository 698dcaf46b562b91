//! Runtime configuration: the engine settings plus where the binary keeps its
//! socket and saved results.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use alertrank_core::EngineConfig;

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(flatten)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub socket_path: Option<String>,
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            socket_path: None,
            results_dir: default_results_dir(),
        }
    }
}

impl RuntimeConfig {
    /// Load from `path`, or defaults when no file is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// `--socket-path` beats the config file, which beats the per-user default.
    pub fn socket_path(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.socket_path.clone())
            .unwrap_or_else(crate::cli::default_socket_path)
    }
}
