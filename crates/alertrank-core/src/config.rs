//! Engine configuration: which dimensions to index and how to treat
//! unmatched resolutions. Loaded from TOML; every field has a default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::extractor::{AttributeExtractor, FallbackExtractor};
use crate::manager::IndexManager;
use crate::tracker::UnmatchedResolvePolicy;

/// Dimensions indexed when no configuration names any.
pub const DEFAULT_DIMENSIONS: [&str; 4] = ["host", "dc", "service", "volume"];

/// One `[[dimensions]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionSpec {
    pub name: String,
    /// Tag read verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    /// Tags tried in order; the first non-empty one wins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Vec<String>>,
}

impl DimensionSpec {
    /// A dimension reading the tag of the same name.
    pub fn same_named(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            attribute: Some(name.to_owned()),
            attributes: None,
        }
    }

    fn register_into(&self, manager: &mut IndexManager) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidDimension {
            name: self.name.clone(),
            reason: reason.to_owned(),
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        match (&self.attribute, &self.attributes) {
            (Some(key), None) if !key.is_empty() => {
                manager.register_dimension(self.name.clone(), AttributeExtractor::new(key.clone()))
            }
            (None, Some(keys)) if !keys.is_empty() && keys.iter().all(|k| !k.is_empty()) => {
                manager.register_dimension(self.name.clone(), FallbackExtractor::new(keys.clone()))
            }
            (Some(_), Some(_)) => Err(invalid("give either `attribute` or `attributes`, not both")),
            (None, None) => Err(invalid("one of `attribute` or `attributes` is required")),
            _ => Err(invalid("attribute names must not be empty")),
        }
    }
}

fn default_dimensions() -> Vec<DimensionSpec> {
    DEFAULT_DIMENSIONS
        .iter()
        .map(|name| DimensionSpec::same_named(name))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub unmatched_resolve: UnmatchedResolvePolicy,
    #[serde(default = "default_dimensions")]
    pub dimensions: Vec<DimensionSpec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            unmatched_resolve: UnmatchedResolvePolicy::default(),
            dimensions: default_dimensions(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    /// Construct an [`IndexManager`] with every configured dimension registered.
    pub fn build_manager(&self) -> Result<IndexManager, ConfigError> {
        let mut manager = IndexManager::new();
        for spec in &self.dimensions {
            spec.register_into(&mut manager)?;
        }
        Ok(manager)
    }
}
