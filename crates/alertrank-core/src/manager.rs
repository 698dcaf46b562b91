//! Index manager: owns every dimension's ranked index and is the single
//! funnel for mutations.
//!
//! Writes for one resolution are serialized behind `writer` and applied to
//! each dimension under that index's write lock; readers take per-index read
//! locks and therefore never see an entity mid-reposition.

use std::collections::BTreeMap;

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use tracing::debug;

use crate::error::ConfigError;
use crate::extractor::{DimensionExtractor, ExtractorRegistry};
use crate::index::RankedDimensionIndex;
use crate::types::{Resolution, UnhealthyInterval};

#[derive(Debug, Default)]
pub struct IndexManager {
    registry: ExtractorRegistry,
    indices: BTreeMap<String, RwLock<RankedDimensionIndex>>,
    writer: Mutex<()>,
}

impl IndexManager {
    /// A manager with no dimensions. Register them before sharing it.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_dimension(
        &mut self,
        name: impl Into<String>,
        extractor: impl DimensionExtractor + 'static,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        self.registry.register(name.clone(), extractor)?;
        self.indices
            .insert(name.clone(), RwLock::new(RankedDimensionIndex::new(name.clone())));
        debug!(dimension = %name, "registered dimension");
        Ok(())
    }

    /// Attribute a finalized alert to every dimension whose extractor yields
    /// an entity. Returns how many dimensions were updated.
    ///
    /// All dimensions are updated before the writer lock is released.
    pub fn apply_resolution(&self, resolution: &Resolution) -> usize {
        let _writer = self.writer.lock();
        let mut applied = 0;
        for (dimension, entity) in self.registry.resolve_all(&resolution.attributes) {
            let Some(index) = self.indices.get(dimension) else {
                continue;
            };
            let total = index
                .write()
                .apply(&entity, resolution.interval, &resolution.alert_type);
            debug!(
                alert_id = %resolution.alert_id,
                dimension,
                entity = %entity,
                total_secs = total,
                "applied unhealthy interval"
            );
            applied += 1;
        }
        applied
    }

    /// Apply one interval to a single named dimension, bypassing extraction.
    ///
    /// Returns the entity's new cumulative total in seconds.
    pub fn apply_to_dimension(
        &self,
        dimension: &str,
        entity: &str,
        interval: UnhealthyInterval,
        alert_type: &str,
    ) -> Result<f64, ConfigError> {
        let index = self
            .indices
            .get(dimension)
            .ok_or_else(|| ConfigError::UnknownDimension(dimension.to_owned()))?;
        let _writer = self.writer.lock();
        Ok(index.write().apply(entity, interval, alert_type))
    }

    /// Read access to one dimension's index.
    pub fn get_index(
        &self,
        dimension: &str,
    ) -> Result<RwLockReadGuard<'_, RankedDimensionIndex>, ConfigError> {
        self.indices
            .get(dimension)
            .map(|index| index.read())
            .ok_or_else(|| ConfigError::UnknownDimension(dimension.to_owned()))
    }

    /// Registered dimension names, sorted.
    pub fn dimensions(&self) -> Vec<String> {
        self.indices.keys().cloned().collect()
    }

    pub fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }
}
