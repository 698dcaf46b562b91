//! Read-only query surface over a shared [`IndexManager`].

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{ConfigError, QueryError};
use crate::manager::IndexManager;
use crate::types::TopKReport;

#[derive(Debug, Clone)]
pub struct QueryEngine {
    manager: Arc<IndexManager>,
}

impl QueryEngine {
    pub fn new(manager: Arc<IndexManager>) -> Self {
        Self { manager }
    }

    /// Top `k` entities of `dimension` by cumulative unhealthy time.
    pub fn top_k(&self, dimension: &str, k: usize) -> Result<TopKReport, ConfigError> {
        let index = self.manager.get_index(dimension)?;
        Ok(TopKReport {
            dimension: dimension.to_owned(),
            k,
            entities: index.top_k(k),
        })
    }

    pub fn top_k_with_alert_type(
        &self,
        dimension: &str,
        k: usize,
        alert_type: &str,
    ) -> Result<TopKReport, ConfigError> {
        let index = self.manager.get_index(dimension)?;
        Ok(TopKReport {
            dimension: dimension.to_owned(),
            k,
            entities: index.top_k_with_alert_type(k, alert_type),
        })
    }

    /// Ranking by unhealthy time overlapping `[start, end]` only.
    pub fn top_k_in_range(
        &self,
        dimension: &str,
        k: usize,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<TopKReport, QueryError> {
        check_window(start, end)?;
        let index = self.manager.get_index(dimension)?;
        Ok(TopKReport {
            dimension: dimension.to_owned(),
            k,
            entities: index.top_k_in_range(k, start, end),
        })
    }

    /// Seconds of `entity` overlapping `[start, end]`; 0 for an unknown entity.
    pub fn unhealthy_time_in_range(
        &self,
        dimension: &str,
        entity: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<f64, QueryError> {
        check_window(start, end)?;
        let index = self.manager.get_index(dimension)?;
        Ok(index.unhealthy_time_in_range(entity, start, end))
    }

    /// Cumulative seconds of `entity` over all time; 0 for an unknown entity.
    pub fn total_unhealthy_time(&self, dimension: &str, entity: &str) -> Result<f64, ConfigError> {
        let index = self.manager.get_index(dimension)?;
        Ok(index
            .entity(entity)
            .map_or(0.0, |state| state.total_unhealthy_secs()))
    }

    pub fn dimensions(&self) -> Vec<String> {
        self.manager.dimensions()
    }
}

fn check_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), QueryError> {
    if start > end {
        return Err(QueryError::InvalidWindow { start, end });
    }
    Ok(())
}
