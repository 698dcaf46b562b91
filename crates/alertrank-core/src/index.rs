//! Ranked dimension index: per-entity unhealthy-time aggregates for one
//! grouping dimension, kept in cumulative-time order.
//!
//! Ordering lives in a `BTreeMap` keyed by cumulative microseconds whose values are
//! the set of entities sharing that total (the bucket). `apply` moves an entity
//! between buckets (reposition) in O(log n); `top_k` walks the map from the
//! largest key down and touches only the entities it returns.
//!
//! Bucket invariant: every entity sits in exactly one bucket, the one keyed by
//! its current total, and no bucket is ever left empty.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{AlertTypeCounts, RankedEntity, UnhealthyInterval, micros_to_secs};

/// Cumulative unhealthy time in microseconds.
type RankKey = u64;

// ─── Entity State ────────────────────────────────────────────────────

/// Aggregate for one entity value within one dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityState {
    total_unhealthy_us: u64,
    alert_type_counts: AlertTypeCounts,
    /// Closed intervals in application order.
    intervals: Vec<UnhealthyInterval>,
}

impl EntityState {
    pub fn total_unhealthy_us(&self) -> u64 {
        self.total_unhealthy_us
    }

    pub fn total_unhealthy_secs(&self) -> f64 {
        micros_to_secs(self.total_unhealthy_us)
    }

    pub fn alert_type_counts(&self) -> &AlertTypeCounts {
        &self.alert_type_counts
    }

    pub fn intervals(&self) -> &[UnhealthyInterval] {
        &self.intervals
    }

    /// Overlap of the recorded intervals with `[start, end]`, in seconds.
    pub fn unhealthy_time_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
        micros_to_secs(self.unhealthy_us_in_range(start, end))
    }

    fn unhealthy_us_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
        self.intervals
            .iter()
            .map(|iv| iv.overlap_us(start, end))
            .sum()
    }

    fn record(&mut self, interval: UnhealthyInterval, alert_type: &str) {
        self.total_unhealthy_us = self.total_unhealthy_us.saturating_add(interval.duration_us());
        *self
            .alert_type_counts
            .entry(alert_type.to_owned())
            .or_insert(0) += 1;
        self.intervals.push(interval);
    }
}

// ─── Ranked Dimension Index ──────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct RankedDimensionIndex {
    name: String,
    entities: HashMap<String, EntityState>,
    ranking: BTreeMap<RankKey, BTreeSet<String>>,
}

impl RankedDimensionIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entities: HashMap::new(),
            ranking: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute one closed interval of `alert_type` to `entity`.
    ///
    /// Returns the entity's new cumulative total in seconds.
    pub fn apply(&mut self, entity: &str, interval: UnhealthyInterval, alert_type: &str) -> f64 {
        let (old_total, new_total) = match self.entities.get_mut(entity) {
            Some(state) => {
                let old = state.total_unhealthy_us;
                state.record(interval, alert_type);
                (Some(old), state.total_unhealthy_us)
            }
            None => {
                let mut state = EntityState::default();
                state.record(interval, alert_type);
                let total = state.total_unhealthy_us;
                self.entities.insert(entity.to_owned(), state);
                (None, total)
            }
        };
        self.reposition(entity, old_total, new_total);
        micros_to_secs(new_total)
    }

    /// Move `entity` from the bucket for `old_total` to the bucket for `new_total`.
    fn reposition(&mut self, entity: &str, old_total: Option<RankKey>, new_total: RankKey) {
        if let Some(old) = old_total {
            if let Some(bucket) = self.ranking.get_mut(&old) {
                bucket.remove(entity);
                if bucket.is_empty() {
                    self.ranking.remove(&old);
                }
            }
        }
        self.ranking
            .entry(new_total)
            .or_default()
            .insert(entity.to_owned());
    }

    /// Up to `k` entities by descending cumulative time.
    ///
    /// Entities tied on time come out in name order, so repeated calls agree.
    pub fn top_k(&self, k: usize) -> Vec<RankedEntity> {
        self.ranked()
            .take(k)
            .map(|(entity, state)| to_ranked(entity, state.total_unhealthy_us, state))
            .collect()
    }

    /// Like [`Self::top_k`], restricted to entities that saw `alert_type` at least once.
    pub fn top_k_with_alert_type(&self, k: usize, alert_type: &str) -> Vec<RankedEntity> {
        self.ranked()
            .filter(|(_, state)| state.alert_type_counts.contains_key(alert_type))
            .take(k)
            .map(|(entity, state)| to_ranked(entity, state.total_unhealthy_us, state))
            .collect()
    }

    /// Unhealthy seconds of `entity` overlapping `[start, end]`. Unknown entity → 0.
    pub fn unhealthy_time_in_range(
        &self,
        entity: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> f64 {
        self.entities
            .get(entity)
            .map_or(0.0, |state| state.unhealthy_time_in_range(start, end))
    }

    /// Windowed ranking. Recomputed per call: O(entities × intervals).
    ///
    /// Entities with no time inside the window are left out.
    pub fn top_k_in_range(
        &self,
        k: usize,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<RankedEntity> {
        let mut scored: Vec<(&String, u64, &EntityState)> = self
            .entities
            .iter()
            .map(|(entity, state)| (entity, state.unhealthy_us_in_range(start, end), state))
            .filter(|(_, us, _)| *us > 0)
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        scored
            .into_iter()
            .take(k)
            .map(|(entity, us, state)| to_ranked(entity, us, state))
            .collect()
    }

    pub fn entity(&self, entity: &str) -> Option<&EntityState> {
        self.entities.get(entity)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Number of distinct cumulative totals currently held.
    pub fn bucket_count(&self) -> usize {
        self.ranking.len()
    }

    /// Verify the bucket invariant. Returns a description of the first violation.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut placed = 0usize;
        for (key, bucket) in &self.ranking {
            if bucket.is_empty() {
                return Err(format!("empty bucket at {key}"));
            }
            for entity in bucket {
                let Some(state) = self.entities.get(entity) else {
                    return Err(format!("bucket {key} holds unknown entity {entity}"));
                };
                if state.total_unhealthy_us != *key {
                    return Err(format!(
                        "entity {entity} has total {} but sits in bucket {key}",
                        state.total_unhealthy_us
                    ));
                }
                placed += 1;
            }
        }
        if placed != self.entities.len() {
            return Err(format!(
                "{placed} bucket memberships for {} entities",
                self.entities.len()
            ));
        }
        Ok(())
    }

    /// Entities in rank order: largest total first, ties by name.
    fn ranked(&self) -> impl Iterator<Item = (&String, &EntityState)> + '_ {
        self.ranking.values().rev().flat_map(move |bucket| {
            bucket
                .iter()
                .filter_map(move |entity| self.entities.get(entity).map(|state| (entity, state)))
        })
    }
}

fn to_ranked(entity: &str, us: u64, state: &EntityState) -> RankedEntity {
    RankedEntity {
        entity_id: entity.to_owned(),
        total_unhealthy_time: micros_to_secs(us),
        alert_type_counts: state.alert_type_counts.clone(),
    }
}
