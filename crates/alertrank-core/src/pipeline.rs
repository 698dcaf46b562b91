//! Ingest pipeline: raw lines → validator → tracker → index manager.
//!
//! Bad records are logged and counted, never fatal. Lines are applied in the
//! order given unless a batch asks for a timestamp presort.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{ConfigError, EventError};
use crate::manager::IndexManager;
use crate::tracker::{AlertTracker, Transition, UnmatchedResolvePolicy};
use crate::types::AlertEvent;
use crate::validator::{EventValidator, Validated};

// ─── Stats ───────────────────────────────────────────────────────────

/// Counters for one ingest call, or cumulative for a pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    /// Non-blank lines (or typed events) seen.
    pub lines: u64,
    pub accepted: u64,
    pub duplicates: u64,
    pub parse_errors: u64,
    pub validation_errors: u64,
    pub opened: u64,
    pub finalized: u64,
    pub warnings: u64,
}

impl IngestStats {
    pub fn rejected(&self) -> u64 {
        self.parse_errors + self.validation_errors
    }

    pub fn merge(&mut self, other: &IngestStats) {
        self.lines += other.lines;
        self.accepted += other.accepted;
        self.duplicates += other.duplicates;
        self.parse_errors += other.parse_errors;
        self.validation_errors += other.validation_errors;
        self.opened += other.opened;
        self.finalized += other.finalized;
        self.warnings += other.warnings;
    }

    fn count_rejection(&mut self, err: &EventError) {
        match err {
            EventError::Parse(_) => self.parse_errors += 1,
            EventError::Validation { .. } => self.validation_errors += 1,
        }
    }

    fn count_transition(&mut self, transition: &Transition) {
        match transition {
            Transition::Opened { .. } => self.opened += 1,
            Transition::Updated { .. } => {}
            Transition::Finalized { .. } => self.finalized += 1,
            Transition::Backfilled { .. } => {
                self.finalized += 1;
                self.warnings += 1;
            }
            Transition::Warned(_) => self.warnings += 1,
        }
    }
}

// ─── Pipeline ────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Pipeline {
    validator: EventValidator,
    tracker: AlertTracker,
    manager: Arc<IndexManager>,
    stats: IngestStats,
}

impl Pipeline {
    pub fn new(manager: Arc<IndexManager>, policy: UnmatchedResolvePolicy) -> Self {
        Self {
            validator: EventValidator::new(),
            tracker: AlertTracker::new(policy),
            manager,
            stats: IngestStats::default(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        let manager = Arc::new(config.build_manager()?);
        Ok(Self::new(manager, config.unmatched_resolve))
    }

    /// Shared handle for query engines.
    pub fn manager(&self) -> &Arc<IndexManager> {
        &self.manager
    }

    pub fn tracker(&self) -> &AlertTracker {
        &self.tracker
    }

    /// Totals since construction.
    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Feed one raw line. Blank lines are skipped without counting.
    pub fn ingest_line(&mut self, line: &str) -> IngestStats {
        let mut delta = IngestStats::default();
        let line = line.trim();
        if !line.is_empty() {
            delta.lines += 1;
            if let Some(event) = self.validate(line, &mut delta) {
                self.track(event, &mut delta);
            }
        }
        self.stats.merge(&delta);
        delta
    }

    /// Feed an event that is already typed. Duplicate ids are still dropped.
    pub fn ingest_event(&mut self, event: AlertEvent) -> IngestStats {
        let mut delta = IngestStats {
            lines: 1,
            ..IngestStats::default()
        };
        match self.validator.admit(event) {
            Validated::Fresh(event) => {
                delta.accepted += 1;
                self.track(event, &mut delta);
            }
            Validated::Duplicate { event_id } => {
                debug!(event_id = %event_id, "duplicate event ignored");
                delta.duplicates += 1;
            }
        }
        self.stats.merge(&delta);
        delta
    }

    /// Validate every line in input order, then feed the accepted events to the
    /// tracker. With `presort`, events are stable-sorted by timestamp first so
    /// out-of-order input still pairs opens with resolutions. The tracker's
    /// window start is seeded with the batch's earliest timestamp before any
    /// event is tracked.
    pub fn ingest_batch<I, S>(&mut self, lines: I, presort: bool) -> IngestStats
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let started = Instant::now();
        let mut delta = IngestStats::default();
        let mut events = Vec::new();
        for line in lines {
            let line = line.as_ref().trim();
            if line.is_empty() {
                continue;
            }
            delta.lines += 1;
            if let Some(event) = self.validate(line, &mut delta) {
                events.push(event);
            }
        }
        if presort {
            events.sort_by_key(|event| event.timestamp);
        }
        if let Some(earliest) = events.iter().map(|event| event.timestamp).min() {
            self.tracker.seed_window_start(earliest);
        }
        for event in events {
            self.track(event, &mut delta);
        }
        self.stats.merge(&delta);

        let elapsed = started.elapsed();
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 { delta.lines as f64 / secs } else { 0.0 };
        info!(
            events = delta.lines,
            accepted = delta.accepted,
            rejected = delta.rejected(),
            duplicates = delta.duplicates,
            finalized = delta.finalized,
            warnings = delta.warnings,
            elapsed_ms = elapsed.as_millis() as u64,
            events_per_sec = rate,
            "ingested batch"
        );
        delta
    }

    fn validate(&mut self, line: &str, delta: &mut IngestStats) -> Option<AlertEvent> {
        match self.validator.validate_line(line) {
            Ok(Validated::Fresh(event)) => {
                delta.accepted += 1;
                Some(event)
            }
            Ok(Validated::Duplicate { event_id }) => {
                debug!(event_id = %event_id, "duplicate event ignored");
                delta.duplicates += 1;
                None
            }
            Err(err) => {
                match &err {
                    EventError::Validation {
                        event_id: Some(id), ..
                    } => warn!(event_id = %id, error_type = err.kind(), "skipping event: {err}"),
                    _ => warn!(error_type = err.kind(), "skipping event: {err}"),
                }
                delta.count_rejection(&err);
                None
            }
        }
    }

    fn track(&mut self, event: AlertEvent, delta: &mut IngestStats) {
        let transition = self.tracker.observe(event, &self.manager);
        delta.count_transition(&transition);
    }
}
