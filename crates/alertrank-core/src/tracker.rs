//! Alert lifecycle tracker.
//!
//! Keeps working state only for alerts that are currently open. A RESOLVED
//! event closes the alert, forwards its interval to the index manager and
//! drops the state.
//!
//! Per alert id: `absent → open` on NEW/ACK, `open → open` on further NEW/ACK
//! (first-seen attributes and start time win), `open → closed` on RESOLVED.
//! A RESOLVED for an alert never seen open is governed by
//! [`UnmatchedResolvePolicy`]; a second RESOLVED for a closed alert is a no-op.
//!
//! Under the default policy nothing outlives a finalized alert. Finalized ids
//! are remembered only under [`UnmatchedResolvePolicy::WindowStart`], where they
//! stop a replayed RESOLVED from being backfilled a second time.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LifecycleWarning;
use crate::manager::IndexManager;
use crate::types::{AlertEvent, Attributes, LifecycleState, Resolution, UnhealthyInterval};

// ─── Policy ──────────────────────────────────────────────────────────

/// What to do with a RESOLVED event whose alert was never seen open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedResolvePolicy {
    /// Contribute nothing; log a warning.
    #[default]
    Ignore,
    /// Treat the alert as unhealthy from the window start up to the RESOLVED
    /// timestamp; still log a warning. The window start is the earliest event
    /// timestamp observed, including every event of the batch being ingested.
    WindowStart,
}

// ─── Alert State ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPhase {
    New,
    Acknowledged,
}

impl AlertPhase {
    fn from_state(state: LifecycleState) -> Self {
        match state {
            LifecycleState::Ack => Self::Acknowledged,
            LifecycleState::New | LifecycleState::Resolved => Self::New,
        }
    }
}

/// Working memory for one open alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertState {
    pub alert_id: String,
    pub alert_type: String,
    /// Snapshot taken at first sighting.
    pub attributes: Attributes,
    pub phase: AlertPhase,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

// ─── Transition ──────────────────────────────────────────────────────

/// What one event did to the tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Opened {
        alert_id: String,
    },
    /// Further NEW/ACK for an already-open alert.
    Updated {
        alert_id: String,
    },
    Finalized {
        alert_id: String,
        duration_secs: f64,
        dimensions: usize,
    },
    /// Unmatched RESOLVED attributed under [`UnmatchedResolvePolicy::WindowStart`].
    Backfilled {
        alert_id: String,
        duration_secs: f64,
        dimensions: usize,
    },
    /// Nothing was attributed.
    Warned(LifecycleWarning),
}

// ─── Tracker ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct AlertTracker {
    open: HashMap<String, AlertState>,
    /// Ids finalized so far. Only kept under `WindowStart`.
    closed: HashSet<String>,
    policy: UnmatchedResolvePolicy,
    /// Earliest event timestamp observed.
    window_start: Option<DateTime<Utc>>,
}

impl AlertTracker {
    pub fn new(policy: UnmatchedResolvePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> UnmatchedResolvePolicy {
        self.policy
    }

    /// Feed one validated event. Never fails; inconsistencies come back as
    /// [`Transition::Warned`] and are logged here.
    pub fn observe(&mut self, event: AlertEvent, manager: &IndexManager) -> Transition {
        self.seed_window_start(event.timestamp);

        let transition = if event.state.is_open() {
            self.open_or_update(event)
        } else {
            self.resolve(event, manager)
        };

        if let Transition::Warned(warning) = &transition {
            warn!(error_type = warning.kind(), "{warning}");
        }
        transition
    }

    fn open_or_update(&mut self, event: AlertEvent) -> Transition {
        if let Some(state) = self.open.get_mut(&event.alert_id) {
            if event.state == LifecycleState::Ack {
                state.phase = AlertPhase::Acknowledged;
            }
            return Transition::Updated {
                alert_id: event.alert_id,
            };
        }

        self.closed.remove(&event.alert_id);
        let state = AlertState {
            alert_id: event.alert_id.clone(),
            alert_type: event.alert_type,
            attributes: event.attributes,
            phase: AlertPhase::from_state(event.state),
            start_time: event.timestamp,
            end_time: None,
        };
        debug!(alert_id = %state.alert_id, start = %state.start_time, "alert opened");
        self.open.insert(event.alert_id.clone(), state);
        Transition::Opened {
            alert_id: event.alert_id,
        }
    }

    fn resolve(&mut self, event: AlertEvent, manager: &IndexManager) -> Transition {
        let Some(mut state) = self.open.remove(&event.alert_id) else {
            return self.resolve_unmatched(event, manager);
        };
        state.end_time = Some(event.timestamp);
        self.remember_closed(&state.alert_id);

        let interval = match UnhealthyInterval::new(state.start_time, event.timestamp) {
            Ok(interval) => interval,
            Err(_) => {
                return Transition::Warned(LifecycleWarning::NegativeDuration {
                    alert_id: state.alert_id,
                    start: state.start_time,
                    end: event.timestamp,
                });
            }
        };

        let duration_secs = interval.duration_secs();
        let dimensions = manager.apply_resolution(&Resolution {
            alert_id: state.alert_id.clone(),
            alert_type: state.alert_type,
            attributes: state.attributes,
            interval,
        });
        debug!(alert_id = %state.alert_id, duration_secs, dimensions, "alert finalized");
        Transition::Finalized {
            alert_id: state.alert_id,
            duration_secs,
            dimensions,
        }
    }

    fn resolve_unmatched(&mut self, event: AlertEvent, manager: &IndexManager) -> Transition {
        if self.closed.contains(&event.alert_id) {
            return Transition::Warned(LifecycleWarning::RedundantResolve {
                alert_id: event.alert_id,
            });
        }

        let warning = LifecycleWarning::UnmatchedResolve {
            alert_id: event.alert_id.clone(),
        };
        let window_start = match (self.policy, self.window_start) {
            (UnmatchedResolvePolicy::WindowStart, Some(ws)) => ws,
            _ => return Transition::Warned(warning),
        };
        let Ok(interval) = UnhealthyInterval::new(window_start, event.timestamp) else {
            return Transition::Warned(warning);
        };

        warn!(error_type = warning.kind(), window_start = %window_start, "{warning}; attributing from window start");
        self.remember_closed(&event.alert_id);
        let duration_secs = interval.duration_secs();
        let dimensions = manager.apply_resolution(&Resolution {
            alert_id: event.alert_id.clone(),
            alert_type: event.alert_type,
            attributes: event.attributes,
            interval,
        });
        Transition::Backfilled {
            alert_id: event.alert_id,
            duration_secs,
            dimensions,
        }
    }

    fn remember_closed(&mut self, alert_id: &str) {
        if self.policy == UnmatchedResolvePolicy::WindowStart {
            self.closed.insert(alert_id.to_owned());
        }
    }

    /// Pull the window start back to `ts` if it is earlier. Batch ingest seeds
    /// the batch minimum before tracking so backfills do not depend on the
    /// order unrelated alerts arrive in.
    pub fn seed_window_start(&mut self, ts: DateTime<Utc>) {
        self.window_start = Some(match self.window_start {
            Some(ws) => ws.min(ts),
            None => ts,
        });
    }

    /// Finalized ids still remembered.
    pub fn closed_count(&self) -> usize {
        self.closed.len()
    }

    pub fn is_open(&self, alert_id: &str) -> bool {
        self.open.contains_key(alert_id)
    }

    pub fn get(&self, alert_id: &str) -> Option<&AlertState> {
        self.open.get(alert_id)
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn window_start(&self) -> Option<DateTime<Utc>> {
        self.window_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::AttributeExtractor;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, h, m, 0).single().expect("valid time")
    }

    fn manager() -> IndexManager {
        let mut m = IndexManager::new();
        m.register_dimension("host", AttributeExtractor::new("host"))
            .expect("host");
        m.register_dimension("dc", AttributeExtractor::new("dc"))
            .expect("dc");
        m
    }

    fn event(alert_id: &str, state: LifecycleState, ts: DateTime<Utc>, host: &str) -> AlertEvent {
        AlertEvent {
            event_id: format!("{alert_id}-{state}-{}", ts.timestamp()),
            alert_id: alert_id.to_owned(),
            timestamp: ts,
            state,
            alert_type: "Disk Usage Alert".to_owned(),
            attributes: [("host".to_owned(), host.to_owned())].into_iter().collect(),
        }
    }

    fn host_total(m: &IndexManager, host: &str) -> Option<f64> {
        m.get_index("host")
            .expect("registered")
            .entity(host)
            .map(|s| s.total_unhealthy_secs())
    }

    // ── 1. new_then_resolve_attributes_duration ─────────────────────

    #[test]
    fn new_then_resolve_attributes_duration() {
        let m = manager();
        let mut t = AlertTracker::default();

        assert!(matches!(
            t.observe(event("A1", LifecycleState::New, at(10, 0), "h1"), &m),
            Transition::Opened { .. }
        ));
        assert!(t.is_open("A1"));

        let tr = t.observe(event("A1", LifecycleState::Resolved, at(11, 0), "h1"), &m);
        assert_eq!(
            tr,
            Transition::Finalized {
                alert_id: "A1".into(),
                duration_secs: 3600.0,
                dimensions: 1,
            }
        );
        assert!(!t.is_open("A1"));
        assert_eq!(t.open_count(), 0);
        assert_eq!(host_total(&m, "h1"), Some(3600.0));
    }

    // ── 2. ack_does_not_move_start_or_snapshot ──────────────────────

    #[test]
    fn ack_does_not_move_start_or_snapshot() {
        let m = manager();
        let mut t = AlertTracker::default();
        t.observe(event("A1", LifecycleState::New, at(10, 0), "h1"), &m);
        let tr = t.observe(event("A1", LifecycleState::Ack, at(10, 5), "h2"), &m);
        assert_eq!(tr, Transition::Updated { alert_id: "A1".into() });

        let state = t.get("A1").expect("open");
        assert_eq!(state.start_time, at(10, 0));
        assert_eq!(state.phase, AlertPhase::Acknowledged);
        assert_eq!(state.attributes.get("host").map(String::as_str), Some("h1"));

        t.observe(event("A1", LifecycleState::Resolved, at(11, 0), "h3"), &m);
        assert_eq!(host_total(&m, "h1"), Some(3600.0));
        assert_eq!(host_total(&m, "h2"), None);
        assert_eq!(host_total(&m, "h3"), None);
    }

    // ── 3. ack_can_open_an_alert ────────────────────────────────────

    #[test]
    fn ack_can_open_an_alert() {
        let m = manager();
        let mut t = AlertTracker::default();
        t.observe(event("A1", LifecycleState::Ack, at(10, 0), "h1"), &m);
        assert_eq!(t.get("A1").expect("open").phase, AlertPhase::Acknowledged);
        t.observe(event("A1", LifecycleState::Resolved, at(10, 30), "h1"), &m);
        assert_eq!(host_total(&m, "h1"), Some(1800.0));
    }

    // ── 4. unmatched_resolve_is_ignored_by_default ──────────────────

    #[test]
    fn unmatched_resolve_is_ignored_by_default() {
        let m = manager();
        let mut t = AlertTracker::default();
        let tr = t.observe(event("A3", LifecycleState::Resolved, at(12, 0), "h2"), &m);
        assert_eq!(
            tr,
            Transition::Warned(LifecycleWarning::UnmatchedResolve {
                alert_id: "A3".into()
            })
        );
        assert!(m.get_index("host").expect("registered").is_empty());
    }

    // ── 5. redundant_resolve_does_not_double_count ──────────────────

    #[test]
    fn redundant_resolve_does_not_double_count() {
        let m = manager();
        let mut t = AlertTracker::new(UnmatchedResolvePolicy::WindowStart);
        t.observe(event("A1", LifecycleState::New, at(10, 0), "h1"), &m);
        t.observe(event("A1", LifecycleState::Resolved, at(11, 0), "h1"), &m);
        let tr = t.observe(event("A1", LifecycleState::Resolved, at(11, 30), "h1"), &m);
        assert_eq!(
            tr,
            Transition::Warned(LifecycleWarning::RedundantResolve {
                alert_id: "A1".into()
            })
        );
        assert_eq!(host_total(&m, "h1"), Some(3600.0));
    }

    // ── 6. negative_duration_discarded_and_state_removed ────────────

    #[test]
    fn negative_duration_discarded_and_state_removed() {
        let m = manager();
        let mut t = AlertTracker::default();
        t.observe(event("A1", LifecycleState::New, at(11, 0), "h1"), &m);
        let tr = t.observe(event("A1", LifecycleState::Resolved, at(10, 0), "h1"), &m);
        assert!(matches!(
            tr,
            Transition::Warned(LifecycleWarning::NegativeDuration { .. })
        ));
        assert!(!t.is_open("A1"));
        assert!(m.get_index("host").expect("registered").is_empty());
    }

    // ── 7. reopen_after_close_is_a_fresh_interval ───────────────────

    #[test]
    fn reopen_after_close_is_a_fresh_interval() {
        let m = manager();
        let mut t = AlertTracker::default();
        t.observe(event("A1", LifecycleState::New, at(10, 0), "h1"), &m);
        t.observe(event("A1", LifecycleState::Resolved, at(10, 10), "h1"), &m);
        assert!(matches!(
            t.observe(event("A1", LifecycleState::New, at(12, 0), "h1"), &m),
            Transition::Opened { .. }
        ));
        t.observe(event("A1", LifecycleState::Resolved, at(12, 20), "h1"), &m);
        assert_eq!(host_total(&m, "h1"), Some(1800.0));
        let idx = m.get_index("host").expect("registered");
        assert_eq!(idx.entity("h1").expect("h1").intervals().len(), 2);
    }

    // ── 8. window_start_policy_backfills_from_earliest_event ────────

    #[test]
    fn window_start_policy_backfills_from_earliest_event() {
        let m = manager();
        let mut t = AlertTracker::new(UnmatchedResolvePolicy::WindowStart);
        t.observe(event("A1", LifecycleState::New, at(9, 0), "h1"), &m);
        let tr = t.observe(event("A3", LifecycleState::Resolved, at(10, 0), "h2"), &m);
        assert_eq!(
            tr,
            Transition::Backfilled {
                alert_id: "A3".into(),
                duration_secs: 3600.0,
                dimensions: 1,
            }
        );
        assert_eq!(host_total(&m, "h2"), Some(3600.0));
        assert_eq!(t.window_start(), Some(at(9, 0)));

        // A replayed resolution for the backfilled alert is redundant.
        let again = t.observe(event("A3", LifecycleState::Resolved, at(10, 5), "h2"), &m);
        assert!(matches!(
            again,
            Transition::Warned(LifecycleWarning::RedundantResolve { .. })
        ));
        assert_eq!(host_total(&m, "h2"), Some(3600.0));
    }

    #[test]
    fn window_start_tracks_out_of_order_minimum() {
        let m = manager();
        let mut t = AlertTracker::new(UnmatchedResolvePolicy::WindowStart);
        t.observe(event("A1", LifecycleState::New, at(10, 0), "h1"), &m);
        t.observe(event("A2", LifecycleState::New, at(8, 0), "h1"), &m);
        assert_eq!(t.window_start(), Some(at(8, 0)));

        let late = at(8, 0) + Duration::minutes(30);
        let tr = t.observe(event("A9", LifecycleState::Resolved, late, "h9"), &m);
        assert!(matches!(tr, Transition::Backfilled { duration_secs, .. } if duration_secs == 1800.0));
    }

    #[test]
    fn seeded_window_start_precedes_arrival_order() {
        let m = manager();
        let mut t = AlertTracker::new(UnmatchedResolvePolicy::WindowStart);
        t.seed_window_start(at(9, 0));
        t.seed_window_start(at(9, 30));
        assert_eq!(t.window_start(), Some(at(9, 0)));

        let tr = t.observe(event("A3", LifecycleState::Resolved, at(10, 0), "h2"), &m);
        assert!(matches!(tr, Transition::Backfilled { duration_secs, .. } if duration_secs == 3600.0));
        t.observe(event("A1", LifecycleState::New, at(9, 0), "h1"), &m);
        assert_eq!(host_total(&m, "h2"), Some(3600.0));
    }

    #[test]
    fn ignore_policy_keeps_no_finalized_ids() {
        let m = manager();
        let mut t = AlertTracker::default();
        for i in 0..50 {
            let id = format!("A{i}");
            t.observe(event(&id, LifecycleState::New, at(10, 0), "h1"), &m);
            t.observe(event(&id, LifecycleState::Resolved, at(10, 1), "h1"), &m);
        }
        assert_eq!(t.open_count(), 0);
        assert_eq!(t.closed_count(), 0);

        // A replayed resolution still attributes nothing.
        let tr = t.observe(event("A0", LifecycleState::Resolved, at(10, 2), "h1"), &m);
        assert!(matches!(tr, Transition::Warned(LifecycleWarning::UnmatchedResolve { .. })));
        assert_eq!(host_total(&m, "h1"), Some(3000.0));
    }

    // ── 9. alert_without_grouping_attribute_still_closes ────────────

    #[test]
    fn alert_without_grouping_attribute_still_closes() {
        let m = manager();
        let mut t = AlertTracker::default();
        let mut open = event("A1", LifecycleState::New, at(10, 0), "h1");
        open.attributes.clear();
        t.observe(open, &m);
        let tr = t.observe(event("A1", LifecycleState::Resolved, at(10, 1), "h1"), &m);
        assert!(matches!(tr, Transition::Finalized { dimensions: 0, .. }));
        assert_eq!(t.open_count(), 0);
    }
}
