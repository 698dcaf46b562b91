use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{IntervalError, ValidationIssue};

/// Entity attributes attached to an alert (`tags` on the wire).
pub type Attributes = BTreeMap<String, String>;

/// Per-alert-type occurrence counts for one entity.
pub type AlertTypeCounts = BTreeMap<String, u64>;

// ─── Lifecycle State ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    #[serde(rename = "NEW")]
    New,
    #[serde(rename = "ACK")]
    Ack,
    #[serde(rename = "RSV", alias = "RESOLVED")]
    Resolved,
}

impl LifecycleState {
    pub const ALL: [Self; 3] = [Self::New, Self::Ack, Self::Resolved];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Ack => "ACK",
            Self::Resolved => "RSV",
        }
    }

    /// NEW and ACK both mean the alert is (still) open.
    pub fn is_open(self) -> bool {
        matches!(self, Self::New | Self::Ack)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleState {
    type Err = ValidationIssue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(Self::New),
            "ACK" => Ok(Self::Ack),
            "RSV" | "RESOLVED" => Ok(Self::Resolved),
            _ => Err(ValidationIssue::UnknownState(s.to_owned())),
        }
    }
}

// ─── Alert Event ──────────────────────────────────────────────────

/// One validated lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub event_id: String,
    pub alert_id: String,
    pub timestamp: DateTime<Utc>,
    pub state: LifecycleState,
    #[serde(rename = "type")]
    pub alert_type: String,
    #[serde(rename = "tags", default)]
    pub attributes: Attributes,
}

// ─── Unhealthy Interval ───────────────────────────────────────────

/// A closed span during which an alert kept its entities unhealthy.
///
/// Construction rejects `end < start`; a zero-length interval is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnhealthyInterval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl UnhealthyInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, IntervalError> {
        if end < start {
            return Err(IntervalError::EndBeforeStart { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Length in whole microseconds.
    pub fn duration_us(&self) -> u64 {
        micros_between(self.start, self.end)
    }

    /// Length in seconds.
    pub fn duration_secs(&self) -> f64 {
        micros_to_secs(self.duration_us())
    }

    /// Microseconds of this interval that fall inside `[start, end]`.
    pub fn overlap_us(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
        let lo = self.start.max(start);
        let hi = self.end.min(end);
        if hi <= lo {
            return 0;
        }
        micros_between(lo, hi)
    }

    /// Seconds of this interval that fall inside `[start, end]`. Never negative.
    pub fn overlap_secs(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
        micros_to_secs(self.overlap_us(start, end))
    }
}

fn micros_between(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    (to - from)
        .num_microseconds()
        .and_then(|us| u64::try_from(us).ok())
        .unwrap_or(0)
}

/// Totals are kept in integer microseconds; sub-microsecond spans are dropped.
/// Seconds are a presentation unit.
pub fn micros_to_secs(us: u64) -> f64 {
    us as f64 / 1_000_000.0
}

// ─── Resolution ───────────────────────────────────────────────────

/// A finalized alert, ready to be attributed to every registered dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub alert_id: String,
    pub alert_type: String,
    pub attributes: Attributes,
    pub interval: UnhealthyInterval,
}

// ─── Query Records ────────────────────────────────────────────────

/// One row of a ranking answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntity {
    pub entity_id: String,
    /// Seconds.
    pub total_unhealthy_time: f64,
    pub alert_type_counts: AlertTypeCounts,
}

/// A ranking answer for one dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopKReport {
    pub dimension: String,
    pub k: usize,
    pub entities: Vec<RankedEntity>,
}

// ─── Tests ────────────────────────────────────────────────────────
