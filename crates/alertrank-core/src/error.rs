//! Error and warning taxonomy.
//!
//! `EventError` and `LifecycleWarning` are data-quality problems: the pipeline
//! logs them and moves on. `ConfigError` and `QueryError` are caller mistakes
//! and are always returned.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// A raw record could not become an `AlertEvent`.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("malformed event record: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid event{}: {issue}", id_suffix(.event_id))]
    Validation {
        event_id: Option<String>,
        issue: ValidationIssue,
    },
}

fn id_suffix(event_id: &Option<String>) -> String {
    event_id
        .as_deref()
        .map(|id| format!(" {id}"))
        .unwrap_or_default()
}

impl EventError {
    /// Short classifier used as the `error_type` log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parse_error",
            Self::Validation { .. } => "validation_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationIssue {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("field `{0}` must not be empty")]
    EmptyField(&'static str),

    #[error("unparsable timestamp {0:?}")]
    BadTimestamp(String),

    #[error("unknown lifecycle state {0:?}")]
    UnknownState(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntervalError {
    #[error("interval end {end} is before start {start}")]
    EndBeforeStart {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Recoverable lifecycle inconsistency. Never aborts ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleWarning {
    #[error("alert {alert_id} resolved without being seen open")]
    UnmatchedResolve { alert_id: String },

    #[error("alert {alert_id} resolved at {end} before it opened at {start}")]
    NegativeDuration {
        alert_id: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("alert {alert_id} already resolved")]
    RedundantResolve { alert_id: String },
}

impl LifecycleWarning {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnmatchedResolve { .. } => "unmatched_resolve",
            Self::NegativeDuration { .. } => "negative_duration",
            Self::RedundantResolve { .. } => "redundant_resolve",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("dimension {0:?} is not registered")]
    UnknownDimension(String),

    #[error("dimension {0:?} is already registered")]
    DuplicateDimension(String),

    #[error("invalid dimension {name:?}: {reason}")]
    InvalidDimension { name: String, reason: String },

    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("query window start {start} is after end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}
