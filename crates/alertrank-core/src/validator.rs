//! Event validator: raw JSON record → typed `AlertEvent`.
//!
//! Remembers every event id it has accepted; a repeated id is reported as
//! `Validated::Duplicate` (first occurrence wins) instead of an error so that
//! retransmitted records are harmless.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::error::{EventError, ValidationIssue};
use crate::types::{AlertEvent, Attributes, LifecycleState};

/// Naive timestamp layouts accepted in addition to RFC 3339. Interpreted as UTC.
const NAIVE_LAYOUTS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Outcome of validating one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validated {
    Fresh(AlertEvent),
    Duplicate { event_id: String },
}

#[derive(Debug, Default)]
pub struct EventValidator {
    seen: HashSet<String>,
}

impl EventValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate one line of JSON.
    pub fn validate_line(&mut self, line: &str) -> Result<Validated, EventError> {
        let value: Value = serde_json::from_str(line)?;
        self.validate_value(value)
    }

    /// Validate an already-decoded record.
    pub fn validate_value(&mut self, value: Value) -> Result<Validated, EventError> {
        let Value::Object(record) = value else {
            return Err(EventError::Validation {
                event_id: None,
                issue: ValidationIssue::NotAnObject,
            });
        };

        let event_id = required_str(&record, "event_id").map_err(|issue| EventError::Validation {
            event_id: None,
            issue,
        })?;

        let event = parse_record(&record, &event_id).map_err(|issue| EventError::Validation {
            event_id: Some(event_id),
            issue,
        })?;

        Ok(self.admit(event))
    }

    /// Duplicate check for an event that is already typed.
    pub fn admit(&mut self, event: AlertEvent) -> Validated {
        if self.seen.contains(&event.event_id) {
            return Validated::Duplicate {
                event_id: event.event_id,
            };
        }
        self.seen.insert(event.event_id.clone());
        Validated::Fresh(event)
    }

    /// Number of distinct event ids accepted so far.
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

fn parse_record(record: &Map<String, Value>, event_id: &str) -> Result<AlertEvent, ValidationIssue> {
    let alert_id = required_str(record, "alert_id")?;
    let raw_ts = required_str(record, "timestamp")?;
    let raw_state = required_str(record, "state")?;
    let alert_type = required_field(record, "type")?
        .as_str()
        .ok_or(ValidationIssue::WrongType {
            field: "type",
            expected: "a string",
        })?
        .to_owned();
    let attributes = parse_attributes(required_field(record, "tags")?)?;

    let timestamp = parse_timestamp(&raw_ts)?;
    let state = raw_state.parse::<LifecycleState>()?;

    Ok(AlertEvent {
        event_id: event_id.to_owned(),
        alert_id,
        timestamp,
        state,
        alert_type,
        attributes,
    })
}

fn required_field<'a>(
    record: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a Value, ValidationIssue> {
    match record.get(field) {
        None | Some(Value::Null) => Err(ValidationIssue::MissingField(field)),
        Some(v) => Ok(v),
    }
}

/// A required, non-empty string field.
fn required_str(record: &Map<String, Value>, field: &'static str) -> Result<String, ValidationIssue> {
    let s = required_field(record, field)?
        .as_str()
        .ok_or(ValidationIssue::WrongType {
            field,
            expected: "a string",
        })?;
    if s.is_empty() {
        return Err(ValidationIssue::EmptyField(field));
    }
    Ok(s.to_owned())
}

/// Scalars are kept as strings; null and nested values carry no grouping key.
fn parse_attributes(tags: &Value) -> Result<Attributes, ValidationIssue> {
    let Value::Object(map) = tags else {
        return Err(ValidationIssue::WrongType {
            field: "tags",
            expected: "an object",
        });
    };
    let mut attributes = Attributes::new();
    for (key, value) in map {
        let rendered = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null | Value::Array(_) | Value::Object(_) => continue,
        };
        attributes.insert(key.clone(), rendered);
    }
    Ok(attributes)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ValidationIssue> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for layout in NAIVE_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, layout) {
            return Ok(naive.and_utc());
        }
    }
    Err(ValidationIssue::BadTimestamp(raw.to_owned()))
}
