//! A ranking request as the CLI and the server see it, and how it maps onto
//! the query engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use alertrank_core::validator::parse_timestamp;
use alertrank_core::{QueryEngine, QueryError, TopKReport};

use crate::cli::QueryArgs;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub dimension: String,
    pub top_k: usize,
    #[serde(default)]
    pub alert_type: Option<String>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
}

impl QuerySpec {
    pub fn from_args(dimension: &str, args: &QueryArgs) -> anyhow::Result<Self> {
        let bound = |raw: &Option<String>, flag: &str| -> anyhow::Result<Option<DateTime<Utc>>> {
            raw.as_deref()
                .map(|s| {
                    parse_timestamp(s).map_err(|e| anyhow::anyhow!("invalid --{flag}: {e}"))
                })
                .transpose()
        };
        Ok(Self {
            dimension: dimension.to_owned(),
            top_k: args.top,
            alert_type: args.alert_type.clone(),
            since: bound(&args.since, "since")?,
            until: bound(&args.until, "until")?,
        })
    }

    pub fn is_windowed(&self) -> bool {
        self.since.is_some() || self.until.is_some()
    }

    /// An open side of the window extends to the end of representable time.
    pub fn window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            self.since.unwrap_or(DateTime::<Utc>::MIN_UTC),
            self.until.unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }

    pub fn run(&self, engine: &QueryEngine) -> Result<TopKReport, QueryError> {
        if !self.is_windowed() {
            return Ok(match &self.alert_type {
                Some(kind) => engine.top_k_with_alert_type(&self.dimension, self.top_k, kind)?,
                None => engine.top_k(&self.dimension, self.top_k)?,
            });
        }

        let (start, end) = self.window();
        let Some(kind) = &self.alert_type else {
            return engine.top_k_in_range(&self.dimension, self.top_k, start, end);
        };
        let mut report = engine.top_k_in_range(&self.dimension, usize::MAX, start, end)?;
        report.entities.retain(|e| e.alert_type_counts.contains_key(kind));
        report.entities.truncate(self.top_k);
        report.k = self.top_k;
        Ok(report)
    }
}
