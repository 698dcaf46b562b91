//! Saved query results: one JSON file per query, with the parameters that
//! produced it.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use alertrank_core::RankedEntity;

use crate::report::QuerySpec;

const PREFIX: &str = "query_results_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedQuery {
    pub timestamp: DateTime<Utc>,
    /// Event file or socket the ranking came from.
    pub data_source: String,
    pub parameters: QuerySpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedResults {
    pub query: SavedQuery,
    pub results: Vec<RankedEntity>,
}

/// One line of `results list`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedSummary {
    pub filename: String,
    pub timestamp: DateTime<Utc>,
    pub data_source: String,
    pub dimension: String,
    pub top_k: usize,
    pub alert_type: Option<String>,
    pub result_count: usize,
}

pub struct ResultsStore {
    dir: PathBuf,
}

impl ResultsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write a result file, creating the directory on first use.
    pub fn save(
        &self,
        results: &[RankedEntity],
        data_source: &str,
        parameters: &QuerySpec,
    ) -> anyhow::Result<PathBuf> {
        self.save_at(Utc::now(), results, data_source, parameters)
    }

    fn save_at(
        &self,
        now: DateTime<Utc>,
        results: &[RankedEntity],
        data_source: &str,
        parameters: &QuerySpec,
    ) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("cannot create results dir {}", self.dir.display()))?;
        let saved = SavedResults {
            query: SavedQuery {
                timestamp: now,
                data_source: data_source.to_owned(),
                parameters: parameters.clone(),
            },
            results: results.to_vec(),
        };
        let path = self
            .dir
            .join(format!("{PREFIX}{}.json", now.format("%Y%m%d_%H%M%S_%3f")));
        std::fs::write(&path, serde_json::to_string_pretty(&saved)?)
            .with_context(|| format!("cannot write {}", path.display()))?;
        tracing::info!(path = %path.display(), results = results.len(), "saved query results");
        Ok(path)
    }

    /// Read back a result file by name (relative to the results dir) or path.
    pub fn load(&self, name: &str) -> anyhow::Result<SavedResults> {
        let candidate = Path::new(name);
        let path = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.dir.join(candidate)
        };
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("invalid results file {}", path.display()))
    }

    /// Every readable result file, newest first. A missing directory is empty.
    pub fn list(&self) -> anyhow::Result<Vec<SavedSummary>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("cannot list results dir {}", self.dir.display()));
            }
        };

        let mut summaries = Vec::new();
        for entry in entries {
            let entry = entry?;
            let filename = entry.file_name().to_string_lossy().into_owned();
            if !filename.starts_with(PREFIX) || !filename.ends_with(".json") {
                continue;
            }
            match self.load(&filename) {
                Ok(saved) => summaries.push(SavedSummary {
                    filename,
                    timestamp: saved.query.timestamp,
                    data_source: saved.query.data_source,
                    dimension: saved.query.parameters.dimension,
                    top_k: saved.query.parameters.top_k,
                    alert_type: saved.query.parameters.alert_type,
                    result_count: saved.results.len(),
                }),
                Err(e) => tracing::warn!(file = %filename, "skipping unreadable results file: {e:#}"),
            }
        }
        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(summaries)
    }
}
