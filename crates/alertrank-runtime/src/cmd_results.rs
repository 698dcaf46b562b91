//! `alertrank results`: browse saved query results.

use crate::cli::{OutputFormat, ResultsCommand};
use crate::output;
use crate::results::{ResultsStore, SavedSummary};

pub fn cmd_results(command: ResultsCommand, store: &ResultsStore) -> anyhow::Result<()> {
    match command {
        ResultsCommand::List => {
            let listed = store.list()?;
            println!("{}", format_listing(&listed));
        }
        ResultsCommand::Show { name } => {
            let saved = store.load(&name)?;
            let params = &saved.query.parameters;
            println!(
                "Query at {} on {} (dimension {}, top {}{})",
                saved.query.timestamp.to_rfc3339(),
                saved.query.data_source,
                params.dimension,
                params.top_k,
                params
                    .alert_type
                    .as_deref()
                    .map(|t| format!(", alert type {t}"))
                    .unwrap_or_default(),
            );
            println!();
            let report = alertrank_core::TopKReport {
                dimension: params.dimension.clone(),
                k: params.top_k,
                entities: saved.results,
            };
            println!("{}", output::render(&report, OutputFormat::Text)?);
        }
    }
    Ok(())
}

pub(crate) fn format_listing(listed: &[SavedSummary]) -> String {
    if listed.is_empty() {
        return "No saved results".to_string();
    }
    listed
        .iter()
        .map(|s| {
            format!(
                "{}  {}  {}  dimension={} top_k={} alert_type={} results={}",
                s.filename,
                s.timestamp.format("%Y-%m-%d %H:%M:%S"),
                s.data_source,
                s.dimension,
                s.top_k,
                s.alert_type.as_deref().unwrap_or("-"),
                s.result_count,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
