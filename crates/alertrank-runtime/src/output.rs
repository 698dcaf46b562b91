//! Text and JSON rendering of ranking reports.

use std::path::Path;

use anyhow::Context;

use alertrank_core::{RankedEntity, TopKReport};

use crate::cli::OutputFormat;

pub fn render(report: &TopKReport, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&report.entities)?),
        OutputFormat::Text => Ok(format_text(&report.dimension, &report.entities)),
    }
}

/// Human-readable ranking:
///
/// ```text
/// Top Unhealthy Entities (host):
/// ==============================
/// 1. h1
///    Total Unhealthy Time: 5400 seconds
///    Alert Types:
///      - Disk Usage Alert: 2
/// ```
pub(crate) fn format_text(dimension: &str, entities: &[RankedEntity]) -> String {
    let header = format!("Top Unhealthy Entities ({dimension}):");
    let mut out = vec![header.clone(), "=".repeat(header.chars().count())];

    if entities.is_empty() {
        out.push("(no entities)".to_string());
    }
    for (i, entity) in entities.iter().enumerate() {
        out.push(format!("{}. {}", i + 1, entity.entity_id));
        out.push(format!(
            "   Total Unhealthy Time: {} seconds",
            entity.total_unhealthy_time
        ));
        if !entity.alert_type_counts.is_empty() {
            out.push("   Alert Types:".to_string());
            for (kind, count) in &entity.alert_type_counts {
                out.push(format!("     - {kind}: {count}"));
            }
        }
        out.push(String::new());
    }
    out.join("\n")
}

/// Print to stdout, or write to `path` when one is given.
pub fn emit(rendered: &str, path: Option<&Path>) -> anyhow::Result<()> {
    match path {
        Some(path) => std::fs::write(path, rendered)
            .with_context(|| format!("cannot write output to {}", path.display())),
        None => {
            println!("{rendered}");
            Ok(())
        }
    }
}
