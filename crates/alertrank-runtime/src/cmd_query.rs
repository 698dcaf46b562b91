//! Client subcommands talking to a running `alertrank serve`.

use crate::cli::{IngestOpts, QueryOpts};
use crate::client::{fetch_report, rpc_call};
use crate::config::RuntimeConfig;
use crate::output;
use crate::report::QuerySpec;
use crate::results::ResultsStore;

/// `alertrank query <dimension>`
pub async fn cmd_query(
    socket_path: &str,
    opts: QueryOpts,
    config: &RuntimeConfig,
) -> anyhow::Result<()> {
    let spec = QuerySpec::from_args(&opts.dimension, &opts.query)?;
    let report = fetch_report(socket_path, &spec).await?;
    output::emit(
        &output::render(&report, opts.query.format)?,
        opts.query.output.as_deref(),
    )?;
    if opts.query.save {
        let path = ResultsStore::new(&config.results_dir).save(
            &report.entities,
            &format!("server:{socket_path}"),
            &spec,
        )?;
        eprintln!("Results saved to {}", path.display());
    }
    Ok(())
}

/// `alertrank ingest <file>`
pub async fn cmd_ingest(socket_path: &str, opts: IngestOpts) -> anyhow::Result<()> {
    let path = std::path::absolute(&opts.file)?;
    let stats = rpc_call(
        socket_path,
        "ingest_file",
        serde_json::json!({"path": path, "presort": opts.presort}),
    )
    .await?;
    println!("{}", format_ingest_stats(&path.display().to_string(), &stats));
    Ok(())
}

/// `alertrank dimensions`
pub async fn cmd_dimensions(socket_path: &str) -> anyhow::Result<()> {
    let dims = rpc_call(socket_path, "list_dimensions", serde_json::Value::Null).await?;
    for dim in dims.as_array().into_iter().flatten() {
        if let Some(name) = dim.as_str() {
            println!("{name}");
        }
    }
    Ok(())
}

/// `alertrank health`
pub async fn cmd_health(socket_path: &str) -> anyhow::Result<()> {
    let health = rpc_call(socket_path, "health", serde_json::Value::Null).await?;
    println!("{}", serde_json::to_string_pretty(&health)?);
    Ok(())
}

pub(crate) fn format_ingest_stats(file: &str, stats: &serde_json::Value) -> String {
    let n = |key: &str| stats[key].as_u64().unwrap_or(0);
    format!(
        "Ingested {file}: {} lines, {} accepted, {} rejected, {} duplicates, {} finalized, {} warnings",
        n("lines"),
        n("accepted"),
        n("parse_errors") + n("validation_errors"),
        n("duplicates"),
        n("finalized"),
        n("warnings"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_summary_line() {
        let stats = serde_json::json!({
            "lines": 10, "accepted": 7, "duplicates": 1, "parse_errors": 1,
            "validation_errors": 1, "opened": 4, "finalized": 3, "warnings": 0,
        });
        assert_eq!(
            format_ingest_stats("e.jsonl", &stats),
            "Ingested e.jsonl: 10 lines, 7 accepted, 2 rejected, 1 duplicates, 3 finalized, 0 warnings"
        );
    }

    #[test]
    fn missing_counters_read_as_zero() {
        let line = format_ingest_stats("x", &serde_json::Value::Null);
        assert!(line.contains("0 lines"));
    }
}
