//! `alertrank process`: one-shot ingest and ranking, no server involved.

use std::sync::Arc;

use tokio::sync::Mutex;

use alertrank_core::{Pipeline, QueryEngine};

use crate::cli::ProcessOpts;
use crate::config::RuntimeConfig;
use crate::report::QuerySpec;
use crate::results::ResultsStore;
use crate::{ingest, output};

pub async fn cmd_process(opts: ProcessOpts, config: &RuntimeConfig) -> anyhow::Result<()> {
    let spec = QuerySpec::from_args(&opts.dimension, &opts.query)?;
    let pipeline = Pipeline::from_config(&config.engine)?;
    let engine = QueryEngine::new(Arc::clone(pipeline.manager()));
    let pipeline = Mutex::new(pipeline);

    let stats = ingest::ingest_file(&pipeline, opts.file.clone(), opts.presort).await?;
    eprintln!(
        "Processed {} events from {} ({} accepted, {} rejected, {} duplicates)",
        stats.lines,
        opts.file.display(),
        stats.accepted,
        stats.rejected(),
        stats.duplicates
    );

    let report = spec.run(&engine)?;
    output::emit(
        &output::render(&report, opts.query.format)?,
        opts.query.output.as_deref(),
    )?;

    if opts.query.save {
        let path = ResultsStore::new(&config.results_dir).save(
            &report.entities,
            &opts.file.display().to_string(),
            &spec,
        )?;
        eprintln!("Results saved to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{OutputFormat, QueryArgs};

    #[tokio::test]
    async fn process_writes_output_and_saves() {
        let dir = tempfile::tempdir().expect("tempdir");
        let events = dir.path().join("events.jsonl");
        std::fs::write(
            &events,
            concat!(
                r#"{"event_id":"e1","alert_id":"A1","timestamp":"2023-01-01T10:00:00Z","state":"NEW","type":"Disk","tags":{"dc":"dc-1"}}"#,
                "\n",
                r#"{"event_id":"e2","alert_id":"A1","timestamp":"2023-01-01T10:01:00Z","state":"RSV","type":"Disk","tags":{"dc":"dc-1"}}"#,
                "\n",
            ),
        )
        .expect("write");
        let out = dir.path().join("out.json");
        let config = RuntimeConfig {
            results_dir: dir.path().join("results"),
            ..RuntimeConfig::default()
        };
        let opts = ProcessOpts {
            file: events,
            dimension: "dc".into(),
            presort: false,
            query: QueryArgs {
                top: 5,
                alert_type: None,
                since: None,
                until: None,
                format: OutputFormat::Json,
                output: Some(out.clone()),
                save: true,
            },
        };

        cmd_process(opts, &config).await.expect("process");

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).expect("read")).expect("json");
        assert_eq!(written[0]["entity_id"], "dc-1");
        assert_eq!(written[0]["total_unhealthy_time"], 60.0);

        let saved = ResultsStore::new(&config.results_dir).list().expect("list");
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].dimension, "dc");
    }

    #[tokio::test]
    async fn unknown_dimension_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let events = dir.path().join("events.jsonl");
        std::fs::write(&events, "").expect("write");
        let opts = ProcessOpts {
            file: events,
            dimension: "rack".into(),
            presort: false,
            query: QueryArgs {
                top: 5,
                alert_type: None,
                since: None,
                until: None,
                format: OutputFormat::Text,
                output: Some(dir.path().join("out.txt")),
                save: false,
            },
        };
        let err = cmd_process(opts, &RuntimeConfig::default())
            .await
            .expect_err("unknown dimension");
        assert!(err.to_string().contains("rack"));
    }
}
