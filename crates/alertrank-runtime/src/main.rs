//! alertrank: alert lifecycle ranking runtime binary.
//! One-shot processing, a UDS query server, and its client commands.

use clap::Parser;

mod cli;
mod client;
mod cmd_process;
mod cmd_query;
mod cmd_results;
mod config;
mod ingest;
mod output;
mod report;
mod results;
mod rpc;
mod serve;
mod server;

fn init_tracing(format: cli::LogFormat) {
    let filter = std::env::var("ALERTRANK_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr);
    match format {
        cli::LogFormat::Text => builder.init(),
        cli::LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    init_tracing(args.log_format);

    let config = config::RuntimeConfig::load(args.config.as_deref())?;
    let socket_path = config.socket_path(args.socket_path);

    match args.command {
        cli::Command::Process(opts) => {
            cmd_process::cmd_process(opts, &config).await?;
        }
        cli::Command::Serve(opts) => {
            serve::run_serve(opts, &config, &socket_path).await?;
        }
        cli::Command::Query(opts) => {
            cmd_query::cmd_query(&socket_path, opts, &config).await?;
        }
        cli::Command::Ingest(opts) => {
            cmd_query::cmd_ingest(&socket_path, opts).await?;
        }
        cli::Command::Dimensions => {
            cmd_query::cmd_dimensions(&socket_path).await?;
        }
        cli::Command::Health => {
            cmd_query::cmd_health(&socket_path).await?;
        }
        cli::Command::Results(command) => {
            let store = results::ResultsStore::new(&config.results_dir);
            cmd_results::cmd_results(command, &store)?;
        }
    }

    Ok(())
}
