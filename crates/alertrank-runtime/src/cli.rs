//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "alertrank",
    about = "Rank entities by cumulative unhealthy time from alert lifecycle events"
)]
pub struct Cli {
    /// TOML config file (dimensions, unmatched-resolve policy, paths)
    #[arg(long, short = 'c', global = true, env = "ALERTRANK_CONFIG")]
    pub config: Option<PathBuf>,

    /// UDS socket path (default: /tmp/alertrank-$USER/alertrank.sock)
    #[arg(long, short = 's', global = true)]
    pub socket_path: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Ingest an event file and print a ranking (no server)
    Process(ProcessOpts),
    /// Ingest event files, then serve queries on the socket until interrupted
    Serve(ServeOpts),
    /// Query a running server
    Query(QueryOpts),
    /// Ask a running server to ingest another event file
    Ingest(IngestOpts),
    /// List the dimensions a running server indexes
    Dimensions,
    /// Show server health and ingest counters
    Health,
    /// Inspect saved query results
    #[command(subcommand)]
    Results(ResultsCommand),
}

#[derive(Args)]
pub struct ProcessOpts {
    /// Event file (newline-delimited JSON, optionally gzip-compressed)
    pub file: PathBuf,

    /// Dimension to rank
    #[arg(long, short = 'd', default_value = "host")]
    pub dimension: String,

    /// Stable-sort events by timestamp before tracking
    #[arg(long)]
    pub presort: bool,

    #[command(flatten)]
    pub query: QueryArgs,
}

#[derive(Args)]
pub struct ServeOpts {
    /// Event files ingested before the socket opens
    pub files: Vec<PathBuf>,

    /// Stable-sort each file's events by timestamp before tracking
    #[arg(long)]
    pub presort: bool,
}

#[derive(Args)]
pub struct QueryOpts {
    /// Dimension to rank
    pub dimension: String,

    #[command(flatten)]
    pub query: QueryArgs,
}

#[derive(Args)]
pub struct IngestOpts {
    pub file: PathBuf,

    #[arg(long)]
    pub presort: bool,
}

/// Flags shared by every command that prints a ranking.
#[derive(Args, Clone)]
pub struct QueryArgs {
    /// Number of entities to return
    #[arg(long, short = 'k', default_value = "5")]
    pub top: usize,

    /// Only rank entities that saw this alert type
    #[arg(long)]
    pub alert_type: Option<String>,

    /// Window start (RFC 3339); ranks by time overlapping the window
    #[arg(long)]
    pub since: Option<String>,

    /// Window end (RFC 3339)
    #[arg(long)]
    pub until: Option<String>,

    #[arg(long, short = 'f', value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Write output to a file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Also save the result under the results directory
    #[arg(long)]
    pub save: bool,
}

#[derive(Subcommand)]
pub enum ResultsCommand {
    /// List saved results, newest first
    List,
    /// Print one saved result
    Show {
        /// File name as shown by `results list`
        name: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Default socket path using $USER for per-user isolation.
pub fn default_socket_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return format!("{dir}/alertrank/alertrank.sock");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/tmp/alertrank-{user}/alertrank.sock")
}
