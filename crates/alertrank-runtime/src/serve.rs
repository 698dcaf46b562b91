//! `alertrank serve`: ingest the given files, then answer queries on the UDS
//! socket until ctrl-c or SIGTERM.

use std::sync::Arc;

use alertrank_core::Pipeline;

use crate::cli::ServeOpts;
use crate::config::RuntimeConfig;
use crate::ingest;
use crate::server::{self, ServerState};

pub async fn run_serve(
    opts: ServeOpts,
    config: &RuntimeConfig,
    socket_path: &str,
) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(&config.engine)?;
    tracing::info!(
        dimensions = ?pipeline.manager().dimensions(),
        policy = ?pipeline.tracker().policy(),
        "alertrank server starting"
    );
    let state = Arc::new(ServerState::new(pipeline, opts.presort));

    for file in opts.files {
        ingest::ingest_file(&state.pipeline, file, opts.presort).await?;
    }

    let server_state = Arc::clone(&state);
    let server_socket = socket_path.to_string();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::run_server(&server_socket, server_state).await {
            tracing::error!("query server error: {e}");
        }
    });

    tokio::select! {
        result = shutdown_signal() => result?,
        _ = server_handle => {
            tracing::warn!("server exited unexpectedly");
        }
    }

    // Cleanup socket
    let _ = std::fs::remove_file(socket_path);
    tracing::info!("alertrank server stopped");
    Ok(())
}

/// Resolves on ctrl-c, or SIGTERM on unix.
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("received ctrl-c, shutting down");
            }
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("received ctrl-c, shutting down");
    }
    Ok(())
}
