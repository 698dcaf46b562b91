//! UDS JSON-RPC query server.
//! Connection-per-request, newline-delimited JSON (see [`crate::rpc`]).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::BufReader;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;

use alertrank_core::validator::parse_timestamp;
use alertrank_core::{ConfigError, Pipeline, QueryEngine, QueryError};

use crate::ingest;
use crate::report::QuerySpec;
use crate::rpc::{
    self, INGEST_FAILED, INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR,
    QUERY_FAILED, Request, Response, RpcError,
};

/// Everything a request handler may touch.
pub struct ServerState {
    pub engine: QueryEngine,
    /// Serializes ingestion; queries never take this lock.
    pub pipeline: Mutex<Pipeline>,
    pub started_at: DateTime<Utc>,
    pub presort: bool,
}

impl ServerState {
    pub fn new(pipeline: Pipeline, presort: bool) -> Self {
        Self {
            engine: QueryEngine::new(Arc::clone(pipeline.manager())),
            pipeline: Mutex::new(pipeline),
            started_at: Utc::now(),
            presort,
        }
    }
}

impl From<QueryError> for RpcError {
    fn from(e: QueryError) -> Self {
        Self::new(QUERY_FAILED, e.to_string())
    }
}

impl From<ConfigError> for RpcError {
    fn from(e: ConfigError) -> Self {
        Self::new(QUERY_FAILED, e.to_string())
    }
}

/// Serve queries on `socket_path` until the listener fails.
pub async fn run_server(socket_path: &str, state: Arc<ServerState>) -> anyhow::Result<()> {
    let listener = bind(Path::new(socket_path)).await?;
    tracing::info!("query server listening on {socket_path}");

    loop {
        let (stream, _) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, &state).await {
                tracing::debug!("connection error: {e}");
            }
        });
    }
}

/// Private socket directory (0700), stale socket cleanup, owner-only socket (0600).
async fn bind(socket_path: &Path) -> anyhow::Result<UnixListener> {
    let socket_dir = socket_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid socket path {}", socket_path.display()))?;
    std::fs::create_dir_all(socket_dir)?;
    restrict(socket_dir, 0o700)?;

    if socket_path.exists() {
        if UnixStream::connect(socket_path).await.is_ok() {
            anyhow::bail!("another server is already running at {}", socket_path.display());
        }
        std::fs::remove_file(socket_path)?;
        tracing::info!(socket = %socket_path.display(), "removed stale socket");
    }

    let listener = UnixListener::bind(socket_path)?;
    restrict(socket_path, 0o600)?;
    Ok(listener)
}

#[cfg(unix)]
fn restrict(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn restrict(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

async fn handle_connection(stream: UnixStream, state: &ServerState) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let Some(line) = rpc::read_line(&mut BufReader::new(reader)).await? else {
        return Ok(());
    };

    let response = match serde_json::from_str::<Request>(line.trim()) {
        Ok(request) => {
            tracing::debug!(method = %request.method, "rpc request");
            let outcome = dispatch(state, &request.method, &request.params).await;
            Response::reply(request.id, outcome)
        }
        Err(e) => Response::reply(Value::Null, Err(RpcError::new(PARSE_ERROR, e.to_string()))),
    };
    rpc::write_message(&mut writer, &response).await
}

// ─── Dispatch ────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TopKParams {
    dimension: String,
    #[serde(default = "default_k")]
    k: usize,
    #[serde(default)]
    alert_type: Option<String>,
}

#[derive(Deserialize)]
struct RangeParams {
    dimension: String,
    #[serde(default = "default_k")]
    k: usize,
    #[serde(default)]
    alert_type: Option<String>,
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    end: Option<String>,
}

#[derive(Deserialize)]
struct UnhealthyTimeParams {
    dimension: String,
    entity: String,
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    end: Option<String>,
}

#[derive(Deserialize)]
struct IngestParams {
    path: PathBuf,
    #[serde(default)]
    presort: Option<bool>,
}

fn default_k() -> usize {
    5
}

fn params<T: for<'de> Deserialize<'de>>(raw: &Value) -> Result<T, RpcError> {
    let raw = if raw.is_null() {
        Value::Object(Default::default())
    } else {
        raw.clone()
    };
    serde_json::from_value(raw).map_err(|e| RpcError::new(INVALID_PARAMS, e.to_string()))
}

fn bound(raw: Option<&str>, name: &str) -> Result<Option<DateTime<Utc>>, RpcError> {
    raw.map(|s| {
        parse_timestamp(s).map_err(|e| RpcError::new(INVALID_PARAMS, format!("{name}: {e}")))
    })
    .transpose()
}

pub(crate) async fn dispatch(
    state: &ServerState,
    method: &str,
    raw_params: &Value,
) -> Result<Value, RpcError> {
    match method {
        "top_k" => {
            let p: TopKParams = params(raw_params)?;
            let spec = QuerySpec {
                dimension: p.dimension,
                top_k: p.k,
                alert_type: p.alert_type,
                since: None,
                until: None,
            };
            to_value(&spec.run(&state.engine)?)
        }
        "top_k_in_range" => {
            let p: RangeParams = params(raw_params)?;
            let spec = QuerySpec {
                dimension: p.dimension,
                top_k: p.k,
                alert_type: p.alert_type,
                since: bound(p.start.as_deref(), "start")?,
                until: bound(p.end.as_deref(), "end")?,
            };
            let (start, end) = spec.window();
            let report = if spec.alert_type.is_some() {
                spec.run(&state.engine)?
            } else {
                state
                    .engine
                    .top_k_in_range(&spec.dimension, spec.top_k, start, end)?
            };
            to_value(&report)
        }
        "unhealthy_time" => {
            let p: UnhealthyTimeParams = params(raw_params)?;
            let start = bound(p.start.as_deref(), "start")?;
            let end = bound(p.end.as_deref(), "end")?;
            let seconds = match (start, end) {
                (None, None) => state.engine.total_unhealthy_time(&p.dimension, &p.entity)?,
                (start, end) => state.engine.unhealthy_time_in_range(
                    &p.dimension,
                    &p.entity,
                    start.unwrap_or(DateTime::<Utc>::MIN_UTC),
                    end.unwrap_or(DateTime::<Utc>::MAX_UTC),
                )?,
            };
            Ok(serde_json::json!({
                "dimension": p.dimension,
                "entity": p.entity,
                "unhealthy_seconds": seconds,
            }))
        }
        "list_dimensions" => to_value(&state.engine.dimensions()),
        "ingest_file" => {
            let p: IngestParams = params(raw_params)?;
            let presort = p.presort.unwrap_or(state.presort);
            let stats = ingest::ingest_file(&state.pipeline, p.path, presort)
                .await
                .map_err(|e| RpcError::new(INGEST_FAILED, format!("{e:#}")))?;
            to_value(&stats)
        }
        "health" => {
            let pipeline = state.pipeline.lock().await;
            Ok(serde_json::json!({
                "status": "ok",
                "started_at": state.started_at,
                "dimensions": state.engine.dimensions(),
                "open_alerts": pipeline.tracker().open_count(),
                "ingest": pipeline.stats(),
            }))
        }
        _ => Err(RpcError::new(METHOD_NOT_FOUND, "method not found")),
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::new(INTERNAL_ERROR, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alertrank_core::EngineConfig;
    use serde_json::json;

    fn event(id: &str, alert: &str, ts: &str, state: &str, host: &str) -> String {
        format!(
            r#"{{"event_id":"{id}","alert_id":"{alert}","timestamp":"{ts}","state":"{state}","type":"Disk","tags":{{"host":"{host}","dc":"dc-1"}}}}"#
        )
    }

    fn state() -> ServerState {
        let mut p = Pipeline::from_config(&EngineConfig::default()).expect("config");
        p.ingest_batch(
            [
                event("e1", "A1", "2023-01-01T10:00:00Z", "NEW", "h1"),
                event("e2", "A1", "2023-01-01T11:00:00Z", "RSV", "h1"),
                event("e3", "A2", "2023-01-01T10:30:00Z", "NEW", "h2"),
                event("e4", "A2", "2023-01-01T10:40:00Z", "RSV", "h2"),
                event("e5", "A3", "2023-01-01T12:00:00Z", "NEW", "h3"),
            ],
            false,
        );
        ServerState::new(p, false)
    }

    #[tokio::test]
    async fn top_k_dispatch() {
        let st = state();
        let v = dispatch(&st, "top_k", &json!({"dimension": "host", "k": 1}))
            .await
            .expect("ok");
        assert_eq!(v["dimension"], "host");
        assert_eq!(v["entities"].as_array().expect("array").len(), 1);
        assert_eq!(v["entities"][0]["entity_id"], "h1");
        assert_eq!(v["entities"][0]["total_unhealthy_time"], 3600.0);
    }

    #[tokio::test]
    async fn top_k_in_range_dispatch() {
        let st = state();
        let v = dispatch(
            &st,
            "top_k_in_range",
            &json!({
                "dimension": "host",
                "k": 5,
                "start": "2023-01-01T10:30:00Z",
                "end": "2023-01-01T10:35:00Z",
            }),
        )
        .await
        .expect("ok");
        let entities = v["entities"].as_array().expect("array");
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0]["total_unhealthy_time"], 300.0);
        assert_eq!(entities[0]["entity_id"], "h1");
    }

    #[tokio::test]
    async fn unhealthy_time_dispatch() {
        let st = state();
        let total = dispatch(&st, "unhealthy_time", &json!({"dimension": "host", "entity": "h2"}))
            .await
            .expect("ok");
        assert_eq!(total["unhealthy_seconds"], 600.0);

        let windowed = dispatch(
            &st,
            "unhealthy_time",
            &json!({"dimension": "host", "entity": "h1", "end": "2023-01-01T10:15:00Z"}),
        )
        .await
        .expect("ok");
        assert_eq!(windowed["unhealthy_seconds"], 900.0);
    }

    #[tokio::test]
    async fn error_codes() {
        let st = state();
        let unknown = dispatch(&st, "nope", &Value::Null).await.expect_err("method");
        assert_eq!(unknown.code, METHOD_NOT_FOUND);

        let missing = dispatch(&st, "top_k", &json!({})).await.expect_err("params");
        assert_eq!(missing.code, INVALID_PARAMS);

        let bad_ts = dispatch(
            &st,
            "top_k_in_range",
            &json!({"dimension": "host", "start": "soon"}),
        )
        .await
        .expect_err("timestamp");
        assert_eq!(bad_ts.code, INVALID_PARAMS);

        let dim = dispatch(&st, "top_k", &json!({"dimension": "rack"}))
            .await
            .expect_err("dimension");
        assert_eq!(dim.code, QUERY_FAILED);

        let window = dispatch(
            &st,
            "top_k_in_range",
            &json!({"dimension": "host", "start": "2023-01-02T00:00:00Z", "end": "2023-01-01T00:00:00Z"}),
        )
        .await
        .expect_err("window");
        assert_eq!(window.code, QUERY_FAILED);

        let ingest = dispatch(&st, "ingest_file", &json!({"path": "/nonexistent/events.jsonl"}))
            .await
            .expect_err("ingest");
        assert_eq!(ingest.code, INGEST_FAILED);
    }

    #[tokio::test]
    async fn health_and_dimensions() {
        let st = state();
        let health = dispatch(&st, "health", &Value::Null).await.expect("ok");
        assert_eq!(health["status"], "ok");
        assert_eq!(health["open_alerts"], 1);
        assert_eq!(health["ingest"]["finalized"], 2);

        let dims = dispatch(&st, "list_dimensions", &Value::Null).await.expect("ok");
        assert_eq!(dims, json!(["dc", "host", "service", "volume"]));
    }

    #[tokio::test]
    async fn ingest_file_then_query() {
        let st = state();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("more.jsonl");
        std::fs::write(
            &path,
            format!(
                "{}\n",
                event("e6", "A3", "2023-01-01T14:00:00Z", "RSV", "h3")
            ),
        )
        .expect("write");

        let stats = dispatch(&st, "ingest_file", &json!({"path": path}))
            .await
            .expect("ok");
        assert_eq!(stats["finalized"], 1);

        let v = dispatch(&st, "top_k", &json!({"dimension": "host", "k": 1}))
            .await
            .expect("ok");
        assert_eq!(v["entities"][0]["entity_id"], "h3");
        assert_eq!(v["entities"][0]["total_unhealthy_time"], 7200.0);
    }

    #[tokio::test]
    async fn socket_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket = dir.path().join("sock").join("alertrank.sock");
        let socket = socket.to_str().expect("utf-8 path").to_string();

        let st = Arc::new(state());
        let server_socket = socket.clone();
        let server = tokio::spawn(async move { run_server(&server_socket, st).await });

        let mut result = None;
        for _ in 0..50 {
            match crate::client::rpc_call(&socket, "top_k", json!({"dimension": "host", "k": 2}))
                .await
            {
                Ok(v) => {
                    result = Some(v);
                    break;
                }
                Err(_) => tokio::time::sleep(std::time::Duration::from_millis(20)).await,
            }
        }
        let result = result.expect("server answered");
        assert_eq!(result["entities"][0]["entity_id"], "h1");

        let err = crate::client::rpc_call(&socket, "bogus", Value::Null)
            .await
            .expect_err("unknown method");
        assert!(err.to_string().contains("-32601"));

        // A line that is not a request still gets an answer.
        let (reader, mut writer) = UnixStream::connect(&socket).await.expect("connect").into_split();
        tokio::io::AsyncWriteExt::write_all(&mut writer, b"{not json\n")
            .await
            .expect("write");
        let response: Response = rpc::read_message(&mut BufReader::new(reader))
            .await
            .expect("response");
        assert_eq!(response.error.map(|e| e.code), Some(PARSE_ERROR));
        assert!(response.id.is_null());

        // A second server on a live socket is refused.
        let second = run_server(&socket, Arc::new(state())).await.expect_err("in use");
        assert!(second.to_string().contains("already running"));
        server.abort();
    }

    #[tokio::test]
    async fn bind_replaces_stale_socket() {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket = dir.path().join("alertrank.sock");
        drop(std::os::unix::net::UnixListener::bind(&socket).expect("bind"));
        assert!(socket.exists());

        let listener = bind(&socket).await.expect("rebind");
        drop(listener);
        assert!(socket.exists());
    }
}
