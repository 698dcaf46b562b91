//! UDS JSON-RPC client for CLI subcommands.

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use alertrank_core::TopKReport;

use crate::report::QuerySpec;
use crate::rpc::{self, Request, Response};

/// Send one request and wait for its response.
pub(crate) async fn rpc_call(
    socket_path: &str,
    method: &str,
    params: serde_json::Value,
) -> anyhow::Result<serde_json::Value> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot connect to server at {socket_path}: {e}"))?;
    let (reader, mut writer) = stream.into_split();

    rpc::write_message(&mut writer, &Request::new(method, params)).await?;
    writer.shutdown().await?;

    let response: Response = rpc::read_message(&mut BufReader::new(reader)).await?;
    response.into_result()
}

/// Method and params for fetching `spec` from a server.
pub(crate) fn report_request(spec: &QuerySpec) -> (&'static str, serde_json::Value) {
    if spec.is_windowed() {
        let (start, end) = spec.window();
        (
            "top_k_in_range",
            serde_json::json!({
                "dimension": spec.dimension,
                "k": spec.top_k,
                "alert_type": spec.alert_type,
                "start": spec.since.map(|_| start.to_rfc3339()),
                "end": spec.until.map(|_| end.to_rfc3339()),
            }),
        )
    } else {
        (
            "top_k",
            serde_json::json!({
                "dimension": spec.dimension,
                "k": spec.top_k,
                "alert_type": spec.alert_type,
            }),
        )
    }
}

pub(crate) async fn fetch_report(socket_path: &str, spec: &QuerySpec) -> anyhow::Result<TopKReport> {
    let (method, params) = report_request(spec);
    let result = rpc_call(socket_path, method, params).await?;
    Ok(serde_json::from_value(result)?)
}
