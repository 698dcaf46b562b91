//! JSON-RPC 2.0 envelope shared by the query server and its client.
//! One request and one response per connection, each a single JSON line.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

pub(crate) const PARSE_ERROR: i64 = -32700;
pub(crate) const METHOD_NOT_FOUND: i64 = -32601;
pub(crate) const INVALID_PARAMS: i64 = -32602;
pub(crate) const INTERNAL_ERROR: i64 = -32603;
pub(crate) const QUERY_FAILED: i64 = -32001;
pub(crate) const INGEST_FAILED: i64 = -32002;

const VERSION: &str = "2.0";

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Request {
    #[serde(default)]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

impl Request {
    pub fn new(method: &str, params: Value) -> Self {
        Self {
            jsonrpc: VERSION.to_owned(),
            method: method.to_owned(),
            params,
            id: Value::from(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Response {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    #[serde(default)]
    pub id: Value,
}

impl Response {
    pub fn reply(id: Value, outcome: Result<Value, RpcError>) -> Self {
        let (result, error) = match outcome {
            Ok(value) => (Some(value), None),
            Err(err) => (None, Some(err)),
        };
        Self {
            jsonrpc: VERSION.to_owned(),
            result,
            error,
            id,
        }
    }

    /// The result value, or the server's error as an `anyhow` error.
    pub fn into_result(self) -> anyhow::Result<Value> {
        match self.error {
            Some(err) => anyhow::bail!("RPC error: {err}"),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Write `message` as one JSON line.
pub(crate) async fn write_message<W, T>(writer: &mut W, message: &T) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    Ok(())
}

/// Read one line. `None` when the peer closed without sending anything.
pub(crate) async fn read_line<R>(reader: &mut R) -> anyhow::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}

/// Read one JSON line and decode it.
pub(crate) async fn read_message<R, T>(reader: &mut R) -> anyhow::Result<T>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let line = read_line(reader)
        .await?
        .ok_or_else(|| anyhow::anyhow!("connection closed before a message arrived"))?;
    Ok(serde_json::from_str(line.trim())?)
}
