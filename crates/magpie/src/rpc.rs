//
// rpc.rs
//
// JSON-RPC 2.0 envelope and Content-Length framing
//

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

pub const JSONRPC_VERSION: &str = "2.0";

/// One JSON-RPC envelope: request (id + method), notification (method only),
/// or response (id + result/error).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcMessage {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcMessage {
    pub fn request(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: Some(method.to_string()),
            params: Some(params),
            result: None,
            error: None,
        }
    }

    pub fn notification(method: &str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: Some(method.to_string()),
            params: Some(params),
            result: None,
            error: None,
        }
    }

    /// A response carries an id and no method.
    pub fn is_response(&self) -> bool {
        self.id.is_some() && self.method.is_none()
    }
}

/// Frame a message for the wire: `Content-Length: <n>\r\n\r\n` followed by
/// exactly n bytes of JSON. The length counts bytes, not characters.
pub fn encode(message: &RpcMessage) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(message).context("failed to serialize JSON-RPC message")?;
    let mut framed = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    framed.extend_from_slice(&body);
    Ok(framed)
}

/// Read one framed message from `reader`.
///
/// Header lines are consumed until the blank line, then exactly
/// Content-Length bytes of body. Nothing assumes a whole message arrives in
/// one read. Returns Ok(None) on a clean end-of-stream before any header
/// byte; end-of-stream inside a message is an error.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<RpcMessage>>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut line = Vec::new();

    let length = loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .await
            .context("failed to read message header")?;
        if read == 0 {
            if content_length.is_none() {
                return Ok(None);
            }
            return Err(anyhow!("stream closed mid-header"));
        }

        let text = String::from_utf8_lossy(&line);
        let text = text.trim_end_matches(['\r', '\n']);
        if text.is_empty() {
            match content_length {
                Some(length) => break length,
                // Stray blank line before any header; keep scanning.
                None => continue,
            }
        }
        if let Some(value) = text.strip_prefix("Content-Length:") {
            let parsed = value
                .trim()
                .parse::<usize>()
                .with_context(|| format!("invalid Content-Length header: {:?}", text))?;
            content_length = Some(parsed);
        }
        // Other headers (Content-Type) are ignored.
    };

    let mut body = vec![0u8; length];
    reader
        .read_exact(&mut body)
        .await
        .context("stream closed mid-body")?;
    let message =
        serde_json::from_slice(&body).context("failed to parse JSON-RPC message body")?;
    Ok(Some(message))
}
