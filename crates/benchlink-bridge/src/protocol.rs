//! JSON-RPC 2.0 envelope types and response decoding.
//!
//! The kernel service answers every POST either with a bare JSON document or
//! with SSE framing (`data: <json>` lines). Both encodings carry exactly one
//! logical JSON-RPC reply; [`decode_body`] is the single decoder used on
//! every response path so the two framings are indistinguishable to callers.

use serde::Serialize;
use serde_json::Value;

/// JSON-RPC protocol version carried on every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision sent during the `initialize` handshake.
pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";

/// Header correlating requests to an initialized kernel session.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// An outbound JSON-RPC request or notification.
///
/// Notifications carry no `id`; the serialized form omits the key entirely
/// so the kernel never sees `"id": null`.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Build a request that expects a reply.
    ///
    /// Ids are fixed literals per call site, not a counter: no client
    /// instance multiplexes concurrent in-flight requests over one
    /// connection, so each HTTP response already correlates itself.
    pub fn call(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: Some(id),
            method: method.to_string(),
            params: Some(params),
        }
    }

    /// Build a one-way notification (no `id`, no reply expected).
    pub fn notification(method: &str) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: None,
            method: method.to_string(),
            params: None,
        }
    }
}

/// Decode a response body that may be bare JSON or SSE-framed.
///
/// SSE framing is detected by the `data: ` marker. In that mode every
/// `data: ` line is parsed and the LAST line that yields an object
/// containing a `jsonrpc` key is authoritative; earlier lines (progress
/// pings, partial frames, comments) are discarded. Otherwise the whole
/// body is parsed as a single JSON document.
pub fn decode_body(body: &str) -> Option<Value> {
    if body.contains("data: ") {
        let mut last = None;
        for line in body.lines() {
            if let Some(payload) = line.strip_prefix("data: ") {
                if let Ok(value) = serde_json::from_str::<Value>(payload) {
                    if value.is_object() && value.get("jsonrpc").is_some() {
                        last = Some(value);
                    }
                }
            }
        }
        last
    } else {
        serde_json::from_str(body).ok()
    }
}

/// Structural envelope check: an object with `jsonrpc` and one of
/// `result` / `error`. Nothing deeper is validated here; payloads are
/// opaque to the bridge.
pub fn is_envelope(value: &Value) -> bool {
    value.is_object()
        && value.get("jsonrpc").is_some()
        && (value.get("result").is_some() || value.get("error").is_some())
}

/// Unwrap a `tools/call` result.
///
/// Results following the MCP tool-result convention
/// `{"content": [{"text": ...}]}` collapse to the first text item,
/// verbatim and unparsed. Anything else passes through unchanged.
pub fn unwrap_tool_result(result: Value) -> Value {
    if let Some(text) = result
        .get("content")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|item| item.get("text"))
        .and_then(Value::as_str)
    {
        return Value::String(text.to_string());
    }
    result
}

/// Render a backend `error` object for display.
///
/// Standard `{code, message}` errors render as `{code: -1, message: boom}`;
/// anything else falls back to its JSON serialization so no error content
/// is ever dropped.
pub fn render_backend_error(error: &Value) -> String {
    match (error.get("code"), error.get("message").and_then(Value::as_str)) {
        (Some(code), Some(message)) => format!("{{code: {code}, message: {message}}}"),
        _ => error.to_string(),
    }
}
