//! HTTP client for the notebook kernel service.
//!
//! The kernel service speaks JSON-RPC 2.0 over session-based HTTP POST at
//! `{base_url}/mcp`, answering either with bare JSON or with SSE framing.
//! Every public operation converts its failures into [`KernelError`] values;
//! nothing escapes this boundary as a panic, so a dead backend can never
//! take the bridge process down with it.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::protocol::{
    decode_body, render_backend_error, unwrap_tool_result, JsonRpcRequest, MCP_PROTOCOL_VERSION,
    SESSION_HEADER,
};

/// Sentinel substituted when the kernel hands out no session identifier,
/// so downstream logic never branches on "no session".
pub const DEFAULT_SESSION: &str = "default-session";

/// Consecutive transport failures tolerated before the cached endpoint and
/// session are invalidated and rediscovered on the next call.
const FAILURE_THRESHOLD: u32 = 3;

/// Failure taxonomy for kernel communication.
///
/// The `Display` strings are part of the bridge contract: they are exactly
/// what the upstream AI host sees inside `{"error": …}` payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// The HTTP exchange itself failed: refused connection, timeout, DNS,
    /// or a non-success status before any envelope could be read.
    #[error("Proxy request failed: {0}")]
    Transport(String),

    /// The kernel answered with a JSON-RPC `error` object of its own.
    #[error("MCP error: {0}")]
    Backend(String),

    /// HTTP succeeded but the body held no `result` or `error` envelope.
    #[error("Invalid JSON-RPC response")]
    MalformedResponse,
}

/// Cached connection state, invalidated after repeated transport failures.
///
/// Endpoint and session are written once on first use and read on every
/// call afterwards. Protocol errors do not count toward invalidation: the
/// backend answered, so the cached values are evidently still usable.
#[derive(Debug, Default)]
struct ConnectionCache {
    endpoint: Option<String>,
    session_id: Option<String>,
    consecutive_failures: u32,
}

impl ConnectionCache {
    fn invalidate(&mut self) {
        self.endpoint = None;
        self.session_id = None;
        self.consecutive_failures = 0;
    }

    fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= FAILURE_THRESHOLD {
            warn!(
                failures = self.consecutive_failures,
                "invalidating cached endpoint and session after repeated transport failures"
            );
            self.invalidate();
        }
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }
}

/// Client for the notebook kernel service.
///
/// Cheap to clone; clones share the connection cache. Concurrent calls
/// racing before the first handshake may each perform their own handshake.
/// That is benign idempotent convergence, and the cache mutex is therefore
/// never held across network I/O.
#[derive(Clone)]
pub struct KernelClient {
    base_url: String,
    http: reqwest::Client,
    trust_token: Option<String>,
    cache: Arc<Mutex<ConnectionCache>>,
}

impl KernelClient {
    /// Create a client for the kernel service at `base_url`.
    ///
    /// `request_timeout` bounds every steady-state HTTP exchange; there is
    /// no retry layer here, a timed-out call simply surfaces as a
    /// [`KernelError::Transport`] value.
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        trust_token: Option<String>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;

        Ok(Self {
            base_url: base_url.into(),
            http,
            trust_token,
            cache: Arc::new(Mutex::new(ConnectionCache::default())),
        })
    }

    /// Resolve and cache the kernel's protocol endpoint.
    ///
    /// Sends a trial `tools/list` to the well-known `{base_url}/mcp` URL.
    /// Whether or not the probe answers, that same URL is cached: this is
    /// intentionally not multi-endpoint discovery, the probe only warms the
    /// connection and records the outcome in the log.
    pub async fn ensure_endpoint(&self) -> String {
        if let Some(endpoint) = self.cache.lock().await.endpoint.clone() {
            return endpoint;
        }

        let endpoint = format!("{}/mcp", self.base_url.trim_end_matches('/'));
        let probe = JsonRpcRequest::call(1, "tools/list", json!({}));
        match self.round_trip(&endpoint, None, &probe).await {
            Ok(_) | Err(KernelError::Backend(_)) => {
                debug!(endpoint = %endpoint, "endpoint probe answered");
            }
            Err(e) => {
                debug!(
                    endpoint = %endpoint,
                    error = %e,
                    "endpoint probe failed; caching well-known URL anyway"
                );
            }
        }

        self.cache.lock().await.endpoint = Some(endpoint.clone());
        endpoint
    }

    /// Establish and cache a kernel session.
    ///
    /// Performs the `initialize` + `notifications/initialized` handshake on
    /// first use. On any handshake failure the sentinel
    /// [`DEFAULT_SESSION`] is cached instead so subsequent calls proceed
    /// uniformly.
    pub async fn ensure_session(&self) -> String {
        if let Some(session) = self.cache.lock().await.session_id.clone() {
            return session;
        }

        let endpoint = self.ensure_endpoint().await;
        let session = match self.handshake(&endpoint).await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "session handshake failed; continuing with sentinel session");
                DEFAULT_SESSION.to_string()
            }
        };

        self.cache.lock().await.session_id = Some(session.clone());
        session
    }

    /// Invoke a kernel tool by name, forwarding `args` verbatim.
    ///
    /// Results following the `{"content": [{"text": …}]}` convention are
    /// unwrapped to the first text item; all other result shapes pass
    /// through unchanged.
    pub async fn call(&self, tool: &str, args: Value) -> Result<Value, KernelError> {
        let params = json!({ "name": tool, "arguments": args });
        self.request(2, "tools/call", params)
            .await
            .map(unwrap_tool_result)
    }

    /// List the resources the kernel currently exposes.
    ///
    /// Returns an empty list on ANY failure: callers must treat "no
    /// resources" and "resources unreachable" identically.
    pub async fn list_resources(&self) -> Vec<Value> {
        match self.request(3, "resources/list", json!({})).await {
            Ok(result) => result
                .get("resources")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            Err(e) => {
                debug!(error = %e, "resources/list failed; returning empty list");
                Vec::new()
            }
        }
    }

    /// Read a single resource by URI.
    ///
    /// Unlike [`Self::list_resources`] this surfaces failures, because
    /// callers need to distinguish "resource missing" from "empty list".
    pub async fn read_resource(&self, uri: &str) -> Result<Value, KernelError> {
        self.request(4, "resources/read", json!({ "uri": uri })).await
    }

    /// One-way notification toward the kernel.
    ///
    /// Deliberately distinct from [`Self::call`]: no reply is awaited, the
    /// response body is dropped, and delivery failures are logged and
    /// swallowed.
    pub async fn notify(&self, method: &str) {
        let endpoint = self.ensure_endpoint().await;
        let session = self.cache.lock().await.session_id.clone();
        self.send_notification(&endpoint, session.as_deref(), method)
            .await;
    }

    /// Perform one request/response exchange with cache bookkeeping.
    async fn request(&self, id: u64, method: &str, params: Value) -> Result<Value, KernelError> {
        let endpoint = self.ensure_endpoint().await;
        let session = self.ensure_session().await;

        let envelope = JsonRpcRequest::call(id, method, params);
        let outcome = self.round_trip(&endpoint, Some(&session), &envelope).await;

        let mut cache = self.cache.lock().await;
        match &outcome {
            Err(KernelError::Transport(_)) => cache.record_failure(),
            _ => cache.record_success(),
        }
        drop(cache);

        outcome
    }

    /// POST one envelope and decode the reply into its `result` value.
    async fn round_trip(
        &self,
        endpoint: &str,
        session: Option<&str>,
        envelope: &JsonRpcRequest,
    ) -> Result<Value, KernelError> {
        let response = self
            .http
            .post(endpoint)
            .headers(self.base_headers(session))
            .json(envelope)
            .send()
            .await
            .map_err(|e| KernelError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| KernelError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(KernelError::Transport(format!(
                "backend returned HTTP {status}"
            )));
        }

        let decoded = decode_body(&body).ok_or(KernelError::MalformedResponse)?;
        if let Some(error) = decoded.get("error") {
            return Err(KernelError::Backend(render_backend_error(error)));
        }
        match decoded.get("result") {
            Some(result) => Ok(result.clone()),
            None => Err(KernelError::MalformedResponse),
        }
    }

    /// `initialize` + `notifications/initialized`, returning the session id
    /// the kernel handed out in its response headers.
    async fn handshake(&self, endpoint: &str) -> Result<String, KernelError> {
        let initialize = JsonRpcRequest::call(
            1,
            "initialize",
            json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": "benchlink",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        );

        let response = self
            .http
            .post(endpoint)
            .headers(self.base_headers(None))
            .json(&initialize)
            .send()
            .await
            .map_err(|e| KernelError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(KernelError::Transport(format!(
                "initialize returned HTTP {}",
                response.status()
            )));
        }

        let session = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                KernelError::Transport("initialize response carried no session header".to_string())
            })?;

        debug!(session = %session, "kernel session established");
        self.send_notification(endpoint, Some(&session), "notifications/initialized")
            .await;

        Ok(session)
    }

    /// Fire-and-forget POST; the response is dropped unread.
    async fn send_notification(&self, endpoint: &str, session: Option<&str>, method: &str) {
        let notification = JsonRpcRequest::notification(method);
        match self
            .http
            .post(endpoint)
            .headers(self.base_headers(session))
            .json(&notification)
            .send()
            .await
        {
            Ok(_) => debug!(method, "notification delivered"),
            Err(e) => debug!(method, error = %e, "notification dropped"),
        }
    }

    /// Common headers: JSON body, dual-encoding accept, optional trust
    /// token, optional session correlation.
    fn base_headers(&self, session: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/event-stream"),
        );

        if let Some(token) = &self.trust_token {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        if let Some(session) = session {
            if let Ok(value) = HeaderValue::from_str(session) {
                headers.insert(HeaderName::from_static(SESSION_HEADER), value);
            }
        }

        headers
    }
}
