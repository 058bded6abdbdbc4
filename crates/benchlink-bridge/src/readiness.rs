//! One-shot readiness probe for the kernel service.
//!
//! Used before the bridge starts serving to decide whether the backend is
//! actually there. Pure validation: no retries, no state, nothing observable
//! outside the timeout window.

use std::time::Duration;

use serde_json::json;

use crate::protocol::{
    decode_body, is_envelope, JsonRpcRequest, MCP_PROTOCOL_VERSION, SESSION_HEADER,
};

/// Check that a kernel service at `host:port` answers the MCP handshake.
///
/// Three steps, all bounded by `timeout` per request:
/// 1. `initialize`: must return a success status AND a non-empty
///    `mcp-session-id` response header; either missing is a failure
///    regardless of the other.
/// 2. `notifications/initialized`: fire-and-forget, response ignored.
/// 3. `tools/list` with the session header: must return a success status
///    and a structurally valid JSON-RPC envelope (bare or SSE-framed).
///
/// Any network error, timeout, or structural mismatch yields `false`.
pub async fn is_backend_ready(host: &str, port: u16, timeout: Duration) -> bool {
    let Ok(client) = reqwest::Client::builder().timeout(timeout).build() else {
        return false;
    };
    let endpoint = format!("http://{host}:{port}/mcp");

    // Step 1: initialize, expecting a session identifier back.
    let initialize = JsonRpcRequest::call(
        1,
        "initialize",
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "benchlink-readiness",
                "version": env!("CARGO_PKG_VERSION"),
            },
        }),
    );
    let response = match post_json(&client, &endpoint, None, &initialize).await {
        Some(response) => response,
        None => return false,
    };
    if !response.status().is_success() {
        return false;
    }
    let session = match response
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
    {
        Some(session) => session.to_string(),
        None => return false,
    };

    // Step 2: initialized notification; outcome deliberately ignored.
    let initialized = JsonRpcRequest::notification("notifications/initialized");
    let _ = post_json(&client, &endpoint, Some(&session), &initialized).await;

    // Step 3: tools/list must come back as a real envelope.
    let list = JsonRpcRequest::call(2, "tools/list", json!({}));
    let response = match post_json(&client, &endpoint, Some(&session), &list).await {
        Some(response) => response,
        None => return false,
    };
    if !response.status().is_success() {
        return false;
    }
    let Ok(body) = response.text().await else {
        return false;
    };

    matches!(decode_body(&body), Some(envelope) if is_envelope(&envelope))
}

async fn post_json(
    client: &reqwest::Client,
    endpoint: &str,
    session: Option<&str>,
    request: &JsonRpcRequest,
) -> Option<reqwest::Response> {
    let mut builder = client
        .post(endpoint)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .header(
            reqwest::header::ACCEPT,
            "application/json, text/event-stream",
        );
    if let Some(session) = session {
        builder = builder.header(SESSION_HEADER, session);
    }
    builder.json(request).send().await.ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::Request;
    use axum::response::Response;
    use axum::routing::post;
    use axum::Router;
    use serde_json::Value;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    async fn start_test_server(app: Router) -> (String, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        ("127.0.0.1".to_string(), addr.port())
    }

    /// A well-behaved kernel: session header on initialize, valid envelope
    /// on tools/list, 202 on notifications.
    fn healthy_app(sse_tools_list: bool) -> Router {
        Router::new().route(
            "/mcp",
            post(move |request: Request| async move {
                let bytes = axum::body::to_bytes(request.into_body(), usize::MAX)
                    .await
                    .unwrap();
                let body: Value = serde_json::from_slice(&bytes).unwrap();

                match body["method"].as_str() {
                    Some("initialize") => Response::builder()
                        .status(200)
                        .header("content-type", "application/json")
                        .header(SESSION_HEADER, "probe-session")
                        .body(Body::from(
                            r#"{"jsonrpc":"2.0","id":1,"result":{"capabilities":{}}}"#,
                        ))
                        .unwrap(),
                    Some("notifications/initialized") => {
                        Response::builder().status(202).body(Body::empty()).unwrap()
                    }
                    _ if sse_tools_list => Response::builder()
                        .status(200)
                        .header("content-type", "text/event-stream")
                        .body(Body::from(
                            "data: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"tools\":[]}}\n\n",
                        ))
                        .unwrap(),
                    _ => Response::builder()
                        .status(200)
                        .header("content-type", "application/json")
                        .body(Body::from(r#"{"jsonrpc":"2.0","id":2,"result":{"tools":[]}}"#))
                        .unwrap(),
                }
            }),
        )
    }

    #[tokio::test]
    async fn test_ready_when_handshake_completes() {
        let (host, port) = start_test_server(healthy_app(false)).await;
        assert!(is_backend_ready(&host, port, Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_ready_with_sse_framed_tools_list() {
        let (host, port) = start_test_server(healthy_app(true)).await;
        assert!(is_backend_ready(&host, port, Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_not_ready_without_session_header() {
        let app = Router::new().route(
            "/mcp",
            post(|| async {
                // 200 but no session header: still a failure.
                Response::builder()
                    .status(200)
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#))
                    .unwrap()
            }),
        );
        let (host, port) = start_test_server(app).await;
        assert!(!is_backend_ready(&host, port, Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_not_ready_on_http_error() {
        let app = Router::new().route(
            "/mcp",
            post(|| async {
                Response::builder()
                    .status(500)
                    .body(Body::from("boom"))
                    .unwrap()
            }),
        );
        let (host, port) = start_test_server(app).await;
        assert!(!is_backend_ready(&host, port, Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_not_ready_when_tools_list_is_not_an_envelope() {
        let app = Router::new().route(
            "/mcp",
            post(|request: Request| async move {
                let bytes = axum::body::to_bytes(request.into_body(), usize::MAX)
                    .await
                    .unwrap();
                let body: Value = serde_json::from_slice(&bytes).unwrap();
                if body["method"] == "initialize" {
                    Response::builder()
                        .status(200)
                        .header(SESSION_HEADER, "probe-session")
                        .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#))
                        .unwrap()
                } else {
                    // Valid JSON, but neither result nor error.
                    Response::builder()
                        .status(200)
                        .body(Body::from(r#"{"jsonrpc":"2.0","id":2}"#))
                        .unwrap()
                }
            }),
        );
        let (host, port) = start_test_server(app).await;
        assert!(!is_backend_ready(&host, port, Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_not_ready_when_tools_list_times_out() {
        let app = Router::new().route(
            "/mcp",
            post(|request: Request| async move {
                let bytes = axum::body::to_bytes(request.into_body(), usize::MAX)
                    .await
                    .unwrap();
                let body: Value = serde_json::from_slice(&bytes).unwrap();
                if body["method"] == "initialize" {
                    Response::builder()
                        .status(200)
                        .header(SESSION_HEADER, "probe-session")
                        .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#))
                        .unwrap()
                } else {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Response::builder()
                        .status(200)
                        .body(Body::from(r#"{"jsonrpc":"2.0","id":2,"result":{}}"#))
                        .unwrap()
                }
            }),
        );
        let (host, port) = start_test_server(app).await;
        assert!(!is_backend_ready(&host, port, Duration::from_millis(300)).await);
    }

    #[tokio::test]
    async fn test_not_ready_when_nothing_listens() {
        assert!(!is_backend_ready("127.0.0.1", 1, Duration::from_millis(300)).await);
    }
}
