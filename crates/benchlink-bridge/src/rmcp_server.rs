//! RMCP server exposing the kernel tool and resource catalog over stdio.
//!
//! The catalog is static: a fixed table of tool names and resource URIs,
//! each a thin pass-through to [`KernelClient`]. Action-specific validation
//! and dispatch for the meta-tools (`notebook`, `database`, `dynamic_tool`)
//! happens on the kernel side; the bridge forwards the `action` discriminator
//! and parameters verbatim and never inspects them.

use std::borrow::Cow;
use std::sync::Arc;

use anyhow::Result;
use rmcp::model::{
    AnnotateAble, CallToolRequestParam, CallToolResult, Content, ListResourcesResult,
    ListToolsResult, PaginatedRequestParam, ProtocolVersion, RawResource,
    ReadResourceRequestParam, ReadResourceResult, Resource, ResourceContents, ServerCapabilities,
    ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{serve_server, ErrorData, RoleServer, ServerHandler};
use serde_json::{json, Map as JsonObject, Value};
use tokio::io::{stdin, stdout};
use tracing::{info, warn};

use crate::builder::{BridgeConfig, UnreadyPolicy};
use crate::kernel_client::{KernelClient, KernelError};
use crate::readiness::is_backend_ready;

/// A declared resource the bridge mirrors 1:1 from the kernel.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResourceSpec {
    pub uri: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub mime_type: &'static str,
}

/// Fixed resource surface. Every URI here always yields *something* shaped
/// like a resource, even when the kernel is unreachable.
pub(crate) const DECLARED_RESOURCES: &[ResourceSpec] = &[
    ResourceSpec {
        uri: "instruments://available",
        name: "Available instruments",
        description: "Instruments currently registered with the measurement station",
        mime_type: "application/json",
    },
    ResourceSpec {
        uri: "station://state",
        name: "Station state",
        description: "Live snapshot of the station and its parameter values",
        mime_type: "application/json",
    },
    ResourceSpec {
        uri: "database://config",
        name: "Database configuration",
        description: "Configuration of the active measurement database",
        mime_type: "application/json",
    },
    ResourceSpec {
        uri: "measurements://recent",
        name: "Recent measurements",
        description: "Most recent measurement runs recorded by the kernel",
        mime_type: "application/json",
    },
    ResourceSpec {
        uri: "examples://sweep1d",
        name: "1D sweep example",
        description: "Template code for a one-dimensional parameter sweep",
        mime_type: "text/x-python",
    },
    ResourceSpec {
        uri: "examples://sweep2d",
        name: "2D sweep example",
        description: "Template code for a two-dimensional parameter sweep",
        mime_type: "text/x-python",
    },
    ResourceSpec {
        uri: "examples://time-sweep",
        name: "Time sweep example",
        description: "Template code for monitoring parameters over time",
        mime_type: "text/x-python",
    },
    ResourceSpec {
        uri: "examples://simul-sweep",
        name: "Simultaneous sweep example",
        description: "Template code for sweeping two parameters simultaneously",
        mime_type: "text/x-python",
    },
];

fn tool(name: &'static str, description: &'static str, schema: Value) -> Tool {
    let schema = match schema {
        Value::Object(object) => Arc::new(object),
        _ => Arc::new(JsonObject::new()),
    };
    Tool {
        name: Cow::Borrowed(name),
        description: Some(Cow::Borrowed(description)),
        input_schema: schema,
        output_schema: None,
        annotations: None,
        title: None,
        icons: None,
    }
}

/// Fixed tool surface. Parameters are forwarded verbatim as `arguments`.
pub(crate) fn declared_tools() -> Vec<Tool> {
    vec![
        tool(
            "instrument_parameter",
            "Read or write a single instrument parameter. Omit 'value' to read, \
             provide it to write.",
            json!({
                "type": "object",
                "properties": {
                    "instrument": { "type": "string", "description": "Instrument name as registered with the station" },
                    "parameter": { "type": "string", "description": "Parameter name on the instrument" },
                    "value": { "description": "New value; omit to read the current value" }
                },
                "required": ["instrument", "parameter"]
            }),
        ),
        tool(
            "notebook",
            "Operate on the measurement notebook. The 'action' field selects the \
             operation; remaining fields depend on the action and are validated by \
             the kernel.",
            json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": ["add_cell", "edit_cell", "execute_cell", "get_output", "list_cells", "delete_cell"]
                    },
                    "content": { "type": "string", "description": "Cell source for add_cell / edit_cell" },
                    "cell_id": { "type": "string", "description": "Target cell identifier" },
                    "position": { "type": "integer", "description": "Insertion position for add_cell" }
                },
                "required": ["action"]
            }),
        ),
        tool(
            "resource_list",
            "List the resources the kernel currently exposes.",
            json!({ "type": "object", "properties": {} }),
        ),
        tool(
            "resource_get",
            "Read a single kernel resource by URI.",
            json!({
                "type": "object",
                "properties": {
                    "uri": { "type": "string", "description": "Resource URI, e.g. station://state" }
                },
                "required": ["uri"]
            }),
        ),
        tool(
            "sweep_get_status",
            "Report the state of the currently running sweep, if any.",
            json!({ "type": "object", "properties": {} }),
        ),
        tool(
            "sweep_wait_for_completion",
            "Block until the running sweep finishes or the given timeout elapses.",
            json!({
                "type": "object",
                "properties": {
                    "timeout_seconds": { "type": "number", "description": "Maximum time to wait" }
                }
            }),
        ),
        tool(
            "database",
            "Inspect the measurement database. The 'action' field selects the \
             operation; remaining fields depend on the action and are validated by \
             the kernel.",
            json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": ["list_experiments", "get_dataset", "get_config", "query"]
                    },
                    "experiment": { "type": "string", "description": "Experiment name filter" },
                    "dataset_id": { "type": "integer", "description": "Dataset run id for get_dataset" },
                    "sql": { "type": "string", "description": "Read-only SQL for the query action" }
                },
                "required": ["action"]
            }),
        ),
        tool(
            "dynamic_tool",
            "Manage kernel-defined tools at runtime. The 'action' field selects the \
             operation; remaining fields are forwarded to the kernel unchanged.",
            json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": ["register", "unregister", "list", "describe"]
                    },
                    "name": { "type": "string", "description": "Tool name for register / unregister / describe" },
                    "code": { "type": "string", "description": "Tool implementation source for register" }
                },
                "required": ["action"]
            }),
        ),
    ]
}

fn is_declared_tool(name: &str) -> bool {
    declared_tools().iter().any(|tool| tool.name == name)
}

fn declared_resources() -> Vec<Resource> {
    DECLARED_RESOURCES
        .iter()
        .map(|spec| {
            let mut resource = RawResource::new(spec.uri, spec.name);
            resource.description = Some(spec.description.to_string());
            resource.mime_type = Some(spec.mime_type.to_string());
            resource.no_annotation()
        })
        .collect()
}

fn success_result(value: Value) -> CallToolResult {
    let text = match &value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    CallToolResult {
        content: vec![Content::text(text)],
        structured_content: Some(value),
        is_error: Some(false),
        meta: None,
    }
}

fn error_result(error: &KernelError) -> CallToolResult {
    let payload = json!({ "error": error.to_string() });
    CallToolResult {
        content: vec![Content::text(payload.to_string())],
        structured_content: Some(payload),
        is_error: Some(true),
        meta: None,
    }
}

/// Kernel bridge service exposed to the MCP host.
#[derive(Clone)]
pub struct KernelBridge {
    client: KernelClient,
}

impl KernelBridge {
    pub fn new(client: KernelClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &KernelClient {
        &self.client
    }

    /// Dispatch one declared tool invocation.
    ///
    /// The resource helper tools route through the dedicated client
    /// operations; everything else is a verbatim `tools/call` pass-through.
    /// Failures become `{"error": …}` payloads, never protocol errors, so
    /// the host always receives a syntactically valid tool result.
    pub(crate) async fn forward_tool(&self, name: &str, args: Value) -> CallToolResult {
        if !is_declared_tool(name) {
            let payload = json!({ "error": format!("Tool '{name}' is not provided by this bridge") });
            return CallToolResult {
                content: vec![Content::text(payload.to_string())],
                structured_content: Some(payload),
                is_error: Some(true),
                meta: None,
            };
        }

        match name {
            "resource_list" => {
                let resources = self.client.list_resources().await;
                success_result(json!({ "resources": resources }))
            }
            "resource_get" => {
                let uri = args
                    .get("uri")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                match self.client.read_resource(&uri).await {
                    Ok(value) => success_result(value),
                    Err(error) => error_result(&error),
                }
            }
            _ => match self.client.call(name, args).await {
                Ok(value) => success_result(value),
                Err(error) => error_result(&error),
            },
        }
    }

    /// Fetch one declared resource.
    ///
    /// A kernel failure yields an error-flavored resource payload with
    /// non-empty name and description fields instead of omitting the
    /// resource; the host always gets something resource-shaped back.
    pub(crate) async fn fetch_resource(&self, spec: &ResourceSpec) -> ResourceContents {
        match self.client.read_resource(spec.uri).await {
            Ok(value) => {
                let text = match &value {
                    Value::String(text) => text.clone(),
                    other => serde_json::to_string_pretty(other)
                        .unwrap_or_else(|_| other.to_string()),
                };
                ResourceContents::text(text, spec.uri)
            }
            Err(error) => {
                let placeholder = json!({
                    "name": format!("{} (unavailable)", spec.name),
                    "description": format!("{} - fetch failed: {}", spec.description, error),
                    "error": error.to_string(),
                });
                ResourceContents::text(placeholder.to_string(), spec.uri)
            }
        }
    }
}

impl ServerHandler for KernelBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: rmcp::model::Implementation {
                name: "benchlink-bridge".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("Benchlink Kernel Bridge".to_string()),
                website_url: Some("https://github.com/benchlink/benchlink".to_string()),
                icons: None,
            },
            instructions: Some(
                "Bridge to a laboratory notebook kernel: instrument parameters, notebook \
                 cells, sweep monitoring and the measurement database are reachable through \
                 the declared tools. Failed operations return an {\"error\": …} payload \
                 rather than a protocol error."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: declared_tools(),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let args = request
            .arguments
            .map(Value::Object)
            .unwrap_or_else(|| Value::Object(JsonObject::new()));
        Ok(self.forward_tool(request.name.as_ref(), args).await)
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListResourcesResult, ErrorData> {
        Ok(ListResourcesResult {
            resources: declared_resources(),
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ReadResourceResult, ErrorData> {
        let Some(spec) = DECLARED_RESOURCES
            .iter()
            .find(|spec| spec.uri == request.uri)
        else {
            return Err(ErrorData::resource_not_found(
                format!("unknown resource URI: {}", request.uri),
                None,
            ));
        };

        Ok(ReadResourceResult {
            contents: vec![self.fetch_resource(spec).await],
        })
    }
}

/// Run the bridge: readiness probe, policy check, then serve MCP on stdio.
pub async fn run(config: BridgeConfig) -> Result<()> {
    info!(base_url = %config.base_url, "starting benchlink bridge");

    let parsed = url::Url::parse(&config.base_url)
        .map_err(|e| anyhow::anyhow!("invalid base URL '{}': {e}", config.base_url))?;
    let host = parsed.host_str().unwrap_or("127.0.0.1").to_string();
    let port = parsed.port_or_known_default().unwrap_or(80);

    if !is_backend_ready(&host, port, config.probe_timeout).await {
        match config.on_unready {
            UnreadyPolicy::Fail => anyhow::bail!(
                "kernel service at {} failed the readiness probe",
                config.base_url
            ),
            UnreadyPolicy::Degrade => warn!(
                base_url = %config.base_url,
                "kernel service not ready; serving anyway, calls will surface errors"
            ),
        }
    }

    let client = KernelClient::new(
        &config.base_url,
        config.request_timeout,
        config.trust_token.clone(),
    )?;
    let bridge = KernelBridge::new(client);

    let server = serve_server(bridge, (stdin(), stdout()))
        .await
        .map_err(|e| anyhow::anyhow!("failed to start MCP server: {e}"))?;
    info!("bridge serving MCP over stdio");

    let quit_reason = server
        .waiting()
        .await
        .map_err(|e| anyhow::anyhow!("MCP server task failed: {e}"))?;
    info!(?quit_reason, "bridge stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::Request;
    use axum::response::Response;
    use axum::routing::post;
    use axum::Router;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;

    async fn start_test_server(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn bridge_for(base_url: &str) -> KernelBridge {
        let client = KernelClient::new(base_url, Duration::from_secs(5), None).unwrap();
        KernelBridge::new(client)
    }

    /// Mock kernel recording (method, params) pairs and answering every
    /// request with the given result.
    fn recording_app(seen: Arc<Mutex<Vec<(String, Value)>>>, result: Value) -> Router {
        Router::new().route(
            "/mcp",
            post(move |request: Request| {
                let seen = seen.clone();
                let result = result.clone();
                async move {
                    let bytes = axum::body::to_bytes(request.into_body(), usize::MAX)
                        .await
                        .unwrap();
                    let body: Value = serde_json::from_slice(&bytes).unwrap();
                    let method = body["method"].as_str().unwrap_or_default().to_string();
                    let params = body.get("params").cloned().unwrap_or(Value::Null);
                    let is_notification = body.get("id").is_none();
                    seen.lock().await.push((method, params));

                    if is_notification {
                        return Response::builder().status(202).body(Body::empty()).unwrap();
                    }
                    let reply = json!({"jsonrpc": "2.0", "id": 1, "result": result});
                    Response::builder()
                        .status(200)
                        .header("content-type", "application/json")
                        .header("mcp-session-id", "catalog-session")
                        .body(Body::from(reply.to_string()))
                        .unwrap()
                }
            }),
        )
    }

    #[test]
    fn test_declared_tool_surface_is_fixed() {
        let names: Vec<_> = declared_tools()
            .iter()
            .map(|tool| tool.name.to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "instrument_parameter",
                "notebook",
                "resource_list",
                "resource_get",
                "sweep_get_status",
                "sweep_wait_for_completion",
                "database",
                "dynamic_tool",
            ]
        );
    }

    #[test]
    fn test_every_tool_has_object_schema_and_description() {
        for tool in declared_tools() {
            assert_eq!(
                tool.input_schema.get("type").and_then(Value::as_str),
                Some("object"),
                "tool {} schema is not an object",
                tool.name
            );
            assert!(tool.description.is_some());
        }
    }

    #[test]
    fn test_meta_tools_declare_action_discriminator() {
        for name in ["notebook", "database", "dynamic_tool"] {
            let tools = declared_tools();
            let tool = tools.iter().find(|tool| tool.name == name).unwrap();
            let action = tool
                .input_schema
                .get("properties")
                .and_then(|p| p.get("action"))
                .and_then(|a| a.get("enum"))
                .and_then(Value::as_array);
            assert!(
                action.is_some_and(|variants| !variants.is_empty()),
                "meta-tool {name} lacks an action enum"
            );
            let required = tool
                .input_schema
                .get("required")
                .and_then(Value::as_array)
                .unwrap();
            assert!(required.contains(&json!("action")));
        }
    }

    #[test]
    fn test_declared_resource_surface_is_fixed() {
        let uris: Vec<_> = DECLARED_RESOURCES.iter().map(|spec| spec.uri).collect();
        assert_eq!(
            uris,
            vec![
                "instruments://available",
                "station://state",
                "database://config",
                "measurements://recent",
                "examples://sweep1d",
                "examples://sweep2d",
                "examples://time-sweep",
                "examples://simul-sweep",
            ]
        );
        for resource in declared_resources() {
            assert!(!resource.name.is_empty());
            assert!(resource.description.is_some());
        }
    }

    #[tokio::test]
    async fn test_forward_tool_passes_name_and_arguments_verbatim() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let base_url = start_test_server(recording_app(seen.clone(), json!({"ok": true}))).await;
        let bridge = bridge_for(&base_url);

        let result = bridge
            .forward_tool(
                "notebook",
                json!({"action": "add_cell", "content": "print(1)"}),
            )
            .await;
        assert_eq!(result.is_error, Some(false));

        let seen = seen.lock().await;
        let (_, params) = seen
            .iter()
            .find(|(method, _)| method == "tools/call")
            .expect("no tools/call forwarded");
        assert_eq!(params["name"], "notebook");
        assert_eq!(params["arguments"]["action"], "add_cell");
        assert_eq!(params["arguments"]["content"], "print(1)");
    }

    #[tokio::test]
    async fn test_forward_tool_converts_failure_to_error_payload() {
        let bridge = bridge_for("http://127.0.0.1:1");

        let result = bridge.forward_tool("sweep_get_status", json!({})).await;

        assert_eq!(result.is_error, Some(true));
        let payload = result.structured_content.unwrap();
        let message = payload["error"].as_str().unwrap();
        assert!(message.starts_with("Proxy request failed: "));
    }

    #[tokio::test]
    async fn test_forward_tool_rejects_undeclared_names_without_network() {
        let bridge = bridge_for("http://127.0.0.1:1");

        let result = bridge.forward_tool("rm_rf_slash", json!({})).await;

        assert_eq!(result.is_error, Some(true));
        let payload = result.structured_content.unwrap();
        assert!(payload["error"]
            .as_str()
            .unwrap()
            .contains("not provided by this bridge"));
    }

    #[tokio::test]
    async fn test_resource_get_tool_routes_to_resources_read() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let base_url =
            start_test_server(recording_app(seen.clone(), json!({"state": "idle"}))).await;
        let bridge = bridge_for(&base_url);

        let result = bridge
            .forward_tool("resource_get", json!({"uri": "station://state"}))
            .await;
        assert_eq!(result.is_error, Some(false));

        let seen = seen.lock().await;
        let (_, params) = seen
            .iter()
            .find(|(method, _)| method == "resources/read")
            .expect("resource_get did not use resources/read");
        assert_eq!(params["uri"], "station://state");
    }

    #[tokio::test]
    async fn test_resource_list_tool_degrades_to_empty_list() {
        let bridge = bridge_for("http://127.0.0.1:1");

        let result = bridge.forward_tool("resource_list", json!({})).await;

        // Unreachable backend and "no resources" are indistinguishable here.
        assert_eq!(result.is_error, Some(false));
        let payload = result.structured_content.unwrap();
        assert_eq!(payload["resources"], json!([]));
    }

    #[tokio::test]
    async fn test_fetch_resource_success_carries_kernel_payload() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let base_url =
            start_test_server(recording_app(seen, json!({"instruments": ["dmm", "vna"]}))).await;
        let bridge = bridge_for(&base_url);

        let contents = bridge.fetch_resource(&DECLARED_RESOURCES[0]).await;
        let ResourceContents::TextResourceContents { uri, text, .. } = contents else {
            panic!("expected text resource contents");
        };
        assert_eq!(uri, "instruments://available");
        let payload: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(payload["instruments"][0], "dmm");
    }

    #[tokio::test]
    async fn test_fetch_resource_failure_is_error_flavored_not_absent() {
        let bridge = bridge_for("http://127.0.0.1:1");

        let contents = bridge.fetch_resource(&DECLARED_RESOURCES[1]).await;
        let ResourceContents::TextResourceContents { uri, text, .. } = contents else {
            panic!("expected text resource contents");
        };
        assert_eq!(uri, "station://state");

        let payload: Value = serde_json::from_str(&text).unwrap();
        assert!(!payload["name"].as_str().unwrap().is_empty());
        assert!(!payload["description"].as_str().unwrap().is_empty());
        assert!(payload["error"]
            .as_str()
            .unwrap()
            .starts_with("Proxy request failed: "));
    }

    #[test]
    fn test_get_info_advertises_tools_and_resources() {
        let bridge = bridge_for("http://127.0.0.1:1");
        let info = bridge.get_info();

        assert!(info.capabilities.tools.is_some());
        assert!(info.capabilities.resources.is_some());
        assert!(info.instructions.is_some());
        assert_eq!(info.server_info.name, "benchlink-bridge");
    }
}
