//! MCP Server Implementation
//!
//! Serves the Switchboard entry points as MCP tools.

use super::protocol::*;
use super::tools::{
    self, EXECUTE_WORKFLOW, ExecuteWorkflowArgs, GET_ROUTING_RULES, GetRoutingRulesArgs,
    LIST_AVAILABLE_MCPS, LIST_WORKFLOWS, ListMcpsArgs, ROUTE_TASK, RouteTaskArgs,
};
use super::transport::Transport;
use crate::switchboard::Switchboard;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;

/// MCP Server configuration
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    /// Server name
    pub name: String,
    /// Server version
    pub version: String,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            name: "switchboard".to_string(),
            version: crate::VERSION.to_string(),
        }
    }
}

/// MCP server over a [`Switchboard`]
#[derive(Debug, Clone)]
pub struct McpServer {
    config: McpServerConfig,
    switchboard: Arc<Switchboard>,
}

impl McpServer {
    pub fn new(switchboard: Arc<Switchboard>) -> Self {
        Self::with_config(switchboard, McpServerConfig::default())
    }

    pub fn with_config(switchboard: Arc<Switchboard>, config: McpServerConfig) -> Self {
        Self {
            config,
            switchboard,
        }
    }

    pub fn switchboard(&self) -> &Arc<Switchboard> {
        &self.switchboard
    }

    /// Handle an incoming JSON-RPC message.
    ///
    /// Notifications get no response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = request.id.clone() else {
            tracing::debug!(method = %request.method, "notification received");
            return None;
        };

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(id, request.params),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(id, request.params).await,
            other => {
                tracing::debug!(method = %other, "unsupported method");
                JsonRpcResponse::error(id, JsonRpcError::method_not_found())
            }
        };
        Some(response)
    }

    fn handle_initialize(&self, id: RequestId, params: Option<Value>) -> JsonRpcResponse {
        let params: InitializeParams = match params.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                return JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_params(format!("Invalid initialize params: {}", e)),
                );
            }
            None => {
                return JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_params("Missing initialize params"),
                );
            }
        };

        if let Some(client) = &params.client_info {
            tracing::info!(client = %client.name, version = %client.version, "client connected");
        }

        let result = InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: false }),
            },
            server_info: PeerInfo {
                name: self.config.name.clone(),
                version: self.config.version.clone(),
            },
        };
        respond(id, &result)
    }

    fn handle_tools_list(&self, id: RequestId) -> JsonRpcResponse {
        respond(
            id,
            &ToolsListResult {
                tools: tools::tool_definitions(),
            },
        )
    }

    async fn handle_tools_call(&self, id: RequestId, params: Option<Value>) -> JsonRpcResponse {
        let call: ToolCallParams = match params.map(serde_json::from_value) {
            Some(Ok(call)) => call,
            Some(Err(e)) => {
                return JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_params(format!("Invalid tool call params: {}", e)),
                );
            }
            None => {
                return JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_params("Missing tool call params"),
                );
            }
        };

        tracing::debug!(tool = %call.name, "tool call");
        let outcome = match call.name.as_str() {
            ROUTE_TASK => self.route_task(call.arguments).await,
            EXECUTE_WORKFLOW => self.execute_workflow(call.arguments).await,
            LIST_AVAILABLE_MCPS => parse_args::<ListMcpsArgs>(call.arguments).and_then(|args| {
                to_json(&self.switchboard.list_available_mcps(args.capability.as_deref()), false)
            }),
            GET_ROUTING_RULES => parse_args::<GetRoutingRulesArgs>(call.arguments).and_then(|args| {
                to_json(&self.switchboard.get_routing_rules(args.task_type.as_deref()), false)
            }),
            LIST_WORKFLOWS => to_json(&self.switchboard.list_workflows(), false),
            unknown => {
                return JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_params(format!("Unknown tool: {}", unknown)),
                );
            }
        };

        let result = match outcome {
            Ok((value, is_error)) => ToolCallResult::json(&value, is_error),
            Err(message) => ToolCallResult::json(&json!({ "success": false, "error": message }), true),
        };
        respond(id, &result)
    }

    async fn route_task(&self, arguments: Value) -> Result<(Value, bool), String> {
        let args: RouteTaskArgs = parse_args(arguments)?;
        let report = self.switchboard.route_task(args.into(), None).await;
        to_json(&report, !report.success)
    }

    async fn execute_workflow(&self, arguments: Value) -> Result<(Value, bool), String> {
        let args: ExecuteWorkflowArgs = parse_args(arguments)?;
        let report = self
            .switchboard
            .execute_workflow(&args.workflow, args.payload(), None)
            .await;
        to_json(&report, !report.success)
    }

    /// Run the server until the transport closes
    pub async fn run<T: Transport>(&self, mut transport: T) -> crate::error::Result<()> {
        tracing::info!(name = %self.config.name, version = %self.config.version, "MCP server started");
        loop {
            match transport.receive().await {
                Ok(Some(request)) => {
                    if let Some(response) = self.handle_request(request).await {
                        transport.send(response).await?;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Transport error: {}", e);
                    return Err(e);
                }
            }
        }
        tracing::info!("MCP server stopped");
        Ok(())
    }
}

fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, String> {
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    serde_json::from_value(arguments).map_err(|e| format!("Invalid arguments: {}", e))
}

fn to_json<T: serde::Serialize>(value: &T, is_error: bool) -> Result<(Value, bool), String> {
    serde_json::to_value(value)
        .map(|value| (value, is_error))
        .map_err(|e| e.to_string())
}

fn respond<T: serde::Serialize>(id: RequestId, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, JsonRpcError::internal_error(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SwitchboardConfig;
    use crate::invoker::ScriptedInvoker;
    use crate::mcp::MemoryTransport;

    fn server(invoker: Arc<ScriptedInvoker>) -> McpServer {
        let config = SwitchboardConfig::from_toml_str(
            r#"
[providers.search]
capabilities = ["research"]

[[routing_rules]]
name = "research"
condition = { task_type = "research" }
action = { provider = "search", tool = "ask" }
"#,
        )
        .unwrap();
        McpServer::new(Arc::new(Switchboard::new(config, invoker)))
    }

    fn call(id: i64, tool: &str, arguments: Value) -> JsonRpcRequest {
        JsonRpcRequest::new(id, "tools/call").with_params(json!({
            "name": tool,
            "arguments": arguments
        }))
    }

    fn tool_result(response: JsonRpcResponse) -> (Value, bool) {
        let result: ToolCallResult = serde_json::from_value(response.result.unwrap()).unwrap();
        let value = serde_json::from_str(&result.text()).unwrap();
        (value, result.is_error == Some(true))
    }

    #[tokio::test]
    async fn test_initialize_and_list() {
        let server = server(Arc::new(ScriptedInvoker::new()));

        let init = server
            .handle_request(JsonRpcRequest::new(1i64, "initialize").with_params(json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": { "name": "test", "version": "0.0.0" }
            })))
            .await
            .unwrap();
        let result = init.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], "switchboard");
        assert!(result["capabilities"]["tools"].is_object());

        let list = server
            .handle_request(JsonRpcRequest::new(2i64, "tools/list"))
            .await
            .unwrap();
        assert_eq!(list.result.unwrap()["tools"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let server = server(Arc::new(ScriptedInvoker::new()));
        let response = server
            .handle_request(JsonRpcRequest::notification("notifications/initialized"))
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_route_task_tool() {
        let invoker = Arc::new(ScriptedInvoker::new().with_response("search", "ask", json!({"answer": 1})));
        let server = server(invoker);

        let response = server
            .handle_request(call(3, ROUTE_TASK, json!({"task_type": "research", "description": "x"})))
            .await
            .unwrap();
        let (value, is_error) = tool_result(response);
        assert!(!is_error);
        assert_eq!(value["routed_to"]["provider"], "search");
        assert_eq!(value["result"]["answer"], 1);
    }

    #[tokio::test]
    async fn test_failures_are_tool_errors() {
        let server = server(Arc::new(ScriptedInvoker::new()));

        let no_route = server
            .handle_request(call(4, ROUTE_TASK, json!({"task_type": "deploy", "description": "x"})))
            .await
            .unwrap();
        let (value, is_error) = tool_result(no_route);
        assert!(is_error);
        assert_eq!(value["success"], false);

        let bad_args = server
            .handle_request(call(5, ROUTE_TASK, json!({"description": "missing type"})))
            .await
            .unwrap();
        let (value, is_error) = tool_result(bad_args);
        assert!(is_error);
        assert!(value["error"].as_str().unwrap().starts_with("Invalid arguments"));

        let unknown_workflow = server
            .handle_request(call(6, EXECUTE_WORKFLOW, json!({"workflow": "nope"})))
            .await
            .unwrap();
        assert!(tool_result(unknown_workflow).1);
    }

    #[tokio::test]
    async fn test_unknown_tool_and_method() {
        let server = server(Arc::new(ScriptedInvoker::new()));

        let unknown_tool = server
            .handle_request(call(7, "summon", json!({})))
            .await
            .unwrap();
        assert_eq!(unknown_tool.error.unwrap().code, -32602);

        let unknown_method = server
            .handle_request(JsonRpcRequest::new(8i64, "resources/list"))
            .await
            .unwrap();
        assert_eq!(unknown_method.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_run_over_memory_transport() {
        let server = server(Arc::new(ScriptedInvoker::new()));
        let mut transport = MemoryTransport::new();
        transport.push_request(JsonRpcRequest::new(1i64, "ping"));
        transport.push_request(JsonRpcRequest::notification("notifications/initialized"));
        transport.push_request(call(2, LIST_WORKFLOWS, Value::Null));

        server.run(&mut transport).await.unwrap();

        assert_eq!(transport.responses().len(), 2);
        let (value, _) = tool_result(transport.pop_response().unwrap());
        assert_eq!(value, json!([]));
    }
}
