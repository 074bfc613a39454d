use rmcp::model::{CallToolRequestParams, CallToolResult, RawContent};
use rmcp::service::{Peer, RoleClient};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use toolchat_core::{ParameterSchema, ToolCatalog, ToolDescriptor, ToolGateway, ToolOutcome};

/// Peer handle for one connected server. Cleared to `None` on disconnect so
/// in-flight lookups fail cleanly instead of hitting a dead process.
pub(crate) type SharedPeer = Arc<RwLock<Option<Peer<RoleClient>>>>;

#[derive(Clone)]
pub(crate) struct ServerHandle {
    pub(crate) name: String,
    pub(crate) peer: SharedPeer,
}

/// Aggregates the tools of every connected MCP server behind the
/// `ToolCatalog` and `ToolGateway` seams.
pub struct McpGateway {
    servers: Vec<ServerHandle>,
    /// Tool name -> index into `servers`.
    routes: RwLock<HashMap<String, usize>>,
    initial: Vec<ToolDescriptor>,
}

impl McpGateway {
    /// A gateway with no servers: lists nothing, fails every call.
    pub fn empty() -> Self {
        Self {
            servers: Vec::new(),
            routes: RwLock::new(HashMap::new()),
            initial: Vec::new(),
        }
    }

    /// `listings[i]` must be the tools of `servers[i]`.
    pub(crate) fn from_listings(servers: Vec<ServerHandle>, listings: Vec<Vec<ToolDescriptor>>) -> Self {
        debug_assert_eq!(servers.len(), listings.len());
        let named = servers
            .iter()
            .map(|s| s.name.as_str())
            .zip(listings)
            .collect::<Vec<_>>();
        let (initial, routes) = merge_listings(named);
        Self {
            servers,
            routes: RwLock::new(routes),
            initial,
        }
    }

    /// Tools discovered at connect time, in server order.
    pub fn initial_tools(&self) -> &[ToolDescriptor] {
        &self.initial
    }

    pub fn server_names(&self) -> Vec<&str> {
        self.servers.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

#[async_trait::async_trait]
impl ToolCatalog for McpGateway {
    /// Re-list every live server and rebuild the routing table.
    async fn list_tools(&self) -> anyhow::Result<Vec<ToolDescriptor>> {
        let mut listings = Vec::with_capacity(self.servers.len());
        for server in &self.servers {
            let guard = server.peer.read().await;
            let tools: Vec<ToolDescriptor> = match guard.as_ref() {
                Some(peer) => peer
                    .list_all_tools()
                    .await
                    .map_err(|e| anyhow::anyhow!("list_tools failed for '{}': {}", server.name, e))?
                    .iter()
                    .map(descriptor_from_mcp)
                    .collect(),
                None => {
                    tracing::debug!("Skipping disconnected MCP server '{}'", server.name);
                    Vec::new()
                }
            };
            listings.push((server.name.as_str(), tools));
        }

        let (tools, routes) = merge_listings(listings);
        *self.routes.write().await = routes;
        Ok(tools)
    }
}

#[async_trait::async_trait]
impl ToolGateway for McpGateway {
    async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> ToolOutcome {
        let index = self.routes.read().await.get(name).copied();
        let Some(server) = index.and_then(|i| self.servers.get(i)) else {
            return ToolOutcome::failure(format!("Unknown tool: {name}"));
        };

        let guard = server.peer.read().await;
        let Some(peer) = guard.as_ref() else {
            return ToolOutcome::failure(format!("MCP server '{}' is disconnected", server.name));
        };

        let params = CallToolRequestParams {
            meta: None,
            name: name.to_string().into(),
            arguments: Some(arguments.clone()),
            task: None,
        };

        tracing::debug!("Calling MCP tool '{}' on '{}'", name, server.name);
        match peer.call_tool(params).await {
            Ok(result) => convert_call_result(result),
            Err(e) => {
                tracing::warn!("MCP tool '{}' failed: {}", name, e);
                ToolOutcome::failure(format!("MCP tool '{name}' failed: {e}"))
            }
        }
    }
}

/// Flatten per-server listings. The first server to expose a name owns it.
fn merge_listings<'a>(
    listings: impl IntoIterator<Item = (&'a str, Vec<ToolDescriptor>)>,
) -> (Vec<ToolDescriptor>, HashMap<String, usize>) {
    let mut tools = Vec::new();
    let mut routes: HashMap<String, usize> = HashMap::new();
    let mut owners: Vec<&str> = Vec::new();

    for (index, (server, listing)) in listings.into_iter().enumerate() {
        owners.push(server);
        for tool in listing {
            if let Some(&owner) = routes.get(&tool.name) {
                tracing::warn!(
                    "Tool '{}' from server '{}' shadowed by server '{}'",
                    tool.name,
                    server,
                    owners[owner]
                );
                continue;
            }
            routes.insert(tool.name.clone(), index);
            tools.push(tool);
        }
    }
    (tools, routes)
}

pub(crate) fn descriptor_from_mcp(mcp_tool: &rmcp::model::Tool) -> ToolDescriptor {
    let schema = Value::Object((*mcp_tool.input_schema).clone());
    ToolDescriptor::new(
        mcp_tool.name.to_string(),
        mcp_tool
            .description
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_default(),
        ParameterSchema::from_json_schema(&schema),
    )
}

/// Convert an MCP call result into an outcome.
///
/// Text blocks are joined with newlines; a lone block that parses as JSON is
/// returned as that value.
fn convert_call_result(result: CallToolResult) -> ToolOutcome {
    let texts: Vec<&str> = result
        .content
        .iter()
        .filter_map(|c| match &c.raw {
            RawContent::Text(t) => Some(t.text.as_str()),
            _ => None,
        })
        .collect();

    if result.is_error.unwrap_or(false) {
        let reason = texts.join("\n");
        return if reason.is_empty() {
            ToolOutcome::failure("tool reported an error")
        } else {
            ToolOutcome::failure(reason)
        };
    }

    match texts.as_slice() {
        [] => ToolOutcome::ok(Value::Null),
        [single] => match serde_json::from_str::<Value>(single) {
            Ok(value) => ToolOutcome::ok(value),
            Err(_) => ToolOutcome::ok(Value::String(single.to_string())),
        },
        many => ToolOutcome::ok(Value::String(many.join("\n"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::Content;
    use serde_json::json;

    fn tool(name: &str) -> ToolDescriptor {
        ToolDescriptor::new(name, format!("{name} tool"), ParameterSchema::default())
    }

    #[test]
    fn test_merge_first_server_wins() {
        let (tools, routes) = merge_listings(vec![
            ("files", vec![tool("read"), tool("write")]),
            ("web", vec![tool("fetch"), tool("read")]),
        ]);
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["read", "write", "fetch"]);
        assert_eq!(routes["read"], 0);
        assert_eq!(routes["fetch"], 1);
    }

    #[test]
    fn test_text_result_parsed_as_json() {
        let outcome = convert_call_result(CallToolResult::success(vec![Content::text(
            r#"{"temp": 21}"#,
        )]));
        assert!(outcome.success);
        assert_eq!(outcome.result, Some(json!({"temp": 21})));
    }

    #[test]
    fn test_plain_and_multi_text_results() {
        let outcome = convert_call_result(CallToolResult::success(vec![Content::text("sunny")]));
        assert_eq!(outcome.result, Some(json!("sunny")));

        let outcome = convert_call_result(CallToolResult::success(vec![
            Content::text("line one"),
            Content::text("line two"),
        ]));
        assert_eq!(outcome.result, Some(json!("line one\nline two")));

        let outcome = convert_call_result(CallToolResult::success(vec![]));
        assert!(outcome.success);
        assert_eq!(outcome.render_for_model(), "[no output]");
    }

    #[test]
    fn test_error_result_becomes_failure() {
        let outcome = convert_call_result(CallToolResult::error(vec![Content::text(
            "file not found",
        )]));
        assert!(!outcome.success);
        assert_eq!(outcome.reason(), "file not found");

        let outcome = convert_call_result(CallToolResult::error(vec![]));
        assert_eq!(outcome.reason(), "tool reported an error");
    }

    #[tokio::test]
    async fn test_tools_route_to_their_own_server() {
        let files = ServerHandle {
            name: "files".into(),
            peer: Arc::new(RwLock::new(None)),
        };
        let web = ServerHandle {
            name: "web".into(),
            peer: Arc::new(RwLock::new(None)),
        };
        let gateway = McpGateway::from_listings(vec![files, web], vec![vec![tool("read")], vec![tool("fetch")]]);
        assert_eq!(gateway.server_names(), vec!["files", "web"]);

        let outcome = gateway.call_tool("fetch", &Map::new()).await;
        assert!(outcome.reason().contains("'web'"), "{}", outcome.reason());
        let outcome = gateway.call_tool("read", &Map::new()).await;
        assert!(outcome.reason().contains("'files'"), "{}", outcome.reason());
    }

    #[tokio::test]
    async fn test_unknown_tool_fails() {
        let gateway = McpGateway::empty();
        let outcome = gateway.call_tool("nope", &Map::new()).await;
        assert!(!outcome.success);
        assert!(outcome.reason().contains("Unknown tool"));
        assert!(gateway.list_tools().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disconnected_server_fails_cleanly() {
        let server = ServerHandle {
            name: "files".into(),
            peer: Arc::new(RwLock::new(None)),
        };
        let gateway = McpGateway::from_listings(vec![server], vec![vec![tool("read")]]);
        assert_eq!(gateway.initial_tools().len(), 1);
        assert_eq!(gateway.server_names(), vec!["files"]);

        let outcome = gateway.call_tool("read", &Map::new()).await;
        assert!(!outcome.success);
        assert!(outcome.reason().contains("disconnected"));

        // Re-listing skips the dead server and drops its routes.
        assert!(gateway.list_tools().await.unwrap().is_empty());
        let outcome = gateway.call_tool("read", &Map::new()).await;
        assert!(outcome.reason().contains("Unknown tool"));
    }
}
