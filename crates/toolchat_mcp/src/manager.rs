use crate::bridge::{descriptor_from_mcp, McpGateway, ServerHandle};
use rmcp::service::{RoleClient, RunningService, ServiceExt};
use rmcp::transport::TokioChildProcess;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::RwLock;
use toolchat_core::{McpServerConfig, ToolDescriptor};

/// A connected MCP server with its running service and shared peer handle.
struct ConnectedServer {
    handle: ServerHandle,
    service: RunningService<RoleClient, ()>,
}

/// Owns the MCP child processes for the lifetime of a chat session.
pub struct McpManager {
    configs: Vec<McpServerConfig>,
    servers: Vec<ConnectedServer>,
}

impl McpManager {
    pub fn new(configs: Vec<McpServerConfig>) -> Self {
        Self {
            configs,
            servers: Vec::new(),
        }
    }

    /// Names of the servers that will be spawned by `connect_all`.
    pub fn auto_connect_names(&self) -> Vec<&str> {
        self.configs
            .iter()
            .filter(|c| c.auto_connect)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Connect to every auto-connect server and discover its tools.
    ///
    /// A server that fails to start or handshake is logged and skipped.
    /// Calling it again reconnects: servers from the previous round are shut down first.
    pub async fn connect_all(&mut self) -> McpGateway {
        self.disconnect_all().await;
        let mut listings = Vec::new();

        for config in &self.configs {
            if !config.auto_connect {
                tracing::info!("Skipping MCP server '{}' (auto_connect=false)", config.name);
                continue;
            }

            match connect_server(config).await {
                Ok((server, tools)) => {
                    tracing::info!(
                        "MCP server '{}': {} tool(s) discovered",
                        config.name,
                        tools.len()
                    );
                    listings.push(tools);
                    self.servers.push(server);
                }
                Err(e) => {
                    tracing::error!("Failed to connect MCP server '{}': {:#}", config.name, e);
                }
            }
        }

        let handles = self.servers.iter().map(|s| s.handle.clone()).collect();
        McpGateway::from_listings(handles, listings)
    }

    /// Disconnect all MCP servers. Gateways built from this manager start
    /// failing their calls immediately.
    pub async fn disconnect_all(&mut self) {
        for server in self.servers.drain(..) {
            *server.handle.peer.write().await = None;
            if let Err(e) = server.service.cancel().await {
                tracing::warn!("Error cancelling MCP server '{}': {:?}", server.handle.name, e);
            }
            tracing::info!("MCP server '{}' disconnected", server.handle.name);
        }
    }

    pub fn connected_count(&self) -> usize {
        self.servers.len()
    }
}

async fn connect_server(
    config: &McpServerConfig,
) -> anyhow::Result<(ConnectedServer, Vec<ToolDescriptor>)> {
    if config.command.trim().is_empty() {
        anyhow::bail!("no command configured");
    }

    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args);
    for (k, v) in &config.env {
        cmd.env(k, v);
    }

    let transport = TokioChildProcess::new(cmd)?;
    let service = ()
        .serve(transport)
        .await
        .map_err(|e| anyhow::anyhow!("MCP handshake failed for '{}': {}", config.name, e))?;

    let tools = service
        .peer()
        .list_all_tools()
        .await
        .map_err(|e| anyhow::anyhow!("list_tools failed for '{}': {}", config.name, e))?;

    let descriptors = tools
        .iter()
        .map(|t| {
            tracing::debug!("  -> tool '{}' from server '{}'", t.name, config.name);
            descriptor_from_mcp(t)
        })
        .collect();

    let handle = ServerHandle {
        name: config.name.clone(),
        peer: Arc::new(RwLock::new(Some(service.peer().clone()))),
    };
    Ok((ConnectedServer { handle, service }, descriptors))
}
