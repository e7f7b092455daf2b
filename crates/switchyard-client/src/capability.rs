//! The merged tool catalog across connected servers.
//!
//! Discovery rebuilds the catalog wholesale. A tool name discovered on two
//! servers resolves to whichever server was merged last; servers are merged in
//! registration order.

use futures_util::future::join_all;
use serde::Deserialize;
use std::collections::BTreeMap;
use switchyard_types::Tool;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::connection::ConnectionRegistry;
use crate::correlator::CallOutcome;
use crate::error::CallError;

/// Upper bound on `tools/list` pages followed for one server.
const MAX_LIST_PAGES: usize = 64;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolsListResult {
    tools: Vec<ToolEntry>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct ToolEntry {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "default_schema", rename = "inputSchema")]
    input_schema: serde_json::Value,
}

fn default_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// Tools by qualified name.
#[derive(Default)]
pub struct CapabilityRegistry {
    tools: RwLock<BTreeMap<String, Tool>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query every connected server and replace the catalog with the union.
    ///
    /// A server whose listing fails contributes nothing. Returns the number of
    /// tools now known.
    pub async fn discover_all(&self, connections: &ConnectionRegistry) -> usize {
        let servers = connections.connected_server_names().await;
        let listings = join_all(servers.iter().map(|server| async move {
            (server, discover_server(connections, server).await)
        }))
        .await;

        let mut merged: BTreeMap<String, Tool> = BTreeMap::new();
        for (server, listing) in listings {
            match listing {
                Ok(tools) => {
                    tracing::info!(server = %server, "Discovered {} tool(s)", tools.len());
                    for tool in tools {
                        if let Some(previous) = merged.insert(tool.name.clone(), tool) {
                            tracing::warn!(
                                "Tool '{}' from '{}' replaced by server '{}'",
                                previous.name,
                                previous.server,
                                server
                            );
                        }
                    }
                }
                Err(e) => tracing::warn!(server = %server, "Tool discovery failed: {e}"),
            }
        }

        let count = merged.len();
        *self.tools.write().await = merged;
        count
    }

    /// Forget every tool.
    pub async fn clear(&self) {
        self.tools.write().await.clear();
    }

    /// All tools, ordered by qualified name.
    pub async fn list(&self) -> Vec<Tool> {
        self.tools.read().await.values().cloned().collect()
    }

    pub async fn get(&self, name: &str) -> Option<Tool> {
        self.tools.read().await.get(name).cloned()
    }

    /// Tools owned by one server.
    pub async fn tools_for_server(&self, server: &str) -> Vec<Tool> {
        self.tools
            .read()
            .await
            .values()
            .filter(|t| t.server == server)
            .cloned()
            .collect()
    }

    /// Route a call to the tool's owning server.
    pub async fn invoke(
        &self,
        connections: &ConnectionRegistry,
        name: &str,
        params: serde_json::Value,
    ) -> CallOutcome {
        let tool = self.route(connections, name).await?;
        connections
            .call(&tool.server, "tools/call", Some(call_params(&tool, params)))
            .await
    }

    /// Like [`CapabilityRegistry::invoke`], abandoned when `cancel` fires.
    pub async fn invoke_with_cancel(
        &self,
        connections: &ConnectionRegistry,
        name: &str,
        params: serde_json::Value,
        cancel: &CancellationToken,
    ) -> CallOutcome {
        let tool = self.route(connections, name).await?;
        connections
            .call_with_cancel(
                &tool.server,
                "tools/call",
                Some(call_params(&tool, params)),
                cancel,
            )
            .await
    }

    async fn route(&self, connections: &ConnectionRegistry, name: &str) -> Result<Tool, CallError> {
        let tool = self.get(name).await.ok_or_else(|| CallError::UnknownTool {
            name: name.to_string(),
        })?;
        if !connections.is_connected(&tool.server).await {
            return Err(CallError::ServerUnavailable {
                server: tool.server.clone(),
            });
        }
        Ok(tool)
    }
}

fn call_params(tool: &Tool, arguments: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "name": tool.remote_name,
        "arguments": arguments,
    })
}

/// List one server's tools, following pagination cursors.
async fn discover_server(
    connections: &ConnectionRegistry,
    server: &str,
) -> Result<Vec<Tool>, CallError> {
    let mut tools = Vec::new();
    let mut cursor: Option<String> = None;
    for _ in 0..MAX_LIST_PAGES {
        let params = cursor
            .take()
            .map(|c| serde_json::json!({ "cursor": c }));
        let result = connections.call(server, "tools/list", params).await?;
        let page = parse_tools_list(server, result)?;
        tools.extend(page.tools.into_iter().map(|entry| {
            Tool::new(
                server,
                entry.name,
                entry.description.unwrap_or_default(),
                entry.input_schema,
            )
        }));
        match page.next_cursor {
            Some(next) if !next.is_empty() => cursor = Some(next),
            _ => return Ok(tools),
        }
    }
    tracing::warn!(server, "Stopped following tools/list after {MAX_LIST_PAGES} pages");
    Ok(tools)
}

fn parse_tools_list(server: &str, result: serde_json::Value) -> Result<ToolsListResult, CallError> {
    serde_json::from_value(result).map_err(|e| CallError::Protocol {
        server: server.to_string(),
        reason: format!("failed to parse tools/list response: {e}"),
    })
}
