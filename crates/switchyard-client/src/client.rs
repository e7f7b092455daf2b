//! Tool client, the facade over connections, discovery, and invocation.

use std::path::Path;
use std::sync::Arc;
use switchyard_types::{ConfigError, ServerConfig, Tool};
use tokio_util::sync::CancellationToken;

use crate::capability::CapabilityRegistry;
use crate::connection::{ConnectionInfo, ConnectionRegistry};
use crate::correlator::{CallOutcome, Correlator};
use crate::error::ConnectError;

/// Connects to a set of tool servers and presents their tools as one catalog.
pub struct ToolClient {
    connections: ConnectionRegistry,
    capabilities: CapabilityRegistry,
}

impl ToolClient {
    pub fn new(configs: Vec<ServerConfig>) -> Self {
        Self {
            connections: ConnectionRegistry::new(configs, Arc::new(Correlator::new())),
            capabilities: CapabilityRegistry::new(),
        }
    }

    /// Build a client from a descriptor file. A missing file yields no servers.
    pub fn from_descriptor(path: &Path) -> Result<Self, ConfigError> {
        let configs = switchyard_config::load_servers(path)?;
        tracing::debug!("Loaded {} server(s) from {}", configs.len(), path.display());
        Ok(Self::new(configs))
    }

    /// Connect every server, then discover tools on those that came up.
    ///
    /// Servers that fail to connect are logged and skipped. True iff at least
    /// one server is connected.
    pub async fn connect_all(&self) -> bool {
        let any = self.connections.connect_all().await;
        if any {
            let count = self.capabilities.discover_all(&self.connections).await;
            tracing::info!("{count} tool(s) available");
        } else {
            self.capabilities.clear().await;
        }
        any
    }

    /// Close every connection and forget every tool.
    pub async fn disconnect_all(&self) {
        self.connections.disconnect_all().await;
        self.capabilities.clear().await;
    }

    /// Drop and re-establish one server, then rediscover tools.
    pub async fn reconnect(&self, server: &str) -> Result<(), ConnectError> {
        self.connections.disconnect(server).await;
        let result = self.connections.connect(server).await;
        self.capabilities.discover_all(&self.connections).await;
        result
    }

    /// Rebuild the tool catalog from the currently connected servers.
    pub async fn refresh_tools(&self) -> usize {
        self.capabilities.discover_all(&self.connections).await
    }

    pub async fn list_tools(&self) -> Vec<Tool> {
        self.capabilities.list().await
    }

    pub async fn tools_for_server(&self, server: &str) -> Vec<Tool> {
        self.capabilities.tools_for_server(server).await
    }

    /// Invoke a tool by qualified name. Returns the server's raw result.
    pub async fn invoke_tool(&self, name: &str, params: serde_json::Value) -> CallOutcome {
        self.capabilities
            .invoke(&self.connections, name, params)
            .await
    }

    /// Invoke a tool, giving up with `Cancelled` once `cancel` fires.
    pub async fn invoke_tool_with_cancel(
        &self,
        name: &str,
        params: serde_json::Value,
        cancel: &CancellationToken,
    ) -> CallOutcome {
        self.capabilities
            .invoke_with_cancel(&self.connections, name, params, cancel)
            .await
    }

    /// Read a resource by URI from one server.
    pub async fn read_resource(&self, server: &str, uri: &str) -> CallOutcome {
        self.connections
            .call(
                server,
                "resources/read",
                Some(serde_json::json!({ "uri": uri })),
            )
            .await
    }

    /// Whether any server is connected.
    pub async fn is_connected(&self) -> bool {
        self.connections.any_connected().await
    }

    pub async fn connected_server_names(&self) -> Vec<String> {
        self.connections.connected_server_names().await
    }

    pub async fn server_status(&self) -> Vec<ConnectionInfo> {
        self.connections.snapshot().await
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn correlator(&self) -> &Correlator {
        self.connections.correlator()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_client_has_nothing() {
        let client = ToolClient::new(Vec::new());
        assert!(!client.connect_all().await);
        assert!(!client.is_connected().await);
        assert!(client.list_tools().await.is_empty());
        assert!(client.server_status().await.is_empty());
        client.disconnect_all().await;
    }

    #[tokio::test]
    async fn failed_server_is_skipped() {
        let client = ToolClient::new(vec![ServerConfig::pipe(
            "bad",
            "nonexistent_command_xyz123",
            vec![],
        )]);
        assert!(!client.connect_all().await);
        assert!(client.connected_server_names().await.is_empty());
        let status = client.server_status().await;
        assert_eq!(status.len(), 1);
        assert!(status[0].last_error.is_some());
    }

    #[tokio::test]
    async fn read_resource_requires_connection() {
        let client = ToolClient::new(Vec::new());
        let err = client.read_resource("docs", "file:///a").await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::CallError::ServerUnavailable { ref server } if server == "docs"
        ));
    }

    #[test]
    fn missing_descriptor_is_empty() {
        let client =
            ToolClient::from_descriptor(Path::new("/nonexistent/switchyard/servers.json")).unwrap();
        assert!(client.connections().server_names().is_empty());
    }
}
