//! Connection registry. Owns every named server's live transport.
//!
//! Connections move Disconnected → Connecting → Connected → Disconnected.
//! There is no reconnect loop; callers re-invoke [`ConnectionRegistry::connect`].

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use switchyard_types::{ServerConfig, TransportKind};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::correlator::{CallOutcome, Correlator};
use crate::error::{CallError, ConnectError};
use crate::transport::{self, Established, InboundEvent, Transport};

/// Protocol version announced in the `initialize` request.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Reason attached to calls rejected by an explicit disconnect.
const CLOSED_REASON: &str = "connection closed";

/// Lifecycle state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        })
    }
}

/// Point-in-time view of one connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub name: String,
    pub kind: TransportKind,
    pub endpoint: String,
    pub status: ConnectionStatus,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub pending_calls: usize,
}

struct Connection {
    config: ServerConfig,
    status: ConnectionStatus,
    transport: Option<Arc<dyn Transport>>,
    reader: Option<JoinHandle<()>>,
    /// Bumped on every connect attempt and close so stale tasks can tell.
    epoch: u64,
    connected_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl Connection {
    fn new(config: ServerConfig) -> Self {
        Self {
            config,
            status: ConnectionStatus::Disconnected,
            transport: None,
            reader: None,
            epoch: 0,
            connected_at: None,
            last_error: None,
        }
    }
}

type ConnectionTable = Arc<Mutex<HashMap<String, Connection>>>;

/// The set of named servers and their connection state.
pub struct ConnectionRegistry {
    order: Vec<String>,
    connections: ConnectionTable,
    correlator: Arc<Correlator>,
}

impl ConnectionRegistry {
    /// Register servers in the given order. All start Disconnected.
    pub fn new(configs: Vec<ServerConfig>, correlator: Arc<Correlator>) -> Self {
        let mut order = Vec::with_capacity(configs.len());
        let mut connections = HashMap::with_capacity(configs.len());
        for config in configs {
            if connections.contains_key(&config.name) {
                tracing::warn!(server = %config.name, "Duplicate server name, keeping the last");
            } else {
                order.push(config.name.clone());
            }
            connections.insert(config.name.clone(), Connection::new(config));
        }
        Self {
            order,
            connections: Arc::new(Mutex::new(connections)),
            correlator,
        }
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    /// Server names in registration order.
    pub fn server_names(&self) -> &[String] {
        &self.order
    }

    /// Connect every server concurrently. True iff at least one connected.
    pub async fn connect_all(&self) -> bool {
        let results = join_all(self.order.iter().map(|name| self.connect(name))).await;
        let connected = results.iter().filter(|r| r.is_ok()).count();
        tracing::info!(
            "Connected {connected}/{} server(s)",
            self.order.len()
        );
        connected > 0
    }

    /// Connect one server. A no-op if it is already connected.
    pub async fn connect(&self, name: &str) -> Result<(), ConnectError> {
        let (config, epoch) = {
            let mut connections = self.connections.lock().await;
            let conn = connections
                .get_mut(name)
                .ok_or_else(|| ConnectError::UnknownServer {
                    server: name.to_string(),
                })?;
            match conn.status {
                ConnectionStatus::Connected => return Ok(()),
                ConnectionStatus::Connecting => {
                    return Err(ConnectError::Refused {
                        server: name.to_string(),
                        reason: "a connect attempt is already in progress".into(),
                    });
                }
                ConnectionStatus::Disconnected => {}
            }
            conn.status = ConnectionStatus::Connecting;
            conn.epoch += 1;
            (conn.config.clone(), conn.epoch)
        };

        tracing::info!(
            server = name,
            kind = %config.kind(),
            "Connecting to {}",
            config.endpoint()
        );

        match self.establish(&config, epoch).await {
            Ok((transport, reader)) => {
                let mut connections = self.connections.lock().await;
                let current = connections.get_mut(name).filter(|c| c.epoch == epoch);
                let Some(conn) = current else {
                    drop(connections);
                    if let Some(reader) = reader {
                        reader.abort();
                    }
                    transport.close().await;
                    return Err(ConnectError::Refused {
                        server: name.to_string(),
                        reason: "connection closed while connecting".into(),
                    });
                };
                conn.status = ConnectionStatus::Connected;
                conn.transport = Some(transport);
                conn.reader = reader;
                conn.connected_at = Some(Utc::now());
                conn.last_error = None;
                tracing::info!(server = name, "Connected");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(server = name, "Failed to connect: {e}");
                let mut connections = self.connections.lock().await;
                if let Some(conn) = connections.get_mut(name) {
                    if conn.epoch == epoch {
                        conn.status = ConnectionStatus::Disconnected;
                    }
                    conn.last_error = Some(e.to_string());
                }
                Err(e)
            }
        }
    }

    /// Open the transport, start its reader, and run the handshake.
    ///
    /// The server's timeout bounds the whole attempt, not each step.
    async fn establish(
        &self,
        config: &ServerConfig,
        epoch: u64,
    ) -> Result<(Arc<dyn Transport>, Option<JoinHandle<()>>), ConnectError> {
        let deadline = Instant::now() + config.timeout;
        let Established { transport, inbound } = transport::connect(config).await?;
        let transport: Arc<dyn Transport> = Arc::from(transport);
        let reader = inbound.map(|rx| self.spawn_reader(config.name.clone(), epoch, rx));

        if config.handshake {
            if let Err(e) = self.handshake(config, transport.as_ref(), deadline).await {
                if let Some(reader) = &reader {
                    reader.abort();
                }
                self.correlator
                    .reject_server(&config.name, "handshake failed")
                    .await;
                transport.close().await;
                return Err(ConnectError::Handshake {
                    server: config.name.clone(),
                    source: Box::new(e),
                });
            }
        }
        Ok((transport, reader))
    }

    /// `initialize` request followed by the `notifications/initialized` notification,
    /// both finished by `deadline`.
    async fn handshake(
        &self,
        config: &ServerConfig,
        transport: &dyn Transport,
        deadline: Instant,
    ) -> Result<(), CallError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "switchyard",
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        let result = self
            .correlator
            .call(
                &config.name,
                transport,
                "initialize",
                Some(params),
                deadline.saturating_duration_since(Instant::now()),
            )
            .await?;
        if let Some(version) = result.get("protocolVersion").and_then(|v| v.as_str()) {
            if version != PROTOCOL_VERSION {
                tracing::debug!(server = %config.name, "Server negotiated protocol {version}");
            }
        }
        let method = "notifications/initialized";
        let initialized = self.correlator.notify(&config.name, transport, method, None);
        tokio::time::timeout_at(deadline, initialized)
            .await
            .map_err(|_| CallError::Timeout {
                server: config.name.clone(),
                method: method.to_string(),
                timeout_ms: config.timeout.as_millis() as u64,
            })?
    }

    /// Pump inbound events into the correlator until the transport closes.
    fn spawn_reader(
        &self,
        server: String,
        epoch: u64,
        mut inbound: mpsc::Receiver<InboundEvent>,
    ) -> JoinHandle<()> {
        let correlator = Arc::clone(&self.correlator);
        let connections = Arc::clone(&self.connections);
        tokio::spawn(async move {
            while let Some(event) = inbound.recv().await {
                match event {
                    InboundEvent::Frame(text) => correlator.dispatch(&server, &text).await,
                    InboundEvent::Closed { reason } => {
                        mark_closed(&connections, &correlator, &server, epoch, &reason).await;
                        return;
                    }
                }
            }
        })
    }

    /// Close one connection, rejecting its pending calls.
    pub async fn disconnect(&self, name: &str) {
        let (transport, reader) = {
            let mut connections = self.connections.lock().await;
            let Some(conn) = connections.get_mut(name) else {
                return;
            };
            conn.epoch += 1;
            conn.status = ConnectionStatus::Disconnected;
            conn.connected_at = None;
            (conn.transport.take(), conn.reader.take())
        };

        if let Some(reader) = reader {
            reader.abort();
        }
        self.correlator.reject_server(name, CLOSED_REASON).await;
        if let Some(transport) = transport {
            transport.close().await;
            tracing::info!(server = name, "Disconnected");
        }
    }

    /// Close every connection concurrently.
    pub async fn disconnect_all(&self) {
        join_all(self.order.iter().map(|name| self.disconnect(name))).await;
    }

    /// Issue a call on a connected server.
    pub async fn call(
        &self,
        server: &str,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> CallOutcome {
        let (transport, timeout) = self.live_transport(server).await?;
        self.correlator
            .call(server, transport.as_ref(), method, params, timeout)
            .await
    }

    /// Issue a call that `cancel` can abandon.
    pub async fn call_with_cancel(
        &self,
        server: &str,
        method: &str,
        params: Option<serde_json::Value>,
        cancel: &CancellationToken,
    ) -> CallOutcome {
        let (transport, timeout) = self.live_transport(server).await?;
        self.correlator
            .call_with_cancel(server, transport.as_ref(), method, params, timeout, cancel)
            .await
    }

    /// Borrow the transport of a Connected server for the duration of one call.
    async fn live_transport(
        &self,
        server: &str,
    ) -> Result<(Arc<dyn Transport>, std::time::Duration), CallError> {
        let connections = self.connections.lock().await;
        let unavailable = || CallError::ServerUnavailable {
            server: server.to_string(),
        };
        let conn = connections.get(server).ok_or_else(unavailable)?;
        if conn.status != ConnectionStatus::Connected {
            return Err(unavailable());
        }
        let transport = conn.transport.as_ref().ok_or_else(unavailable)?;
        Ok((Arc::clone(transport), conn.config.timeout))
    }

    pub async fn status(&self, name: &str) -> Option<ConnectionStatus> {
        self.connections.lock().await.get(name).map(|c| c.status)
    }

    pub async fn is_connected(&self, name: &str) -> bool {
        self.status(name).await == Some(ConnectionStatus::Connected)
    }

    /// Whether any server is connected.
    pub async fn any_connected(&self) -> bool {
        self.connections
            .lock()
            .await
            .values()
            .any(|c| c.status == ConnectionStatus::Connected)
    }

    /// Names of Connected servers, in registration order.
    pub async fn connected_server_names(&self) -> Vec<String> {
        let connections = self.connections.lock().await;
        self.order
            .iter()
            .filter(|name| {
                connections
                    .get(name.as_str())
                    .is_some_and(|c| c.status == ConnectionStatus::Connected)
            })
            .cloned()
            .collect()
    }

    /// Per-server state, in registration order.
    pub async fn snapshot(&self) -> Vec<ConnectionInfo> {
        let mut infos = Vec::with_capacity(self.order.len());
        for name in &self.order {
            let info = {
                let connections = self.connections.lock().await;
                let Some(conn) = connections.get(name) else {
                    continue;
                };
                ConnectionInfo {
                    name: name.clone(),
                    kind: conn.config.kind(),
                    endpoint: conn.config.endpoint(),
                    status: conn.status,
                    connected_at: conn.connected_at,
                    last_error: conn.last_error.clone(),
                    pending_calls: 0,
                }
            };
            let pending_calls = self.correlator.pending_for(name).await;
            infos.push(ConnectionInfo {
                pending_calls,
                ..info
            });
        }
        infos
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        if let Ok(mut connections) = self.connections.try_lock() {
            for conn in connections.values_mut() {
                if let Some(reader) = conn.reader.take() {
                    reader.abort();
                }
                conn.transport = None;
            }
        }
    }
}

/// Handle an unsolicited close reported by the transport.
async fn mark_closed(
    connections: &ConnectionTable,
    correlator: &Correlator,
    server: &str,
    epoch: u64,
    reason: &str,
) {
    let transport = {
        let mut connections = connections.lock().await;
        let Some(conn) = connections.get_mut(server) else {
            return;
        };
        if conn.epoch != epoch {
            return;
        }
        // A connect still in flight sees the bump and gives up.
        conn.epoch += 1;
        conn.status = ConnectionStatus::Disconnected;
        conn.connected_at = None;
        conn.last_error = Some(reason.to_string());
        conn.reader = None;
        conn.transport.take()
    };

    tracing::warn!(server, "Connection lost: {reason}");
    correlator.reject_server(server, reason).await;
    if let Some(transport) = transport {
        transport.close().await;
    }
}
