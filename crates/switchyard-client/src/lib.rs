//! Multi-transport tool-server client for Switchyard.
//!
//! Connects to named servers over a subprocess pipe, a WebSocket, or plain
//! HTTP, speaks JSON-RPC 2.0 to each, discovers the tools they expose, and
//! routes invocations by qualified tool name (`server.tool`).

pub mod capability;
pub mod client;
pub mod connection;
pub mod content;
pub mod correlator;
pub mod error;
pub mod jsonrpc;
pub mod transport;

pub use capability::CapabilityRegistry;
pub use client::ToolClient;
pub use connection::{ConnectionInfo, ConnectionRegistry, ConnectionStatus};
pub use content::{ToolCallResult, ToolContent};
pub use correlator::{CallOutcome, Correlator, PendingSnapshot};
pub use error::{CallError, ConnectError, ProtocolError};
pub use switchyard_types::{ServerConfig, Tool, TransportKind};
pub use tokio_util::sync::CancellationToken;
