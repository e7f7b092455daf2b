//! Transport adapters: one send/receive/close contract over three I/O models.
//!
//! Message-oriented transports (pipe, socket) deliver inbound frames on an
//! event channel handed back from [`connect`]; the HTTP transport couples each
//! response to its request and returns it from [`Transport::send`].

mod http;
mod pipe;
mod socket;

pub use http::HttpTransport;
pub use pipe::PipeTransport;
pub use socket::SocketTransport;

use std::future::Future;
use std::pin::Pin;
use switchyard_types::{ServerConfig, TransportKind, TransportParams};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::error::ConnectError;

/// Capacity of the per-connection inbound event channel.
const INBOUND_CAPACITY: usize = 256;

/// Capacity of the per-connection outbound write queue.
const OUTBOUND_CAPACITY: usize = 64;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Something arriving from a message-oriented transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// One whole frame of text.
    Frame(String),
    /// The transport went away; no further events follow.
    Closed { reason: String },
}

/// Low-level failure to hand a frame to the transport.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// The common contract every adapter implements.
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Send one serialized frame.
    ///
    /// Message transports return `Ok(None)` once the frame is queued; the HTTP
    /// transport returns the coupled response body, if any.
    fn send(&self, frame: String) -> BoxFuture<'_, Result<Option<String>, TransportError>>;

    /// Release the underlying resource. Idempotent.
    fn close(&self) -> BoxFuture<'_, ()>;
}

/// A freshly connected transport and, for message transports, its inbound stream.
pub struct Established {
    pub transport: Box<dyn Transport>,
    pub inbound: Option<mpsc::Receiver<InboundEvent>>,
}

/// Connect the adapter matching the server's transport kind, bounded by its timeout.
pub async fn connect(config: &ServerConfig) -> Result<Established, ConnectError> {
    let attempt = async {
        match &config.transport {
            TransportParams::Pipe { command, args, env } => {
                let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
                let transport = PipeTransport::spawn(&config.name, command, args, env, tx)?;
                Ok(Established {
                    transport: Box::new(transport),
                    inbound: Some(rx),
                })
            }
            TransportParams::Socket { url, token } => {
                let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
                let transport =
                    SocketTransport::connect(&config.name, url, token.as_deref(), tx).await?;
                Ok(Established {
                    transport: Box::new(transport),
                    inbound: Some(rx),
                })
            }
            TransportParams::Http { url, token } => {
                let transport =
                    HttpTransport::connect(&config.name, url, token.as_deref(), config.timeout)
                        .await?;
                Ok(Established {
                    transport: Box::new(transport),
                    inbound: None,
                })
            }
        }
    };

    match tokio::time::timeout(config.timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(ConnectError::Timeout {
            server: config.name.clone(),
            timeout_ms: config.timeout.as_millis() as u64,
        }),
    }
}

/// `Bearer <token>` header value.
fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}
