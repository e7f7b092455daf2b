//! Persistent WebSocket transport. One text message carries one frame.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use switchyard_types::TransportKind;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;

use super::{BoxFuture, InboundEvent, OUTBOUND_CAPACITY, Transport, TransportError, bearer};
use crate::error::ConnectError;

/// How long the close handshake may take before the socket is dropped.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Duplex socket transport with background reader and writer tasks.
pub struct SocketTransport {
    write_tx: Mutex<Option<mpsc::Sender<Message>>>,
    writer_handle: Mutex<Option<JoinHandle<()>>>,
    reader_handle: JoinHandle<()>,
}

impl SocketTransport {
    /// Open the socket, sending the bearer token on the upgrade request.
    pub async fn connect(
        server: &str,
        url: &str,
        token: Option<&str>,
        events: mpsc::Sender<InboundEvent>,
    ) -> Result<Self, ConnectError> {
        let refused = |reason: String| ConnectError::Refused {
            server: server.to_string(),
            reason,
        };

        let mut request = url.into_client_request().map_err(|e| refused(e.to_string()))?;
        if let Some(token) = token {
            let value = HeaderValue::from_str(&bearer(token))
                .map_err(|_| refused("token is not a valid header value".into()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| refused(e.to_string()))?;
        let (mut sink, mut source) = stream.split();
        tracing::debug!(server, url, "socket connected");

        let (write_tx, mut write_rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);
        let writer_server = server.to_string();
        let writer_handle = tokio::spawn(async move {
            while let Some(message) = write_rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    tracing::warn!(server = %writer_server, "Socket write failed: {e}");
                    return;
                }
            }
            let _ = sink.close().await;
        });

        let reader_server = server.to_string();
        let reader_handle = tokio::spawn(async move {
            let reason = loop {
                let text = match source.next().await {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(_) => {
                            tracing::warn!(server = %reader_server, "Dropping non-UTF-8 binary frame");
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) if !frame.reason.is_empty() => {
                                format!("socket closed by server: {}", frame.reason)
                            }
                            _ => "socket closed by server".to_string(),
                        };
                    }
                    // Ping/pong are answered by the library.
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break format!("socket error: {e}"),
                    None => break "socket stream ended".to_string(),
                };
                if events.send(InboundEvent::Frame(text)).await.is_err() {
                    return;
                }
            };
            let _ = events.send(InboundEvent::Closed { reason }).await;
        });

        Ok(Self {
            write_tx: Mutex::new(Some(write_tx)),
            writer_handle: Mutex::new(Some(writer_handle)),
            reader_handle,
        })
    }
}

impl Transport for SocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    fn send(&self, frame: String) -> BoxFuture<'_, Result<Option<String>, TransportError>> {
        Box::pin(async move {
            let tx = self
                .write_tx
                .lock()
                .await
                .clone()
                .ok_or_else(|| TransportError("socket is closed".into()))?;
            tx.send(Message::Text(frame))
                .await
                .map_err(|_| TransportError("socket writer closed".into()))?;
            Ok(None)
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let Some(tx) = self.write_tx.lock().await.take() else {
                return;
            };
            let _ = tx.send(Message::Close(None)).await;
            drop(tx);

            if let Some(writer) = self.writer_handle.lock().await.take() {
                let abort = writer.abort_handle();
                if tokio::time::timeout(CLOSE_GRACE, writer).await.is_err() {
                    abort.abort();
                }
            }
            self.reader_handle.abort();
        })
    }
}
