//! Matches responses to outstanding calls by id.
//!
//! Every call registers a pending entry before its frame is sent. Whoever
//! removes the entry first (inbound reader, deadline, cancellation, or
//! connection closure) decides the outcome; later attempts find nothing and
//! no-op, so each caller observes exactly one result. The entry never outlives
//! the caller's future: dropping it mid-call removes the entry too.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::CallError;
use crate::jsonrpc::{
    InboundFrame, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, decode_frame,
};
use crate::transport::Transport;

/// What a call eventually resolves to.
pub type CallOutcome = Result<serde_json::Value, CallError>;

/// One in-flight call awaiting its response.
struct PendingCall {
    server: String,
    method: String,
    deadline: Instant,
    tx: oneshot::Sender<CallOutcome>,
}

/// Read-only view of an in-flight call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSnapshot {
    pub id: u64,
    pub server: String,
    pub method: String,
    pub overdue: bool,
}

/// Why a call stopped waiting without a response in hand.
enum Interrupted {
    Timeout,
    Cancelled,
}

/// Removes a call's entry when the call's future completes or is dropped.
struct PendingGuard<'a> {
    correlator: &'a Correlator,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.correlator.lock_pending().remove(&self.id).is_some() {
            tracing::debug!(id = self.id, "Forgot abandoned call");
        }
    }
}

/// Shared map of in-flight calls across all connections.
///
/// The map lock is never held across an await point.
pub struct Correlator {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingCall>>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<u64, PendingCall>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a call and return its fresh id and completion receiver.
    pub async fn register(
        &self,
        server: &str,
        method: &str,
        timeout: Duration,
    ) -> (u64, oneshot::Receiver<CallOutcome>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(
            id,
            PendingCall {
                server: server.to_string(),
                method: method.to_string(),
                deadline: Instant::now() + timeout,
                tx,
            },
        );
        (id, rx)
    }

    /// Resolve a pending call. Returns false if it was already gone.
    pub async fn resolve(&self, id: u64, outcome: CallOutcome) -> bool {
        let Some(call) = self.lock_pending().remove(&id) else {
            return false;
        };
        // The caller may have given up already; nothing to do then.
        let _ = call.tx.send(outcome);
        true
    }

    /// Route one inbound frame received on `server`'s connection.
    ///
    /// Malformed frames, orphan responses, and server-initiated messages are
    /// logged and dropped; none of them affect other pending calls.
    pub async fn dispatch(&self, server: &str, text: &str) {
        let response = match decode_frame(text) {
            Ok(InboundFrame::Response(response)) => response,
            Ok(InboundFrame::ServerMessage { method }) => {
                tracing::debug!(server, method = %method, "Ignoring server-initiated message");
                return;
            }
            Err(e) => {
                tracing::warn!(server, "Dropping inbound frame: {e}");
                return;
            }
        };

        let id = response.id;
        let call = {
            let mut pending = self.lock_pending();
            let owned = pending.get(&id).is_some_and(|call| call.server == server);
            if owned {
                pending.remove(&id)
            } else {
                None
            }
        };

        match call {
            Some(call) => {
                tracing::debug!(server, id, method = %call.method, "Response matched");
                let _ = call.tx.send(response_outcome(server, response));
            }
            None => tracing::warn!(server, id, "Orphan response (no pending call), discarding"),
        }
    }

    /// Reject every pending call owned by `server`. Returns how many were rejected.
    pub async fn reject_server(&self, server: &str, reason: &str) -> usize {
        let rejected: Vec<PendingCall> = {
            let mut pending = self.lock_pending();
            let ids: Vec<u64> = pending
                .iter()
                .filter(|(_, call)| call.server == server)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| pending.remove(id)).collect()
        };

        let count = rejected.len();
        for call in rejected {
            let _ = call.tx.send(Err(CallError::ConnectionClosed {
                server: server.to_string(),
                reason: reason.to_string(),
            }));
        }
        if count > 0 {
            tracing::info!(server, "Rejected {count} pending call(s): {reason}");
        }
        count
    }

    pub async fn is_pending(&self, id: u64) -> bool {
        self.lock_pending().contains_key(&id)
    }

    pub async fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Number of pending calls owned by one server.
    pub async fn pending_for(&self, server: &str) -> usize {
        self.lock_pending()
            .values()
            .filter(|call| call.server == server)
            .count()
    }

    /// Snapshot of every in-flight call, ordered by id.
    pub async fn pending_calls(&self) -> Vec<PendingSnapshot> {
        let now = Instant::now();
        let mut calls: Vec<PendingSnapshot> = self
            .lock_pending()
            .iter()
            .map(|(id, call)| PendingSnapshot {
                id: *id,
                server: call.server.clone(),
                method: call.method.clone(),
                overdue: call.deadline <= now,
            })
            .collect();
        calls.sort_by_key(|c| c.id);
        calls
    }

    /// Issue a request on `transport` and wait for its outcome.
    pub async fn call(
        &self,
        server: &str,
        transport: &dyn Transport,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> CallOutcome {
        self.call_inner(server, transport, method, params, timeout, None)
            .await
    }

    /// Like [`Correlator::call`], but firing `cancel` abandons the wait.
    ///
    /// The transport is not told; a late response is treated as an orphan.
    pub async fn call_with_cancel(
        &self,
        server: &str,
        transport: &dyn Transport,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> CallOutcome {
        self.call_inner(server, transport, method, params, timeout, Some(cancel))
            .await
    }

    /// Send a notification. No id is allocated and no response is awaited.
    pub async fn notify(
        &self,
        server: &str,
        transport: &dyn Transport,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), CallError> {
        let frame = serde_json::to_string(&JsonRpcNotification::new(method, params)).map_err(
            |e| CallError::Protocol {
                server: server.to_string(),
                reason: e.to_string(),
            },
        )?;
        transport
            .send(frame)
            .await
            .map(|_| ())
            .map_err(|e| CallError::Transport {
                server: server.to_string(),
                reason: e.to_string(),
            })
    }

    async fn call_inner(
        &self,
        server: &str,
        transport: &dyn Transport,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> CallOutcome {
        let (id, mut rx) = self.register(server, method, timeout).await;
        let _forget = PendingGuard { correlator: self, id };

        let frame = match serde_json::to_string(&JsonRpcRequest::new(id, method, params)) {
            Ok(frame) => frame,
            Err(e) => {
                return Err(CallError::Protocol {
                    server: server.to_string(),
                    reason: format!("failed to serialize request: {e}"),
                });
            }
        };
        tracing::debug!(server, id, method, "Sending request");

        let exchange = async {
            match transport.send(frame).await {
                Ok(Some(body)) => self.resolve_coupled(server, id, &body).await,
                Ok(None) if transport.kind().is_message_oriented() => {}
                Ok(None) => {
                    self.resolve(
                        id,
                        Err(CallError::Protocol {
                            server: server.to_string(),
                            reason: "empty response body".into(),
                        }),
                    )
                    .await;
                }
                Err(e) => {
                    self.resolve(
                        id,
                        Err(CallError::Transport {
                            server: server.to_string(),
                            reason: e.to_string(),
                        }),
                    )
                    .await;
                }
            }
            (&mut rx).await
        };
        let cancelled = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };

        let interrupted = tokio::select! {
            waited = tokio::time::timeout(timeout, exchange) => match waited {
                Ok(Ok(outcome)) => return outcome,
                Ok(Err(_)) => {
                    return Err(CallError::ConnectionClosed {
                        server: server.to_string(),
                        reason: "call abandoned".into(),
                    });
                }
                Err(_) => Interrupted::Timeout,
            },
            _ = cancelled => Interrupted::Cancelled,
        };

        // Only the side that removes the entry decides the outcome. A side
        // that got there first sends without awaiting, so this wait is short.
        let claimed = self.lock_pending().remove(&id);
        if claimed.is_none() {
            if let Ok(outcome) = rx.await {
                return outcome;
            }
        }

        match interrupted {
            Interrupted::Timeout => {
                tracing::warn!(server, id, method, "Call timed out");
                Err(CallError::Timeout {
                    server: server.to_string(),
                    method: method.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
            Interrupted::Cancelled => Err(CallError::Cancelled {
                server: server.to_string(),
                method: method.to_string(),
            }),
        }
    }

    /// Resolve `id` from a response body returned by a coupled transport.
    async fn resolve_coupled(&self, server: &str, id: u64, body: &str) {
        let outcome = match decode_frame(body) {
            Ok(InboundFrame::Response(response)) => {
                if response.id != id {
                    tracing::warn!(server, id, got = response.id, "Response id mismatch");
                }
                response_outcome(server, response)
            }
            Ok(InboundFrame::ServerMessage { method }) => Err(CallError::Protocol {
                server: server.to_string(),
                reason: format!("expected a response, got '{method}'"),
            }),
            Err(e) => Err(CallError::Protocol {
                server: server.to_string(),
                reason: e.to_string(),
            }),
        };
        self.resolve(id, outcome).await;
    }
}

/// Turn a decoded response into the caller-facing outcome.
fn response_outcome(server: &str, response: JsonRpcResponse) -> CallOutcome {
    if let Some(err) = response.error {
        return Err(CallError::Remote {
            server: server.to_string(),
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }
    Ok(response.result.unwrap_or(serde_json::Value::Null))
}
