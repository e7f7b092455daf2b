//! Subprocess pipe transport.
//!
//! Spawns a child process and exchanges newline-delimited frames over its
//! stdin/stdout. Stderr is drained into the log and never parsed.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use switchyard_types::TransportKind;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use super::{BoxFuture, InboundEvent, OUTBOUND_CAPACITY, Transport, TransportError};
use crate::error::ConnectError;

/// How long a child gets to exit on its own after stdin closes.
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// Async stdio transport for a spawned server process.
pub struct PipeTransport {
    server: String,
    write_tx: Mutex<Option<mpsc::Sender<String>>>,
    child: Arc<Mutex<Child>>,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
    stderr_handle: JoinHandle<()>,
}

impl PipeTransport {
    /// Spawn the child process and start background reader/writer tasks.
    pub fn spawn(
        server: &str,
        command: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
        events: mpsc::Sender<InboundEvent>,
    ) -> Result<Self, ConnectError> {
        let spawn_failed = |source: std::io::Error| ConnectError::SpawnFailed {
            server: server.to_string(),
            source,
        };

        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(spawn_failed)?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(spawn_failed(std::io::Error::other(
                "child stdio was not captured",
            )));
        };

        tracing::debug!(server, command, "spawned pipe server (pid {:?})", child.id());

        // Writer task: drains channel and writes to child stdin
        let (write_tx, mut write_rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
        let writer_server = server.to_string();
        let writer_handle = tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(frame) = write_rx.recv().await {
                let written = async {
                    stdin.write_all(frame.as_bytes()).await?;
                    stdin.write_all(b"\n").await?;
                    stdin.flush().await
                }
                .await;
                if let Err(e) = written {
                    tracing::warn!(server = %writer_server, "Write to pipe server failed: {e}");
                    break;
                }
            }
        });

        // Reader task: one frame per non-empty stdout line
        let reader_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let reason = loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if events.send(InboundEvent::Frame(line)).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => break "server process exited".to_string(),
                    Err(e) => break format!("failed to read server output: {e}"),
                }
            };
            let _ = events.send(InboundEvent::Closed { reason }).await;
        });

        let stderr_server = server.to_string();
        let stderr_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(server = %stderr_server, "stderr: {line}");
            }
        });

        Ok(Self {
            server: server.to_string(),
            write_tx: Mutex::new(Some(write_tx)),
            child: Arc::new(Mutex::new(child)),
            reader_handle,
            writer_handle,
            stderr_handle,
        })
    }

    /// Process id of the child, if it is still running.
    pub async fn pid(&self) -> Option<u32> {
        self.child.lock().await.id()
    }
}

impl Transport for PipeTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Pipe
    }

    fn send(&self, frame: String) -> BoxFuture<'_, Result<Option<String>, TransportError>> {
        Box::pin(async move {
            let tx = self
                .write_tx
                .lock()
                .await
                .clone()
                .ok_or_else(|| TransportError("pipe is closed".into()))?;
            tx.send(frame)
                .await
                .map_err(|_| TransportError("writer channel closed".into()))?;
            Ok(None)
        })
    }

    /// Drop the write channel to send EOF, wait briefly, then kill.
    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if self.write_tx.lock().await.take().is_none() {
                return;
            }

            let graceful = tokio::time::timeout(EXIT_GRACE, async {
                let mut child = self.child.lock().await;
                let _ = child.wait().await;
            })
            .await;

            if graceful.is_err() {
                tracing::debug!(server = %self.server, "pipe server ignored EOF, killing");
                let mut child = self.child.lock().await;
                let _ = child.kill().await;
            }

            self.reader_handle.abort();
            self.writer_handle.abort();
            self.stderr_handle.abort();
        })
    }
}
