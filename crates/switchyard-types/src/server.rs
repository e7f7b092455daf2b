//! Typed server configuration produced by the descriptor loader.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Default call/connect timeout for pipe and socket servers.
pub const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default call/connect timeout for HTTP servers.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_millis(3000);

/// The I/O mechanism used to reach a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Pipe,
    Socket,
    Http,
}

impl TransportKind {
    /// Parse the descriptor's `type` field.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pipe" => Some(TransportKind::Pipe),
            "socket" => Some(TransportKind::Socket),
            "http" => Some(TransportKind::Http),
            _ => None,
        }
    }

    /// Timeout applied when the descriptor does not set one.
    pub fn default_timeout(self) -> Duration {
        match self {
            TransportKind::Pipe | TransportKind::Socket => DEFAULT_MESSAGE_TIMEOUT,
            TransportKind::Http => DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Whether responses arrive on a separate inbound stream.
    pub fn is_message_oriented(self) -> bool {
        !matches!(self, TransportKind::Http)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Pipe => "pipe",
            TransportKind::Socket => "socket",
            TransportKind::Http => "http",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Transport-specific connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportParams {
    Pipe {
        command: String,
        args: Vec<String>,
        env: BTreeMap<String, String>,
    },
    Socket {
        url: String,
        token: Option<String>,
    },
    Http {
        url: String,
        token: Option<String>,
    },
}

/// Configuration for one named tool server.
///
/// Immutable once loaded; the connection registry only reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub name: String,
    pub transport: TransportParams,
    /// Bounds both the connect attempt and every call on this server.
    pub timeout: Duration,
    /// Whether to run the `initialize` exchange after connecting.
    pub handshake: bool,
}

impl ServerConfig {
    /// A pipe server spawning `command` with `args`.
    pub fn pipe(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportParams::Pipe {
                command: command.into(),
                args,
                env: BTreeMap::new(),
            },
            timeout: DEFAULT_MESSAGE_TIMEOUT,
            handshake: true,
        }
    }

    /// A WebSocket server at `url`.
    pub fn socket(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportParams::Socket {
                url: url.into(),
                token: None,
            },
            timeout: DEFAULT_MESSAGE_TIMEOUT,
            handshake: true,
        }
    }

    /// An HTTP server at `url`.
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportParams::Http {
                url: url.into(),
                token: None,
            },
            timeout: DEFAULT_HTTP_TIMEOUT,
            handshake: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_handshake(mut self, handshake: bool) -> Self {
        self.handshake = handshake;
        self
    }

    /// Attach a bearer token. Ignored for pipe servers, which have no auth concept.
    pub fn with_token(mut self, value: impl Into<String>) -> Self {
        match &mut self.transport {
            TransportParams::Socket { token, .. } | TransportParams::Http { token, .. } => {
                *token = Some(value.into());
            }
            TransportParams::Pipe { .. } => {}
        }
        self
    }

    pub fn kind(&self) -> TransportKind {
        match self.transport {
            TransportParams::Pipe { .. } => TransportKind::Pipe,
            TransportParams::Socket { .. } => TransportKind::Socket,
            TransportParams::Http { .. } => TransportKind::Http,
        }
    }

    /// Command line for pipe servers, URL otherwise.
    pub fn endpoint(&self) -> String {
        match &self.transport {
            TransportParams::Pipe { command, args, .. } => {
                if args.is_empty() {
                    command.clone()
                } else {
                    format!("{command} {}", args.join(" "))
                }
            }
            TransportParams::Socket { url, .. } | TransportParams::Http { url, .. } => url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_transport_kinds() {
        assert_eq!(TransportKind::parse("pipe"), Some(TransportKind::Pipe));
        assert_eq!(TransportKind::parse("socket"), Some(TransportKind::Socket));
        assert_eq!(TransportKind::parse("http"), Some(TransportKind::Http));
        assert_eq!(TransportKind::parse("stdio"), None);
    }

    #[test]
    fn default_timeouts_by_kind() {
        assert_eq!(ServerConfig::pipe("a", "cat", vec![]).timeout.as_millis(), 5000);
        assert_eq!(ServerConfig::socket("b", "ws://x").timeout.as_millis(), 5000);
        assert_eq!(ServerConfig::http("c", "http://x").timeout.as_millis(), 3000);
    }

    #[test]
    fn token_is_ignored_for_pipe() {
        let cfg = ServerConfig::pipe("a", "cat", vec![]).with_token("secret");
        assert!(matches!(cfg.transport, TransportParams::Pipe { .. }));

        let cfg = ServerConfig::http("b", "http://x").with_token("secret");
        match cfg.transport {
            TransportParams::Http { token, .. } => assert_eq!(token.as_deref(), Some("secret")),
            other => panic!("Expected http params, got: {other:?}"),
        }
    }

    #[test]
    fn endpoint_joins_args() {
        let cfg = ServerConfig::pipe("a", "npx", vec!["-y".into(), "server".into()]);
        assert_eq!(cfg.endpoint(), "npx -y server");
        assert_eq!(cfg.kind(), TransportKind::Pipe);
        assert!(cfg.kind().is_message_oriented());
        assert!(!TransportKind::Http.is_message_oriented());
    }
}
