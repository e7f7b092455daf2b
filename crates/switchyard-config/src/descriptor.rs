//! Raw descriptor entries and their validation into [`ServerConfig`].

use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use switchyard_types::{ConfigError, ServerConfig, TransportKind, TransportParams};

fn default_handshake() -> bool {
    true
}

/// One server entry exactly as written in the descriptor document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawServer {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, alias = "timeout_ms")]
    pub timeout_ms: Option<u64>,
    #[serde(default = "default_handshake")]
    pub handshake: bool,
}

impl RawServer {
    /// Validate transport-specific fields and apply defaults.
    pub fn into_config(self, name: &str) -> Result<ServerConfig, ConfigError> {
        let kind = TransportKind::parse(&self.kind).ok_or_else(|| ConfigError::UnknownTransport {
            server: name.to_string(),
            kind: self.kind.clone(),
        })?;

        let transport = match kind {
            TransportKind::Pipe => {
                let command = self
                    .command
                    .filter(|c| !c.trim().is_empty())
                    .ok_or_else(|| ConfigError::MissingField {
                        server: name.to_string(),
                        field: "command",
                    })?;
                TransportParams::Pipe {
                    command,
                    args: self.args,
                    env: self.env,
                }
            }
            TransportKind::Socket => TransportParams::Socket {
                url: required_url(name, self.url, &["ws://", "wss://"])?,
                token: self.token,
            },
            TransportKind::Http => TransportParams::Http {
                url: required_url(name, self.url, &["http://", "https://"])?,
                token: self.token,
            },
        };

        let timeout = match self.timeout_ms {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    server: name.to_string(),
                    field: "timeoutMs",
                    message: "must be greater than zero".into(),
                });
            }
            Some(ms) => Duration::from_millis(ms),
            None => kind.default_timeout(),
        };

        Ok(ServerConfig {
            name: name.to_string(),
            transport,
            timeout,
            handshake: self.handshake,
        })
    }
}

fn required_url(
    server: &str,
    url: Option<String>,
    schemes: &[&str],
) -> Result<String, ConfigError> {
    let url = url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingField {
            server: server.to_string(),
            field: "url",
        })?;
    if !schemes.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::InvalidValue {
            server: server.to_string(),
            field: "url",
            message: format!("'{url}' must start with {}", schemes.join(" or ")),
        });
    }
    Ok(url)
}
