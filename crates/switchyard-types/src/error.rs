//! Configuration error type shared by the loader and its callers.

use thiserror::Error;

/// Errors from loading a server descriptor document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Descriptor parse error at {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Server '{server}' has unknown transport type '{kind}' (expected pipe, socket, or http)")]
    UnknownTransport { server: String, kind: String },

    #[error("Server '{server}' is missing required field '{field}'")]
    MissingField { server: String, field: &'static str },

    #[error("Invalid value for '{field}' on server '{server}': {message}")]
    InvalidValue {
        server: String,
        field: &'static str,
        message: String,
    },
}

impl ConfigError {
    /// The server the error is attributed to, if any.
    pub fn server(&self) -> Option<&str> {
        match self {
            ConfigError::Parse { .. } => None,
            ConfigError::UnknownTransport { server, .. }
            | ConfigError::MissingField { server, .. }
            | ConfigError::InvalidValue { server, .. } => Some(server),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_transport_names_server() {
        let err = ConfigError::UnknownTransport {
            server: "weather".into(),
            kind: "carrier-pigeon".into(),
        };
        assert_eq!(err.server(), Some("weather"));
        let msg = err.to_string();
        assert!(msg.contains("weather"));
        assert!(msg.contains("carrier-pigeon"));
    }

    #[test]
    fn parse_error_has_no_server() {
        let err = ConfigError::Parse {
            path: "/tmp/servers.json".into(),
            message: "expected value".into(),
        };
        assert!(err.server().is_none());
        assert!(err.to_string().contains("/tmp/servers.json"));
    }
}
