//! Server descriptor loading for Switchyard.
//!
//! Resolves the descriptor path with precedence:
//! explicit path > `SWITCHYARD_SERVERS` > config dir > defaults
//! and parses it (JSON, or TOML by extension) into validated [`ServerConfig`]s.

pub mod descriptor;

use descriptor::RawServer;
use std::path::{Path, PathBuf};
use switchyard_types::{ConfigError, ServerConfig};

/// File name of the descriptor inside the config directory.
pub const DESCRIPTOR_FILE: &str = "servers.json";

/// Environment variable naming the descriptor file directly.
pub const SERVERS_ENV: &str = "SWITCHYARD_SERVERS";

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "SWITCHYARD_CONFIG_DIR";

/// Serialization format of a descriptor document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Toml,
}

impl DocumentFormat {
    /// Pick the format from the file extension; anything but `.toml` is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => DocumentFormat::Toml,
            _ => DocumentFormat::Json,
        }
    }
}

/// Get the Switchyard config directory path (~/.switchyard/).
pub fn config_dir() -> PathBuf {
    config_dir_from(|key| std::env::var(key).ok())
}

fn config_dir_from(env: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(dir) = env(CONFIG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".switchyard")
}

/// Resolve which descriptor file to read.
pub fn descriptor_path(explicit: Option<&Path>) -> PathBuf {
    descriptor_path_from(explicit, |key| std::env::var(key).ok())
}

fn descriptor_path_from(explicit: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(path) = env(SERVERS_ENV) {
        return PathBuf::from(path);
    }
    config_dir_from(env).join(DESCRIPTOR_FILE)
}

/// Load server configurations from a descriptor file.
///
/// A missing or unreadable file is not an error: it yields no servers.
pub fn load_servers(path: &Path) -> Result<Vec<ServerConfig>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::debug!("No server descriptor at {}: {}", path.display(), e);
            return Ok(Vec::new());
        }
    };
    let origin = path.display().to_string();
    let servers = parse_servers(&content, DocumentFormat::from_path(path), &origin)?;
    tracing::info!("Loaded {} server(s) from {}", servers.len(), origin);
    Ok(servers)
}

/// Parse descriptor text into server configurations ordered by name.
///
/// The server mapping may sit at the top level or under a `servers` key.
/// `servers` is therefore reserved: a top-level entry with that name is always
/// read as the wrapper, never as a server. Loading stops at the first invalid
/// server, naming it in the error.
pub fn parse_servers(
    content: &str,
    format: DocumentFormat,
    origin: &str,
) -> Result<Vec<ServerConfig>, ConfigError> {
    let parse_err = |message: String| ConfigError::Parse {
        path: origin.to_string(),
        message,
    };

    let document: serde_json::Value = match format {
        DocumentFormat::Json => serde_json::from_str(content).map_err(|e| parse_err(e.to_string()))?,
        DocumentFormat::Toml => {
            let value: toml::Value = toml::from_str(content).map_err(|e| parse_err(e.to_string()))?;
            serde_json::to_value(value).map_err(|e| parse_err(e.to_string()))?
        }
    };

    let serde_json::Value::Object(mut top) = document else {
        return Err(parse_err("descriptor must be an object of servers".into()));
    };
    let entries = match top.remove("servers") {
        Some(serde_json::Value::Object(servers)) => servers,
        Some(_) => return Err(parse_err("'servers' must be an object".into())),
        None => top,
    };

    let mut entries: Vec<_> = entries.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut servers = Vec::with_capacity(entries.len());
    for (name, value) in entries {
        let raw: RawServer =
            serde_json::from_value(value).map_err(|e| ConfigError::InvalidValue {
                server: name.clone(),
                field: "entry",
                message: e.to_string(),
            })?;
        servers.push(raw.into_config(&name)?);
    }
    Ok(servers)
}
