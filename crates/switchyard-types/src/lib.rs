//! Shared server, tool, and error types for Switchyard.

pub mod error;
pub mod server;
pub mod tool;

pub use error::ConfigError;
pub use server::{ServerConfig, TransportKind, TransportParams};
pub use tool::Tool;
