//! Tool descriptors in the merged capability namespace.

use serde::{Deserialize, Serialize};

/// A tool exposed by one connected server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Qualified name, unique within the merged registry (e.g. `files.read_file`).
    pub name: String,
    /// The name the owning server knows the tool by.
    pub remote_name: String,
    pub description: String,
    /// Parameter schema, passed through to the server uninterpreted.
    pub input_schema: serde_json::Value,
    /// Name of the server that owns this tool.
    pub server: String,
}

impl Tool {
    /// Build a tool, qualifying its name with the server unless the server
    /// already returned a dotted name.
    pub fn new(
        server: &str,
        remote_name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        let remote_name = remote_name.into();
        Self {
            name: qualified_name(server, &remote_name),
            remote_name,
            description: description.into(),
            input_schema,
            server: server.to_string(),
        }
    }
}

/// `server.tool`, or `tool` unchanged when it already contains a dot.
pub fn qualified_name(server: &str, tool: &str) -> String {
    if tool.contains('.') {
        tool.to_string()
    } else {
        format!("{server}.{tool}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualifies_plain_names() {
        let tool = Tool::new("files", "read_file", "Read a file", serde_json::json!({}));
        assert_eq!(tool.name, "files.read_file");
        assert_eq!(tool.remote_name, "read_file");
        assert_eq!(tool.server, "files");
    }

    #[test]
    fn keeps_dotted_names() {
        assert_eq!(qualified_name("a", "shared.search"), "shared.search");
    }
}
