//! Plain-text rendering for command output. Everything goes to stdout.

use std::path::Path;
use switchyard_client::{ConnectionInfo, Tool, ToolCallResult, ToolContent};
use switchyard_types::ServerConfig;

pub fn servers(path: &Path, configs: &[ServerConfig]) {
    if configs.is_empty() {
        println!("No servers configured in {}", path.display());
        return;
    }
    println!("{} server(s) from {}", configs.len(), path.display());
    for config in configs {
        println!(
            "  {:<20} {:<7} {} (timeout {}ms{})",
            config.name,
            config.kind(),
            config.endpoint(),
            config.timeout.as_millis(),
            if config.handshake { "" } else { ", no handshake" }
        );
    }
}

pub fn status(infos: &[ConnectionInfo]) {
    for info in infos {
        let since = info
            .connected_at
            .map(|t| format!(" since {}", t.format("%Y-%m-%d %H:%M:%S UTC")))
            .unwrap_or_default();
        println!(
            "{:<20} {:<7} {}{since}",
            info.name, info.kind, info.status
        );
        if info.pending_calls > 0 {
            println!("  {} pending call(s)", info.pending_calls);
        }
        if let Some(error) = &info.last_error {
            println!("  last error: {error}");
        }
    }
}

pub fn tools(tools: &[Tool], schema: bool) {
    if tools.is_empty() {
        println!("No tools discovered");
        return;
    }
    for tool in tools {
        if tool.description.is_empty() {
            println!("{}", tool.name);
        } else {
            println!("{:<32} {}", tool.name, first_line(&tool.description));
        }
        if schema {
            let pretty = serde_json::to_string_pretty(&tool.input_schema)
                .unwrap_or_else(|_| tool.input_schema.to_string());
            for line in pretty.lines() {
                println!("    {line}");
            }
        }
    }
}

pub fn tool_result(result: &ToolCallResult) {
    for item in &result.content {
        match item {
            ToolContent::Text { text } => println!("{text}"),
            ToolContent::Image { data, mime_type } => {
                println!("[image: {mime_type}, {} bytes base64]", data.len());
            }
            ToolContent::Resource { resource } => match resource.get("text").and_then(|t| t.as_str()) {
                Some(text) => println!("{text}"),
                None => json(resource),
            },
            ToolContent::Unsupported => println!("[unsupported content]"),
        }
    }
}

pub fn json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(pretty) => println!("{pretty}"),
        Err(_) => println!("{value}"),
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_line_of_multiline_description() {
        assert_eq!(first_line("Read a file.\nMore detail."), "Read a file.");
        assert_eq!(first_line(""), "");
    }
}
