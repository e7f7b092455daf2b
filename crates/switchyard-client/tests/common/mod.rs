//! Shared fixtures: a scripted pipe server speaking just enough of the protocol.

#![allow(dead_code)]

use std::time::Duration;
use switchyard_client::{Correlator, ServerConfig};

/// POSIX shell server. Answers `initialize`, lists four tools, and reacts to
/// `tools/call` by tool name: `hang` never answers, `crash` exits, `fail`
/// returns an error, anything else returns a text result.
pub const MOCK_SERVER: &str = r#"
while IFS= read -r line; do
  case "$line" in *'"id":'*) ;; *) continue ;; esac
  id=$(printf '%s\n' "$line" | sed 's/.*"id":\([0-9]*\).*/\1/')
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"mock","version":"0"}}}\n' "$id" ;;
    *'"method":"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"read_file","description":"Read a file","inputSchema":{"type":"object"}},{"name":"hang","description":"Never answers"},{"name":"crash","description":"Exits"},{"name":"fail","description":"Always fails"}]}}\n' "$id" ;;
    *'"name":"hang"'*) ;;
    *'"name":"crash"'*) exit 0 ;;
    *'"name":"fail"'*)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32000,"message":"tool failed"}}\n' "$id" ;;
    *'"method":"tools/call"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"hello"}]}}\n' "$id" ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32601,"message":"method not found"}}\n' "$id" ;;
  esac
done
"#;

/// A pipe server running [`MOCK_SERVER`].
pub fn mock_pipe(name: &str) -> ServerConfig {
    ServerConfig::pipe(name, "sh", vec!["-c".to_string(), MOCK_SERVER.to_string()])
}

/// POSIX shell server exposing one dotted tool, `shared.search`, whose
/// result text is the script's first argument.
pub const SHARED_TOOL_SERVER: &str = r#"
while IFS= read -r line; do
  case "$line" in *'"id":'*) ;; *) continue ;; esac
  id=$(printf '%s\n' "$line" | sed 's/.*"id":\([0-9]*\).*/\1/')
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"shared","version":"0"}}}\n' "$id" ;;
    *'"method":"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"shared.search","description":"Search"}]}}\n' "$id" ;;
    *'"method":"tools/call"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"%s"}]}}\n' "$id" "$1" ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32601,"message":"method not found"}}\n' "$id" ;;
  esac
done
"#;

/// A pipe server running [`SHARED_TOOL_SERVER`] that answers with `label`.
pub fn shared_tool_pipe(name: &str, label: &str) -> ServerConfig {
    ServerConfig::pipe(
        name,
        "sh",
        vec![
            "-c".to_string(),
            SHARED_TOOL_SERVER.to_string(),
            "sh".to_string(),
            label.to_string(),
        ],
    )
}

/// Poll until `count` calls are pending, or panic after a few seconds.
pub async fn wait_for_pending(correlator: &Correlator, count: usize) {
    for _ in 0..200 {
        if correlator.pending_count().await == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {count} pending call(s), found {}",
        correlator.pending_count().await
    );
}
