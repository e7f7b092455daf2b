//! WebSocket transport tests against an in-process tungstenite server.

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::borrow::Cow;
use std::sync::{Arc, Mutex};
use switchyard_client::{CallError, ConnectionStatus, ServerConfig, ToolClient};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

fn reply(request: &Value) -> Option<Message> {
    let id = request.get("id")?.clone();
    let result = match request["method"].as_str()? {
        "initialize" => json!({"protocolVersion": "2024-11-05", "capabilities": {}}),
        "tools/list" => json!({"tools": [
            {"name": "echo", "description": "Echo arguments back"},
            {"name": "shutdown"}
        ]}),
        "tools/call" => json!({"content": [{"type": "text", "text": request["params"]["arguments"].to_string()}]}),
        _ => {
            return Some(Message::Text(
                json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32601, "message": "method not found"}})
                    .to_string(),
            ));
        }
    };
    Some(Message::Text(
        json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string(),
    ))
}

/// Start a one-client socket server. Returns its URL and the Authorization header it saw.
async fn start_socket_server() -> (String, Arc<Mutex<Option<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let auth = Arc::new(Mutex::new(None));
    let seen_auth = Arc::clone(&auth);

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = move |request: &Request, response: Response| {
            let header = request
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            *seen_auth.lock().unwrap() = header;
            Ok::<Response, ErrorResponse>(response)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap();

        while let Some(Ok(message)) = ws.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            let request: Value = serde_json::from_str(&text).unwrap();
            if request["params"]["name"] == "shutdown" {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: Cow::Borrowed("going away"),
                };
                let _ = ws.close(Some(frame)).await;
                return;
            }
            if let Some(response) = reply(&request) {
                if ws.send(response).await.is_err() {
                    return;
                }
            }
        }
    });

    (format!("ws://{addr}"), auth)
}

#[tokio::test]
async fn discover_and_invoke_over_socket() {
    let (url, auth) = start_socket_server().await;
    let client = ToolClient::new(vec![ServerConfig::socket("live", url).with_token("tok")]);

    assert!(client.connect_all().await);
    assert_eq!(auth.lock().unwrap().as_deref(), Some("Bearer tok"));

    let names: Vec<String> = client.list_tools().await.into_iter().map(|t| t.name).collect();
    assert_eq!(names, ["live.echo", "live.shutdown"]);

    let result = client
        .invoke_tool("live.echo", json!({"word": "ping"}))
        .await
        .unwrap();
    assert_eq!(result["content"][0]["text"], r#"{"word":"ping"}"#);

    let err = client.read_resource("live", "mem://x").await.unwrap_err();
    assert!(matches!(err, CallError::Remote { code: Some(-32601), .. }));
    client.disconnect_all().await;
    assert!(!client.is_connected().await);
}

#[tokio::test]
async fn server_close_rejects_pending_call() {
    let (url, _auth) = start_socket_server().await;
    let client = ToolClient::new(vec![ServerConfig::socket("live", url)]);
    assert!(client.connect_all().await);

    match client.invoke_tool("live.shutdown", json!({})).await {
        Err(CallError::ConnectionClosed { server, reason }) => {
            assert_eq!(server, "live");
            assert!(reason.contains("going away"), "got: {reason}");
        }
        other => panic!("Expected ConnectionClosed, got: {other:?}"),
    }
    assert_eq!(
        client.connections().status("live").await,
        Some(ConnectionStatus::Disconnected)
    );
    assert_eq!(client.correlator().pending_count().await, 0);
}

#[tokio::test]
async fn refused_socket_fails_to_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = ToolClient::new(vec![ServerConfig::socket("gone", format!("ws://{addr}"))]);
    assert!(!client.connect_all().await);
    let status = &client.server_status().await[0];
    assert_eq!(status.status, ConnectionStatus::Disconnected);
    assert!(status.last_error.is_some());
}
