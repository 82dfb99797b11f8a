//! Handshake and end-to-end tool calls between two real sessions.

mod common;

use serde_json::json;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

use common::*;
use mcp_session::transport::ChannelTransport;
use mcp_session::types::{error_codes, ClientCapabilities, ErrorKind, McpError, MCP_VERSION};
use mcp_session::{McpClient, Session, SessionConfig, SessionState};

// ═══════════════════════════════════════════════════════
// END TO END
// ═══════════════════════════════════════════════════════

/// Initialize, list tools, echo, then an unknown tool.
#[tokio::test]
async fn test_01_tool_server_round_trip() {
    let (a, b) = ChannelTransport::pair();
    let server_config = SessionConfig::default().with_protocol_version("1.0");
    let server = Session::server(b, server_config);
    mcp_session::tools::ToolRegistry::install(&server).unwrap();
    server.start().unwrap();

    let client = McpClient::new(a, SessionConfig::default().with_protocol_version("1.0"));
    let mut capabilities = ClientCapabilities::default();
    capabilities.other.insert("tools".to_string(), json!(true));
    client.session().set_capabilities(capabilities).unwrap();

    let init = client.initialize().await.unwrap();
    assert_eq!(init.protocol_version, "1.0");
    assert!(init.capabilities.tools.unwrap().list_changed);
    assert_eq!(client.session().state(), SessionState::Ready);

    let settled = timeout(WAIT, server.wait_until_settled()).await.unwrap();
    assert_eq!(settled, SessionState::Ready);
    let peer = server.peer_info().unwrap();
    assert_eq!(peer.protocol_version, "1.0");
    assert_eq!(peer.capabilities.as_client().unwrap().other["tools"], json!(true));

    let tools = client.list_tools().await.unwrap();
    let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["echo", "timestamp"]);

    let echoed = client.call_tool("echo", json!({"message": "hi"})).await.unwrap();
    assert_eq!(echoed, json!({"message": "hi"}));

    let err = client.call_tool("does_not_exist", json!({})).await.unwrap_err();
    assert_eq!(err.code(), error_codes::METHOD_NOT_FOUND);
    assert_eq!(err.kind(), ErrorKind::MethodNotFound);

    assert_ok!(client.close().await);
    assert_ok!(timeout(WAIT, server.closed()).await);
    assert_eq!(server.state(), SessionState::Closed);
    assert!(server.close_reason().is_some());
}

/// Bad tool arguments come back as InvalidParams, not a dead session.
#[tokio::test]
async fn test_02_invalid_tool_arguments() {
    let (client, _server) = ready_pair().await;

    let err = client
        .call("tools/call", json!({"name": "echo", "arguments": {"message": 7}}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), error_codes::INVALID_PARAMS);

    let stamp = client
        .call("tools/call", json!({"name": "timestamp"}))
        .await
        .unwrap();
    assert!(stamp["timestamp"].is_string());
}

// ═══════════════════════════════════════════════════════
// NEGOTIATION
// ═══════════════════════════════════════════════════════

/// Server answers with a version the client does not speak.
#[tokio::test]
async fn test_03_version_mismatch_fails_initialize() {
    let (client, server) = connected(
        SessionConfig::default()
            .with_protocol_version("1.0")
            .with_supported_versions(["1.0"]),
        SessionConfig::default().with_supported_versions([MCP_VERSION]),
    );

    let err = assert_err!(client.initialize().await);
    assert!(matches!(err, McpError::UnsupportedProtocolVersion { .. }));
    assert_eq!(client.state(), SessionState::Closed);
    assert!(client.close_reason().unwrap().contains("Handshake failed"));

    assert_ok!(timeout(WAIT, server.closed()).await);
}

/// Initialize twice is refused locally.
#[tokio::test]
async fn test_04_second_initialize_is_invalid_state() {
    let (client, _server) = ready_pair().await;
    let err = client.initialize().await.unwrap_err();
    assert!(matches!(err, McpError::InvalidState(_)));
    assert_eq!(client.state(), SessionState::Ready);
}

/// A server never sends initialize.
#[tokio::test]
async fn test_05_server_cannot_initialize() {
    let (_client, server) = connected(SessionConfig::default(), SessionConfig::default());
    assert!(matches!(server.initialize().await, Err(McpError::InvalidState(_))));
}

/// Capabilities are fixed once the handshake starts and must match the role.
#[tokio::test]
async fn test_06_capabilities_are_role_checked() {
    let (client, _server) = ready_pair().await;
    assert!(client.set_capabilities(ClientCapabilities::default()).is_err());

    let (fresh, _peer) = client_with_raw_server(SessionConfig::default());
    let err = fresh
        .set_capabilities(mcp_session::types::ServerCapabilities::default())
        .unwrap_err();
    assert!(matches!(err, McpError::InvalidState(_)));
}

// ═══════════════════════════════════════════════════════
// BEFORE READY
// ═══════════════════════════════════════════════════════

/// Ping works in either direction before the handshake.
#[tokio::test]
async fn test_07_ping_before_initialize() {
    let (client, server) = connected(SessionConfig::default(), SessionConfig::default());
    assert_eq!(client.call("ping", json!({})).await.unwrap(), json!({}));
    assert_eq!(server.state(), SessionState::Uninitialized);
}

/// Outbound calls other than ping need a ready session.
#[tokio::test]
async fn test_08_call_before_ready_is_rejected_locally() {
    let (client, _server) = connected(SessionConfig::default(), SessionConfig::default());
    let err = client.call("tools/list", json!({})).await.unwrap_err();
    assert!(matches!(err, McpError::InvalidState(_)));
    assert_eq!(client.pending_requests(), 0);
}

/// Default policy answers early requests with ServerNotInitialized.
#[tokio::test]
async fn test_09_request_before_ready_is_rejected() {
    let (_server, peer) = server_with_raw_client(SessionConfig::default());

    peer.send(request(1, "tools/list", json!({}))).await;
    let reply = peer.recv().await;
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["error"]["code"], -32002);

    let init = raw_client_handshake(&peer).await;
    assert_eq!(init["result"]["protocolVersion"], MCP_VERSION);

    peer.send(request(2, "tools/list", json!({}))).await;
    let reply = peer.recv().await;
    assert_eq!(reply["id"], 2);
    assert_eq!(reply["result"]["tools"].as_array().unwrap().len(), 2);
}

/// With queueing enabled, early requests are served once the session is ready.
#[tokio::test]
async fn test_10_request_before_ready_is_queued() {
    let config = SessionConfig::default().with_pre_ready_policy(mcp_session::config::PreReadyPolicy::Queue);
    let (server, peer) = server_with_raw_client(config);

    peer.send(request(1, "tools/list", json!({}))).await;
    let init = raw_client_handshake(&peer).await;
    assert_eq!(init["id"], 0);

    let queued = peer.recv().await;
    assert_eq!(queued["id"], 1);
    assert_eq!(queued["result"]["tools"][0]["name"], "echo");
    assert_eq!(server.inflight_requests(), 0);
}

/// Queued requests are dropped without a reply when the session closes first.
#[tokio::test]
async fn test_11_queued_request_dropped_on_close() {
    let config = SessionConfig::default().with_pre_ready_policy(mcp_session::config::PreReadyPolicy::Queue);
    let (server, peer) = server_with_raw_client(config);

    peer.send(request(1, "tools/list", json!({}))).await;
    peer.send(request(2, "ping", json!({}))).await;
    assert_eq!(peer.recv().await["id"], 2);

    assert_ok!(server.close().await);
    peer.expect_end().await;
}
