//! Shared fixtures: sessions wired over in-memory channels, and a raw peer
//! that speaks hand-written frames.

#![allow(dead_code)]

use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::timeout;

use mcp_session::tools::ToolRegistry;
use mcp_session::transport::{ChannelTransport, Transport};
use mcp_session::types::MCP_VERSION;
use mcp_session::{McpClient, Session, SessionConfig, SessionState};

/// Upper bound on any single wait, so a regression fails instead of hanging.
pub const WAIT: Duration = Duration::from_secs(5);

/// The far end of a session, driven frame by frame from the test.
pub struct RawPeer {
    transport: ChannelTransport,
}

impl RawPeer {
    pub async fn send(&self, frame: Value) {
        self.send_raw(&serde_json::to_vec(&frame).unwrap()).await;
    }

    pub async fn send_raw(&self, bytes: &[u8]) {
        self.transport.send(bytes.to_vec()).await.unwrap();
    }

    pub async fn recv(&self) -> Value {
        let frame = timeout(WAIT, self.transport.receive())
            .await
            .expect("timed out waiting for a frame")
            .unwrap()
            .expect("session ended the stream");
        serde_json::from_slice(&frame).unwrap()
    }

    /// Wait for the session to end the stream.
    pub async fn expect_end(&self) {
        let next = timeout(WAIT, self.transport.receive())
            .await
            .expect("timed out waiting for end of stream")
            .unwrap();
        assert!(next.is_none(), "expected end of stream, got a frame");
    }

    pub async fn close(&self) {
        self.transport.close().await.unwrap();
    }
}

pub fn request(id: i64, method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
}

pub fn notification(method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "method": method, "params": params })
}

pub fn response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

/// Server session with the demo tools installed, started, facing a raw client.
pub fn server_with_raw_client(config: SessionConfig) -> (Session, RawPeer) {
    let (ours, theirs) = ChannelTransport::pair();
    let server = Session::server(ours, config);
    ToolRegistry::install(&server).unwrap();
    server.start().unwrap();
    (server, RawPeer { transport: theirs })
}

/// Client session facing a raw server. Not started.
pub fn client_with_raw_server(config: SessionConfig) -> (Session, RawPeer) {
    let (ours, theirs) = ChannelTransport::pair();
    (Session::client(ours, config), RawPeer { transport: theirs })
}

/// Drive the client half of the handshake from a raw peer.
pub async fn raw_client_handshake(peer: &RawPeer) -> Value {
    peer.send(request(
        0,
        "initialize",
        json!({
            "protocolVersion": MCP_VERSION,
            "capabilities": {},
            "clientInfo": { "name": "raw-client", "version": "1.0" }
        }),
    ))
    .await;
    let reply = peer.recv().await;
    peer.send(notification("notifications/initialized", json!({}))).await;
    reply
}

/// Tool client facing a raw server. Not initialized.
pub fn mcp_client_with_raw_server() -> (McpClient, RawPeer) {
    let (ours, theirs) = ChannelTransport::pair();
    (
        McpClient::new(ours, SessionConfig::default()),
        RawPeer { transport: theirs },
    )
}

/// Drive the server half of the handshake from a raw peer.
pub async fn raw_server_handshake(peer: &RawPeer) {
    let init_request = peer.recv().await;
    assert_eq!(init_request["method"], "initialize");
    peer.send(response(
        init_request["id"].clone(),
        json!({
            "protocolVersion": MCP_VERSION,
            "capabilities": {},
            "serverInfo": { "name": "raw-server", "version": "0.0.1" }
        }),
    ))
    .await;
    assert_eq!(peer.recv().await["method"], "notifications/initialized");
}

/// Client session made ready by a raw server.
pub async fn ready_client_with_raw_server() -> (Session, RawPeer) {
    let (client, peer) = client_with_raw_server(SessionConfig::default());
    let init = tokio::spawn({
        let client = client.clone();
        async move { client.initialize().await }
    });

    raw_server_handshake(&peer).await;

    init.await.unwrap().unwrap();
    assert_eq!(client.state(), SessionState::Ready);
    (client, peer)
}

/// Two real sessions over a channel pair. The server has the demo tools and
/// is started; the client is not.
pub fn connected(client_config: SessionConfig, server_config: SessionConfig) -> (Session, Session) {
    let (a, b) = ChannelTransport::pair();
    let server = Session::server(b, server_config);
    ToolRegistry::install(&server).unwrap();
    server.start().unwrap();
    (Session::client(a, client_config), server)
}

/// Two real sessions, both ready.
pub async fn ready_pair() -> (Session, Session) {
    let (client, server) = connected(SessionConfig::default(), SessionConfig::default());
    client.initialize().await.unwrap();
    let state = timeout(WAIT, server.wait_until_settled()).await.unwrap();
    assert_eq!(state, SessionState::Ready);
    (client, server)
}
