//! Sessions over byte-stream transports: in-process duplex pipes and TCP.

mod common;

use serde_json::json;
use tokio::io::BufReader;
use tokio::time::timeout;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

use common::WAIT;
use mcp_session::server;
use mcp_session::transport::{StreamTransport, Transport};
use mcp_session::{McpClient, SessionConfig};

#[tokio::test]
async fn stream_transport_frames_by_line() {
    let (a, b) = tokio::io::duplex(1024);
    let (ar, aw) = tokio::io::split(a);
    let (br, bw) = tokio::io::split(b);
    let left = StreamTransport::new(BufReader::new(ar), aw);
    let right = StreamTransport::new(BufReader::new(br), bw);

    left.send(br#"{"jsonrpc":"2.0","method":"a"}"#.to_vec()).await.unwrap();
    left.send(br#"{"jsonrpc":"2.0","method":"b"}"#.to_vec()).await.unwrap();
    assert!(left.send(b"{\n}".to_vec()).await.is_err());

    assert_eq!(
        right.receive().await.unwrap().unwrap(),
        br#"{"jsonrpc":"2.0","method":"a"}"#.to_vec()
    );
    assert_eq!(
        right.receive().await.unwrap().unwrap(),
        br#"{"jsonrpc":"2.0","method":"b"}"#.to_vec()
    );

    left.close().await.unwrap();
    assert!(right.receive().await.unwrap().is_none());
}

#[tokio::test]
async fn tool_server_over_duplex_pipe() {
    let (a, b) = tokio::io::duplex(4096);
    let (ar, aw) = tokio::io::split(a);
    let (br, bw) = tokio::io::split(b);

    let shutdown = CancellationToken::new();
    let serving = tokio::spawn(server::serve_connection(
        StreamTransport::new(BufReader::new(br), bw),
        SessionConfig::default(),
        shutdown.clone(),
    ));

    let client = McpClient::new(StreamTransport::new(BufReader::new(ar), aw), SessionConfig::default());
    client.initialize().await.unwrap();
    assert_ok!(client.ping().await);
    assert_eq!(
        client.call_tool("echo", json!({ "message": "piped" })).await.unwrap(),
        json!({ "message": "piped" })
    );

    shutdown.cancel();
    assert_ok!(timeout(WAIT, serving).await.unwrap().unwrap());
    assert_ok!(timeout(WAIT, client.session().closed()).await);
}

#[cfg(feature = "tcp")]
#[tokio::test]
async fn tool_server_over_tcp() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let shutdown = CancellationToken::new();
    let serving = tokio::spawn(server::serve_listener(listener, SessionConfig::default(), shutdown.clone()));

    // Two independent sessions on one listener.
    let first = McpClient::connect_tcp(&addr, SessionConfig::default()).await.unwrap();
    let second = McpClient::connect_tcp(&addr, SessionConfig::default()).await.unwrap();
    first.initialize().await.unwrap();
    second.initialize().await.unwrap();
    assert_ne!(first.session().id(), second.session().id());

    assert_eq!(first.list_tools().await.unwrap().len(), 2);
    let stamp = second.call_tool("timestamp", json!({})).await.unwrap();
    assert!(stamp["timestamp"].is_string());

    assert_ok!(first.close().await);
    assert_eq!(
        second.call_tool("echo", json!({ "message": "still here" })).await.unwrap()["message"],
        "still here"
    );

    shutdown.cancel();
    assert_ok!(timeout(WAIT, serving).await.unwrap().unwrap());
    assert_ok!(timeout(WAIT, second.session().closed()).await);
}
