//! Run the demo tool server, one session per connection.

use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::session::Session;
use crate::tools::ToolRegistry;
use crate::transport::Transport;
use crate::types::McpResult;

/// Install the tool set on a fresh server session and run it until the peer
/// disconnects or `shutdown` fires.
pub async fn serve_connection(
    transport: impl Transport,
    config: SessionConfig,
    shutdown: CancellationToken,
) -> McpResult<()> {
    let session = Session::server(transport, config);
    ToolRegistry::install(&session)?;
    session.start()?;

    tokio::select! {
        _ = session.closed() => {}
        _ = shutdown.cancelled() => tracing::info!("Shutting down session {}", session.id()),
    }
    session.close().await?;

    if let Some(reason) = session.close_reason() {
        tracing::debug!("Session {} finished: {reason}", session.id());
    }
    Ok(())
}

#[cfg(feature = "stdio")]
pub async fn serve_stdio(config: SessionConfig) -> McpResult<()> {
    tracing::info!("MCP server listening on stdio");
    serve_connection(
        crate::transport::StdioTransport::stdio(),
        config,
        CancellationToken::new(),
    )
    .await
}

#[cfg(feature = "tcp")]
pub async fn serve_tcp(addr: &str, config: SessionConfig) -> McpResult<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("MCP server listening on {}", listener.local_addr()?);
    serve_listener(listener, config, CancellationToken::new()).await
}

/// Accept connections until `shutdown` fires. Each connection gets an
/// independent session; cancelling `shutdown` closes all of them.
#[cfg(feature = "tcp")]
pub async fn serve_listener(
    listener: tokio::net::TcpListener,
    config: SessionConfig,
    shutdown: CancellationToken,
) -> McpResult<()> {
    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted?,
        };
        tracing::info!("Accepted connection from {peer}");

        let transport = crate::transport::TcpTransport::from_stream(stream);
        let config = config.clone();
        let shutdown = shutdown.child_token();
        tokio::spawn(async move {
            if let Err(e) = serve_connection(transport, config, shutdown).await {
                tracing::warn!("Connection from {peer} failed: {e}");
            }
        });
    }

    tracing::info!("Listener stopped");
    Ok(())
}
