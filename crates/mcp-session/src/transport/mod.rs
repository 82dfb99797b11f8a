//! Transport layer for MCP communication.
//!
//! A transport moves opaque frames in both directions and owns framing. The
//! session treats every received frame as exactly one envelope.

pub mod framing;
pub mod memory;
#[cfg(feature = "stdio")]
pub mod stdio;
pub mod stream;
#[cfg(feature = "tcp")]
pub mod tcp;

use async_trait::async_trait;

use crate::types::McpResult;

pub use memory::ChannelTransport;
#[cfg(feature = "stdio")]
pub use stdio::StdioTransport;
pub use stream::StreamTransport;
#[cfg(feature = "tcp")]
pub use tcp::TcpTransport;

/// Ordered, reliable, message-oriented duplex channel.
///
/// `send` and `receive` may be called concurrently from different tasks; the
/// session guarantees at most one of each is in flight at a time.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Write one frame.
    async fn send(&self, frame: Vec<u8>) -> McpResult<()>;

    /// Wait for the next frame. `Ok(None)` marks an orderly end of stream.
    async fn receive(&self) -> McpResult<Option<Vec<u8>>>;

    /// Stop sending and release the underlying channel.
    async fn close(&self) -> McpResult<()>;
}
