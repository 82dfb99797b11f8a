//! In-memory transport: two connected endpoints backed by channels.

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::types::{McpError, McpResult};

use super::Transport;

/// One end of an in-process duplex channel.
#[derive(Debug)]
pub struct ChannelTransport {
    outgoing: std::sync::Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    incoming: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl ChannelTransport {
    /// Create two endpoints; frames sent on one arrive on the other.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (Self::new(a_tx, b_rx), Self::new(b_tx, a_rx))
    }

    fn new(outgoing: mpsc::UnboundedSender<Vec<u8>>, incoming: mpsc::UnboundedReceiver<Vec<u8>>) -> Self {
        Self {
            outgoing: std::sync::Mutex::new(Some(outgoing)),
            incoming: Mutex::new(incoming),
        }
    }

    fn sender(&self) -> Option<mpsc::UnboundedSender<Vec<u8>>> {
        self.outgoing
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, frame: Vec<u8>) -> McpResult<()> {
        let sender = self
            .sender()
            .ok_or_else(|| McpError::Transport("Channel closed locally".to_string()))?;
        sender
            .send(frame)
            .map_err(|_| McpError::Transport("Peer endpoint dropped".to_string()))
    }

    async fn receive(&self) -> McpResult<Option<Vec<u8>>> {
        Ok(self.incoming.lock().await.recv().await)
    }

    async fn close(&self) -> McpResult<()> {
        self.outgoing
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        Ok(())
    }
}
