//! Newline-delimited transport over any pair of async byte streams.
//!
//! Backs the stdio and TCP transports, and is handy for tests that wire two
//! sessions together through `tokio::io::duplex`.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::types::McpResult;

use super::{framing, Transport};

pub struct StreamTransport<R, W> {
    reader: Mutex<R>,
    writer: Mutex<Option<W>>,
}

impl<R, W> StreamTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(Some(writer)),
        }
    }
}

impl<R, W> std::fmt::Debug for StreamTransport<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, frame: Vec<u8>) -> McpResult<()> {
        let framed = framing::frame_message(&frame)?;
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "transport closed")
        })?;
        writer.write_all(&framed).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn receive(&self) -> McpResult<Option<Vec<u8>>> {
        let mut reader = self.reader.lock().await;
        let mut line = Vec::new();

        loop {
            line.clear();
            let bytes_read = reader.read_until(b'\n', &mut line).await?;
            if bytes_read == 0 {
                tracing::debug!("EOF on reader");
                return Ok(None);
            }

            if let Some(frame) = framing::unframe_line(&line) {
                return Ok(Some(frame.to_vec()));
            }
        }
    }

    async fn close(&self) -> McpResult<()> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            writer.shutdown().await?;
        }
        Ok(())
    }
}
