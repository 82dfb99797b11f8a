//! TCP transport: newline-delimited frames over a socket.

use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::types::{McpError, McpResult};

use super::StreamTransport;

pub type TcpTransport = StreamTransport<BufReader<OwnedReadHalf>, OwnedWriteHalf>;

impl TcpTransport {
    pub async fn connect(addr: impl ToSocketAddrs) -> McpResult<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| McpError::Transport(format!("Failed to connect: {e}")))?;
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Could not set TCP_NODELAY: {e}");
        }
        let (read, write) = stream.into_split();
        StreamTransport::new(BufReader::new(read), write)
    }
}
