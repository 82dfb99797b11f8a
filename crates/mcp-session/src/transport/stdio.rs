//! Stdio transport. Reads frames from stdin and writes them to stdout.

use tokio::io::{BufReader, Stdin, Stdout};

use super::StreamTransport;

/// Stdio transport for desktop MCP clients.
pub type StdioTransport = StreamTransport<BufReader<Stdin>, Stdout>;

impl StdioTransport {
    pub fn stdio() -> Self {
        StreamTransport::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}
