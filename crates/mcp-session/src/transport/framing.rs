//! Message framing for newline-delimited JSON.

use crate::types::{McpError, McpResult};

/// Append the frame delimiter. Frames must not contain raw newlines.
pub fn frame_message(frame: &[u8]) -> McpResult<Vec<u8>> {
    if frame.contains(&b'\n') {
        return Err(McpError::Encoding(
            "Frame contains a raw newline".to_string(),
        ));
    }

    let mut framed = Vec::with_capacity(frame.len() + 1);
    framed.extend_from_slice(frame);
    framed.push(b'\n');
    Ok(framed)
}

/// Strip the delimiter and surrounding whitespace. Blank lines yield `None`.
pub fn unframe_line(line: &[u8]) -> Option<&[u8]> {
    let start = line.iter().position(|b| !b.is_ascii_whitespace())?;
    let end = line.iter().rposition(|b| !b.is_ascii_whitespace())?;
    Some(&line[start..=end])
}
