//! Server-sent event line decoding

use crate::response::SseEvent;
use tracing::debug;

/// Prefix of an SSE data line
pub const DATA_PREFIX: &str = "data:";

/// Splits a byte stream into lines, across chunk boundaries.
///
/// Accepts `\n`, `\r\n` and bare `\r` terminators.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    /// Last chunk ended on `\r`; a leading `\n` belongs to that terminator
    skip_lf: bool,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completes, without terminators
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut start = 0;

        for (i, &byte) in chunk.iter().enumerate() {
            if std::mem::take(&mut self.skip_lf) && byte == b'\n' {
                start = i + 1;
                continue;
            }
            if byte == b'\n' || byte == b'\r' {
                self.buffer.extend_from_slice(&chunk[start..i]);
                lines.push(decode_line(&self.buffer));
                self.buffer.clear();
                self.skip_lf = byte == b'\r';
                start = i + 1;
            }
        }

        self.buffer.extend_from_slice(&chunk[start..]);
        lines
    }

    /// Remaining partial line at end of stream
    pub fn finish(&mut self) -> Option<String> {
        self.skip_lf = false;
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Decode one line into an event.
///
/// Lines without the data prefix (blank lines, comments, `event:` fields)
/// and data that is not a JSON object yield `None`.
pub fn parse_event_line(line: &str) -> Option<SseEvent> {
    let data = line.strip_prefix(DATA_PREFIX)?;
    let data = data.strip_prefix(' ').unwrap_or(data);

    match SseEvent::parse(data) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!("Skipping malformed SSE frame: {}", e);
            None
        }
    }
}
