//! Splits an arbitrary byte stream into line-delimited JSON-RPC frames.

use bytes::{Bytes, BytesMut};

use super::message::{Frame, ParsedMessage};

/// Stateful line splitter. Holds the trailing partial line across `feed`
/// calls so a frame split across two stdin chunks still parses as one.
#[derive(Default)]
pub struct FrameParser {
    buf: BytesMut,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning zero or more complete frames.
    /// Blank lines between frames are dropped rather than yielding empty
    /// frames.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            let Some(newline_at) = self.buf.iter().position(|&b| b == b'\n') else {
                break;
            };
            let mut line = self.buf.split_to(newline_at + 1);
            let text = line.split_to(newline_at);
            let _consumed_newline = line; // the `\n` itself, discarded from `text`

            if text.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }

            let mut raw = BytesMut::with_capacity(text.len() + 1);
            raw.extend_from_slice(&text);
            raw.extend_from_slice(b"\n");
            let raw: Bytes = raw.freeze();

            let frame = match serde_json::from_slice::<serde_json::Value>(&text) {
                Ok(value) => Frame::parsed(raw, ParsedMessage::from_value(value)),
                Err(_) => Frame::unparsed(raw),
            };
            frames.push(frame);
        }
        frames
    }
}
