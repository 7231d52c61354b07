//! Frame decoder for the inbound streaming protocol
//!
//! Raw network chunks arrive at arbitrary byte boundaries. The decoder
//! keeps a carry-over buffer, splits it on the blank-line frame delimiter,
//! and concatenates all `data:`-prefixed payload lines of one frame into a
//! single JSON envelope string. Comment/keep-alive lines are ignored, and
//! a malformed envelope is skipped rather than aborting the stream.

use crate::Envelope;

const DATA_PREFIX: &str = "data:";

/// Stateful decoder turning raw byte chunks into [`Envelope`]s
#[derive(Debug, Default)]
pub struct FrameDecoder {
    carry: String,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw chunk; returns every envelope completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Envelope> {
        self.carry.push_str(&String::from_utf8_lossy(chunk));

        let mut envelopes = Vec::new();
        while let Some(pos) = self.carry.find("\n\n") {
            let frame: String = self.carry.drain(..pos + 2).collect();
            if let Some(envelope) = decode_frame(&frame) {
                envelopes.push(envelope);
            }
        }
        envelopes
    }

    /// Drain the final, unterminated frame at stream end
    pub fn finish(&mut self) -> Vec<Envelope> {
        let frame = std::mem::take(&mut self.carry);
        decode_frame(&frame).into_iter().collect()
    }
}

fn decode_frame(frame: &str) -> Option<Envelope> {
    let mut payload = String::new();
    for line in frame.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix(DATA_PREFIX) {
            if !payload.is_empty() {
                payload.push('\n');
            }
            payload.push_str(rest.trim_start());
        }
        // Anything else (comments, keep-alives, blank lines) is ignored
    }

    if payload.is_empty() {
        return None;
    }
    Envelope::parse(&payload)
}
