//! Stream events forwarded to the downstream consumer
//!
//! The outbound protocol mirrors the inbound one: blank-line-delimited
//! frames, each carrying one JSON event payload on a `data:` line.

use crate::Record;
use serde::{Deserialize, Serialize};

/// One event on the outbound stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// A paced sub-chunk of raw provider text
    Chunk { chunk: String },
    /// The number of complete logical records seen so far
    Progress { count: usize },
    /// A named unit of work completed (e.g. one generated file)
    Milestone { name: String, count: usize },
    /// Terminal success: the full recovered record list
    Complete { records: Vec<Record>, count: usize },
    /// Terminal failure, emitted exactly once
    Error { error: String },
}

impl StreamEvent {
    /// True for the two terminal event kinds
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::Complete { .. } | StreamEvent::Error { .. }
        )
    }

    /// Encode as one SSE frame: `data: {...}\n\n`
    pub fn to_sse_frame(&self) -> String {
        // StreamEvent serialization cannot fail: no non-string keys, no
        // non-finite floats
        let json = serde_json::to_string(self).unwrap_or_default();
        format!("data: {}\n\n", json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chunk_wire_format() {
        let event = StreamEvent::Chunk {
            chunk: "hello".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"type": "chunk", "chunk": "hello"}));
    }

    #[test]
    fn test_milestone_wire_format() {
        let event = StreamEvent::Milestone {
            name: "backend/server.js".into(),
            count: 3,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"type": "milestone", "name": "backend/server.js", "count": 3})
        );
    }

    #[test]
    fn test_complete_wire_format() {
        let record = Record::from_value(json!({"key": "a"})).unwrap();
        let event = StreamEvent::Complete {
            records: vec![record],
            count: 1,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"type": "complete", "records": [{"key": "a"}], "count": 1})
        );
    }

    #[test]
    fn test_sse_frame_shape() {
        let frame = StreamEvent::Progress { count: 2 }.to_sse_frame();
        assert_eq!(frame, "data: {\"type\":\"progress\",\"count\":2}\n\n");
    }

    #[test]
    fn test_terminal_classification() {
        assert!(StreamEvent::Error { error: "x".into() }.is_terminal());
        assert!(!StreamEvent::Progress { count: 1 }.is_terminal());
    }
}
