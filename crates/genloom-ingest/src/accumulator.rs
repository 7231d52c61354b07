//! Text accumulation and incremental progress detection
//!
//! The accumulator is the single source of truth the recovery parser runs
//! over: deltas are appended in arrival order and never edited in place.
//! The progress scanner re-scans the whole buffer on every append and
//! reports a count only when it strictly increases, so the consumer never
//! sees duplicate or decreasing progress.

use genloom_core::RecordShape;
use regex::Regex;

/// Append-only text buffer for one attempt
#[derive(Debug, Default)]
pub struct Accumulator {
    text: String,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, delta: &str) {
        self.text.push_str(delta);
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// A strictly-increasing progress observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressUpdate {
    /// N complete logical records are present in the buffer
    Count(usize),
    /// As above, plus the name captured from the newest record's marker
    Named { name: String, count: usize },
}

/// Counts structural-marker matches in the growing buffer
#[derive(Debug)]
pub struct ProgressScanner {
    marker: Regex,
    named: bool,
    last: usize,
}

impl ProgressScanner {
    /// Build a scanner for one record shape. Shapes with a milestone field
    /// yield [`ProgressUpdate::Named`] using the marker's first capture
    /// group.
    pub fn for_shape(shape: &RecordShape) -> Self {
        Self {
            marker: shape.marker.clone(),
            named: shape.milestone_field.is_some(),
            last: 0,
        }
    }

    /// Re-scan the entire buffer; `Some` only when the match count
    /// strictly increased since the last emission
    pub fn scan(&mut self, buffer: &str) -> Option<ProgressUpdate> {
        let count = self.marker.find_iter(buffer).count();
        if count <= self.last {
            return None;
        }
        self.last = count;

        if self.named {
            // The newest marker names the milestone
            let name = self
                .marker
                .captures_iter(buffer)
                .last()
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string());
            if let Some(name) = name {
                return Some(ProgressUpdate::Named { name, count });
            }
        }
        Some(ProgressUpdate::Count(count))
    }
}
