//! Records and record shapes
//!
//! The pipeline recovers structurally arbitrary records from loosely
//! structured provider output. Validity is not baked into the parser:
//! each call site supplies a [`RecordShape`] carrying the required-field
//! predicate, the structural marker used for progress counting, and the
//! loose fallback pattern used by last-resort extraction.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// One recovered record: an ordered mapping from field name to value.
///
/// Field order is insertion order (serde_json `preserve_order`), so a
/// record round-trips in the order the provider emitted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub Map<String, Value>);

impl Record {
    /// Build a record from any JSON value; returns `None` for non-objects
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Record(map)),
            _ => None,
        }
    }

    /// Get a field value by name
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Get a field as a non-empty string
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Check that every named field is present
    pub fn has_fields(&self, fields: &[&str]) -> bool {
        fields.iter().all(|f| self.0.contains_key(*f))
    }
}

type Predicate = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Shape contract for one record kind.
///
/// The recovery parser and progress scanner are generic over this: they
/// never know whether they are recovering quiz questions or project files.
#[derive(Clone)]
pub struct RecordShape {
    /// Shape name, used in logs and error messages
    pub name: &'static str,
    /// Substring signature present once per complete logical record,
    /// used to count progress in a not-yet-parseable buffer
    pub marker: Regex,
    /// Loose brace-span pattern used by pattern-fallback extraction
    pub fallback: Regex,
    /// Field whose value names a milestone event (e.g. a filename);
    /// shapes without one emit plain progress counts
    pub milestone_field: Option<&'static str>,
    validate: Predicate,
}

impl RecordShape {
    /// Build a shape from explicit parts
    pub fn new(
        name: &'static str,
        marker: Regex,
        fallback: Regex,
        milestone_field: Option<&'static str>,
        validate: impl Fn(&Record) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            marker,
            fallback,
            milestone_field,
            validate: Arc::new(validate),
        }
    }

    /// Apply the required-field predicate
    pub fn is_valid(&self, record: &Record) -> bool {
        (self.validate)(record)
    }

    /// Preference questions: `key`, `question`, and an `options` list of
    /// at least two entries
    pub fn questions() -> Self {
        Self::new(
            "questions",
            Regex::new(r#"\{[^{}]*"key"[^{}]*"question"[^{}]*\}"#).unwrap(),
            Regex::new(r#"\{[^{}]*"key"[^{}]*"question"[^{}]*"options"[^{}]*\}"#).unwrap(),
            None,
            |r| {
                r.get_str("key").is_some()
                    && r.get_str("question").is_some()
                    && r.get("options")
                        .and_then(Value::as_array)
                        .is_some_and(|opts| opts.len() >= 2)
            },
        )
    }

    /// Generated project files: `filename` and `content` strings; each
    /// completed filename is a milestone
    pub fn project_files() -> Self {
        Self::new(
            "files",
            Regex::new(r#""filename"\s*:\s*"([^"]+)""#).unwrap(),
            Regex::new(r#"\{[^{}]*"filename"[^{}]*"content"[^{}]*\}"#).unwrap(),
            Some("filename"),
            |r| r.get_str("filename").is_some() && r.get_str("content").is_some(),
        )
    }
}

impl std::fmt::Debug for RecordShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordShape")
            .field("name", &self.name)
            .field("marker", &self.marker.as_str())
            .field("milestone_field", &self.milestone_field)
            .finish()
    }
}
