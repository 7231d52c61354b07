//! Multi-strategy recovery parser
//!
//! Converts the final accumulated text of one attempt into an ordered list
//! of records, tolerating truncated output, trailing garbage, and the
//! markdown wrappers providers like to add. Strategies form an ordered
//! chain with early exit; each is independently testable and new ones can
//! be appended without touching the existing steps.
//!
//! No deduplication is performed: the chain exits on the first strategy
//! that yields records, and within a strategy every successfully parsed
//! candidate is kept in first-parse order.

use genloom_core::{LoomError, Record, RecordShape, Result};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Which strategy produced a recovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// The buffer contained a complete, strictly valid array
    FastPath,
    /// A truncated array was closed off (or cut back) at the last
    /// complete object
    BracketRepair,
    /// Individually well-formed objects were lifted out of a broken
    /// surrounding structure
    ObjectScan,
    /// Loose pattern extraction over the original text
    PatternFallback,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::FastPath => write!(f, "fast_path"),
            Strategy::BracketRepair => write!(f, "bracket_repair"),
            Strategy::ObjectScan => write!(f, "object_scan"),
            Strategy::PatternFallback => write!(f, "pattern_fallback"),
        }
    }
}

/// A successful recovery and the strategy that produced it
#[derive(Debug)]
pub struct Recovered {
    pub records: Vec<Record>,
    pub strategy: Strategy,
}

/// Run the strategy chain over the final accumulated text.
///
/// Element order in the result is the order of first successful parse.
/// Returns [`LoomError::MalformedPayload`] carrying the original text when
/// every strategy comes up empty.
pub fn recover_records(raw: &str, shape: &RecordShape) -> Result<Recovered> {
    let cleaned = normalize(raw);

    // 1+2. Normalize, then try a strict parse of the first balanced array
    if let Some(span) = balanced_array_span(&cleaned) {
        if let Some(records) = parse_array(span) {
            return Ok(Recovered {
                records,
                strategy: Strategy::FastPath,
            });
        }
    }

    // 3. Close off (or cut back) a truncated array and re-try strictly
    let repaired = repair_brackets(&cleaned);
    if let Some(ref repaired) = repaired {
        if let Some(records) = parse_array(repaired) {
            tracing::debug!("Recovered {} records via bracket repair", records.len());
            return Ok(Recovered {
                records,
                strategy: Strategy::BracketRepair,
            });
        }
    }

    // 4. Lift out individually well-formed objects
    let scan_input = repaired.as_deref().unwrap_or(&cleaned);
    let records = scan_objects(scan_input);
    if !records.is_empty() {
        tracing::debug!("Recovered {} records via object scan", records.len());
        return Ok(Recovered {
            records,
            strategy: Strategy::ObjectScan,
        });
    }

    // 5. Loose pattern extraction over the original, unmodified text
    let records = pattern_fallback(raw, shape);
    if !records.is_empty() {
        tracing::debug!("Recovered {} records via pattern fallback", records.len());
        return Ok(Recovered {
            records,
            strategy: Strategy::PatternFallback,
        });
    }

    Err(LoomError::MalformedPayload {
        raw: raw.to_string(),
    })
}

/// Recover and validate: run the chain, then apply the shape's
/// required-field predicate. Shared by the streaming and non-streaming
/// paths.
pub fn finalize_records(text: &str, shape: &RecordShape) -> Result<Vec<Record>> {
    let recovered = recover_records(text, shape)?;
    let total = recovered.records.len();

    let valid: Vec<Record> = recovered
        .records
        .into_iter()
        .filter(|r| shape.is_valid(r))
        .collect();

    tracing::info!(
        "Recovered {}/{} valid {} records via {}",
        valid.len(),
        total,
        shape.name,
        recovered.strategy
    );

    if valid.is_empty() {
        return Err(LoomError::ValidationFailed(format!(
            "None of the {} recovered {} records had the required fields",
            total, shape.name
        )));
    }
    Ok(valid)
}

/// Strip code-fence wrappers and surrounding whitespace
fn normalize(raw: &str) -> String {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| Regex::new(r"(?i)```(?:json|javascript|js)?").unwrap());
    fence.replace_all(raw, "").trim().to_string()
}

/// Locate the first balanced top-level `[ ... ]` span via a single
/// bracket scan, honoring string literals and escapes
fn balanced_array_span(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '[' if !in_string => depth += 1,
            ']' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Strict parse of an array span into records. Non-object elements are
/// dropped; a span yielding zero records counts as a failed strategy so
/// the chain keeps going.
fn parse_array(span: &str) -> Option<Vec<Record>> {
    let value: Value = serde_json::from_str(span).ok()?;
    let items = match value {
        Value::Array(items) => items,
        _ => return None,
    };
    let records: Vec<Record> = items.into_iter().filter_map(Record::from_value).collect();
    if records.is_empty() {
        return None;
    }
    Some(records)
}

/// Repair a truncated array: cut the text back to the last complete `}`
/// and synthesize the closing `]` (or truncate at an existing one), then
/// strip trailing commas before closers
fn repair_brackets(text: &str) -> Option<String> {
    let start = text.find('[')?;
    let tail = &text[start..];
    let last_brace = tail.rfind('}')?;
    let after = &tail[last_brace + 1..];

    let repaired = match after.find(']') {
        // A closing bracket survives after the last object; truncate there
        Some(rel) => tail[..last_brace + 1 + rel + 1].to_string(),
        // Discard the trailing partial object and close the array
        None => format!("{}\n]", &tail[..=last_brace]),
    };

    static TRAILING_COMMA: OnceLock<Regex> = OnceLock::new();
    let trailing_comma = TRAILING_COMMA.get_or_init(|| Regex::new(r",\s*([\]}])").unwrap());
    Some(trailing_comma.replace_all(&repaired, "$1").to_string())
}

/// One left-to-right pass collecting every top-level `{ ... }` span that
/// parses in isolation. String state honors backslash escapes, and brace
/// depth is only tracked outside string literals, so an escaped quote or
/// a brace inside a string never corrupts the scan.
fn scan_objects(text: &str) -> Vec<Record> {
    let mut records = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut start: Option<usize> = None;

    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string => {
                if depth == 0 {
                    continue;
                }
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        // An unparseable candidate is discarded and the
                        // scan continues after it
                        let candidate = &text[s..i + 1];
                        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                            if let Some(record) = Record::from_value(value) {
                                records.push(record);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }
    records
}

/// Last resort: isolated parses of loose-pattern matches over the
/// original text
fn pattern_fallback(raw: &str, shape: &RecordShape) -> Vec<Record> {
    shape
        .fallback
        .find_iter(raw)
        .filter_map(|m| serde_json::from_str::<Value>(m.as_str()).ok())
        .filter_map(Record::from_value)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn questions() -> RecordShape {
        RecordShape::questions()
    }

    #[test]
    fn test_fast_path_returns_valid_array_verbatim() {
        let raw = r#"[{"b":2,"a":1},{"a":3}]"#;
        let recovered = recover_records(raw, &questions()).unwrap();
        assert_eq!(recovered.strategy, Strategy::FastPath);
        assert_eq!(recovered.records.len(), 2);
        // Element and field order preserved, no repair applied
        let keys: Vec<&str> = recovered.records[0].0.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(recovered.records[1].get("a"), Some(&json!(3)));
    }

    #[test]
    fn test_fast_path_strips_code_fences() {
        let raw = "```json\n[{\"a\":1}]\n```";
        let recovered = recover_records(raw, &questions()).unwrap();
        assert_eq!(recovered.strategy, Strategy::FastPath);
        assert_eq!(recovered.records.len(), 1);
    }

    #[test]
    fn test_bracket_repair_closes_unterminated_array() {
        let raw = r#"[{"a":1},{"a":2"#;
        let recovered = recover_records(raw, &questions()).unwrap();
        assert_eq!(recovered.strategy, Strategy::BracketRepair);
        assert_eq!(recovered.records.len(), 1);
        assert_eq!(recovered.records[0].get("a"), Some(&json!(1)));
    }

    #[test]
    fn test_bracket_repair_strips_trailing_comma() {
        let raw = r#"[{"a":1},{"a":2},"#;
        let recovered = recover_records(raw, &questions()).unwrap();
        assert_eq!(recovered.strategy, Strategy::BracketRepair);
        assert_eq!(recovered.records.len(), 2);
    }

    #[test]
    fn test_bracket_repair_truncates_at_existing_bracket() {
        let raw = "Here you go:\n[{\"a\":1}] and some closing remarks";
        // The fast path already handles this, but repair must too if the
        // strict span parse were to fail; exercise repair directly
        let repaired = repair_brackets(raw).unwrap();
        assert_eq!(repaired, r#"[{"a":1}]"#);
    }

    #[test]
    fn test_object_scan_honors_escaped_quotes() {
        // No array at all, and the first value contains an escaped quote;
        // subsequent braces must not be misread as string content
        let raw = r#"note {"a":"x\"y"} sep {"b":2}"#;
        let recovered = recover_records(raw, &questions()).unwrap();
        assert_eq!(recovered.strategy, Strategy::ObjectScan);
        assert_eq!(recovered.records.len(), 2);
        assert_eq!(recovered.records[0].get("a"), Some(&json!("x\"y")));
        assert_eq!(recovered.records[1].get("b"), Some(&json!(2)));
    }

    #[test]
    fn test_object_scan_discards_broken_candidates() {
        let raw = r#"{"bad": } {"good": 1}"#;
        let recovered = recover_records(raw, &questions()).unwrap();
        assert_eq!(recovered.strategy, Strategy::ObjectScan);
        assert_eq!(recovered.records.len(), 1);
        assert_eq!(recovered.records[0].get("good"), Some(&json!(1)));
    }

    #[test]
    fn test_object_scan_handles_braces_inside_strings() {
        let raw = r#"{"code":"function f() { return {}; }"} {"n":1}"#;
        let records = scan_objects(raw);
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].get("code"),
            Some(&json!("function f() { return {}; }"))
        );
    }

    #[test]
    fn test_pattern_fallback_when_scan_is_poisoned() {
        // An unterminated string before the object puts the whole scan
        // in-string; only the loose pattern over the original text works
        let raw = r#""unterminated {"key":"a","question":"Q?","options":["x","y"]}"#;
        let recovered = recover_records(raw, &questions()).unwrap();
        assert_eq!(recovered.strategy, Strategy::PatternFallback);
        assert_eq!(recovered.records.len(), 1);
        assert_eq!(recovered.records[0].get_str("key"), Some("a"));
    }

    #[test]
    fn test_unrecoverable_carries_original_text() {
        let raw = "I'm sorry, I can't help with that.";
        let err = recover_records(raw, &questions()).unwrap_err();
        match err {
            LoomError::MalformedPayload { raw: carried } => assert_eq!(carried, raw),
            other => panic!("expected MalformedPayload, got {:?}", other),
        }
    }

    #[test]
    fn test_reassembled_split_chunks_recover_one_record() {
        // Stream scenario: two deltas split mid-key, then stream end
        let mut buffer = String::new();
        buffer.push_str(r#"[{"key":"a1","question":"Q1?","opti"#);
        buffer.push_str(r#"ons":["x","y"]}]"#);

        let records = finalize_records(&buffer, &questions()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get_str("key"), Some("a1"));
        assert_eq!(records[0].get_str("question"), Some("Q1?"));
        assert_eq!(records[0].get("options"), Some(&json!(["x", "y"])));
    }

    #[test]
    fn test_finalize_filters_invalid_records() {
        let raw = r#"[{"key":"a","question":"Q?","options":["x","y"]},{"key":"b"}]"#;
        let records = finalize_records(raw, &questions()).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_finalize_all_invalid_is_validation_failure() {
        let raw = r#"[{"key":"a"},{"key":"b"}]"#;
        let err = finalize_records(raw, &questions()).unwrap_err();
        assert!(matches!(err, LoomError::ValidationFailed(_)));
    }

    #[test]
    fn test_duplicates_are_kept() {
        let raw = r#"[{"a":1},{"a":1}]"#;
        let recovered = recover_records(raw, &questions()).unwrap();
        assert_eq!(recovered.records.len(), 2);
        assert_eq!(recovered.records[0], recovered.records[1]);
    }

    #[test]
    fn test_truncated_file_content_recovers_complete_files() {
        let shape = RecordShape::project_files();
        let raw = r#"[
  {"filename": "package.json", "content": "{\n  \"name\": \"app\"\n}"},
  {"filename": "src/App.jsx", "content": "import React fr"#;
        let recovered = recover_records(raw, &shape).unwrap();
        assert_eq!(recovered.strategy, Strategy::BracketRepair);
        assert_eq!(recovered.records.len(), 1);
        assert_eq!(recovered.records[0].get_str("filename"), Some("package.json"));
    }
}
