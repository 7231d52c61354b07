//! Protocol envelopes
//!
//! One envelope is one JSON payload inside a streaming frame. The provider
//! wire shape (Gemini `streamGenerateContent`) nests the interesting bits a
//! few levels down; deserialization is deliberately loose so one oddly
//! shaped envelope never aborts the stream.

use serde::Deserialize;

/// One decoded protocol unit
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// A text delta, possibly empty
    TextDelta(String),
    /// The provider signalled the end of generation
    Finish(String),
    /// The provider signalled an error; `blocked` marks safety/policy
    /// rejections, which are never retried
    Error { message: String, blocked: bool },
}

#[derive(Debug, Deserialize)]
struct EnvelopePayload {
    error: Option<ApiError>,
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    parts: Option<Vec<Part>>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl Envelope {
    /// Parse one envelope JSON string.
    ///
    /// Returns `None` for malformed or empty envelopes; the decoder skips
    /// those silently.
    pub fn parse(json: &str) -> Option<Envelope> {
        let payload: EnvelopePayload = serde_json::from_str(json).ok()?;

        if let Some(error) = payload.error {
            return Some(Envelope::Error {
                message: error
                    .message
                    .unwrap_or_else(|| "Upstream API error".to_string()),
                blocked: false,
            });
        }

        let candidate = payload.candidates?.into_iter().next()?;
        let text = candidate
            .content
            .and_then(|c| c.parts)
            .and_then(|parts| parts.into_iter().next())
            .and_then(|p| p.text);

        match (text, candidate.finish_reason) {
            // A safety block with no accompanying content is terminal
            (None, Some(reason)) if reason == "SAFETY" => Some(Envelope::Error {
                message: "Content was blocked by AI safety filters. Try rephrasing your request."
                    .to_string(),
                blocked: true,
            }),
            (None, Some(reason)) => Some(Envelope::Finish(reason)),
            (Some(text), _) => Some(Envelope::TextDelta(text)),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_delta() {
        let json = r#"{"candidates":[{"content":{"parts":[{"text":"hello"}]}}]}"#;
        assert_eq!(
            Envelope::parse(json),
            Some(Envelope::TextDelta("hello".into()))
        );
    }

    #[test]
    fn test_parse_empty_delta() {
        let json = r#"{"candidates":[{"content":{"parts":[{"text":""}]}}]}"#;
        assert_eq!(Envelope::parse(json), Some(Envelope::TextDelta("".into())));
    }

    #[test]
    fn test_parse_api_error() {
        let json = r#"{"error":{"message":"quota exceeded"}}"#;
        assert_eq!(
            Envelope::parse(json),
            Some(Envelope::Error {
                message: "quota exceeded".into(),
                blocked: false,
            })
        );
    }

    #[test]
    fn test_parse_safety_block_without_content() {
        let json = r#"{"candidates":[{"finishReason":"SAFETY"}]}"#;
        match Envelope::parse(json) {
            Some(Envelope::Error { blocked, .. }) => assert!(blocked),
            other => panic!("expected blocked error, got {:?}", other),
        }
    }

    #[test]
    fn test_safety_reason_with_text_is_still_a_delta() {
        let json =
            r#"{"candidates":[{"content":{"parts":[{"text":"tail"}]},"finishReason":"SAFETY"}]}"#;
        assert_eq!(
            Envelope::parse(json),
            Some(Envelope::TextDelta("tail".into()))
        );
    }

    #[test]
    fn test_parse_finish_reason() {
        let json = r#"{"candidates":[{"finishReason":"STOP"}]}"#;
        assert_eq!(Envelope::parse(json), Some(Envelope::Finish("STOP".into())));
    }

    #[test]
    fn test_malformed_envelope_is_skipped() {
        assert_eq!(Envelope::parse("{not json"), None);
        assert_eq!(Envelope::parse(r#"{"candidates":[]}"#), None);
    }
}
