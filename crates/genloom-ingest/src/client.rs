//! Upstream generative provider client
//!
//! One client serves both paths: `stream_once` performs a single streaming
//! attempt (frame decode, accumulate, watchdog race), `generate_once`
//! performs the synchronous fallback. Retry orchestration lives above
//! both, in [`crate::run_with_retry`].

use futures::StreamExt;
use serde_json::json;

use genloom_core::{LoomError, Result, UpstreamConfig, WatchdogConfig};

use crate::{watchdog, Accumulator, ActivityMonitor, Envelope, FrameDecoder};

/// HTTP client for the upstream provider
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    config: UpstreamConfig,
    api_key: String,
}

/// Per-attempt mutable state. Owned exclusively by one attempt and
/// destroyed when it concludes; no two attempts share a buffer or timer.
struct AttemptState {
    monitor: ActivityMonitor,
    decoder: FrameDecoder,
    accumulator: Accumulator,
}

impl AttemptState {
    fn new() -> Self {
        Self {
            monitor: ActivityMonitor::new(),
            decoder: FrameDecoder::new(),
            accumulator: Accumulator::new(),
        }
    }
}

impl UpstreamClient {
    /// Build a client, reading the API key from the configured
    /// environment variable
    pub fn from_env(config: UpstreamConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            LoomError::Other(format!(
                "API key missing: set the {} environment variable",
                config.api_key_env
            ))
        })?;
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| LoomError::Other(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            config,
            api_key,
        })
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.config.endpoint, self.config.model, self.api_key
        )
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.config.endpoint, self.config.model, self.api_key
        )
    }

    fn request_body(&self, prompt: &str, temperature: f64) -> serde_json::Value {
        json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": temperature,
                "topK": 40,
                "topP": 0.95,
                "maxOutputTokens": self.config.max_output_tokens,
            },
            "safetySettings": [
                { "category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_ONLY_HIGH" },
                { "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "BLOCK_ONLY_HIGH" },
                { "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": "BLOCK_ONLY_HIGH" },
                { "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": "BLOCK_ONLY_HIGH" },
            ],
        })
    }

    /// One streaming attempt: connect, decode frames, accumulate deltas,
    /// race the watchdog. Returns the final accumulated text.
    ///
    /// `on_delta` is called with each non-empty delta and the full buffer
    /// so far; returning `false` cancels the attempt (consumer gone) and
    /// tears down the upstream read.
    pub async fn stream_once(
        &self,
        prompt: &str,
        temperature: f64,
        watchdog_config: &WatchdogConfig,
        mut on_delta: impl FnMut(&str, &str) -> bool,
    ) -> Result<String> {
        let response = self
            .http
            .post(self.stream_url())
            .json(&self.request_body(prompt, temperature))
            .send()
            .await
            .map_err(|e| LoomError::Connection(format!("Failed to connect: {}", e)))?;
        let response = check_status(response).await?;

        tracing::debug!("Stream connection established");

        let mut state = AttemptState::new();
        let mut stream = response.bytes_stream();

        let watchdog = watchdog::watch(state.monitor.clone(), watchdog_config.clone());
        tokio::pin!(watchdog);

        loop {
            tokio::select! {
                err = &mut watchdog => {
                    // Returning drops the response stream, tearing down
                    // the underlying read
                    return Err(err);
                }
                chunk = stream.next() => {
                    match chunk {
                        Some(Ok(bytes)) => {
                            state.monitor.touch();
                            for envelope in state.decoder.push(&bytes) {
                                apply_envelope(envelope, &mut state, &mut on_delta)?;
                            }
                        }
                        Some(Err(e)) => {
                            return Err(LoomError::Connection(format!("Stream error: {}", e)));
                        }
                        None => break,
                    }
                }
            }
        }

        for envelope in state.decoder.finish() {
            apply_envelope(envelope, &mut state, &mut on_delta)?;
        }

        tracing::debug!("Stream ended with {} chars", state.accumulator.len());
        if state.accumulator.is_empty() {
            return Err(LoomError::EmptyResponse);
        }
        Ok(state.accumulator.into_text())
    }

    /// Non-streaming fallback: one synchronous generation call, returning
    /// the full response text
    pub async fn generate_once(&self, prompt: &str, temperature: f64) -> Result<String> {
        let response = self
            .http
            .post(self.generate_url())
            .json(&self.request_body(prompt, temperature))
            .send()
            .await
            .map_err(|e| LoomError::Connection(format!("Failed to connect: {}", e)))?;
        let response = check_status(response).await?;

        let body = response
            .text()
            .await
            .map_err(|e| LoomError::Connection(format!("Failed to read response: {}", e)))?;

        match Envelope::parse(&body) {
            Some(Envelope::TextDelta(text)) if !text.is_empty() => Ok(text),
            Some(Envelope::Error { message, blocked }) => {
                if blocked {
                    Err(LoomError::UpstreamRejection(message))
                } else {
                    Err(LoomError::Upstream(message))
                }
            }
            _ => Err(LoomError::EmptyResponse),
        }
    }
}

fn apply_envelope(
    envelope: Envelope,
    state: &mut AttemptState,
    on_delta: &mut impl FnMut(&str, &str) -> bool,
) -> Result<()> {
    match envelope {
        Envelope::TextDelta(text) => {
            if !text.is_empty() {
                state.monitor.mark_content();
                state.accumulator.append(&text);
                if !on_delta(&text, state.accumulator.text()) {
                    return Err(LoomError::Cancelled);
                }
            }
            Ok(())
        }
        Envelope::Finish(reason) => {
            tracing::debug!("Stream finish reason: {}", reason);
            Ok(())
        }
        Envelope::Error { message, blocked } => {
            if blocked {
                Err(LoomError::UpstreamRejection(message))
            } else {
                Err(LoomError::Upstream(message))
            }
        }
    }
}

/// Map HTTP status codes onto the error taxonomy
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_else(|_| "Unknown".to_string());
    tracing::error!("Upstream API error {}: {}", status, body);

    match status.as_u16() {
        429 => Err(LoomError::Upstream(
            "API rate limit exceeded. Please wait a moment and try again.".to_string(),
        )),
        403 => Err(LoomError::BadRequest(
            "API access denied. Please check your API key.".to_string(),
        )),
        code if (400..500).contains(&code) => {
            Err(LoomError::BadRequest(format!("Upstream API error {}: {}", status, body)))
        }
        _ => Err(LoomError::Upstream(format!(
            "Upstream API error {}: {}",
            status, body
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn test_client() -> UpstreamClient {
        UpstreamClient {
            http: reqwest::Client::new(),
            config: UpstreamConfig::default(),
            api_key: "test-key".into(),
        }
    }

    /// Serve one canned HTTP response on a local listener and return the
    /// endpoint to point the client at
    async fn stub_upstream(body: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // Drain the request before replying; the content is irrelevant
            let mut buf = vec![0u8; 4096];
            let mut request = Vec::new();
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        request.extend_from_slice(&buf[..n]);
                        if request.windows(4).any(|w| w == b"\r\n\r\n")
                            && request.ends_with(b"}")
                        {
                            break;
                        }
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
        });

        format!("http://{}", addr)
    }

    #[test]
    fn test_urls_carry_model_and_key() {
        let client = test_client();
        let url = client.stream_url();
        assert!(url.contains(":streamGenerateContent?alt=sse&key=test-key"));
        assert!(url.contains("gemini-2.0-flash-exp"));
        assert!(client.generate_url().contains(":generateContent?key=test-key"));
    }

    #[test]
    fn test_request_body_shape() {
        let client = test_client();
        let body = client.request_body("hello", 0.8);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["generationConfig"]["temperature"], 0.8);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);
        assert_eq!(body["safetySettings"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_stream_without_deltas_is_empty_response() {
        // The upstream connects and finishes cleanly without ever
        // producing a text delta
        let endpoint =
            stub_upstream("data: {\"candidates\":[{\"finishReason\":\"STOP\"}]}\n\n").await;

        let mut config = UpstreamConfig::default();
        config.endpoint = endpoint;
        let client = UpstreamClient {
            http: reqwest::Client::new(),
            config,
            api_key: "test-key".into(),
        };

        let watchdog = WatchdogConfig {
            poll_interval_ms: 50,
            idle_timeout_ms: 5000,
        };
        let err = client
            .stream_once("prompt", 0.8, &watchdog, |_, _| true)
            .await
            .unwrap_err();
        assert!(matches!(err, LoomError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_stream_with_deltas_returns_accumulated_text() {
        let endpoint = stub_upstream(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"[{\\\"a\\\":\"}]}}]}\n\n\
             data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"1}]\"}]}}]}\n\n",
        )
        .await;

        let mut config = UpstreamConfig::default();
        config.endpoint = endpoint;
        let client = UpstreamClient {
            http: reqwest::Client::new(),
            config,
            api_key: "test-key".into(),
        };

        let watchdog = WatchdogConfig {
            poll_interval_ms: 50,
            idle_timeout_ms: 5000,
        };
        let mut deltas = Vec::new();
        let text = client
            .stream_once("prompt", 0.8, &watchdog, |delta, _| {
                deltas.push(delta.to_string());
                true
            })
            .await
            .unwrap();
        assert_eq!(text, "[{\"a\":1}]");
        assert_eq!(deltas.len(), 2);
    }

    #[test]
    fn test_from_env_requires_key() {
        let mut config = UpstreamConfig::default();
        config.api_key_env = "GENLOOM_TEST_MISSING_KEY".into();
        let err = UpstreamClient::from_env(config).unwrap_err();
        assert!(err.to_string().contains("GENLOOM_TEST_MISSING_KEY"));
    }
}
