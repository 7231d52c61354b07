//! Configuration for the genloom pipeline
//!
//! Loaded from a TOML file; every field has a sensible default so a config
//! file is optional.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{LoomError, Result};

/// Top-level pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoomConfig {
    /// Upstream generative provider settings
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Attempt loop settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Pre-content stall detection settings
    #[serde(default)]
    pub watchdog: WatchdogConfig,

    /// Relay pacing profile for conversational content
    #[serde(default = "RelayProfile::conversational")]
    pub conversational_relay: RelayProfile,

    /// Relay pacing profile for bulk code content
    #[serde(default = "RelayProfile::bulk")]
    pub bulk_relay: RelayProfile,
}

impl Default for LoomConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            retry: RetryConfig::default(),
            watchdog: WatchdogConfig::default(),
            conversational_relay: RelayProfile::conversational(),
            bulk_relay: RelayProfile::bulk(),
        }
    }
}

/// Upstream generative provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the provider API
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable containing the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Sampling temperature for conversational requests
    #[serde(default = "default_question_temperature")]
    pub question_temperature: f64,

    /// Sampling temperature for bulk code requests
    #[serde(default = "default_file_temperature")]
    pub file_temperature: f64,

    /// Maximum output tokens per request
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            question_temperature: default_question_temperature(),
            file_temperature: default_file_temperature(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

/// Attempt loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the initial attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay in milliseconds; delay before retry i is
    /// `base * 2^i`
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

/// Pre-content stall detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// How often to compare "now" against the last-activity timestamp
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Idle time after which an attempt with no content is failed
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

impl WatchdogConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

/// Relay pacing profile: how deltas are re-sliced and paced on the way to
/// the downstream consumer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayProfile {
    /// Characters per forwarded sub-chunk
    pub chunk_size: usize,

    /// Delay between sub-chunks in milliseconds; 0 disables pacing
    pub chunk_delay_ms: u64,
}

impl RelayProfile {
    /// Small chunks with a pacing delay, for smooth conversational display
    pub fn conversational() -> Self {
        Self {
            chunk_size: 30,
            chunk_delay_ms: 20,
        }
    }

    /// Larger chunks with no artificial delay, for bulk code content
    pub fn bulk() -> Self {
        Self {
            chunk_size: 80,
            chunk_delay_ms: 0,
        }
    }

    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }
}

impl LoomConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| LoomError::Other(format!("Invalid config {}: {}", path.display(), e)))
    }

    /// Load from a path if given, otherwise defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_question_temperature() -> f64 {
    0.8
}

fn default_file_temperature() -> f64 {
    0.5
}

fn default_max_output_tokens() -> usize {
    8192
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_idle_timeout_ms() -> u64 {
    45000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoomConfig::default();
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.base_delay_ms, 2000);
        assert_eq!(config.watchdog.poll_interval_ms, 5000);
        assert_eq!(config.watchdog.idle_timeout_ms, 45000);
        assert_eq!(config.conversational_relay.chunk_size, 30);
        assert_eq!(config.conversational_relay.chunk_delay_ms, 20);
        assert_eq!(config.bulk_relay.chunk_size, 80);
        assert_eq!(config.bulk_relay.chunk_delay_ms, 0);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: LoomConfig = toml::from_str(
            r#"
            [retry]
            max_retries = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_ms, 2000);
        assert_eq!(config.upstream.model, "gemini-2.0-flash-exp");
    }

    #[test]
    fn test_load_missing_file_errors() {
        let err = LoomConfig::load(Path::new("/nonexistent/genloom.toml")).unwrap_err();
        assert!(matches!(err, LoomError::Io(_)));
    }
}
