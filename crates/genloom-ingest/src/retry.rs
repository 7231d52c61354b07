//! Bounded attempt loop with exponential backoff
//!
//! Wraps one logical request in a retry loop. Which failures are worth
//! another attempt is decided by an injected classifier so the streaming
//! and non-streaming paths share one policy.

use std::future::Future;
use std::time::Duration;

use genloom_core::{LoomError, Result, RetryClass, RetryConfig};

/// Attempt budget and backoff parameters
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// Base backoff delay
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.base_delay(),
        }
    }

    /// Delay before retry `i` (zero-indexed): `base * 2^i`. Never applied
    /// before the first attempt.
    pub fn backoff_delay(&self, retry_index: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(retry_index)
    }

    /// Total attempts the budget allows
    pub fn max_attempts(&self) -> usize {
        self.max_retries as usize + 1
    }
}

/// Run `attempt` until it succeeds, a terminal error occurs, or the budget
/// is exhausted.
///
/// The closure receives the zero-based attempt index. On exhaustion the
/// last underlying error is wrapped: an unrecoverable-parse chain becomes
/// a [`LoomError::ValidationFailed`] (another attempt will not help the
/// caller), everything else becomes [`LoomError::ExhaustedRetries`].
pub async fn run_with_retry<T, C, F, Fut>(
    policy: &RetryPolicy,
    classify: C,
    mut attempt: F,
) -> Result<T>
where
    C: Fn(&LoomError) -> RetryClass,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err: Option<LoomError> = None;

    for attempt_index in 0..=policy.max_retries {
        if attempt_index > 0 {
            let delay = policy.backoff_delay(attempt_index - 1);
            tracing::warn!(
                "Waiting {:?} before retry (attempt {}/{})",
                delay,
                attempt_index + 1,
                policy.max_attempts()
            );
            tokio::time::sleep(delay).await;
        }

        tracing::debug!("Attempt {}/{}", attempt_index + 1, policy.max_attempts());
        match attempt(attempt_index).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if classify(&err) == RetryClass::Terminal {
                    tracing::error!("Terminal error on attempt {}: {}", attempt_index + 1, err);
                    return Err(err);
                }
                tracing::warn!("Attempt {} failed: {}", attempt_index + 1, err);
                last_err = Some(err);
            }
        }
    }

    let source = last_err.unwrap_or_else(|| LoomError::Other("no attempts were made".into()));
    Err(exhausted(policy.max_attempts(), source))
}

fn exhausted(attempts: usize, source: LoomError) -> LoomError {
    match source {
        LoomError::MalformedPayload { .. } => LoomError::ValidationFailed(format!(
            "No valid records could be recovered after {} attempts. {}",
            attempts,
            source.likely_causes()
        )),
        other => LoomError::ExhaustedRetries {
            attempts,
            source: Box::new(other),
        },
    }
}
