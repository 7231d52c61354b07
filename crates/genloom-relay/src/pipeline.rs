//! End-to-end pipeline wiring
//!
//! One job = one bounded attempt loop around streaming attempts, with the
//! relay fed as deltas arrive and exactly one terminal event at the end.
//! The non-streaming fallback shares the same retry policy and recovery
//! chain without the relay.

use std::sync::Arc;

use tokio::sync::mpsc;

use genloom_core::{
    default_retry_class, persist_detached, LoomConfig, LoomError, Record, RecordShape,
    RecordStore, RelayProfile, Result, StreamEvent,
};
use genloom_ingest::{
    finalize_records, run_with_retry, ProgressScanner, RetryPolicy, UpstreamClient,
};

use crate::Relay;

/// Run one streaming job: connect, relay paced chunks and progress to
/// `events`, recover records at stream end, retry on transient failures.
///
/// Emits exactly one `complete` or `error` event, then resolves with the
/// recovered records (also handed to `store` fire-and-forget).
#[allow(clippy::too_many_arguments)]
pub async fn run_streaming(
    client: &UpstreamClient,
    config: &LoomConfig,
    shape: &RecordShape,
    profile: RelayProfile,
    prompt: &str,
    temperature: f64,
    events: mpsc::Sender<StreamEvent>,
    store: Option<Arc<dyn RecordStore>>,
) -> Result<Vec<Record>> {
    let (relay, worker) = Relay::spawn(profile, events);
    let policy = RetryPolicy::from_config(&config.retry);

    let result = run_with_retry(&policy, default_retry_class, |_attempt| {
        let relay = relay.clone();
        let mut scanner = ProgressScanner::for_shape(shape);
        async move {
            let text = client
                .stream_once(prompt, temperature, &config.watchdog, |delta, buffer| {
                    relay.delta(delta);
                    if let Some(update) = scanner.scan(buffer) {
                        relay.progress(update);
                    }
                    // A closed consumer tears down the upstream read too
                    relay.is_open()
                })
                .await?;
            finalize_records(&text, shape)
        }
    })
    .await;

    match &result {
        Ok(records) => {
            tracing::info!("Job complete: {} {} records", records.len(), shape.name);
            if let Some(store) = store {
                persist_detached(store, shape.name.to_string(), records.clone());
            }
            relay.complete(records.clone());
        }
        Err(err) => {
            tracing::error!("Job failed: {}", err);
            relay.fail(user_message(err));
        }
    }

    drop(relay);
    let _ = worker.await;
    result
}

/// Non-streaming fallback: connect, accumulate, recover — no incremental
/// relay. Returns the record list directly.
pub async fn run_blocking(
    client: &UpstreamClient,
    config: &LoomConfig,
    shape: &RecordShape,
    prompt: &str,
    temperature: f64,
    store: Option<Arc<dyn RecordStore>>,
) -> Result<Vec<Record>> {
    let policy = RetryPolicy::from_config(&config.retry);

    let records = run_with_retry(&policy, default_retry_class, |_attempt| async {
        let text = client.generate_once(prompt, temperature).await?;
        finalize_records(&text, shape)
    })
    .await?;

    tracing::info!("Job complete: {} {} records", records.len(), shape.name);
    if let Some(store) = store {
        persist_detached(store, shape.name.to_string(), records.clone());
    }
    Ok(records)
}

/// Error text shown to the consumer; exhausted budgets get the
/// likely-cause summary appended
fn user_message(err: &LoomError) -> String {
    match err {
        LoomError::ExhaustedRetries { .. } => format!("{}. {}", err, err.likely_causes()),
        _ => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_appends_causes_on_exhaustion() {
        let err = LoomError::ExhaustedRetries {
            attempts: 3,
            source: Box::new(LoomError::EmptyResponse),
        };
        let msg = user_message(&err);
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("rate limits"));
    }

    #[test]
    fn test_user_message_passes_terminal_errors_through() {
        let err = LoomError::UpstreamRejection(
            "Content was blocked by AI safety filters. Try rephrasing your request.".into(),
        );
        assert!(user_message(&err).contains("safety filters"));
    }
}
