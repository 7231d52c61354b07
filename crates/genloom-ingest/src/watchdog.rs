//! Activity watchdog for stalled attempts
//!
//! A provider connection can be accepted and then never produce a single
//! delta. The watchdog polls a shared activity monitor and fails the
//! attempt if nothing has arrived within the idle threshold. It is
//! disarmed by the first content delta: stalls after content has started
//! are intentionally not detected by this mechanism.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use genloom_core::{LoomError, WatchdogConfig};

/// Shared activity state for one attempt.
///
/// Written by the read loop, polled by the watchdog. Cheap to clone; the
/// clones share the same state.
#[derive(Debug, Clone)]
pub struct ActivityMonitor {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    last_activity_ms: AtomicU64,
    content_seen: AtomicBool,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

impl ActivityMonitor {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                last_activity_ms: AtomicU64::new(now_ms()),
                content_seen: AtomicBool::new(false),
            }),
        }
    }

    /// Record raw network activity (any chunk, content or not)
    pub fn touch(&self) {
        self.inner.last_activity_ms.store(now_ms(), Ordering::Relaxed);
    }

    /// Record that a non-empty text delta has arrived; disarms the watchdog
    pub fn mark_content(&self) {
        self.inner.content_seen.store(true, Ordering::Relaxed);
    }

    pub fn content_seen(&self) -> bool {
        self.inner.content_seen.load(Ordering::Relaxed)
    }

    /// Time since the last recorded activity
    pub fn idle_for(&self) -> Duration {
        let last = self.inner.last_activity_ms.load(Ordering::Relaxed);
        Duration::from_millis(now_ms().saturating_sub(last))
    }
}

impl Default for ActivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Watchdog future: resolves with a timeout error if the idle threshold
/// elapses before any content arrives.
///
/// Race this against the read loop with `tokio::select!`; dropping the
/// future when the stream ends or errors cancels the watchdog.
pub async fn watch(monitor: ActivityMonitor, config: WatchdogConfig) -> LoomError {
    let mut interval = tokio::time::interval(config.poll_interval());
    // First tick fires immediately; skip it so a fresh attempt is never
    // judged at t=0
    interval.tick().await;

    loop {
        interval.tick().await;
        if monitor.content_seen() {
            continue;
        }
        if monitor.idle_for() >= config.idle_timeout() {
            tracing::error!(
                "Stream timeout: no content received after {:?}",
                config.idle_timeout()
            );
            return LoomError::Connection(format!(
                "Stream timeout - no content received after {} seconds",
                config.idle_timeout().as_secs()
            ));
        }
    }
}
