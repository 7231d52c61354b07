//! Paced downstream relay
//!
//! Re-slices upstream text deltas into fixed-size sub-chunks and forwards
//! them as [`StreamEvent::Chunk`]s, paced by the active profile. The relay
//! runs in its own task so its pacing delay never stalls the upstream
//! read loop: accumulation proceeds while forwarding lags behind.
//!
//! Every write checks that the downstream sink is still open and stops
//! immediately if not; exactly one terminal event is emitted per job.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use genloom_core::{Record, RelayProfile, StreamEvent};
use genloom_ingest::ProgressUpdate;

enum Command {
    Delta(String),
    Progress(ProgressUpdate),
    Complete(Vec<Record>),
    Fail(String),
}

/// Handle for feeding the relay. Cheap to clone; all clones feed the same
/// forwarding task.
#[derive(Clone)]
pub struct Relay {
    cmd_tx: mpsc::UnboundedSender<Command>,
    open: Arc<AtomicBool>,
}

impl Relay {
    /// Spawn the forwarding task. Events land on `events`; the returned
    /// handle resolves when the relay shuts down (terminal event sent,
    /// sink closed, or all `Relay` clones dropped).
    pub fn spawn(
        profile: RelayProfile,
        events: mpsc::Sender<StreamEvent>,
    ) -> (Relay, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));
        let worker = tokio::spawn(run(profile, cmd_rx, events, open.clone()));
        (Relay { cmd_tx, open }, worker)
    }

    /// Whether the downstream consumer is still connected. Checked by the
    /// upstream read loop to avoid wasted work after a disconnect.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    /// Queue one raw upstream delta for re-chunked, paced forwarding
    pub fn delta(&self, text: &str) {
        let _ = self.cmd_tx.send(Command::Delta(text.to_string()));
    }

    /// Queue a progress observation
    pub fn progress(&self, update: ProgressUpdate) {
        let _ = self.cmd_tx.send(Command::Progress(update));
    }

    /// Queue the terminal success event
    pub fn complete(&self, records: Vec<Record>) {
        let _ = self.cmd_tx.send(Command::Complete(records));
    }

    /// Queue the terminal failure event
    pub fn fail(&self, message: String) {
        let _ = self.cmd_tx.send(Command::Fail(message));
    }
}

async fn run(
    profile: RelayProfile,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    events: mpsc::Sender<StreamEvent>,
    open: Arc<AtomicBool>,
) {
    let mut last_count = 0usize;

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            Command::Delta(text) => {
                if !forward_delta(&profile, &events, &text).await {
                    tracing::debug!("Downstream sink closed, relay stopping");
                    break;
                }
            }
            Command::Progress(update) => {
                let (event, count) = match update {
                    ProgressUpdate::Count(count) => (StreamEvent::Progress { count }, count),
                    ProgressUpdate::Named { name, count } => {
                        (StreamEvent::Milestone { name, count }, count)
                    }
                };
                // Forward only strict increases; counts never repeat or
                // decrease downstream
                if count <= last_count {
                    continue;
                }
                last_count = count;
                if !send(&events, event).await {
                    break;
                }
            }
            Command::Complete(records) => {
                let count = records.len();
                let _ = send(&events, StreamEvent::Complete { records, count }).await;
                break;
            }
            Command::Fail(message) => {
                let _ = send(&events, StreamEvent::Error { error: message }).await;
                break;
            }
        }
    }

    open.store(false, Ordering::Relaxed);
}

/// Re-slice one delta into profile-sized sub-chunks, pacing between them
async fn forward_delta(
    profile: &RelayProfile,
    events: &mpsc::Sender<StreamEvent>,
    text: &str,
) -> bool {
    let chars: Vec<char> = text.chars().collect();
    let size = profile.chunk_size.max(1);
    let pieces = chars.chunks(size).count();

    for (i, piece) in chars.chunks(size).enumerate() {
        let chunk: String = piece.iter().collect();
        if !send(events, StreamEvent::Chunk { chunk }).await {
            return false;
        }
        // Pace between sub-chunks, not after the last one
        if profile.chunk_delay_ms > 0 && i + 1 < pieces {
            tokio::time::sleep(profile.chunk_delay()).await;
        }
    }
    true
}

/// Send one event, tolerating a closed sink
async fn send(events: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> bool {
    if events.is_closed() {
        return false;
    }
    events.send(event).await.is_ok()
}
