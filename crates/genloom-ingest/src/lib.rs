//! # genloom-ingest
//!
//! Ingestion side of the genloom pipeline: decode the provider's streaming
//! frames, supervise stalled attempts, accumulate text deltas, recover an
//! ordered record list from the final (possibly malformed) buffer, and
//! orchestrate the bounded retry loop around it all.
//!
//! One attempt owns all of its state — decoder carry buffer, activity
//! monitor, accumulated text. Nothing is shared across attempts or jobs.

mod accumulator;
mod client;
mod decoder;
mod envelope;
mod recover;
mod retry;
mod watchdog;

pub use accumulator::{Accumulator, ProgressScanner, ProgressUpdate};
pub use client::UpstreamClient;
pub use decoder::FrameDecoder;
pub use envelope::Envelope;
pub use recover::{finalize_records, recover_records, Recovered, Strategy};
pub use retry::{run_with_retry, RetryPolicy};
pub use watchdog::{watch, ActivityMonitor};
