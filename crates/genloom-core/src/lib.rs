//! # genloom-core
//!
//! Core types for the genloom streaming recovery pipeline.
//!
//! Genloom ingests an incrementally-delivered text stream from a generative
//! provider and reconstructs a well-formed ordered list of records from it,
//! even when the provider truncates output, emits malformed JSON, or stalls.
//!
//! ## Core Paradigm
//!
//! - Records are ordered field maps validated by an injected shape, not
//!   hard-coded schemas
//! - Repair heuristics are an ordered strategy chain, not nested branches
//! - Retry classification is a shared injectable function
//! - One attempt owns its buffer; attempts never share state

mod config;
mod error;
mod events;
mod record;
mod store;

pub use config::{LoomConfig, RelayProfile, RetryConfig, UpstreamConfig, WatchdogConfig};
pub use error::{default_retry_class, LoomError, Result, RetryClass};
pub use events::StreamEvent;
pub use record::{Record, RecordShape};
pub use store::{persist_detached, JsonDirStore, RecordStore};
