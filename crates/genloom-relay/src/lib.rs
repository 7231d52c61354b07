//! # genloom-relay
//!
//! Delivery side of the genloom pipeline: the paced downstream relay, the
//! end-to-end pipeline wiring (retry loop around streaming attempts plus
//! recovery and persistence), and the axum SSE surface exposing it all to
//! consumers.

mod pipeline;
mod relay;
mod server;
mod sse;

pub use pipeline::{run_blocking, run_streaming};
pub use relay::Relay;
pub use server::{serve, AppState, SharedState};
