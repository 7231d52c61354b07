//! Server-Sent Events endpoints for streaming generation
//!
//! Each request spawns one pipeline job; its events are re-encoded as SSE
//! frames (`data: {"type":...}`) on the response stream. The consumer
//! disconnecting closes the channel, which the relay observes and
//! propagates into upstream teardown.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;

use genloom_core::{RecordShape, RelayProfile};

use crate::{pipeline, server::SharedState};

/// Request body for both generation endpoints
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
}

/// POST /v1/questions/stream - stream question generation
pub async fn questions_stream(
    State(app): State<SharedState>,
    Json(req): Json<GenerateRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let profile = app.config.conversational_relay.clone();
    let temperature = app.config.upstream.question_temperature;
    start_job(app, RecordShape::questions(), req.prompt, profile, temperature)
}

/// POST /v1/files/stream - stream project file generation
pub async fn files_stream(
    State(app): State<SharedState>,
    Json(req): Json<GenerateRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let profile = app.config.bulk_relay.clone();
    let temperature = app.config.upstream.file_temperature;
    start_job(app, RecordShape::project_files(), req.prompt, profile, temperature)
}

fn start_job(
    app: SharedState,
    shape: RecordShape,
    prompt: String,
    profile: RelayProfile,
    temperature: f64,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, mut rx) = mpsc::channel(64);

    tokio::spawn(async move {
        // Terminal outcome is already relayed as an event; nothing more
        // to do with the result here
        let _ = pipeline::run_streaming(
            &app.client,
            &app.config,
            &shape,
            profile,
            &prompt,
            temperature,
            tx,
            app.store.clone(),
        )
        .await;
    });

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&event) {
                yield Ok(Event::default().data(json));
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
