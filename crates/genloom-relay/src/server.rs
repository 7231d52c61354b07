//! Axum web server exposing the pipeline
//!
//! Streaming routes relay events as they happen; the non-streaming routes
//! run the blocking fallback and return the record list in one response.
//! Request admission/rate limiting is an external collaborator and not
//! handled here.

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use genloom_core::{LoomConfig, LoomError, Record, RecordShape, RecordStore};
use genloom_ingest::UpstreamClient;

use crate::{pipeline, sse};

/// Shared application state
pub struct AppState {
    pub config: LoomConfig,
    pub client: UpstreamClient,
    pub store: Option<Arc<dyn RecordStore>>,
}

pub type SharedState = Arc<AppState>;

/// Response body for the non-streaming endpoints
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub records: Vec<Record>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

/// Serve the pipeline on `addr`
pub async fn serve(
    config: LoomConfig,
    addr: &str,
    store: Option<Arc<dyn RecordStore>>,
) -> anyhow::Result<()> {
    let client = UpstreamClient::from_env(config.upstream.clone())?;
    let app_state = Arc::new(AppState {
        config,
        client,
        store,
    });

    let app = router(app_state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: SharedState) -> Router {
    Router::new()
        .route("/v1/questions", post(questions))
        .route("/v1/questions/stream", post(sse::questions_stream))
        .route("/v1/files", post(files))
        .route("/v1/files/stream", post(sse::files_stream))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// POST /v1/questions - non-streaming question generation
async fn questions(
    State(app): State<SharedState>,
    Json(req): Json<sse::GenerateRequest>,
) -> Result<Json<GenerateResponse>, (StatusCode, Json<ErrorResponse>)> {
    let temperature = app.config.upstream.question_temperature;
    respond(
        pipeline::run_blocking(
            &app.client,
            &app.config,
            &RecordShape::questions(),
            &req.prompt,
            temperature,
            app.store.clone(),
        )
        .await,
    )
}

/// POST /v1/files - non-streaming project file generation
async fn files(
    State(app): State<SharedState>,
    Json(req): Json<sse::GenerateRequest>,
) -> Result<Json<GenerateResponse>, (StatusCode, Json<ErrorResponse>)> {
    let temperature = app.config.upstream.file_temperature;
    respond(
        pipeline::run_blocking(
            &app.client,
            &app.config,
            &RecordShape::project_files(),
            &req.prompt,
            temperature,
            app.store.clone(),
        )
        .await,
    )
}

fn respond(
    result: genloom_core::Result<Vec<Record>>,
) -> Result<Json<GenerateResponse>, (StatusCode, Json<ErrorResponse>)> {
    match result {
        Ok(records) => {
            let count = records.len();
            Ok(Json(GenerateResponse {
                success: true,
                records,
                count,
            }))
        }
        Err(err) => {
            let status = match err {
                LoomError::BadRequest(_) => StatusCode::BAD_REQUEST,
                LoomError::UpstreamRejection(_) => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            Err((
                status,
                Json(ErrorResponse {
                    success: false,
                    error: err.to_string(),
                }),
            ))
        }
    }
}

/// GET /health
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
