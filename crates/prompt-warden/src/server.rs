use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use detect_engine::{DetectionEngine, DetectionResult};

#[derive(Debug, Deserialize)]
struct DetectRequest {
    input: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Run the HTTP detection API until the process is stopped.
///
/// Endpoints:
/// - `POST /detect` with `{"input": "..."}` returns the serialized
///   detection result.
/// - `GET /health` returns `{"status":"ok"}`.
pub async fn run(engine: DetectionEngine, port: u16) -> Result<()> {
    let state = Arc::new(engine);

    let app = Router::new()
        .route("/detect", post(detect_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(%addr, "prompt-warden API listening");
    axum::serve(listener, app)
        .await
        .context("HTTP server error")?;

    Ok(())
}

async fn detect_handler(
    State(engine): State<Arc<DetectionEngine>>,
    Json(request): Json<DetectRequest>,
) -> Json<DetectionResult> {
    let result = engine
        .detect(&request.input, &CancellationToken::new())
        .await;
    Json(result)
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
