//! HTTP adapter over a load-once `LapTimePredictor`

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use racr_core::inference::format_lap_time;
use racr_core::types::CircuitPoint;
use racr_core::{LapTimePredictor, Prediction, Scenario, ScenarioError};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared read-only state of the server
pub struct AppState {
    pub predictor: LapTimePredictor,
    pub circuits: Vec<CircuitPoint>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    model_trees: usize,
    schema_version: u32,
}

#[derive(Debug, Serialize)]
struct TracksResponse {
    tracks: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PredictResponse {
    #[serde(flatten)]
    prediction: Prediction,
    predicted: String,
    delta: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<ScenarioError> for ApiError {
    fn from(err: ScenarioError) -> Self {
        let status = match err {
            ScenarioError::MissingTrack => StatusCode::BAD_REQUEST,
            ScenarioError::NoBaseline(_) => StatusCode::NOT_FOUND,
            ScenarioError::Schema(_) | ScenarioError::NonFinitePrediction => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let payload = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, payload).into_response()
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/tracks", get(handle_tracks))
        .route("/circuit/:track", get(handle_circuit))
        .route("/predict", post(handle_predict))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let artifact = state.predictor.artifact();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        model_trees: artifact.model.num_trees(),
        schema_version: artifact.schema.version,
    })
}

async fn handle_tracks(State(state): State<Arc<AppState>>) -> Json<TracksResponse> {
    let tracks = state
        .predictor
        .predictable_tracks()
        .into_iter()
        .map(str::to_string)
        .collect();
    Json(TracksResponse { tracks })
}

async fn handle_circuit(
    State(state): State<Arc<AppState>>,
    Path(track): Path<String>,
) -> Result<Json<Vec<CircuitPoint>>, ApiError> {
    let points: Vec<CircuitPoint> = state
        .circuits
        .iter()
        .filter(|p| p.track == track)
        .cloned()
        .collect();
    if points.is_empty() {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("no circuit geometry for `{track}`"),
        ));
    }
    Ok(Json(points))
}

async fn handle_predict(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Scenario>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let Json(scenario) = payload?;
    let prediction = state.predictor.predict(&scenario).map_err(|err| {
        warn!("scenario rejected: {}", err);
        ApiError::from(err)
    })?;
    Ok(Json(PredictResponse {
        predicted: format_lap_time(prediction.predicted_seconds),
        delta: format!("{:+.3}s", prediction.delta_seconds),
        prediction,
    }))
}

pub async fn start_server(state: AppState, addr: &str) -> Result<()> {
    let app = build_router(Arc::new(state));
    let listener = bind_listener(addr).await?;
    info!("serving lap-time predictions on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server terminated unexpectedly")
}

async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        tokio::net::TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("failed to bind listener on {socket_addr}"))
    } else {
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind listener on {addr}"))
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", err);
        return;
    }
    info!("shutdown signal received");
}
