//! REST handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use tracing::warn;

use scan_core::{Esp32Reading, SensorSnapshot};
use scan_protocol::{
    parse_esp32_reading, ConnectionStatus, ErrorBody, Esp32Ack, Esp32Status, HealthResponse,
    ProtocolError, ServiceInfo, StreamStatus, SystemStatus,
};

use super::AppState;

/// Error returned by REST handlers, rendered as `{"detail": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Unprocessable(String),
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::NotFound(detail) => (StatusCode::NOT_FOUND, detail),
            Self::Unprocessable(detail) => (StatusCode::UNPROCESSABLE_ENTITY, detail),
            Self::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
        };
        (status, Json(ErrorBody::new(detail))).into_response()
    }
}

impl From<ProtocolError> for ApiError {
    fn from(err: ProtocolError) -> Self {
        if err.is_unprocessable() {
            Self::Unprocessable(err.to_string())
        } else {
            Self::BadRequest(err.to_string())
        }
    }
}

pub(super) async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::new(env!("CARGO_PKG_VERSION")))
}

pub(super) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(state.registry.len().await))
}

pub(super) async fn stream_status(State(state): State<AppState>) -> Json<StreamStatus> {
    let clients = state.registry.connections().await;
    Json(StreamStatus {
        state: state.broadcast.state(),
        ticks: state.broadcast.ticks(),
        interval_ms: state.broadcast.interval().as_millis() as u64,
        connections: clients.len(),
        clients,
    })
}

pub(super) async fn stream_latest(
    State(state): State<AppState>,
) -> Result<Json<SensorSnapshot>, ApiError> {
    state
        .broadcast
        .latest()
        .map(|snapshot| Json((*snapshot).clone()))
        .ok_or_else(|| ApiError::NotFound("No snapshot generated yet".to_string()))
}

pub(super) async fn system_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let metrics = *state.metrics.borrow();
    let connections = state.registry.len().await;

    Json(SystemStatus {
        timestamp: Utc::now(),
        device_id: state.config.simulator.device_id.clone(),
        battery_level: state.broadcast.latest().map(|s| s.sensors.battery),
        connection_status: ConnectionStatus::from_count(connections),
        stream_state: state.broadcast.state(),
        cpu_usage: metrics.cpu_percent,
        memory_mb: metrics.memory_mb,
    })
}

pub(super) async fn esp32_ingest(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<Esp32Ack>, ApiError> {
    let now = Utc::now();
    let reading = parse_esp32_reading(&body, &state.config.simulator.device_id, now)
        .map_err(|e| {
            warn!(error = %e, "Rejected ESP32 payload");
            ApiError::from(e)
        })?;

    state.esp32.record(reading).await;
    Ok(Json(Esp32Ack::success(now)))
}

pub(super) async fn esp32_latest(
    State(state): State<AppState>,
) -> Result<Json<Esp32Reading>, ApiError> {
    state
        .esp32
        .latest()
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No data available".to_string()))
}

pub(super) async fn esp32_status(State(state): State<AppState>) -> Json<Esp32Status> {
    Json(state.esp32.status(Utc::now()).await)
}
