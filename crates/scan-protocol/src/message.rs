//! Response bodies for the REST surface and stream replies.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use scan_core::{ConnectionView, DeviceId, Esp32Reading, LoopState};
use serde::{Deserialize, Serialize};

/// Prefix of the reply sent for any text frame a dashboard sends.
pub const ECHO_PREFIX: &str = "Echo: ";

/// Builds the reply for a text frame received from a dashboard.
pub fn echo_reply(text: &str) -> String {
    format!("{ECHO_PREFIX}{text}")
}

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub message: String,
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    /// Endpoint name to path
    pub endpoints: BTreeMap<String, String>,
}

impl ServiceInfo {
    /// Creates the service banner with the standard endpoint map.
    pub fn new(version: &str) -> Self {
        let endpoints = [
            ("websocket", "/ws"),
            ("health", "/health"),
            ("stream_status", "/api/stream/status"),
            ("stream_latest", "/api/stream/latest"),
            ("system_status", "/api/system/status"),
            ("esp32_data", "/api/esp32/data"),
            ("esp32_status", "/api/esp32/status"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            message: "ArchaeoScan WebSocket Server".to_string(),
            status: "running".to_string(),
            version: version.to_string(),
            timestamp: Utc::now(),
            endpoints,
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// Number of open streaming connections
    pub connections: usize,
}

impl HealthResponse {
    pub fn healthy(connections: usize) -> Self {
        Self {
            status: "healthy".to_string(),
            connections,
        }
    }
}

/// Body of `GET /api/stream/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamStatus {
    pub state: LoopState,
    /// Ticks completed since the loop started
    pub ticks: u64,
    pub interval_ms: u64,
    pub connections: usize,
    pub clients: Vec<ConnectionView>,
}

/// Whether any dashboard is currently attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

impl ConnectionStatus {
    pub fn from_count(connections: usize) -> Self {
        if connections > 0 {
            Self::Connected
        } else {
            Self::Disconnected
        }
    }
}

/// Body of `GET /api/system/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub timestamp: DateTime<Utc>,
    pub device_id: DeviceId,
    /// Battery level from the most recent snapshot, if any tick has run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<f64>,
    pub connection_status: ConnectionStatus,
    pub stream_state: LoopState,
    /// Daemon process CPU usage (%)
    pub cpu_usage: f32,
    /// Daemon process resident memory (MB)
    pub memory_mb: u64,
}

/// Reply to `POST /api/esp32/data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Esp32Ack {
    pub status: String,
    pub message: String,
    /// Unix seconds at receipt
    pub timestamp: i64,
}

impl Esp32Ack {
    pub fn success(at: DateTime<Utc>) -> Self {
        Self {
            status: "success".to_string(),
            message: "Data received successfully".to_string(),
            timestamp: at.timestamp(),
        }
    }
}

/// Body of `GET /api/esp32/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Esp32Status {
    pub connected: bool,
    pub last_seen: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_since_last: Option<i64>,
    pub message: String,
    /// Readings accepted since the daemon started
    pub readings_received: u64,
}

impl Esp32Status {
    /// Status for a daemon that has not heard from any probe yet.
    pub fn never_seen() -> Self {
        Self {
            connected: false,
            last_seen: None,
            seconds_since_last: None,
            message: "No data received yet".to_string(),
            readings_received: 0,
        }
    }

    /// Status derived from the most recent reading and the running total.
    pub fn from_reading(
        reading: &Esp32Reading,
        now: DateTime<Utc>,
        online_window_secs: i64,
        readings_received: u64,
    ) -> Self {
        let age = reading.age_secs(now);
        let connected = age < online_window_secs;
        let message = if connected {
            "Online".to_string()
        } else {
            format!("Offline (last seen {age}s ago)")
        };

        Self {
            connected,
            last_seen: Some(reading.received_at.timestamp()),
            seconds_since_last: Some(age),
            message,
            readings_received,
        }
    }
}

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl ErrorBody {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}
