//! ArchaeoScan Protocol - Wire types for daemon communication
//!
//! This crate provides the JSON bodies exchanged between the daemon,
//! browser dashboards, and ESP32 probes.

pub mod message;
pub mod parse;

pub use message::{
    echo_reply, ConnectionStatus, ErrorBody, Esp32Ack, Esp32Status, HealthResponse, ServiceInfo,
    StreamStatus, SystemStatus, ECHO_PREFIX,
};
pub use parse::{parse_esp32_reading, ProtocolError};
