//! ArchaeoScan Core - Shared types for sensor telemetry
//!
//! This crate provides the core domain types shared between
//! the daemon (scand) and the wire protocol (scan-protocol).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod bounds;
pub mod connection;
pub mod error;
pub mod lifecycle;
pub mod reading;
pub mod snapshot;

// Re-exports for convenience
pub use bounds::{FieldBounds, SensorBounds};
pub use connection::{ConnectionId, ConnectionView, SendOutcome};
pub use error::{DomainError, DomainResult};
pub use lifecycle::LoopState;
pub use reading::Esp32Reading;
pub use snapshot::{
    DeviceId, DeviceStatus, Location, SensorReadings, SensorSnapshot, Vector3, DEFAULT_DEVICE_ID,
};
