//! Sensor snapshot entities and value objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::bounds::SensorBounds;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Identifier of the probe that produced a reading (e.g. "archaeoscan_001").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

/// Device id used by the simulator when none is configured.
pub const DEFAULT_DEVICE_ID: &str = "archaeoscan_001";

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE_ID)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// Value Objects
// ============================================================================

/// Three-axis reading (magnetometer, accelerometer, gyroscope).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Same value on every axis.
    pub const fn splat(v: f64) -> Self {
        Self::new(v, v, v)
    }

    pub fn axes(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// Where the probe is: WGS84 coordinates plus depth below surface in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    pub depth: f64,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            lat: 40.7128,
            lng: -74.0060,
            depth: 15.2,
        }
    }
}

/// Operating state reported alongside each snapshot. The simulator is
/// always sampling, so `active` is the only state it reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    #[default]
    Active,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every channel sampled in one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReadings {
    /// Battery charge (%)
    pub battery: f64,
    /// Water temperature (°C)
    pub temperature: f64,
    /// Ambient pressure (hPa)
    pub pressure: f64,
    /// Housing humidity (%)
    pub humidity: f64,
    /// Turbidity (NTU)
    pub turbidity: f64,
    /// Total dissolved solids (ppm)
    pub tds: f64,
    /// Depth (m)
    pub depth: f64,
    pub ph: f64,
    pub magnetometer: Vector3,
    pub accelerometer: Vector3,
    pub gyroscope: Vector3,
}

impl SensorReadings {
    /// Scalar channels paired with their wire names.
    pub fn scalars(&self) -> [(&'static str, f64); 8] {
        [
            ("battery", self.battery),
            ("temperature", self.temperature),
            ("pressure", self.pressure),
            ("humidity", self.humidity),
            ("turbidity", self.turbidity),
            ("tds", self.tds),
            ("depth", self.depth),
            ("ph", self.ph),
        ]
    }

    /// Vector channels paired with their wire names.
    pub fn vectors(&self) -> [(&'static str, Vector3); 3] {
        [
            ("magnetometer", self.magnetometer),
            ("accelerometer", self.accelerometer),
            ("gyroscope", self.gyroscope),
        ]
    }

    /// Names of channels whose value falls outside `bounds`.
    pub fn out_of_bounds(&self, bounds: &SensorBounds) -> Vec<&'static str> {
        let scalar_bounds = [
            &bounds.battery,
            &bounds.temperature,
            &bounds.pressure,
            &bounds.humidity,
            &bounds.turbidity,
            &bounds.tds,
            &bounds.depth,
            &bounds.ph,
        ];
        let vector_bounds = [&bounds.magnetometer, &bounds.accelerometer, &bounds.gyroscope];

        let scalars = self
            .scalars()
            .into_iter()
            .zip(scalar_bounds)
            .filter(|((_, value), b)| !b.contains(*value))
            .map(|((name, _), _)| name);

        let vectors = self
            .vectors()
            .into_iter()
            .zip(vector_bounds)
            .filter(|((_, v), b)| v.axes().iter().any(|axis| !b.contains(*axis)))
            .map(|((name, _), _)| name);

        scalars.chain(vectors).collect()
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// One generated set of sensor values for a single tick.
///
/// Snapshots are built once and then shared read-only (`Arc<SensorSnapshot>`)
/// between the broadcast loop, the latest-snapshot cache, and REST handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    /// Tick that produced this snapshot. Not part of the wire format.
    #[serde(skip)]
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub device_id: DeviceId,
    pub sensors: SensorReadings,
    pub status: DeviceStatus,
    pub location: Location,
}

impl SensorSnapshot {
    /// Serializes to the JSON text frame sent to dashboards.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
