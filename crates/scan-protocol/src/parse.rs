//! Parsing probe payloads into domain readings.

use chrono::{DateTime, Utc};
use scan_core::{DeviceId, DomainError, Esp32Reading, Location};
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while decoding a probe payload.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid reading: {0}")]
    InvalidReading(#[from] DomainError),
}

impl ProtocolError {
    /// Whether the body was well-formed JSON carrying an unusable reading
    /// (missing or mistyped field, value out of range).
    pub fn is_unprocessable(&self) -> bool {
        match self {
            Self::InvalidJson(e) => e.is_data(),
            Self::InvalidReading(_) => true,
        }
    }
}

/// Payload an ESP32 probe posts to `/api/esp32/data`.
///
/// `device_id` is optional on older firmware; readings without one are
/// attributed to the fallback id supplied by the caller.
#[derive(Debug, Deserialize)]
struct RawEsp32Reading {
    lat: f64,
    lng: f64,
    depth: f64,
    /// Magnetic field strength
    mag: f64,
    spectrum: Vec<f64>,
    timestamp: i64,
    #[serde(default)]
    device_id: Option<String>,
}

impl RawEsp32Reading {
    fn into_reading(
        self,
        fallback_device: &DeviceId,
        received_at: DateTime<Utc>,
    ) -> Result<Esp32Reading, DomainError> {
        let device_id = self
            .device_id
            .filter(|id| !id.trim().is_empty())
            .map(DeviceId::new)
            .unwrap_or_else(|| fallback_device.clone());

        Esp32Reading::new(
            device_id,
            Location {
                lat: self.lat,
                lng: self.lng,
                depth: self.depth,
            },
            self.mag,
            self.spectrum,
            self.timestamp,
            received_at,
        )
    }
}

/// Decodes and validates a probe payload in one step.
pub fn parse_esp32_reading(
    json: &str,
    fallback_device: &DeviceId,
    received_at: DateTime<Utc>,
) -> Result<Esp32Reading, ProtocolError> {
    let raw: RawEsp32Reading = serde_json::from_str(json)?;
    Ok(raw.into_reading(fallback_device, received_at)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fallback() -> DeviceId {
        DeviceId::new("archaeoscan_001")
    }

    #[test]
    fn test_parse_full_payload() {
        let json = r#"{
            "lat": 55.7558, "lng": 37.6176, "depth": 3.2, "mag": 48.5,
            "spectrum": [0.15, 0.25, 0.35], "timestamp": 1700000000,
            "device_id": "esp32-north"
        }"#;

        let reading = parse_esp32_reading(json, &fallback(), Utc::now()).unwrap();
        assert_eq!(reading.device_id.as_str(), "esp32-north");
        assert_eq!(reading.spectrum, vec![0.15, 0.25, 0.35]);
        assert_eq!(reading.device_timestamp, 1_700_000_000);
    }

    #[test]
    fn test_missing_device_id_uses_fallback() {
        let json = r#"{"lat": 1.0, "lng": 2.0, "depth": 0.0, "mag": 0.0, "spectrum": [],
            "timestamp": 0}"#;
        let reading = parse_esp32_reading(json, &fallback(), Utc::now()).unwrap();
        assert_eq!(reading.device_id, fallback());
        assert!(reading.spectrum.is_empty());
    }

    #[test]
    fn test_blank_device_id_uses_fallback() {
        let json = r#"{"lat": 1.0, "lng": 2.0, "depth": 0.0, "mag": 0.0, "spectrum": [0.2],
            "timestamp": 0, "device_id": "  "}"#;
        let reading = parse_esp32_reading(json, &fallback(), Utc::now()).unwrap();
        assert_eq!(reading.device_id, fallback());
    }

    #[test]
    fn test_malformed_json() {
        let err = parse_esp32_reading("{not json", &fallback(), Utc::now()).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidJson(_)));
        assert!(!err.is_unprocessable());
    }

    #[test]
    fn test_missing_required_field() {
        let json = r#"{"lat": 1.0, "lng": 2.0, "mag": 0.0, "spectrum": [], "timestamp": 0}"#;
        let err = parse_esp32_reading(json, &fallback(), Utc::now()).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidJson(_)));
        assert!(err.is_unprocessable());
    }

    #[test]
    fn test_missing_spectrum_rejected() {
        let json = r#"{"lat": 1.0, "lng": 2.0, "depth": 0.0, "mag": 0.0, "timestamp": 0}"#;
        let err = parse_esp32_reading(json, &fallback(), Utc::now()).unwrap_err();
        assert!(err.to_string().contains("spectrum"));
        assert!(err.is_unprocessable());
    }

    #[test]
    fn test_out_of_range_latitude() {
        let json = r#"{"lat": 120.0, "lng": 2.0, "depth": 1.0, "mag": 0.0, "spectrum": [],
            "timestamp": 0}"#;
        let err = parse_esp32_reading(json, &fallback(), Utc::now()).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidReading(_)));
        assert!(err.is_unprocessable());
    }
}
