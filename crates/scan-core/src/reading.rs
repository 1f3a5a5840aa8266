//! Readings pushed by a physical ESP32 probe.
//!
//! These arrive over HTTP and are kept alongside the simulated stream;
//! they never replace simulator ticks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::snapshot::{DeviceId, Location};

/// Largest spectrometer frame accepted from a probe.
pub const MAX_SPECTRUM_LEN: usize = 4096;

/// A validated probe reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Esp32Reading {
    pub device_id: DeviceId,
    pub location: Location,
    /// Magnetic field strength (µT)
    pub mag: f64,
    /// Spectrometer intensities
    pub spectrum: Vec<f64>,
    /// Timestamp as reported by the probe clock
    pub device_timestamp: i64,
    /// When the daemon accepted the reading
    pub received_at: DateTime<Utc>,
}

impl Esp32Reading {
    /// Builds a reading, rejecting coordinates and values a probe cannot produce.
    pub fn new(
        device_id: DeviceId,
        location: Location,
        mag: f64,
        spectrum: Vec<f64>,
        device_timestamp: i64,
        received_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if !location.lat.is_finite() || !(-90.0..=90.0).contains(&location.lat) {
            return Err(DomainError::out_of_range("lat", location.lat, "-90..=90"));
        }
        if !location.lng.is_finite() || !(-180.0..=180.0).contains(&location.lng) {
            return Err(DomainError::out_of_range("lng", location.lng, "-180..=180"));
        }
        if !location.depth.is_finite() || location.depth < 0.0 {
            return Err(DomainError::out_of_range("depth", location.depth, ">= 0"));
        }
        if !mag.is_finite() {
            return Err(DomainError::out_of_range("mag", mag, "a finite number"));
        }
        if spectrum.len() > MAX_SPECTRUM_LEN {
            return Err(DomainError::InvalidFieldValue {
                field: "spectrum".to_string(),
                value: format!("{} samples", spectrum.len()),
                expected: format!("at most {MAX_SPECTRUM_LEN} samples"),
            });
        }
        if let Some(bad) = spectrum.iter().find(|v| !v.is_finite()) {
            return Err(DomainError::out_of_range("spectrum", *bad, "finite samples"));
        }

        Ok(Self {
            device_id,
            location,
            mag,
            spectrum,
            device_timestamp,
            received_at,
        })
    }

    /// Seconds elapsed between receipt and `now`, never negative.
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.received_at).num_seconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn location(lat: f64, lng: f64, depth: f64) -> Location {
        Location { lat, lng, depth }
    }

    fn build(loc: Location, spectrum: Vec<f64>) -> DomainResult<Esp32Reading> {
        Esp32Reading::new(DeviceId::new("esp32-a"), loc, 48.2, spectrum, 1_700_000_000, Utc::now())
    }

    #[test]
    fn test_valid_reading() {
        let reading = build(location(55.75, 37.61, 3.2), vec![0.1, 0.5]).unwrap();
        assert_eq!(reading.device_id.as_str(), "esp32-a");
        assert_eq!(reading.spectrum.len(), 2);
    }

    #[test]
    fn test_rejects_bad_coordinates() {
        assert!(build(location(91.0, 0.0, 1.0), vec![]).is_err());
        assert!(build(location(0.0, -181.0, 1.0), vec![]).is_err());
        assert!(build(location(0.0, 0.0, -0.5), vec![]).is_err());
        assert!(build(location(f64::NAN, 0.0, 1.0), vec![]).is_err());
    }

    #[test]
    fn test_rejects_non_finite_spectrum() {
        let err = build(location(0.0, 0.0, 1.0), vec![0.2, f64::INFINITY]).unwrap_err();
        assert!(err.to_string().contains("spectrum"));
    }

    #[test]
    fn test_rejects_oversized_spectrum() {
        let big = vec![0.5; MAX_SPECTRUM_LEN + 1];
        assert!(build(location(0.0, 0.0, 1.0), big).is_err());
    }

    #[test]
    fn test_age_secs() {
        let reading = build(location(0.0, 0.0, 1.0), vec![]).unwrap();
        let later = reading.received_at + Duration::seconds(12);
        assert_eq!(reading.age_secs(later), 12);
        let earlier = reading.received_at - Duration::seconds(5);
        assert_eq!(reading.age_secs(earlier), 0);
    }
}
