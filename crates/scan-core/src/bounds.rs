//! Physical ranges and per-tick jitter for each simulated sensor channel.
//!
//! The limits follow the ranges the ArchaeoScan probe reports in the field:
//! a diver-mounted unit in shallow coastal water.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Most decimal places a channel may keep on the wire.
pub const MAX_DECIMALS: u32 = 10;

/// Closed range plus random-walk step for one scalar channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldBounds {
    /// Smallest value the channel may report
    pub lower: f64,
    /// Largest value the channel may report
    pub upper: f64,
    /// Maximum change per tick (noise is drawn from `[-step, +step]`)
    pub step: f64,
    /// Decimal places kept on the wire
    pub decimals: u32,
}

impl FieldBounds {
    pub const fn new(lower: f64, upper: f64, step: f64, decimals: u32) -> Self {
        Self {
            lower,
            upper,
            step,
            decimals,
        }
    }

    /// Midpoint of the range, used as the starting value.
    #[must_use]
    pub fn baseline(&self) -> f64 {
        (self.lower + self.upper) / 2.0
    }

    #[must_use]
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.lower, self.upper)
    }

    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    /// Advances a random walk by `noise` (expected in `[-1.0, 1.0]`) scaled by the step.
    #[must_use]
    pub fn walk(&self, previous: f64, noise: f64) -> f64 {
        self.clamp(previous + noise * self.step)
    }

    /// Rounds to the configured number of decimals.
    ///
    /// The result stays inside the range because both limits are
    /// representable at that precision.
    #[must_use]
    pub fn round(&self, value: f64) -> f64 {
        let exponent = i32::try_from(self.decimals.min(MAX_DECIMALS)).unwrap_or(0);
        let factor = 10f64.powi(exponent);
        self.clamp((value * factor).round() / factor)
    }

    /// Checks the limits are finite and ordered, the step is non-negative
    /// and the precision is at most [`MAX_DECIMALS`].
    pub fn validate(&self, field: &str) -> DomainResult<()> {
        let finite = self.lower.is_finite() && self.upper.is_finite() && self.step.is_finite();
        if !finite || self.lower > self.upper || self.step < 0.0 {
            return Err(DomainError::InvalidBounds {
                field: field.to_string(),
                lower: self.lower,
                upper: self.upper,
            });
        }
        if self.decimals > MAX_DECIMALS {
            return Err(DomainError::out_of_range(
                &format!("{field}.decimals"),
                f64::from(self.decimals),
                "at most 10",
            ));
        }
        Ok(())
    }
}

/// Bounds for every channel in a [`SensorSnapshot`](crate::SensorSnapshot).
///
/// Vector sensors share one range across their three axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorBounds {
    pub battery: FieldBounds,
    pub temperature: FieldBounds,
    pub pressure: FieldBounds,
    pub humidity: FieldBounds,
    pub turbidity: FieldBounds,
    pub tds: FieldBounds,
    pub depth: FieldBounds,
    pub ph: FieldBounds,
    pub magnetometer: FieldBounds,
    pub accelerometer: FieldBounds,
    pub gyroscope: FieldBounds,
}

impl Default for SensorBounds {
    fn default() -> Self {
        Self {
            battery: FieldBounds::new(75.0, 95.0, 0.5, 1),
            temperature: FieldBounds::new(18.0, 25.0, 0.2, 1),
            pressure: FieldBounds::new(990.0, 1020.0, 1.0, 1),
            humidity: FieldBounds::new(55.0, 75.0, 0.5, 1),
            turbidity: FieldBounds::new(0.0, 100.0, 2.0, 1),
            tds: FieldBounds::new(200.0, 800.0, 10.0, 0),
            depth: FieldBounds::new(0.0, 50.0, 0.5, 1),
            ph: FieldBounds::new(6.5, 8.5, 0.05, 1),
            magnetometer: FieldBounds::new(-50.0, 50.0, 1.0, 2),
            accelerometer: FieldBounds::new(-2.0, 2.0, 0.05, 2),
            gyroscope: FieldBounds::new(-180.0, 180.0, 5.0, 1),
        }
    }
}

impl SensorBounds {
    /// All channels paired with their wire names.
    pub fn channels(&self) -> [(&'static str, &FieldBounds); 11] {
        [
            ("battery", &self.battery),
            ("temperature", &self.temperature),
            ("pressure", &self.pressure),
            ("humidity", &self.humidity),
            ("turbidity", &self.turbidity),
            ("tds", &self.tds),
            ("depth", &self.depth),
            ("ph", &self.ph),
            ("magnetometer", &self.magnetometer),
            ("accelerometer", &self.accelerometer),
            ("gyroscope", &self.gyroscope),
        ]
    }

    /// Validates every channel.
    pub fn validate(&self) -> DomainResult<()> {
        for (name, bounds) in self.channels() {
            bounds.validate(name)?;
        }
        Ok(())
    }
}
