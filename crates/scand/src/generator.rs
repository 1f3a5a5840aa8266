//! Synthetic sensor readings.
//!
//! Every channel is a bounded random walk: each tick adds uniform noise in
//! `[-step, +step]` to the previous value and clamps the result to the
//! channel's range. Walks start at the midpoint of their range.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use scan_core::{
    DeviceId, DeviceStatus, DomainResult, FieldBounds, Location, SensorBounds, SensorReadings,
    SensorSnapshot, Vector3,
};

use crate::config::SimulatorConfig;

/// Anything the broadcast loop can pull one snapshot per tick from.
pub trait SnapshotSource: Send {
    fn next_snapshot(&mut self) -> SensorSnapshot;
}

/// Random-walk simulator for one probe.
pub struct ReadingGenerator {
    rng: StdRng,
    bounds: SensorBounds,
    device_id: DeviceId,
    location: Location,
    /// Unrounded walk positions; rounding only happens on output
    state: SensorReadings,
    sequence: u64,
}

impl ReadingGenerator {
    /// Creates a generator seeded from the OS entropy source.
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidBounds` / `InvalidFieldValue` if any channel's
    ///   bounds fail [`SensorBounds::validate`]
    pub fn new(
        device_id: DeviceId,
        location: Location,
        bounds: SensorBounds,
    ) -> DomainResult<Self> {
        Self::with_rng(StdRng::from_entropy(), device_id, location, bounds)
    }

    /// Creates a generator whose output is fully determined by `seed`.
    pub fn seeded(
        seed: u64,
        device_id: DeviceId,
        location: Location,
        bounds: SensorBounds,
    ) -> DomainResult<Self> {
        Self::with_rng(StdRng::seed_from_u64(seed), device_id, location, bounds)
    }

    pub fn from_config(config: &SimulatorConfig) -> DomainResult<Self> {
        let device_id = config.device_id.clone();
        let bounds = config.bounds.clone();
        match config.seed {
            Some(seed) => Self::seeded(seed, device_id, config.location, bounds),
            None => Self::new(device_id, config.location, bounds),
        }
    }

    fn with_rng(
        rng: StdRng,
        device_id: DeviceId,
        location: Location,
        bounds: SensorBounds,
    ) -> DomainResult<Self> {
        bounds.validate()?;
        let state = baseline(&bounds);
        Ok(Self {
            rng,
            bounds,
            device_id,
            location,
            state,
            sequence: 0,
        })
    }

    /// Produces the next snapshot and advances every walk by one step.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> SensorSnapshot {
        let b = &self.bounds;
        let rng = &mut self.rng;
        let s = &mut self.state;

        s.battery = step(rng, &b.battery, s.battery);
        s.temperature = step(rng, &b.temperature, s.temperature);
        s.pressure = step(rng, &b.pressure, s.pressure);
        s.humidity = step(rng, &b.humidity, s.humidity);
        s.turbidity = step(rng, &b.turbidity, s.turbidity);
        s.tds = step(rng, &b.tds, s.tds);
        s.depth = step(rng, &b.depth, s.depth);
        s.ph = step(rng, &b.ph, s.ph);
        s.magnetometer = step_vector(rng, &b.magnetometer, s.magnetometer);
        s.accelerometer = step_vector(rng, &b.accelerometer, s.accelerometer);
        s.gyroscope = step_vector(rng, &b.gyroscope, s.gyroscope);

        self.sequence += 1;
        debug!(sequence = self.sequence, "Generated snapshot");

        SensorSnapshot {
            sequence: self.sequence,
            timestamp: Utc::now(),
            device_id: self.device_id.clone(),
            sensors: rounded(&self.state, &self.bounds),
            status: DeviceStatus::Active,
            location: self.location,
        }
    }
}

impl SnapshotSource for ReadingGenerator {
    fn next_snapshot(&mut self) -> SensorSnapshot {
        self.next()
    }
}

fn step(rng: &mut StdRng, bounds: &FieldBounds, previous: f64) -> f64 {
    bounds.walk(previous, rng.gen_range(-1.0..=1.0))
}

fn step_vector(rng: &mut StdRng, bounds: &FieldBounds, previous: Vector3) -> Vector3 {
    Vector3::new(
        step(rng, bounds, previous.x),
        step(rng, bounds, previous.y),
        step(rng, bounds, previous.z),
    )
}

fn baseline(bounds: &SensorBounds) -> SensorReadings {
    SensorReadings {
        battery: bounds.battery.baseline(),
        temperature: bounds.temperature.baseline(),
        pressure: bounds.pressure.baseline(),
        humidity: bounds.humidity.baseline(),
        turbidity: bounds.turbidity.baseline(),
        tds: bounds.tds.baseline(),
        depth: bounds.depth.baseline(),
        ph: bounds.ph.baseline(),
        magnetometer: Vector3::splat(bounds.magnetometer.baseline()),
        accelerometer: Vector3::splat(bounds.accelerometer.baseline()),
        gyroscope: Vector3::splat(bounds.gyroscope.baseline()),
    }
}

fn rounded(state: &SensorReadings, bounds: &SensorBounds) -> SensorReadings {
    let round_vector =
        |v: Vector3, b: &FieldBounds| Vector3::new(b.round(v.x), b.round(v.y), b.round(v.z));

    SensorReadings {
        battery: bounds.battery.round(state.battery),
        temperature: bounds.temperature.round(state.temperature),
        pressure: bounds.pressure.round(state.pressure),
        humidity: bounds.humidity.round(state.humidity),
        turbidity: bounds.turbidity.round(state.turbidity),
        tds: bounds.tds.round(state.tds),
        depth: bounds.depth.round(state.depth),
        ph: bounds.ph.round(state.ph),
        magnetometer: round_vector(state.magnetometer, &bounds.magnetometer),
        accelerometer: round_vector(state.accelerometer, &bounds.accelerometer),
        gyroscope: round_vector(state.gyroscope, &bounds.gyroscope),
    }
}
