//! Daemon configuration.
//!
//! Values are layered, later layers winning:
//!
//! 1. Built-in defaults
//! 2. TOML file (`--config`, `$SCAN_CONFIG`, or `<config dir>/archaeoscan/scand.toml`)
//! 3. Environment overrides (`SCAN_BIND`, `SCAN_INTERVAL_MS`, `SCAN_DEVICE_ID`,
//!    `SCAN_MAX_CONNECTIONS`)
//! 4. Command-line flags, applied by the binary
//!
//! ```toml
//! bind = "0.0.0.0:7860"
//!
//! [stream]
//! interval_ms = 1000
//! send_timeout_ms = 250
//!
//! [simulator]
//! device_id = "archaeoscan_001"
//! seed = 42
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use scan_core::{DeviceId, DomainError, Location, SensorBounds};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Default listen address
pub const DEFAULT_BIND: &str = "0.0.0.0:7860";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "SCAN_CONFIG";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid sensor bounds: {0}")]
    Bounds(#[from] DomainError),

    #[error("Failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScandConfig {
    /// Address the HTTP/WebSocket gateway listens on
    pub bind: SocketAddr,
    pub stream: StreamConfig,
    pub simulator: SimulatorConfig,
    pub esp32: Esp32Config,
    pub monitor: MonitorConfig,
}

/// Broadcast cadence and per-connection limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Time between ticks
    pub interval_ms: u64,
    /// Upper bound on one delivery attempt before the connection is evicted
    pub send_timeout_ms: u64,
    /// Frames buffered per connection before sends start to wait
    pub connection_buffer: usize,
    pub max_connections: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            send_timeout_ms: 250,
            connection_buffer: 16,
            max_connections: 64,
        }
    }
}

impl StreamConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

/// Simulated probe identity and channel ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub device_id: DeviceId,
    /// Fixed RNG seed for reproducible runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub location: Location,
    pub bounds: SensorBounds,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            device_id: DeviceId::default(),
            seed: None,
            location: Location::default(),
            bounds: SensorBounds::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Esp32Config {
    /// A probe counts as online if it posted within this many seconds
    pub online_window_secs: i64,
}

impl Default for Esp32Config {
    fn default() -> Self {
        Self {
            online_window_secs: 30,
        }
    }
}

/// Process self-monitoring thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_secs: u64,
    pub memory_threshold_mb: u64,
    pub cpu_threshold_percent: f32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            memory_threshold_mb: 100,
            cpu_threshold_percent: 80.0,
        }
    }
}

impl Default for ScandConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 7860)),
            stream: StreamConfig::default(),
            simulator: SimulatorConfig::default(),
            esp32: Esp32Config::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl ScandConfig {
    /// Loads defaults, the config file and environment overrides, then validates.
    ///
    /// An explicit `path` must exist. Without one, `$SCAN_CONFIG` is tried,
    /// then the per-user default location, which may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML file; missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Applies `SCAN_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("SCAN_BIND") {
            self.bind = parse_env("SCAN_BIND", &value)?;
        }
        if let Some(value) = lookup("SCAN_INTERVAL_MS") {
            self.stream.interval_ms = parse_env("SCAN_INTERVAL_MS", &value)?;
        }
        if let Some(value) = lookup("SCAN_MAX_CONNECTIONS") {
            self.stream.max_connections = parse_env("SCAN_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = lookup("SCAN_DEVICE_ID") {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidEnv {
                    key: "SCAN_DEVICE_ID".to_string(),
                    value,
                });
            }
            self.simulator.device_id = DeviceId::new(value);
        }
        Ok(())
    }

    /// Rejects settings the daemon cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream.interval_ms == 0 {
            return Err(ConfigError::Invalid("stream.interval_ms must be > 0".into()));
        }
        if self.stream.send_timeout_ms == 0 {
            return Err(ConfigError::Invalid("stream.send_timeout_ms must be > 0".into()));
        }
        if self.stream.send_timeout_ms >= self.stream.interval_ms {
            return Err(ConfigError::Invalid(
                "stream.send_timeout_ms must be < stream.interval_ms".into(),
            ));
        }
        if self.stream.connection_buffer == 0 {
            return Err(ConfigError::Invalid("stream.connection_buffer must be > 0".into()));
        }
        if self.stream.max_connections == 0 {
            return Err(ConfigError::Invalid("stream.max_connections must be > 0".into()));
        }
        if self.monitor.interval_secs == 0 {
            return Err(ConfigError::Invalid("monitor.interval_secs must be > 0".into()));
        }
        if self.esp32.online_window_secs <= 0 {
            return Err(ConfigError::Invalid("esp32.online_window_secs must be > 0".into()));
        }
        self.simulator.bounds.validate()?;
        Ok(())
    }
}

/// `<config dir>/archaeoscan/scand.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("archaeoscan").join("scand.toml"))
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}
