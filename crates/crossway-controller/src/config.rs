//! Configuration types for the controller.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::device::ReconnectPolicy;
use crate::error::{ControllerError, Result};

/// Default configuration file name.
pub const CONFIG_FILE: &str = "crossway.toml";

/// Controller configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CrosswayConfig {
    /// HTTP API configuration.
    pub api: ApiConfig,
    /// Density sensor link.
    pub sensor: SensorConfig,
    /// Signal actuator link.
    pub actuator: ActuatorConfig,
    /// Phase controller timing.
    pub controller: ControllerConfig,
    /// Telemetry forwarding.
    pub telemetry: TelemetryConfig,
}

impl CrosswayConfig {
    /// Loads configuration from [`CONFIG_FILE`] and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    /// Loads configuration from the given file path.
    ///
    /// A missing file leaves every value at its default. Environment variables
    /// prefixed with `CROSSWAY_` override file settings, with `__` separating
    /// nested keys (`CROSSWAY_API__LISTEN_ADDR`).
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("CROSSWAY_").split("__"))
            .extract()
            .map_err(|e| ControllerError::Config(e.to_string()))
    }

    /// Parses configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        Figment::new()
            .merge(Toml::string(content))
            .extract()
            .map_err(|e| ControllerError::Config(e.to_string()))
    }
}

/// HTTP API configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Address to listen on.
    pub listen_addr: SocketAddr,
    /// Directory holding the dashboard's static assets.
    pub dashboard_dir: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 5000),
            dashboard_dir: PathBuf::from("dashboard"),
        }
    }
}

/// Density sensor configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Serial device the sensor board writes to.
    pub device: PathBuf,
    /// Whether to read the sensor device at all.
    pub enabled: bool,
    /// Delay between reconnect attempts.
    #[serde(with = "serde_duration_secs")]
    pub retry_delay: Duration,
    /// Lines buffered between the reader and the tick loop.
    pub channel_capacity: usize,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/ttyACM0"),
            enabled: true,
            retry_delay: Duration::from_secs(3),
            channel_capacity: 64,
        }
    }
}

impl SensorConfig {
    /// Reconnect policy for the sensor link.
    #[must_use]
    pub const fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            retry_delay: self.retry_delay,
            settle_delay: Duration::ZERO,
        }
    }
}

/// Signal actuator configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    /// Serial device driving the lights.
    pub device: PathBuf,
    /// Record commands in memory instead of opening the device.
    pub simulated: bool,
    /// Delay between reconnect attempts.
    #[serde(with = "serde_duration_secs")]
    pub retry_delay: Duration,
    /// Wait after opening the port while the board resets.
    #[serde(with = "serde_duration_secs")]
    pub settle_delay: Duration,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/ttyACM1"),
            simulated: false,
            retry_delay: Duration::from_secs(3),
            settle_delay: Duration::from_secs(2),
        }
    }
}

impl ActuatorConfig {
    /// Reconnect policy for the actuator link.
    #[must_use]
    pub const fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            retry_delay: self.retry_delay,
            settle_delay: self.settle_delay,
        }
    }
}

/// Phase controller configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Period of the ingest-and-tick loop.
    #[serde(with = "serde_duration_millis")]
    pub tick_interval: Duration,
    /// Granularity of override countdowns and cancellation checks.
    #[serde(with = "serde_duration_millis")]
    pub override_sub_tick: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(50),
            override_sub_tick: Duration::from_millis(100),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Base URL of the telemetry database. `None` logs records locally.
    pub url: Option<String>,
    /// Collection records are pushed to.
    pub collection: String,
    /// Snapshots buffered before new ones are dropped.
    pub queue_capacity: usize,
    /// Per-request timeout.
    #[serde(with = "serde_duration_secs")]
    pub timeout: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            url: None,
            collection: "traffic_logs".to_owned(),
            queue_capacity: 64,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Serde helper for Duration as seconds.
mod serde_duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serde helper for Duration as milliseconds.
mod serde_duration_millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
