//! ==============================================================================
//! config.rs - Relay Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `relay.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - ServerConfig: where the REST/websocket server listens.
//!     - RelayConfig: live session tick period.
//!     - RetentionConfig: how long readings live, how often expired ones are swept.
//!     - FetchConfig: outgoing bearer token and optional request timeout.
//!     - AuthConfig: bearer token demanded from api callers.
//!     - DevicesConfig: the two remote sensor endpoints.
//!     - ChartConfig: polling period and window of the chart client.
//!
//! ==============================================================================

use crate::domain::DeviceSchema;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// env var that points at an explicit config file
pub const CONFIG_ENV: &str = "SENSOR_RELAY_CONFIG";

/// Root configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub devices: DevicesConfig,
    #[serde(default)]
    pub chart: ChartConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:3100".to_string() }
    }
}

impl ServerConfig {
    /// url a client on the same host can reach; wildcard binds map to loopback
    pub fn local_url(&self) -> String {
        match self.bind.parse::<SocketAddr>() {
            Ok(addr) if addr.ip().is_unspecified() => {
                let loopback = match addr.ip() {
                    IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                    IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
                };
                format!("http://{}", SocketAddr::new(loopback, addr.port()))
            }
            _ => format!("http://{}", self.bind),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RelayConfig {
    pub interval_seconds: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { interval_seconds: 3 }
    }
}

impl RelayConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetentionConfig {
    /// readings older than this are gone
    pub window_seconds: u64,
    /// period of the background purge
    pub sweep_seconds: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { window_seconds: 3600, sweep_seconds: 60 }
    }
}

impl RetentionConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.window_seconds as i64)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FetchConfig {
    /// sent as `Authorization: Bearer ...` to the sensor endpoints
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// unset means the http client's default (no timeout)
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    /// when set, every /api route demands this bearer token
    #[serde(default)]
    pub bearer_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: true }
    }
}

/// one remote sensor endpoint
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DeviceEndpoint {
    /// human label used in logs ("kitchen", "living room")
    pub label: String,
    pub url: String,
    /// deviceId under which readings are stored
    pub device_id: String,
    /// websocket event name for pushes of this endpoint's payload
    pub event: String,
    #[serde(default)]
    pub reports_humidity: bool,
}

impl DeviceEndpoint {
    pub fn schema(&self) -> DeviceSchema {
        DeviceSchema::for_device(self.device_id.clone(), self.reports_humidity)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DevicesConfig {
    /// combined temperature + humidity sensor
    pub primary: DeviceEndpoint,
    /// temperature-only sensor
    pub secondary: DeviceEndpoint,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            primary: DeviceEndpoint {
                label: "kitchen".to_string(),
                url: "http://127.0.0.1:5000/dht".to_string(),
                device_id: "kitchen".to_string(),
                event: "dataFromDHT".to_string(),
                reports_humidity: true,
            },
            secondary: DeviceEndpoint {
                label: "living room".to_string(),
                url: "http://127.0.0.1:5000/ds18b20".to_string(),
                device_id: "living-room".to_string(),
                event: "dataFromD18b20".to_string(),
                reports_humidity: false,
            },
        }
    }
}

impl DevicesConfig {
    /// schema for a device id, ad-hoc when it isn't one of ours
    pub fn schema_for(&self, device_id: &str) -> DeviceSchema {
        [&self.primary, &self.secondary]
            .into_iter()
            .find(|d| d.device_id == device_id)
            .map(DeviceEndpoint::schema)
            .unwrap_or_else(|| DeviceSchema::ad_hoc(device_id))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChartConfig {
    pub poll_interval_seconds: u64,
    /// readings per device fetched on each poll
    pub window: usize,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self { poll_interval_seconds: 5, window: 50 }
    }
}

/// where the loaded settings came from, reported once logging is up
#[derive(Debug, Clone)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults { failures: Vec<(PathBuf, String)> },
}

impl Settings {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))
    }

    /// Load with default fallback
    ///
    /// runs before tracing is initialized, so problems are handed back
    /// in the ConfigSource instead of being logged here.
    pub fn load_or_default() -> (Self, ConfigSource) {
        let mut paths = Vec::new();
        if let Ok(explicit) = std::env::var(CONFIG_ENV) {
            paths.push(PathBuf::from(explicit));
        }
        paths.push(PathBuf::from("config").join("relay.toml"));
        paths.push(PathBuf::from("..").join("config").join("relay.toml"));

        let mut failures = Vec::new();
        for path in paths {
            if path.exists() {
                match Self::load(&path) {
                    Ok(config) => return (config, ConfigSource::File(path)),
                    Err(e) => failures.push((path, e.to_string())),
                }
            }
        }

        (Self::default(), ConfigSource::Defaults { failures })
    }

    /// Log configuration summary
    pub fn log_summary(&self, source: &ConfigSource) {
        match source {
            ConfigSource::File(path) => tracing::info!(path = %path.display(), "config loaded"),
            ConfigSource::Defaults { failures } => {
                for (path, err) in failures {
                    tracing::warn!(path = %path.display(), error = %err, "failed to load config");
                }
                tracing::warn!("no config file found - using defaults");
            }
        }
        tracing::info!(
            bind = %self.server.bind,
            relay_interval_s = self.relay.interval_seconds,
            retention_s = self.retention.window_seconds,
            primary = %self.devices.primary.url,
            secondary = %self.devices.secondary.url,
            auth = self.auth.bearer_token.is_some(),
            "relay configuration"
        );
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            relay: RelayConfig::default(),
            retention: RetentionConfig::default(),
            fetch: FetchConfig::default(),
            auth: AuthConfig::default(),
            logging: LoggingConfig::default(),
            devices: DevicesConfig::default(),
            chart: ChartConfig::default(),
        }
    }
}
