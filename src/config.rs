//! Configuration management for the device fleet

use crate::{Error, Result};
use serde::Deserialize;
use std::ops::RangeInclusive;
use std::path::Path;
use std::time::Duration;

/// Device-control tool implementation selected at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolBackend {
    /// Android emulator launched through the `emulator` binary
    Emulator,
    /// In-process simulated devices
    Simulated,
}

/// Automation bridge implementation selected at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeBackend {
    /// adb command line
    Adb,
    /// In-process simulated bridge
    Simulated,
}

/// Fleet configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum concurrently open sessions
    pub max_concurrent_sessions: usize,

    /// Maximum concurrently running device instances
    pub max_concurrent_instances: usize,

    /// Health monitor tick in seconds
    pub health_check_interval_secs: u64,

    /// Reconnection attempts before a connection is removed
    pub max_connection_retries: u32,

    /// First port of the allocation range
    pub port_range_start: u16,

    /// Last port of the allocation range (inclusive)
    pub port_range_end: u16,

    /// Allocate even ports only (emulator console/adb pairs)
    pub even_ports_only: bool,

    /// Upper bound on waiting for a started device, in seconds
    pub readiness_timeout_secs: u64,

    /// Readiness poll interval in milliseconds
    pub readiness_poll_ms: u64,

    /// Per-attempt attach timeout in seconds
    pub connect_timeout_secs: u64,

    /// Per-probe timeout in seconds
    pub probe_timeout_secs: u64,

    /// Per-dispatch timeout in seconds
    pub dispatch_timeout_secs: u64,

    /// Grace period before a graceful stop escalates, in seconds
    pub stop_grace_secs: u64,

    /// Base reconnection backoff in milliseconds
    pub reconnect_backoff_ms: u64,

    /// Device-control tool backend
    pub tool_backend: ToolBackend,

    /// Automation bridge backend
    pub bridge_backend: BridgeBackend,

    /// Path to the emulator binary
    pub emulator_path: String,

    /// Path to the adb binary
    pub adb_path: String,

    /// Sleep the timing model's delays before each action
    pub pacing_enabled: bool,

    /// Device presets to open sessions for at startup
    pub warm_sessions: Vec<String>,

    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 8,
            max_concurrent_instances: 8,
            health_check_interval_secs: 30,
            max_connection_retries: 3,
            port_range_start: 5554,
            port_range_end: 5654,
            even_ports_only: true,
            readiness_timeout_secs: 300,
            readiness_poll_ms: 2000,
            connect_timeout_secs: 15,
            probe_timeout_secs: 10,
            dispatch_timeout_secs: 30,
            stop_grace_secs: 10,
            reconnect_backoff_ms: 500,
            tool_backend: ToolBackend::Emulator,
            bridge_backend: BridgeBackend::Adb,
            emulator_path: "emulator".to_string(),
            adb_path: "adb".to_string(),
            pacing_enabled: true,
            warm_sessions: Vec::new(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `FLEET_*` environment variables on top of defaults
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::configuration(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::configuration(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Layered load: defaults, then the optional file, then `FLEET_*` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("FLEET")
                .prefix_separator("_")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("warm_sessions"),
        );

        let config: Config = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::configuration(format!("Failed to load config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the fleet cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_sessions == 0 {
            return Err(Error::configuration("max_concurrent_sessions must be at least 1"));
        }
        if self.max_concurrent_instances == 0 {
            return Err(Error::configuration("max_concurrent_instances must be at least 1"));
        }
        if self.port_range_start > self.port_range_end {
            return Err(Error::configuration(format!(
                "Empty port range {}-{}",
                self.port_range_start, self.port_range_end
            )));
        }
        if self.even_ports_only
            && self.port_range_start == self.port_range_end
            && self.port_range_start % 2 == 1
        {
            return Err(Error::configuration("Port range contains no even port"));
        }
        if self.health_check_interval_secs == 0 {
            return Err(Error::configuration("health_check_interval_secs must be positive"));
        }
        if !(10..=30).contains(&self.probe_timeout_secs) {
            return Err(Error::configuration("probe_timeout_secs must be within 10-30"));
        }
        if self.readiness_timeout_secs == 0 || self.connect_timeout_secs == 0 {
            return Err(Error::configuration("Timeouts must be positive"));
        }
        Ok(())
    }

    pub fn port_range(&self) -> RangeInclusive<u16> {
        self.port_range_start..=self.port_range_end
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    pub fn readiness_poll(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}
