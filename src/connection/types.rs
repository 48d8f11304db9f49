//! Connection data types

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Origin of a device connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// Handle already known to the bridge (e.g. a USB serial)
    Local,
    /// Shared remote farm reached as `host:port`
    Remote,
    /// Instance launched by the local pool
    Virtual,
}

/// Where a device can be reached
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceAddress {
    /// Locally launched emulator listening on `port`
    Emulator { port: u16 },
    Remote { host: String, port: u16 },
    Serial { serial: String },
}

impl DeviceAddress {
    /// `host:port` becomes a remote address, anything else a serial
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(Error::configuration("Empty device address"));
        }
        if let Some(port) = value.strip_prefix("emulator-") {
            if let Ok(port) = port.parse() {
                return Ok(DeviceAddress::Emulator { port });
            }
        }
        if let Some((host, port)) = value.rsplit_once(':') {
            let port = port
                .parse()
                .map_err(|_| Error::configuration(format!("Invalid port in address {}", value)))?;
            if host.is_empty() {
                return Err(Error::configuration(format!("Missing host in address {}", value)));
            }
            return Ok(DeviceAddress::Remote {
                host: host.to_string(),
                port,
            });
        }
        Ok(DeviceAddress::Serial {
            serial: value.to_string(),
        })
    }

    pub fn kind(&self) -> ConnectionKind {
        match self {
            DeviceAddress::Emulator { .. } => ConnectionKind::Virtual,
            DeviceAddress::Remote { .. } => ConnectionKind::Remote,
            DeviceAddress::Serial { .. } => ConnectionKind::Local,
        }
    }

    /// Serial the bridge addresses the device by
    pub fn serial(&self) -> String {
        match self {
            DeviceAddress::Emulator { port } => format!("emulator-{}", port),
            DeviceAddress::Remote { host, port } => format!("{}:{}", host, port),
            DeviceAddress::Serial { serial } => serial.clone(),
        }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serial())
    }
}

/// A device to attach to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTarget {
    pub device_id: String,
    pub address: DeviceAddress,
}

impl DeviceTarget {
    pub fn new<S: Into<String>>(device_id: S, address: DeviceAddress) -> Self {
        Self {
            device_id: device_id.into(),
            address,
        }
    }
}

/// Health state of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Disconnected,
    Connecting,
    Connected,
    Degraded,
    Reconnecting,
    Removed,
}

impl HealthState {
    /// An attach is in flight and owned by another caller
    pub fn is_in_flight(self) -> bool {
        matches!(self, HealthState::Connecting | HealthState::Reconnecting)
    }
}

/// Bridge-side handle of an attached device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BridgeHandle {
    /// Unique per attach
    pub id: String,
    pub serial: String,
}

/// Live connection record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionRecord {
    pub device_id: String,
    pub kind: ConnectionKind,
    pub address: DeviceAddress,
    pub health: HealthState,
    pub retry_count: u32,
    pub last_activity: DateTime<Utc>,
    pub handle: Option<BridgeHandle>,
}

impl ConnectionRecord {
    pub fn new(target: &DeviceTarget) -> Self {
        Self {
            device_id: target.device_id.clone(),
            kind: target.address.kind(),
            address: target.address.clone(),
            health: HealthState::Disconnected,
            retry_count: 0,
            last_activity: Utc::now(),
            handle: None,
        }
    }
}

/// Result of one health monitor pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthReport {
    pub healthy: usize,
    pub recovered: Vec<String>,
    pub degraded: Vec<String>,
    pub removed: Vec<String>,
}
