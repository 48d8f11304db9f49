//! Device pool data types

use chrono::{DateTime, Utc};
use phf::phf_map;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Screen size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Hardware preset: width, height, density (dpi), memory (MiB)
static DEVICE_PRESETS: phf::Map<&'static str, (u32, u32, u32, u32)> = phf_map! {
    "pixel_6" => (1080, 2400, 420, 4096),
    "pixel_4" => (1080, 2280, 440, 2048),
    "galaxy_s21" => (1080, 2400, 421, 4096),
    "nexus_5x" => (1080, 1920, 420, 2048),
    "tablet_10" => (1600, 2560, 320, 4096),
};

/// Parameters of one virtual device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device type (AVD name for the emulator backend)
    pub device_type: String,
    pub resolution: Resolution,
    pub density: u32,
    pub memory_mb: u32,
}

impl DeviceConfig {
    /// Build a config from a named hardware preset
    pub fn preset(name: &str) -> Result<Self> {
        let (width, height, density, memory_mb) = DEVICE_PRESETS
            .get(name)
            .copied()
            .ok_or_else(|| Error::configuration(format!("Unknown device preset: {}", name)))?;

        Ok(Self {
            device_type: name.to_string(),
            resolution: Resolution { width, height },
            density,
            memory_mb,
        })
    }

    pub fn preset_names() -> impl Iterator<Item = &'static str> {
        DEVICE_PRESETS.keys().copied()
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_type: "nexus_5x".to_string(),
            resolution: Resolution { width: 1080, height: 1920 },
            density: 420,
            memory_mb: 2048,
        }
    }
}

/// Lifecycle state of a device instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Starting,
    Ready,
    Stopping,
    /// Terminated and no longer tracked by the pool
    Stopped,
}

/// A device instance owned by the pool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInstance {
    pub id: String,
    pub config: DeviceConfig,
    /// 0 until a port is allocated
    pub listen_port: u16,
    /// Identifier the control tool knows the instance by
    pub tool_handle: Option<String>,
    pub state: DeviceState,
    pub created_at: DateTime<Utc>,
}

impl DeviceInstance {
    pub fn is_ready(&self) -> bool {
        self.state == DeviceState::Ready
    }
}
