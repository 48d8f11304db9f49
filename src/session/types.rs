//! Session data types

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::connection::DeviceAddress;
use crate::device::{DeviceConfig, Resolution};
use crate::timing::BehaviorProfile;
use crate::touch::{GestureKind, ScreenBounds, TouchPattern};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Attaching,
    Active,
    Ending,
    Closed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Ending | SessionState::Closed)
    }
}

/// What happens to the device when a session ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseMode {
    /// Detach and stop pool-launched devices
    #[default]
    Stop,
    /// Detach only; the device keeps running
    Detach,
}

/// Where a session's device comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceOrigin {
    /// Launch a fresh instance from the local pool
    Launch(DeviceConfig),
    /// Device on a remote farm
    Remote { host: String, port: u16, screen: Resolution },
    /// Device the bridge already knows by serial
    Attached { serial: String, screen: Resolution },
}

impl DeviceOrigin {
    /// Launch a named hardware preset
    pub fn preset(name: &str) -> crate::Result<Self> {
        DeviceConfig::preset(name).map(DeviceOrigin::Launch)
    }

    pub fn screen(&self) -> Resolution {
        match self {
            DeviceOrigin::Launch(config) => config.resolution,
            DeviceOrigin::Remote { screen, .. } | DeviceOrigin::Attached { screen, .. } => *screen,
        }
    }

    /// Address of a device that needs no launch
    pub(crate) fn external_address(&self) -> Option<DeviceAddress> {
        match self {
            DeviceOrigin::Launch(_) => None,
            DeviceOrigin::Remote { host, port, .. } => Some(DeviceAddress::Remote {
                host: host.clone(),
                port: *port,
            }),
            DeviceOrigin::Attached { serial, .. } => Some(DeviceAddress::Serial { serial: serial.clone() }),
        }
    }
}

/// Snapshot of one session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: String,
    /// Pool instance id, `host:port` or serial; empty until a device is bound
    pub device_id: String,
    pub profile: BehaviorProfile,
    pub start_time: DateTime<Utc>,
    pub state: SessionState,
    pub screen: Resolution,
    /// Whether the device was launched by the pool for this session
    pub pooled: bool,
}

impl Session {
    pub fn bounds(&self) -> ScreenBounds {
        ScreenBounds::new(self.screen.width, self.screen.height)
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }
}

/// One entry of a session's behavioral log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub kind: GestureKind,
    /// When the gesture was dispatched
    pub at: DateTime<Utc>,
    /// Pre-action delay drawn from the timing model
    pub delay: Duration,
    pub duration: Duration,
    pub point_count: usize,
    pub start: (f64, f64),
    pub end: (f64, f64),
}

impl ActionRecord {
    pub fn from_pattern(pattern: &TouchPattern, delay: Duration, at: DateTime<Utc>) -> Self {
        let start = pattern.first().map(|p| (p.x, p.y)).unwrap_or_default();
        let end = pattern.last().map(|p| (p.x, p.y)).unwrap_or(start);
        Self {
            kind: pattern.kind,
            at,
            delay,
            duration: pattern.total_duration,
            point_count: pattern.points.len(),
            start,
            end,
        }
    }
}

/// A gesture to perform
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureRequest {
    Tap { x: f64, y: f64 },
    Swipe { from: (f64, f64), to: (f64, f64), duration: Option<Duration> },
    LongPress { x: f64, y: f64, hold: Duration },
    Pinch { cx: f64, cy: f64, scale: f64, duration: Duration },
}

impl GestureRequest {
    pub fn kind(&self) -> GestureKind {
        match self {
            GestureRequest::Tap { .. } => GestureKind::Tap,
            GestureRequest::Swipe { .. } => GestureKind::Swipe,
            GestureRequest::LongPress { .. } => GestureKind::LongPress,
            GestureRequest::Pinch { .. } => GestureKind::Pinch,
        }
    }
}
