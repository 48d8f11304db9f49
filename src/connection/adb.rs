//! Automation bridge over the `adb` command line
//!
//! Touch patterns are replayed as one `input motionevent` script per
//! gesture so the device sees the original spacing between points.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

use super::traits::AutomationBridge;
use super::types::{BridgeHandle, DeviceAddress};
use crate::command;
use crate::touch::{TouchPattern, TouchPoint};
use crate::Error;

const TRANSPORT_ERRORS: [&str; 5] = ["device offline", "not found", "no devices", "closed", "unauthorized"];

/// `adb`-backed bridge
#[derive(Debug, Clone)]
pub struct AdbBridge {
    adb_path: String,
    timeout: Duration,
}

impl AdbBridge {
    pub fn new<S: Into<String>>(adb_path: S) -> Self {
        Self {
            adb_path: adb_path.into(),
            timeout: command::DEFAULT_TIMEOUT,
        }
    }

    /// Bound every adb invocation by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn adb(&self, args: &[&str]) -> Result<String, Error> {
        command::run(&self.adb_path, args, self.timeout).await.map_err(classify)
    }

    async fn on_device(&self, handle: &BridgeHandle, args: &[&str]) -> Result<String, Error> {
        let mut full = vec!["-s", handle.serial.as_str()];
        full.extend_from_slice(args);
        self.adb(&full).await
    }
}

/// Transport failures are connection errors, anything else stays a tool error
fn classify(error: Error) -> Error {
    match error {
        Error::ToolInvocationFailed(msg) if TRANSPORT_ERRORS.iter().any(|m| msg.contains(m)) => Error::connection(msg),
        other => other,
    }
}

/// Render a pattern as a shell script of motion events
pub fn motion_script(pattern: &TouchPattern) -> String {
    let mut steps = Vec::with_capacity(pattern.points.len() * 2);
    let last = pattern.points.len().saturating_sub(1);
    let mut previous: Option<&TouchPoint> = None;

    for (i, point) in pattern.points.iter().enumerate() {
        if let Some(prev) = previous {
            let gap = point.offset.saturating_sub(prev.offset);
            if gap > Duration::ZERO {
                steps.push(format!("sleep {:.3}", gap.as_secs_f64()));
            }
        }
        let action = match i {
            0 => "DOWN",
            i if i == last => "UP",
            _ => "MOVE",
        };
        steps.push(format!(
            "input motionevent {} {} {}",
            action,
            point.x.round() as i64,
            point.y.round() as i64
        ));
        previous = Some(point);
    }

    steps.join("; ")
}

#[async_trait]
impl AutomationBridge for AdbBridge {
    async fn verify(&self) -> Result<(), Error> {
        command::run(&self.adb_path, &["version"], self.timeout)
            .await
            .map(|_| ())
            .map_err(|e| Error::configuration(format!("adb unusable at '{}': {}", self.adb_path, e)))
    }

    async fn attach(&self, address: &DeviceAddress) -> Result<BridgeHandle, Error> {
        let serial = address.serial();

        if let DeviceAddress::Remote { .. } = address {
            let out = self.adb(&["connect", &serial]).await?;
            if !out.contains("connected") || out.contains("failed") || out.contains("unable") {
                return Err(Error::connection(format!("adb connect {}: {}", serial, out)));
            }
        }

        let state = self
            .adb(&["-s", &serial, "get-state"])
            .await
            .map_err(|e| Error::connection(e.to_string()))?;
        if state != "device" {
            return Err(Error::connection(format!("{} is {}", serial, state)));
        }

        debug!("Attached to {}", serial);
        Ok(BridgeHandle {
            id: Uuid::new_v4().to_string(),
            serial,
        })
    }

    async fn detach(&self, handle: &BridgeHandle) -> Result<(), Error> {
        // Only network transports hold adb-side state.
        if handle.serial.contains(':') {
            self.adb(&["disconnect", &handle.serial]).await?;
        }
        Ok(())
    }

    async fn probe(&self, handle: &BridgeHandle) -> Result<bool, Error> {
        let out = self.on_device(handle, &["shell", "echo", "ok"]).await?;
        Ok(out == "ok")
    }

    async fn dispatch(&self, handle: &BridgeHandle, pattern: &TouchPattern) -> Result<(), Error> {
        let script = motion_script(pattern);
        let mut scripts = vec![script];
        if let Some(companion) = &pattern.companion {
            let second = TouchPattern {
                kind: pattern.kind,
                points: companion.clone(),
                total_duration: pattern.total_duration,
                companion: None,
            };
            scripts.push(motion_script(&second));
        }
        // Two fingers replay in parallel within one shell.
        let script = match scripts.as_slice() {
            [single] => single.clone(),
            _ => scripts.iter().map(|s| format!("({}) &", s)).collect::<Vec<_>>().join(" ") + " wait",
        };
        self.on_device(handle, &["shell", &script]).await.map(|_| ())
    }

    async fn shell(&self, handle: &BridgeHandle, command: &str) -> Result<String, Error> {
        self.on_device(handle, &["shell", command]).await
    }

    async fn screenshot(&self, handle: &BridgeHandle) -> Result<Bytes, Error> {
        let args = ["-s", handle.serial.as_str(), "exec-out", "screencap", "-p"];
        let png = command::run_raw(&self.adb_path, &args, self.timeout)
            .await
            .map_err(classify)?;
        if png.is_empty() {
            return Err(Error::tool(format!("Empty screenshot from {}", handle.serial)));
        }
        Ok(Bytes::from(png))
    }
}
