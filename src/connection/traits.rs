//! Automation bridge trait

use async_trait::async_trait;
use bytes::Bytes;

use super::types::{BridgeHandle, DeviceAddress};
use crate::touch::TouchPattern;

/// External device automation bridge
///
/// Dispatches input and queries state on attached devices. Every method is
/// expected to return promptly on failure; the connection manager applies
/// its own timeouts on top.
#[async_trait]
pub trait AutomationBridge: Send + Sync + std::fmt::Debug {
    /// Check once at startup that the bridge is usable
    async fn verify(&self) -> Result<(), crate::Error> {
        Ok(())
    }

    /// Attach to a device
    async fn attach(&self, address: &DeviceAddress) -> Result<BridgeHandle, crate::Error>;

    /// Release a handle
    async fn detach(&self, handle: &BridgeHandle) -> Result<(), crate::Error>;

    /// Lightweight liveness check
    async fn probe(&self, handle: &BridgeHandle) -> Result<bool, crate::Error>;

    /// Replay a touch pattern on the device
    async fn dispatch(&self, handle: &BridgeHandle, pattern: &TouchPattern) -> Result<(), crate::Error>;

    /// Run a shell command and return its output
    async fn shell(&self, handle: &BridgeHandle, command: &str) -> Result<String, crate::Error>;

    /// Capture the screen as PNG
    async fn screenshot(&self, handle: &BridgeHandle) -> Result<Bytes, crate::Error>;
}
