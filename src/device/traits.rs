//! Device pool collaborator traits

use async_trait::async_trait;

use super::types::DeviceConfig;

/// External device-control tool
///
/// Launches and terminates device instances. Handles returned by
/// [`launch`](DeviceControlTool::launch) are opaque to the pool.
#[async_trait]
pub trait DeviceControlTool: Send + Sync + std::fmt::Debug {
    /// Check once at startup that the tool is usable
    async fn verify(&self) -> Result<(), crate::Error> {
        Ok(())
    }

    /// Launch an instance bound to `port`
    async fn launch(&self, config: &DeviceConfig, port: u16) -> Result<String, crate::Error>;

    /// Whether the instance accepts commands
    async fn is_ready(&self, handle: &str) -> Result<bool, crate::Error>;

    /// Ask the instance to shut down; idempotent
    async fn terminate(&self, handle: &str) -> Result<(), crate::Error>;

    /// Force the instance down
    async fn kill(&self, handle: &str) -> Result<(), crate::Error>;
}

/// Local port reachability check
#[async_trait]
pub trait PortProbe: Send + Sync + std::fmt::Debug {
    /// Whether something already listens on `port`
    async fn is_in_use(&self, port: u16) -> bool;
}
