//! Device lifecycle pool
//!
//! Starts and stops device instances through a [`DeviceControlTool`],
//! allocating one port per instance and enforcing the instance cap.
//!
//! Whoever removes an instance record releases the port stored in it. A
//! launch that finds its record stopping cleans up only what it acquired but
//! had not yet stored, so a port is never released twice.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::ports::PortAllocator;
use super::traits::DeviceControlTool;
use super::types::{DeviceConfig, DeviceInstance, DeviceState};
use crate::config::Config;
use crate::{Error, Result};

/// How often a second stop checks whether the first has finished
const STOP_POLL: Duration = Duration::from_millis(25);

/// Pool limits and timeouts
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub max_instances: usize,
    pub readiness_timeout: Duration,
    pub readiness_poll: Duration,
    pub stop_grace: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for PoolOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_instances: config.max_concurrent_instances,
            readiness_timeout: config.readiness_timeout(),
            readiness_poll: config.readiness_poll(),
            stop_grace: config.stop_grace(),
        }
    }
}

/// Device lifecycle pool
#[derive(Debug)]
pub struct DeviceLifecyclePool {
    tool: Arc<dyn DeviceControlTool>,
    ports: PortAllocator,
    instances: RwLock<HashMap<String, DeviceInstance>>,
    options: PoolOptions,
}

impl DeviceLifecyclePool {
    pub fn new(tool: Arc<dyn DeviceControlTool>, ports: PortAllocator, options: PoolOptions) -> Self {
        Self {
            tool,
            ports,
            instances: RwLock::new(HashMap::new()),
            options,
        }
    }

    pub fn tool(&self) -> &Arc<dyn DeviceControlTool> {
        &self.tool
    }

    /// Launch an instance and wait until it is ready
    pub async fn start(&self, config: DeviceConfig) -> Result<DeviceInstance> {
        let instance = self.launch(config).await?;
        self.wait_ready(&instance.id).await
    }

    /// Reserve a slot and a port and launch an instance without waiting for readiness
    pub async fn launch(&self, config: DeviceConfig) -> Result<DeviceInstance> {
        let id = Uuid::new_v4().to_string();

        {
            let mut instances = self.write()?;
            if instances.len() >= self.options.max_instances {
                return Err(Error::resource_exhausted(format!(
                    "Instance cap of {} reached",
                    self.options.max_instances
                )));
            }
            instances.insert(
                id.clone(),
                DeviceInstance {
                    id: id.clone(),
                    config: config.clone(),
                    listen_port: 0,
                    tool_handle: None,
                    state: DeviceState::Starting,
                    created_at: Utc::now(),
                },
            );
        }

        let port = match self.ports.allocate().await {
            Ok(port) => port,
            Err(e) => {
                self.write()?.remove(&id);
                return Err(e);
            }
        };

        if !self.update_starting(&id, |i| i.listen_port = port)? {
            self.ports.release(port).await;
            return Err(Error::cancelled(format!("Device {} stopped during launch", id)));
        }

        debug!("Launching {} ({}) on port {}", id, config.device_type, port);

        let handle = match self.tool.launch(&config, port).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Launch of {} failed: {}", id, e);
                self.remove_and_release(&id).await;
                return Err(match e {
                    Error::ToolInvocationFailed(_) => e,
                    other => Error::tool(other.to_string()),
                });
            }
        };

        if !self.update_starting(&id, |i| i.tool_handle = Some(handle.clone()))? {
            if let Err(e) = self.tool.kill(&handle).await {
                warn!("Failed to kill orphaned instance {}: {}", handle, e);
            }
            return Err(Error::cancelled(format!("Device {} stopped during launch", id)));
        }

        info!("Device {} launched as {} on port {}", id, handle, port);
        self.get(&id)
    }

    /// Poll readiness until the instance is ready or the readiness timeout elapses
    pub async fn wait_ready(&self, id: &str) -> Result<DeviceInstance> {
        let deadline = Instant::now() + self.options.readiness_timeout;

        loop {
            let instance = self
                .get(id)
                .map_err(|_| Error::cancelled(format!("Device {} stopped before ready", id)))?;
            match instance.state {
                DeviceState::Ready => return Ok(instance),
                DeviceState::Stopping | DeviceState::Stopped => {
                    return Err(Error::cancelled(format!("Device {} stopped before ready", id)))
                }
                DeviceState::Starting => {}
            }
            let handle = instance
                .tool_handle
                .ok_or_else(|| Error::invalid_state(format!("Device {} has not been launched", id)))?;

            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, self.tool.is_ready(&handle)).await {
                Ok(Ok(true)) => {
                    if self.update_starting(id, |i| i.state = DeviceState::Ready)? {
                        info!("Device {} is ready", id);
                        return self.get(id);
                    }
                    return Err(Error::cancelled(format!("Device {} stopped before ready", id)));
                }
                Ok(Ok(false)) => {}
                Ok(Err(e)) => debug!("Readiness check for {} failed: {}", id, e),
                Err(_) => {}
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("Device {} not ready after {:?}, stopping it", id, self.options.readiness_timeout);
                if let Err(e) = self.stop(id).await {
                    warn!("Failed to stop unready device {}: {}", id, e);
                }
                return Err(Error::timeout(format!(
                    "Device {} not ready within {:?}",
                    id, self.options.readiness_timeout
                )));
            }
            tokio::time::sleep(self.options.readiness_poll.min(remaining)).await;
        }
    }

    /// Stop an instance, escalating to a forced kill; the port is released regardless
    ///
    /// Returns the final snapshot of the instance in state `Stopped`. A stop
    /// racing another stop returns once the first one has released the port.
    pub async fn stop(&self, id: &str) -> Result<DeviceInstance> {
        let claimed = {
            let mut instances = self.write()?;
            let instance = instances
                .get_mut(id)
                .ok_or_else(|| Error::device_not_found(id))?;
            match instance.state {
                DeviceState::Stopping | DeviceState::Stopped => None,
                _ => {
                    instance.state = DeviceState::Stopping;
                    Some((instance.tool_handle.clone(), instance.clone()))
                }
            }
        };
        let (handle, snapshot) = match claimed {
            Some(claimed) => claimed,
            None => return self.wait_stopped(id).await,
        };

        info!("Stopping device {}", id);

        let outcome = match handle {
            Some(handle) => self.terminate(&handle).await,
            None => Ok(()),
        };

        let mut stopped = self.remove_and_release(id).await.unwrap_or(snapshot);
        stopped.state = DeviceState::Stopped;
        outcome.map(|_| stopped)
    }

    /// Wait for a concurrent stop to remove the instance
    async fn wait_stopped(&self, id: &str) -> Result<DeviceInstance> {
        // Two terminate attempts and the kill, each bounded by the grace period
        let deadline = Instant::now() + self.options.stop_grace * 3 + STOP_POLL * 4;
        let mut last = None;
        loop {
            let current = self.read()?.get(id).cloned();
            match current {
                Some(instance) => last = Some(instance),
                None => break,
            }
            if Instant::now() >= deadline {
                return Err(Error::timeout(format!("Device {} is still stopping", id)));
            }
            tokio::time::sleep(STOP_POLL).await;
        }

        let mut stopped = last.ok_or_else(|| Error::device_not_found(id))?;
        stopped.state = DeviceState::Stopped;
        Ok(stopped)
    }

    /// Stop every instance
    pub async fn shutdown(&self) -> Result<()> {
        let ids: Vec<String> = self.read()?.keys().cloned().collect();
        info!("Stopping {} device(s)", ids.len());

        let results = futures::future::join_all(ids.iter().map(|id| self.stop(id))).await;
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(_) | Err(Error::DeviceNotFound(_)) => {}
                Err(e) => warn!("Failed to stop {} during shutdown: {}", id, e),
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<DeviceInstance> {
        self.read()?
            .get(id)
            .cloned()
            .ok_or_else(|| Error::device_not_found(id))
    }

    pub fn list(&self) -> Result<Vec<DeviceInstance>> {
        Ok(self.read()?.values().cloned().collect())
    }

    /// Instances in any state, including ones still starting
    pub fn active_count(&self) -> usize {
        self.instances.read().map(|i| i.len()).unwrap_or(0)
    }

    pub async fn free_port_count(&self) -> usize {
        self.ports.free_count().await
    }

    pub fn ports(&self) -> &PortAllocator {
        &self.ports
    }

    /// Graceful terminate with one retry, then a forced kill
    async fn terminate(&self, handle: &str) -> Result<()> {
        for attempt in 1..=2 {
            match tokio::time::timeout(self.options.stop_grace, self.tool.terminate(handle)).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => warn!("Terminate attempt {} for {} failed: {}", attempt, handle, e),
                Err(_) => warn!("Terminate attempt {} for {} timed out", attempt, handle),
            }
        }

        warn!("Escalating to forced kill of {}", handle);
        match tokio::time::timeout(self.options.stop_grace, self.tool.kill(handle)).await {
            Ok(result) => result,
            Err(_) => Err(Error::tool(format!("Kill of {} timed out", handle))),
        }
    }

    /// Apply `f` if the instance is still starting; false when it is stopping or gone
    fn update_starting<F>(&self, id: &str, f: F) -> Result<bool>
    where
        F: FnOnce(&mut DeviceInstance),
    {
        let mut instances = self.write()?;
        match instances.get_mut(id) {
            Some(instance) if instance.state == DeviceState::Starting => {
                f(instance);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove_and_release(&self, id: &str) -> Option<DeviceInstance> {
        let removed = self.instances.write().ok().and_then(|mut i| i.remove(id));
        if let Some(instance) = &removed {
            if instance.listen_port != 0 {
                self.ports.release(instance.listen_port).await;
                debug!("Released port {} of {}", instance.listen_port, id);
            }
        }
        removed
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, DeviceInstance>>> {
        self.instances
            .read()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, DeviceInstance>>> {
        self.instances
            .write()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))
    }
}
