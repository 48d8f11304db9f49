//! Simulated device control for development and testing
//!
//! Devices "boot" after a configurable delay and failures can be scripted.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::traits::{DeviceControlTool, PortProbe};
use super::types::DeviceConfig;
use crate::Error;

#[derive(Debug)]
struct SimulatedDevice {
    ready_at: Instant,
}

/// In-process device control tool
#[derive(Debug)]
pub struct SimulatedDeviceTool {
    devices: Mutex<HashMap<String, SimulatedDevice>>,
    boot_time: Duration,
    failing_launches: AtomicUsize,
    failing_terminates: AtomicUsize,
    never_ready: AtomicBool,
    terminate_delay: Mutex<Duration>,
    launches: AtomicUsize,
    terminations: AtomicUsize,
    kills: AtomicUsize,
}

impl SimulatedDeviceTool {
    /// Devices are ready immediately
    pub fn new() -> Self {
        Self::with_boot_time(Duration::ZERO)
    }

    pub fn with_boot_time(boot_time: Duration) -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
            boot_time,
            failing_launches: AtomicUsize::new(0),
            failing_terminates: AtomicUsize::new(0),
            never_ready: AtomicBool::new(false),
            terminate_delay: Mutex::new(Duration::ZERO),
            launches: AtomicUsize::new(0),
            terminations: AtomicUsize::new(0),
            kills: AtomicUsize::new(0),
        }
    }

    /// The next `n` launches fail
    pub fn fail_next_launches(&self, n: usize) {
        self.failing_launches.store(n, Ordering::SeqCst);
    }

    /// The next `n` graceful terminates fail
    pub fn fail_next_terminates(&self, n: usize) {
        self.failing_terminates.store(n, Ordering::SeqCst);
    }

    pub fn set_never_ready(&self, never: bool) {
        self.never_ready.store(never, Ordering::SeqCst);
    }

    /// Graceful terminates take this long to complete
    pub fn set_terminate_delay(&self, delay: Duration) {
        if let Ok(mut d) = self.terminate_delay.lock() {
            *d = delay;
        }
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn termination_count(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    /// Devices launched and not yet terminated
    pub fn running(&self) -> usize {
        self.devices.lock().map(|d| d.len()).unwrap_or(0)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, SimulatedDevice>>, Error> {
        self.devices
            .lock()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))
    }
}

impl Default for SimulatedDeviceTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceControlTool for SimulatedDeviceTool {
    async fn launch(&self, config: &DeviceConfig, port: u16) -> Result<String, Error> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_launches) {
            return Err(Error::tool(format!("simulated launch failure for {}", config.device_type)));
        }
        let handle = format!("sim-{}", port);
        self.lock()?.insert(
            handle.clone(),
            SimulatedDevice {
                ready_at: Instant::now() + self.boot_time,
            },
        );
        Ok(handle)
    }

    async fn is_ready(&self, handle: &str) -> Result<bool, Error> {
        let devices = self.lock()?;
        let device = devices
            .get(handle)
            .ok_or_else(|| Error::tool(format!("Unknown simulated device {}", handle)))?;
        Ok(!self.never_ready.load(Ordering::SeqCst) && Instant::now() >= device.ready_at)
    }

    async fn terminate(&self, handle: &str) -> Result<(), Error> {
        let delay = self.terminate_delay.lock().map(|d| *d).unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if Self::take_failure(&self.failing_terminates) {
            return Err(Error::tool(format!("simulated terminate failure for {}", handle)));
        }
        self.terminations.fetch_add(1, Ordering::SeqCst);
        self.lock()?.remove(handle);
        Ok(())
    }

    async fn kill(&self, handle: &str) -> Result<(), Error> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        self.lock()?.remove(handle);
        Ok(())
    }
}

/// Port probe with a scripted set of externally busy ports
#[derive(Debug, Default)]
pub struct StaticPortProbe {
    busy: Mutex<HashSet<u16>>,
}

impl StaticPortProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_busy(&self, port: u16) {
        if let Ok(mut busy) = self.busy.lock() {
            busy.insert(port);
        }
    }

    pub fn mark_free(&self, port: u16) {
        if let Ok(mut busy) = self.busy.lock() {
            busy.remove(&port);
        }
    }
}

#[async_trait]
impl PortProbe for StaticPortProbe {
    async fn is_in_use(&self, port: u16) -> bool {
        self.busy.lock().map(|b| b.contains(&port)).unwrap_or(false)
    }
}
