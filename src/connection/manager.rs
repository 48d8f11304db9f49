//! Device connection manager
//!
//! Tracks one [`ConnectionRecord`] per device and drives it through the
//! health state machine. A caller claims a record by moving it into
//! `Connecting` or `Reconnecting` under the records lock; only the claimant
//! talks to the bridge for that device until it moves the record on, so
//! reconnection for a device is strictly sequential.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::traits::AutomationBridge;
use super::types::{BridgeHandle, ConnectionRecord, DeviceTarget, HealthReport, HealthState};
use crate::config::Config;
use crate::touch::TouchPattern;
use crate::{Error, Result};

const CLAIM_POLL: Duration = Duration::from_millis(25);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Retry limits and timeouts
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub max_retries: u32,
    pub health_check_interval: Duration,
    pub connect_timeout: Duration,
    pub probe_timeout: Duration,
    pub dispatch_timeout: Duration,
    pub reconnect_backoff: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ConnectionOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_retries: config.max_connection_retries,
            health_check_interval: config.health_check_interval(),
            connect_timeout: config.connect_timeout(),
            probe_timeout: config.probe_timeout(),
            dispatch_timeout: config.dispatch_timeout(),
            reconnect_backoff: config.reconnect_backoff(),
        }
    }
}

/// What a failure handler did with a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Recovered,
    Degraded,
    Removed,
    /// Another caller owns the record right now
    Busy,
}

enum Claim {
    Ready(BridgeHandle),
    Busy,
    Owned,
}

enum Access {
    Live(BridgeHandle),
    Wait,
    Heal,
}

/// Background health monitor
pub struct HealthMonitor {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HealthMonitor {
    /// Stop the monitor and wait for an in-flight pass to finish
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("Health monitor task ended abnormally: {}", e);
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Device connection manager
#[derive(Debug)]
pub struct DeviceConnectionManager {
    bridge: Arc<dyn AutomationBridge>,
    records: RwLock<HashMap<String, ConnectionRecord>>,
    removals: broadcast::Sender<String>,
    options: ConnectionOptions,
}

impl DeviceConnectionManager {
    pub fn new(bridge: Arc<dyn AutomationBridge>, options: ConnectionOptions) -> Self {
        let (removals, _) = broadcast::channel(64);
        Self {
            bridge,
            records: RwLock::new(HashMap::new()),
            removals,
            options,
        }
    }

    pub fn bridge(&self) -> &Arc<dyn AutomationBridge> {
        &self.bridge
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Device ids removed after exhausting their retries
    pub fn subscribe_removals(&self) -> broadcast::Receiver<String> {
        self.removals.subscribe()
    }

    /// Attach to a device, retrying with exponential backoff
    ///
    /// Idempotent: an already connected device returns its live handle and a
    /// connect already in flight is awaited rather than duplicated. Once more
    /// than `max_retries` attempts have failed the record is removed and
    /// `ConnectionRemoved` is returned.
    pub async fn connect(&self, target: &DeviceTarget) -> Result<BridgeHandle> {
        let id = &target.device_id;
        let wait_limit = self.options.connect_timeout * (self.options.max_retries + 2);
        let waiting_since = Instant::now();

        loop {
            let claim = {
                let mut records = self.write()?;
                let record = records
                    .entry(id.clone())
                    .or_insert_with(|| ConnectionRecord::new(target));
                match (record.health, record.handle.clone()) {
                    (HealthState::Connected, Some(handle)) => Claim::Ready(handle),
                    (state, _) if state.is_in_flight() => Claim::Busy,
                    _ => {
                        record.health = HealthState::Connecting;
                        Claim::Owned
                    }
                }
            };

            match claim {
                Claim::Ready(handle) => return Ok(handle),
                Claim::Owned => break,
                Claim::Busy => {
                    if waiting_since.elapsed() >= wait_limit {
                        return Err(Error::timeout(format!("Connect to {} still in flight", id)));
                    }
                    tokio::time::sleep(CLAIM_POLL).await;
                    if self.record(id).is_none() {
                        return Err(Error::connection_removed(id.clone()));
                    }
                }
            }
        }

        debug!("Connecting to {} at {}", id, target.address);

        loop {
            let failure = match tokio::time::timeout(self.options.connect_timeout, self.bridge.attach(&target.address)).await {
                Ok(Ok(handle)) => {
                    if self.finish_attach(id, handle.clone())? {
                        info!("Connected to {} ({})", id, handle.serial);
                        return Ok(handle);
                    }
                    self.detach_quietly(&handle).await;
                    return Err(Error::connection_removed(id.clone()));
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("attach timed out after {:?}", self.options.connect_timeout),
            };

            let retries = {
                let mut records = self.write()?;
                match records.get_mut(id) {
                    Some(record) => {
                        record.retry_count += 1;
                        record.retry_count
                    }
                    None => return Err(Error::connection_removed(id.clone())),
                }
            };

            if retries > self.options.max_retries {
                error!("Giving up on {} after {} failed attempts: {}", id, retries, failure);
                self.remove(id).await;
                return Err(Error::connection_removed(id.clone()));
            }

            let backoff = self.backoff(retries);
            warn!("Connect to {} failed (attempt {}): {}; retrying in {:?}", id, retries, failure, backoff);
            tokio::time::sleep(backoff).await;
        }
    }

    /// Drop the connection to a device
    pub async fn disconnect(&self, device_id: &str) -> Result<()> {
        let removed = self.write()?.remove(device_id);
        if let Some(handle) = removed.and_then(|r| r.handle) {
            self.detach_quietly(&handle).await;
            info!("Disconnected from {}", device_id);
        }
        Ok(())
    }

    /// Detach from every device
    pub async fn disconnect_all(&self) -> Result<()> {
        let records: Vec<ConnectionRecord> = self.write()?.drain().map(|(_, r)| r).collect();
        let handles: Vec<BridgeHandle> = records.into_iter().filter_map(|r| r.handle).collect();
        join_all(handles.iter().map(|h| self.detach_quietly(h))).await;
        Ok(())
    }

    /// Devices currently connected
    pub fn list_connected(&self) -> Vec<String> {
        self.records
            .read()
            .map(|records| {
                records
                    .values()
                    .filter(|r| r.health == HealthState::Connected)
                    .map(|r| r.device_id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn record(&self, device_id: &str) -> Option<ConnectionRecord> {
        self.records.read().ok().and_then(|r| r.get(device_id).cloned())
    }

    pub fn records(&self) -> Vec<ConnectionRecord> {
        self.records
            .read()
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Replay a touch pattern, healing the connection on failure
    pub async fn dispatch(&self, device_id: &str, pattern: &TouchPattern) -> Result<()> {
        let bridge = self.bridge.clone();
        self.with_handle(device_id, self.options.dispatch_timeout, |handle| {
            let bridge = bridge.clone();
            async move { bridge.dispatch(&handle, pattern).await }
        })
        .await
    }

    pub async fn shell(&self, device_id: &str, command: &str) -> Result<String> {
        let bridge = self.bridge.clone();
        self.with_handle(device_id, self.options.dispatch_timeout, |handle| {
            let bridge = bridge.clone();
            async move { bridge.shell(&handle, command).await }
        })
        .await
    }

    pub async fn screenshot(&self, device_id: &str) -> Result<Bytes> {
        let bridge = self.bridge.clone();
        self.with_handle(device_id, self.options.dispatch_timeout, |handle| {
            let bridge = bridge.clone();
            async move { bridge.screenshot(&handle).await }
        })
        .await
    }

    /// One health pass: probe every settled connection concurrently, then
    /// heal the ones whose probe failed or timed out
    pub async fn check_health(&self) -> Result<HealthReport> {
        let targets: Vec<(String, Option<BridgeHandle>)> = self
            .read()?
            .values()
            .filter(|r| matches!(r.health, HealthState::Connected | HealthState::Degraded))
            .map(|r| (r.device_id.clone(), r.handle.clone()))
            .collect();

        let probes = join_all(targets.into_iter().map(|(id, handle)| async move {
            let alive = match handle {
                Some(handle) => matches!(
                    tokio::time::timeout(self.options.probe_timeout, self.bridge.probe(&handle)).await,
                    Ok(Ok(true))
                ),
                None => false,
            };
            (id, alive)
        }))
        .await;

        let mut report = HealthReport::default();
        let mut failed = Vec::new();
        for (id, alive) in probes {
            if alive {
                self.mark_healthy(&id)?;
                report.healthy += 1;
            } else {
                failed.push(id);
            }
        }

        let outcomes = join_all(failed.iter().map(|id| self.recover(id))).await;
        for (id, outcome) in failed.into_iter().zip(outcomes) {
            match outcome? {
                RecoveryOutcome::Recovered => report.recovered.push(id),
                RecoveryOutcome::Degraded => report.degraded.push(id),
                RecoveryOutcome::Removed => report.removed.push(id),
                RecoveryOutcome::Busy => {}
            }
        }

        if !report.recovered.is_empty() || !report.degraded.is_empty() || !report.removed.is_empty() {
            info!(
                "Health check: {} healthy, {} recovered, {} degraded, {} removed",
                report.healthy,
                report.recovered.len(),
                report.degraded.len(),
                report.removed.len()
            );
        }
        Ok(report)
    }

    /// Run [`check_health`](Self::check_health) every `health_check_interval`
    pub fn spawn_health_monitor(self: &Arc<Self>) -> HealthMonitor {
        let (shutdown, mut stopped) = watch::channel(false);
        let manager = Arc::clone(self);
        let period = self.options.health_check_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("Health monitor started (every {:?})", period);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = manager.check_health().await {
                            error!("Health check failed: {}", e);
                        }
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Health monitor stopped");
        });

        HealthMonitor { shutdown, task }
    }

    /// Count one failure against a device and try a single reattach
    ///
    /// The record is removed once its retry count exceeds `max_retries`.
    pub async fn recover(&self, device_id: &str) -> Result<RecoveryOutcome> {
        let (address, stale, retries) = {
            let mut records = self.write()?;
            let record = match records.get_mut(device_id) {
                Some(record) => record,
                None => return Ok(RecoveryOutcome::Removed),
            };
            if record.health.is_in_flight() {
                return Ok(RecoveryOutcome::Busy);
            }
            record.retry_count += 1;
            if record.retry_count > self.options.max_retries {
                record.health = HealthState::Removed;
                (None, record.handle.take(), record.retry_count)
            } else {
                record.health = HealthState::Reconnecting;
                (Some(record.address.clone()), record.handle.take(), record.retry_count)
            }
        };

        if let Some(handle) = &stale {
            self.detach_quietly(handle).await;
        }

        let address = match address {
            Some(address) => address,
            None => {
                error!("Removing {} after {} consecutive failures", device_id, retries);
                self.remove(device_id).await;
                return Ok(RecoveryOutcome::Removed);
            }
        };

        warn!("Connection to {} degraded (failure {}), reconnecting", device_id, retries);

        match tokio::time::timeout(self.options.connect_timeout, self.bridge.attach(&address)).await {
            Ok(Ok(handle)) => {
                if self.finish_attach(device_id, handle.clone())? {
                    info!("Reconnected to {}", device_id);
                    Ok(RecoveryOutcome::Recovered)
                } else {
                    self.detach_quietly(&handle).await;
                    Ok(RecoveryOutcome::Removed)
                }
            }
            failure => {
                match failure {
                    Ok(Err(e)) => warn!("Reconnect to {} failed: {}", device_id, e),
                    _ => warn!("Reconnect to {} timed out", device_id),
                }
                let mut records = self.write()?;
                match records.get_mut(device_id) {
                    Some(record) => {
                        record.health = HealthState::Degraded;
                        Ok(RecoveryOutcome::Degraded)
                    }
                    None => Ok(RecoveryOutcome::Removed),
                }
            }
        }
    }

    /// Run `op` against the live handle, healing and retrying on failure
    ///
    /// Only `ConnectionRemoved` escapes once the device has been given up on.
    async fn with_handle<T, F, Fut>(&self, device_id: &str, limit: Duration, op: F) -> Result<T>
    where
        F: Fn(BridgeHandle) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        loop {
            let access = {
                let records = self.read()?;
                let record = records
                    .get(device_id)
                    .ok_or_else(|| Error::connection_removed(device_id))?;
                match (record.health, record.handle.clone()) {
                    (HealthState::Connected, Some(handle)) => Access::Live(handle),
                    (state, _) if state.is_in_flight() => Access::Wait,
                    _ => Access::Heal,
                }
            };

            let handle = match access {
                Access::Live(handle) => handle,
                Access::Wait => {
                    tokio::time::sleep(CLAIM_POLL).await;
                    continue;
                }
                Access::Heal => {
                    self.heal(device_id).await?;
                    continue;
                }
            };

            match tokio::time::timeout(limit, op(handle)).await {
                Ok(Ok(value)) => {
                    self.mark_healthy(device_id)?;
                    return Ok(value);
                }
                Ok(Err(e)) if !e.is_transient() => return Err(e),
                Ok(Err(e)) => warn!("Bridge call on {} failed: {}", device_id, e),
                Err(_) => warn!("Bridge call on {} timed out after {:?}", device_id, limit),
            }

            self.heal(device_id).await?;
        }
    }

    async fn heal(&self, device_id: &str) -> Result<()> {
        match self.recover(device_id).await? {
            RecoveryOutcome::Removed => Err(Error::connection_removed(device_id)),
            RecoveryOutcome::Degraded => {
                tokio::time::sleep(self.options.reconnect_backoff).await;
                Ok(())
            }
            RecoveryOutcome::Recovered | RecoveryOutcome::Busy => Ok(()),
        }
    }

    /// Store a fresh handle; false when the record vanished meanwhile
    fn finish_attach(&self, device_id: &str, handle: BridgeHandle) -> Result<bool> {
        let mut records = self.write()?;
        match records.get_mut(device_id) {
            Some(record) => {
                record.health = HealthState::Connected;
                record.handle = Some(handle);
                record.last_activity = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn mark_healthy(&self, device_id: &str) -> Result<()> {
        if let Some(record) = self.write()?.get_mut(device_id) {
            if record.health == HealthState::Connected {
                record.retry_count = 0;
                record.last_activity = Utc::now();
            }
        }
        Ok(())
    }

    async fn remove(&self, device_id: &str) {
        let removed = self.records.write().ok().and_then(|mut r| r.remove(device_id));
        if let Some(record) = removed {
            if let Some(handle) = &record.handle {
                self.detach_quietly(handle).await;
            }
            let _ = self.removals.send(device_id.to_string());
        }
    }

    async fn detach_quietly(&self, handle: &BridgeHandle) {
        match tokio::time::timeout(self.options.probe_timeout, self.bridge.detach(handle)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Detach of {} failed: {}", handle.serial, e),
            Err(_) => debug!("Detach of {} timed out", handle.serial),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        (self.options.reconnect_backoff * factor).min(MAX_BACKOFF)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, ConnectionRecord>>> {
        self.records
            .read()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, ConnectionRecord>>> {
        self.records
            .write()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))
    }
}
