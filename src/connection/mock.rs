//! Simulated automation bridge for development and testing

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use super::traits::AutomationBridge;
use super::types::{BridgeHandle, DeviceAddress};
use crate::touch::{GestureKind, TouchPattern};
use crate::Error;

/// PNG signature, enough for callers that sniff the format
const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\n";

/// In-process bridge with scriptable failures
#[derive(Debug, Default)]
pub struct SimulatedBridge {
    /// handle id -> serial
    attached: Mutex<HashMap<String, String>>,
    unreachable: Mutex<HashSet<String>>,
    failing_probes: Mutex<HashSet<String>>,
    hanging_probes: Mutex<HashSet<String>>,
    failing_attaches: AtomicUsize,
    failing_dispatches: AtomicUsize,
    dispatch_delay: Mutex<Duration>,
    dispatched: Mutex<Vec<(String, GestureKind)>>,
    attaches: AtomicUsize,
    detaches: AtomicUsize,
    probes: AtomicUsize,
    verify_fails: AtomicBool,
    verify_hangs: AtomicBool,
}

impl SimulatedBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` attaches fail
    pub fn fail_next_attaches(&self, n: usize) {
        self.failing_attaches.store(n, Ordering::SeqCst);
    }

    /// Every attach to `serial` fails while set
    pub fn set_unreachable(&self, serial: &str, unreachable: bool) {
        Self::toggle(&self.unreachable, serial, unreachable);
    }

    /// Probes of `serial` report the device dead while set
    pub fn set_probe_failing(&self, serial: &str, failing: bool) {
        Self::toggle(&self.failing_probes, serial, failing);
    }

    /// Probes of `serial` never answer while set
    pub fn set_probe_hanging(&self, serial: &str, hanging: bool) {
        Self::toggle(&self.hanging_probes, serial, hanging);
    }

    /// The next `n` dispatches fail with a transport error
    pub fn fail_next_dispatches(&self, n: usize) {
        self.failing_dispatches.store(n, Ordering::SeqCst);
    }

    pub fn set_dispatch_delay(&self, delay: Duration) {
        if let Ok(mut d) = self.dispatch_delay.lock() {
            *d = delay;
        }
    }

    pub fn set_verify_failing(&self, failing: bool) {
        self.verify_fails.store(failing, Ordering::SeqCst);
    }

    /// `verify` never answers while set
    pub fn set_verify_hanging(&self, hanging: bool) {
        self.verify_hangs.store(hanging, Ordering::SeqCst);
    }

    /// Serial and kind of every successful dispatch, in order
    pub fn dispatched(&self) -> Vec<(String, GestureKind)> {
        self.dispatched.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn attach_count(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    pub fn detach_count(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Handles currently attached
    pub fn attached(&self) -> usize {
        self.attached.lock().map(|a| a.len()).unwrap_or(0)
    }

    fn toggle(set: &Mutex<HashSet<String>>, serial: &str, on: bool) {
        if let Ok(mut set) = set.lock() {
            if on {
                set.insert(serial.to_string());
            } else {
                set.remove(serial);
            }
        }
    }

    fn contains(set: &Mutex<HashSet<String>>, serial: &str) -> bool {
        set.lock().map(|s| s.contains(serial)).unwrap_or(false)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn is_attached(&self, handle: &BridgeHandle) -> bool {
        self.attached
            .lock()
            .map(|a| a.contains_key(&handle.id))
            .unwrap_or(false)
    }

    fn require_attached(&self, handle: &BridgeHandle) -> Result<(), Error> {
        if self.is_attached(handle) {
            Ok(())
        } else {
            Err(Error::connection(format!("{} is not attached", handle.serial)))
        }
    }
}

#[async_trait]
impl AutomationBridge for SimulatedBridge {
    async fn verify(&self) -> Result<(), Error> {
        if self.verify_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.verify_fails.load(Ordering::SeqCst) {
            return Err(Error::configuration("simulated bridge unavailable"));
        }
        Ok(())
    }

    async fn attach(&self, address: &DeviceAddress) -> Result<BridgeHandle, Error> {
        self.attaches.fetch_add(1, Ordering::SeqCst);
        let serial = address.serial();
        if Self::take_failure(&self.failing_attaches) || Self::contains(&self.unreachable, &serial) {
            return Err(Error::connection(format!("simulated attach failure for {}", serial)));
        }

        let handle = BridgeHandle {
            id: Uuid::new_v4().to_string(),
            serial,
        };
        self.attached
            .lock()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))?
            .insert(handle.id.clone(), handle.serial.clone());
        Ok(handle)
    }

    async fn detach(&self, handle: &BridgeHandle) -> Result<(), Error> {
        self.detaches.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut attached) = self.attached.lock() {
            attached.remove(&handle.id);
        }
        Ok(())
    }

    async fn probe(&self, handle: &BridgeHandle) -> Result<bool, Error> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if Self::contains(&self.hanging_probes, &handle.serial) {
            std::future::pending::<()>().await;
        }
        Ok(self.is_attached(handle) && !Self::contains(&self.failing_probes, &handle.serial))
    }

    async fn dispatch(&self, handle: &BridgeHandle, pattern: &TouchPattern) -> Result<(), Error> {
        self.require_attached(handle)?;
        let delay = self.dispatch_delay.lock().map(|d| *d).unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if Self::take_failure(&self.failing_dispatches) {
            return Err(Error::connection(format!("simulated dispatch failure on {}", handle.serial)));
        }
        if let Ok(mut dispatched) = self.dispatched.lock() {
            dispatched.push((handle.serial.clone(), pattern.kind));
        }
        Ok(())
    }

    async fn shell(&self, handle: &BridgeHandle, command: &str) -> Result<String, Error> {
        self.require_attached(handle)?;
        let command = command.trim();
        if let Some(text) = command.strip_prefix("echo ") {
            return Ok(text.trim().to_string());
        }
        match command {
            "false" => Err(Error::tool("false exited with 1")),
            _ => Ok(String::new()),
        }
    }

    async fn screenshot(&self, handle: &BridgeHandle) -> Result<Bytes, Error> {
        self.require_attached(handle)?;
        Ok(Bytes::from_static(FAKE_PNG))
    }
}
