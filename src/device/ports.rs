//! Port allocation for device instances

use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use super::traits::PortProbe;
use crate::{Error, Result};

/// Probe by connecting to 127.0.0.1
#[derive(Debug, Clone)]
pub struct TcpPortProbe {
    timeout: Duration,
}

impl TcpPortProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TcpPortProbe {
    fn default() -> Self {
        Self::new(Duration::from_millis(200))
    }
}

#[async_trait]
impl PortProbe for TcpPortProbe {
    async fn is_in_use(&self, port: u16) -> bool {
        matches!(
            tokio::time::timeout(self.timeout, TcpStream::connect(("127.0.0.1", port))).await,
            Ok(Ok(_))
        )
    }
}

/// Allocator over a fixed port range
#[derive(Debug)]
pub struct PortAllocator {
    ports: Vec<u16>,
    used: Mutex<BTreeSet<u16>>,
    probe: Arc<dyn PortProbe>,
}

impl PortAllocator {
    pub fn new(range: RangeInclusive<u16>, even_only: bool, probe: Arc<dyn PortProbe>) -> Self {
        let ports = range.filter(|p| !even_only || p % 2 == 0).collect();
        Self {
            ports,
            used: Mutex::new(BTreeSet::new()),
            probe,
        }
    }

    /// Number of ports the allocator manages
    pub fn capacity(&self) -> usize {
        self.ports.len()
    }

    /// First port in range order that is neither marked used nor reachable
    pub async fn allocate(&self) -> Result<u16> {
        let mut used = self.used.lock().await;
        for &port in &self.ports {
            if used.contains(&port) {
                continue;
            }
            if self.probe.is_in_use(port).await {
                debug!("Port {} is taken outside the pool, skipping", port);
                continue;
            }
            used.insert(port);
            return Ok(port);
        }
        Err(Error::resource_exhausted(format!(
            "No free port among {} candidates",
            self.ports.len()
        )))
    }

    /// Return `port` to the free set; false if it was not allocated
    pub async fn release(&self, port: u16) -> bool {
        self.used.lock().await.remove(&port)
    }

    pub async fn is_allocated(&self, port: u16) -> bool {
        self.used.lock().await.contains(&port)
    }

    /// Ports not marked used
    pub async fn free_count(&self) -> usize {
        self.ports.len() - self.used.lock().await.len()
    }
}
