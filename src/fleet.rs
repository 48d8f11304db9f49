//! Fleet service registry
//!
//! Builds every component once from a [`Config`] and owns their startup and
//! shutdown. Backends are resolved here and nowhere else.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::{BridgeBackend, Config, ToolBackend};
use crate::connection::{AdbBridge, AutomationBridge, ConnectionOptions, DeviceConnectionManager, HealthMonitor, SimulatedBridge};
use crate::device::{
    DeviceControlTool, DeviceLifecyclePool, EmulatorTool, PoolOptions, PortAllocator, PortProbe, SimulatedDeviceTool,
    StaticPortProbe, TcpPortProbe,
};
use crate::session::{
    BlockingFleet, DeviceOrigin, OrchestratorOptions, Session, SessionOrchestrator, SessionOrchestratorImpl,
};
use crate::timing::{BehaviorProfile, BehaviorTimingModel};
use crate::{Error, Result};

/// All fleet components wired together
pub struct DeviceFleet {
    config: Config,
    pool: Arc<DeviceLifecyclePool>,
    connections: Arc<DeviceConnectionManager>,
    sessions: Arc<SessionOrchestratorImpl>,
    monitor: tokio::sync::Mutex<Option<HealthMonitor>>,
}

impl DeviceFleet {
    /// Build the fleet with the backends named in `config`
    pub fn from_config(config: Config) -> Result<Self> {
        let (tool, probe): (Arc<dyn DeviceControlTool>, Arc<dyn PortProbe>) = match config.tool_backend {
            ToolBackend::Emulator => (
                Arc::new(
                    EmulatorTool::new(config.emulator_path.as_str(), config.adb_path.as_str())
                        .with_timeout(config.connect_timeout()),
                ),
                Arc::new(TcpPortProbe::default()),
            ),
            ToolBackend::Simulated => (Arc::new(SimulatedDeviceTool::new()), Arc::new(StaticPortProbe::new())),
        };
        let bridge: Arc<dyn AutomationBridge> = match config.bridge_backend {
            BridgeBackend::Adb => {
                Arc::new(AdbBridge::new(config.adb_path.as_str()).with_timeout(config.dispatch_timeout()))
            }
            BridgeBackend::Simulated => Arc::new(SimulatedBridge::new()),
        };
        Self::with_backends(config, tool, bridge, probe)
    }

    /// Build the fleet around explicit backends
    pub fn with_backends(
        config: Config,
        tool: Arc<dyn DeviceControlTool>,
        bridge: Arc<dyn AutomationBridge>,
        probe: Arc<dyn PortProbe>,
    ) -> Result<Self> {
        config.validate()?;

        let ports = PortAllocator::new(config.port_range(), config.even_ports_only, probe);
        if ports.capacity() == 0 {
            return Err(Error::configuration("Port range holds no usable port"));
        }
        let pool = Arc::new(DeviceLifecyclePool::new(tool, ports, PoolOptions::from(&config)));
        let connections = Arc::new(DeviceConnectionManager::new(bridge, ConnectionOptions::from(&config)));
        let sessions = Arc::new(SessionOrchestratorImpl::new(
            pool.clone(),
            connections.clone(),
            BehaviorTimingModel::default(),
            OrchestratorOptions::from(&config),
        ));

        Ok(Self {
            config,
            pool,
            connections,
            sessions,
            monitor: tokio::sync::Mutex::new(None),
        })
    }

    /// Verify both backends and start the health monitor
    pub async fn init(&self) -> Result<()> {
        let limit = self.config.connect_timeout();
        bounded("device tool check", limit, self.pool.tool().verify()).await?;
        bounded("automation bridge check", limit, self.connections.bridge().verify()).await?;

        let mut monitor = self.monitor.lock().await;
        if monitor.is_none() {
            *monitor = Some(self.connections.spawn_health_monitor());
        }
        info!(
            "Fleet ready: {} session slot(s), {} instance slot(s), {} port(s)",
            self.config.max_concurrent_sessions,
            self.config.max_concurrent_instances,
            self.pool.ports().capacity()
        );
        Ok(())
    }

    /// Open one session per preset in `warm_sessions`; failures are logged and skipped
    pub async fn warm_up(&self) -> Vec<Session> {
        let mut opened = Vec::new();
        for preset in &self.config.warm_sessions {
            let origin = match DeviceOrigin::preset(preset) {
                Ok(origin) => origin,
                Err(e) => {
                    warn!("Skipping warm session: {}", e);
                    continue;
                }
            };
            match self.sessions.create_session(origin, BehaviorProfile::default()).await {
                Ok(session) => {
                    info!("Warm session {} on {}", session.id, preset);
                    opened.push(session);
                }
                Err(e) => warn!("Warm session on {} failed: {}", preset, e),
            }
        }
        opened
    }

    /// End all sessions, stop the monitor and every device
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down fleet");

        if let Err(e) = self.sessions.shutdown().await {
            error!("Failed to end sessions: {}", e);
        }
        if let Some(monitor) = self.monitor.lock().await.take() {
            monitor.stop().await;
        }
        if let Err(e) = self.connections.disconnect_all().await {
            error!("Failed to detach devices: {}", e);
        }
        self.pool.shutdown().await?;

        info!("Fleet shutdown complete");
        Ok(())
    }

    /// Build and initialize a fleet on a dedicated runtime behind the blocking façade
    pub fn start_blocking(config: Config) -> Result<(Arc<DeviceFleet>, BlockingFleet)> {
        let runtime = BlockingFleet::build_runtime()?;

        let fleet = runtime.block_on(async {
            let fleet = Arc::new(DeviceFleet::from_config(config)?);
            fleet.init().await?;
            Ok::<_, Error>(fleet)
        })?;

        let blocking = BlockingFleet::with_runtime(runtime, fleet.sessions());
        Ok((fleet, blocking))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pool(&self) -> &Arc<DeviceLifecyclePool> {
        &self.pool
    }

    pub fn connections(&self) -> &Arc<DeviceConnectionManager> {
        &self.connections
    }

    pub fn sessions(&self) -> Arc<dyn SessionOrchestrator> {
        self.sessions.clone()
    }

    pub fn orchestrator(&self) -> &Arc<SessionOrchestratorImpl> {
        &self.sessions
    }

    pub async fn health_monitor_running(&self) -> bool {
        self.monitor.lock().await.as_ref().map(|m| m.is_running()).unwrap_or(false)
    }
}

async fn bounded<F>(what: &str, limit: Duration, check: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    tokio::time::timeout(limit, check)
        .await
        .map_err(|_| Error::timeout(format!("{} did not answer within {:?}", what, limit)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulated() -> Config {
        Config {
            tool_backend: ToolBackend::Simulated,
            bridge_backend: BridgeBackend::Simulated,
            pacing_enabled: false,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_fleet_lifecycle() {
        let fleet = DeviceFleet::from_config(simulated()).unwrap();
        fleet.init().await.unwrap();
        assert!(fleet.health_monitor_running().await);

        let session = fleet
            .sessions()
            .create_session(DeviceOrigin::preset("pixel_4").unwrap(), BehaviorProfile::default())
            .await
            .unwrap();
        fleet.sessions().perform_tap(&session.id, 10.0, 10.0).await.unwrap();
        assert_eq!(fleet.pool().active_count(), 1);

        fleet.shutdown().await.unwrap();
        assert_eq!(fleet.sessions().session_count(), 0);
        assert_eq!(fleet.pool().active_count(), 0);
        assert!(!fleet.health_monitor_running().await);
    }

    #[tokio::test]
    async fn test_warm_up_skips_unknown_presets() {
        let config = Config {
            warm_sessions: vec!["pixel_6".into(), "nokia_3310".into(), "tablet_10".into()],
            ..simulated()
        };
        let fleet = DeviceFleet::from_config(config).unwrap();
        fleet.init().await.unwrap();

        let opened = fleet.warm_up().await;
        assert_eq!(opened.len(), 2);
        assert_eq!(fleet.orchestrator().list_sessions().len(), 2);

        fleet.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_init_fails_when_bridge_is_unusable() {
        let bridge = Arc::new(SimulatedBridge::new());
        bridge.set_verify_failing(true);
        let fleet = DeviceFleet::with_backends(
            simulated(),
            Arc::new(SimulatedDeviceTool::new()),
            bridge,
            Arc::new(StaticPortProbe::new()),
        )
        .unwrap();

        assert!(matches!(fleet.init().await, Err(Error::Configuration(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_gives_up_on_hung_bridge() {
        let bridge = Arc::new(SimulatedBridge::new());
        bridge.set_verify_hanging(true);
        let fleet = DeviceFleet::with_backends(
            simulated(),
            Arc::new(SimulatedDeviceTool::new()),
            bridge,
            Arc::new(StaticPortProbe::new()),
        )
        .unwrap();

        assert!(matches!(fleet.init().await, Err(Error::Timeout(_))));
        assert!(!fleet.health_monitor_running().await);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = Config {
            max_concurrent_sessions: 0,
            ..simulated()
        };
        assert!(matches!(DeviceFleet::from_config(config), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_blocking_start() {
        let (fleet, blocking) = DeviceFleet::start_blocking(simulated()).unwrap();
        let session = blocking
            .create_session(DeviceOrigin::preset("nexus_5x").unwrap(), BehaviorProfile::default())
            .unwrap();
        blocking.perform_swipe(&session.id, (100.0, 1500.0), (100.0, 300.0), None).unwrap();

        blocking.block_on(fleet.shutdown()).unwrap();
        assert_eq!(blocking.session_count(), 0);
    }
}
