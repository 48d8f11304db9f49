//! Common test utilities
//!
//! Builds fleets over the simulated device tool and bridge.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use device_fleet::config::{BridgeBackend, Config, ToolBackend};
use device_fleet::connection::SimulatedBridge;
use device_fleet::device::{SimulatedDeviceTool, StaticPortProbe};
use device_fleet::timing::{BehaviorProfile, Personality};
use device_fleet::touch::{ScreenBounds, TouchPattern};
use device_fleet::DeviceFleet;

/// A fleet plus handles on its simulated backends
pub struct TestFleet {
    pub fleet: DeviceFleet,
    pub tool: Arc<SimulatedDeviceTool>,
    pub bridge: Arc<SimulatedBridge>,
    pub probe: Arc<StaticPortProbe>,
}

/// Simulated backends, no pacing, fast readiness polling
pub fn test_config(max_sessions: usize) -> Config {
    Config {
        max_concurrent_sessions: max_sessions,
        max_concurrent_instances: 8,
        port_range_start: 5554,
        port_range_end: 5584,
        readiness_poll_ms: 10,
        tool_backend: ToolBackend::Simulated,
        bridge_backend: BridgeBackend::Simulated,
        pacing_enabled: false,
        ..Config::default()
    }
}

pub fn test_fleet(config: Config) -> TestFleet {
    test_fleet_with_boot_time(config, Duration::ZERO)
}

pub fn test_fleet_with_boot_time(config: Config, boot_time: Duration) -> TestFleet {
    let tool = Arc::new(SimulatedDeviceTool::with_boot_time(boot_time));
    let bridge = Arc::new(SimulatedBridge::new());
    let probe = Arc::new(StaticPortProbe::new());
    let fleet = DeviceFleet::with_backends(config, tool.clone(), bridge.clone(), probe.clone())
        .expect("test config is valid");
    TestFleet {
        fleet,
        tool,
        bridge,
        probe,
    }
}

pub fn profile() -> BehaviorProfile {
    BehaviorProfile::new(Personality::Casual, 0.5, 0.7).expect("valid profile")
}

/// Assert the shared pattern invariants
pub fn assert_well_formed(pattern: &TouchPattern, bounds: &ScreenBounds) {
    assert!(!pattern.points.is_empty(), "empty pattern");
    for pair in pattern.points.windows(2) {
        assert!(pair[1].offset > pair[0].offset, "offsets not strictly increasing");
    }
    let points = pattern.points.iter().chain(pattern.companion.iter().flatten());
    for point in points {
        assert!(bounds.contains(point.x, point.y), "({}, {}) outside screen", point.x, point.y);
        assert!(point.pressure > 0.0 && point.pressure <= 1.0, "pressure {}", point.pressure);
    }
    assert_eq!(pattern.last().map(|p| p.offset), Some(pattern.total_duration));
}
