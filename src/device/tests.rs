//! Device pool tests

use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::Error;

fn allocator(range: std::ops::RangeInclusive<u16>, probe: Arc<StaticPortProbe>) -> PortAllocator {
    PortAllocator::new(range, true, probe)
}

fn pool_with(tool: Arc<SimulatedDeviceTool>, max_instances: usize) -> DeviceLifecyclePool {
    let options = PoolOptions {
        max_instances,
        readiness_timeout: Duration::from_secs(300),
        readiness_poll: Duration::from_millis(10),
        stop_grace: Duration::from_secs(1),
    };
    DeviceLifecyclePool::new(tool, allocator(5554..=5574, Arc::new(StaticPortProbe::new())), options)
}

// ============================================================================
// Port allocation
// ============================================================================

#[tokio::test]
async fn test_allocator_scans_in_order_even_only() {
    let ports = allocator(5554..=5560, Arc::new(StaticPortProbe::new()));
    assert_eq!(ports.capacity(), 4);

    assert_eq!(ports.allocate().await.unwrap(), 5554);
    assert_eq!(ports.allocate().await.unwrap(), 5556);
    assert_eq!(ports.allocate().await.unwrap(), 5558);
    assert_eq!(ports.allocate().await.unwrap(), 5560);
    assert!(matches!(ports.allocate().await, Err(Error::ResourceExhausted(_))));
}

#[tokio::test]
async fn test_allocator_skips_externally_used_ports() {
    let probe = Arc::new(StaticPortProbe::new());
    probe.mark_busy(5554);
    let ports = allocator(5554..=5560, probe.clone());

    assert_eq!(ports.allocate().await.unwrap(), 5556);
    assert!(!ports.is_allocated(5554).await);

    probe.mark_free(5554);
    assert_eq!(ports.allocate().await.unwrap(), 5554);
}

#[tokio::test]
async fn test_release_makes_port_eligible_again() {
    let ports = allocator(5554..=5556, Arc::new(StaticPortProbe::new()));
    let a = ports.allocate().await.unwrap();
    let b = ports.allocate().await.unwrap();
    assert_ne!(a, b);
    assert_eq!(ports.free_count().await, 0);

    assert!(ports.release(a).await);
    assert!(!ports.release(a).await);
    assert_eq!(ports.free_count().await, 1);
    assert_eq!(ports.allocate().await.unwrap(), a);
}

#[tokio::test]
async fn test_allocator_never_hands_out_used_port_concurrently() {
    let ports = Arc::new(PortAllocator::new(6000..=6099, false, Arc::new(StaticPortProbe::new())));
    let handles: Vec<_> = (0..100)
        .map(|_| {
            let ports = ports.clone();
            tokio::spawn(async move { ports.allocate().await.unwrap() })
        })
        .collect();

    let mut seen = std::collections::HashSet::new();
    for handle in handles {
        assert!(seen.insert(handle.await.unwrap()), "port handed out twice");
    }
    assert_eq!(ports.free_count().await, 0);
}

#[tokio::test]
async fn test_tcp_probe_detects_listener() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let probe = TcpPortProbe::default();

    assert!(probe.is_in_use(port).await);
    drop(listener);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_start_and_stop() {
    let tool = Arc::new(SimulatedDeviceTool::new());
    let pool = pool_with(tool.clone(), 4);
    let free = pool.free_port_count().await;

    let device = pool.start(DeviceConfig::preset("pixel_6").unwrap()).await.unwrap();
    assert!(device.is_ready());
    assert_eq!(device.listen_port, 5554);
    assert_eq!(device.tool_handle.as_deref(), Some("sim-5554"));
    assert_eq!(pool.active_count(), 1);
    assert_eq!(pool.free_port_count().await, free - 1);

    let stopped = pool.stop(&device.id).await.unwrap();
    assert_eq!(stopped.state, DeviceState::Stopped);
    assert_eq!(stopped.listen_port, 5554);
    assert_eq!(pool.active_count(), 0);
    assert_eq!(pool.free_port_count().await, free);
    assert_eq!(tool.termination_count(), 1);
    assert_eq!(tool.running(), 0);
}

#[tokio::test]
async fn test_instance_cap_fails_fast() {
    let tool = Arc::new(SimulatedDeviceTool::new());
    let pool = pool_with(tool, 2);

    pool.start(DeviceConfig::default()).await.unwrap();
    pool.start(DeviceConfig::default()).await.unwrap();
    let third = pool.start(DeviceConfig::default()).await;

    assert!(matches!(third, Err(Error::ResourceExhausted(_))));
    assert_eq!(pool.active_count(), 2);
}

#[tokio::test]
async fn test_port_exhaustion_releases_slot() {
    let tool = Arc::new(SimulatedDeviceTool::new());
    let options = PoolOptions { max_instances: 10, ..PoolOptions::default() };
    let pool = DeviceLifecyclePool::new(tool, allocator(5554..=5554, Arc::new(StaticPortProbe::new())), options);

    pool.start(DeviceConfig::default()).await.unwrap();
    let second = pool.start(DeviceConfig::default()).await;
    assert!(matches!(second, Err(Error::ResourceExhausted(_))));
    assert_eq!(pool.active_count(), 1);
}

#[tokio::test]
async fn test_launch_failure_releases_port() {
    let tool = Arc::new(SimulatedDeviceTool::new());
    let pool = pool_with(tool.clone(), 4);
    let free = pool.free_port_count().await;

    tool.fail_next_launches(1);
    let result = pool.start(DeviceConfig::default()).await;

    assert!(matches!(result, Err(Error::ToolInvocationFailed(_))));
    assert_eq!(pool.active_count(), 0);
    assert_eq!(pool.free_port_count().await, free);

    // The failed launch does not poison the port.
    let device = pool.start(DeviceConfig::default()).await.unwrap();
    assert_eq!(device.listen_port, 5554);
}

#[tokio::test]
async fn test_stop_before_ready_releases_port() {
    let tool = Arc::new(SimulatedDeviceTool::with_boot_time(Duration::from_secs(60)));
    let pool = pool_with(tool.clone(), 4);
    let free = pool.free_port_count().await;

    let device = pool.launch(DeviceConfig::default()).await.unwrap();
    assert_eq!(device.state, DeviceState::Starting);
    assert_eq!(pool.free_port_count().await, free - 1);

    pool.stop(&device.id).await.unwrap();
    assert_eq!(pool.free_port_count().await, free);
    assert_eq!(pool.active_count(), 0);
    assert!(matches!(pool.wait_ready(&device.id).await, Err(Error::Cancelled(_))));
}

#[tokio::test]
async fn test_stop_while_start_is_waiting() {
    let tool = Arc::new(SimulatedDeviceTool::with_boot_time(Duration::from_secs(3600)));
    let pool = Arc::new(pool_with(tool, 4));
    let free = pool.free_port_count().await;

    let starter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.start(DeviceConfig::default()).await })
    };

    let id = loop {
        if let Some(device) = pool.list().unwrap().into_iter().find(|d| d.tool_handle.is_some()) {
            break device.id;
        }
        tokio::task::yield_now().await;
    };

    pool.stop(&id).await.unwrap();
    let result = starter.await.unwrap();
    assert!(matches!(result, Err(Error::Cancelled(_))));
    assert_eq!(pool.free_port_count().await, free);
}

#[tokio::test(start_paused = true)]
async fn test_readiness_timeout_stops_device() {
    let tool = Arc::new(SimulatedDeviceTool::new());
    tool.set_never_ready(true);
    let options = PoolOptions {
        max_instances: 2,
        readiness_timeout: Duration::from_secs(300),
        readiness_poll: Duration::from_secs(2),
        stop_grace: Duration::from_secs(1),
    };
    let pool = DeviceLifecyclePool::new(tool.clone(), allocator(5554..=5560, Arc::new(StaticPortProbe::new())), options);

    let started = tokio::time::Instant::now();
    let result = pool.start(DeviceConfig::default()).await;

    assert!(matches!(result, Err(Error::Timeout(_))));
    assert!(started.elapsed() >= Duration::from_secs(300));
    assert_eq!(pool.active_count(), 0);
    assert_eq!(pool.free_port_count().await, 4);
    assert_eq!(tool.running(), 0);
}

#[tokio::test]
async fn test_failed_terminate_retries_then_kills() {
    let tool = Arc::new(SimulatedDeviceTool::new());
    let pool = pool_with(tool.clone(), 4);
    let device = pool.start(DeviceConfig::default()).await.unwrap();

    tool.fail_next_terminates(1);
    pool.stop(&device.id).await.unwrap();
    assert_eq!(tool.termination_count(), 1);
    assert_eq!(tool.kill_count(), 0);

    let device = pool.start(DeviceConfig::default()).await.unwrap();
    tool.fail_next_terminates(2);
    pool.stop(&device.id).await.unwrap();
    assert_eq!(tool.kill_count(), 1);
    assert_eq!(pool.free_port_count().await, pool.ports().capacity());
}

#[tokio::test]
async fn test_stop_unknown_and_repeated() {
    let pool = pool_with(Arc::new(SimulatedDeviceTool::new()), 4);
    assert!(matches!(pool.stop("missing").await, Err(Error::DeviceNotFound(_))));

    let device = pool.start(DeviceConfig::default()).await.unwrap();
    pool.stop(&device.id).await.unwrap();
    assert!(matches!(pool.stop(&device.id).await, Err(Error::DeviceNotFound(_))));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_stop_waits_for_port_release() {
    let tool = Arc::new(SimulatedDeviceTool::new());
    tool.set_terminate_delay(Duration::from_millis(500));
    let pool = Arc::new(pool_with(tool.clone(), 4));
    let device = pool.start(DeviceConfig::default()).await.unwrap();

    let first = {
        let pool = pool.clone();
        let id = device.id.clone();
        tokio::spawn(async move { pool.stop(&id).await })
    };
    while matches!(pool.get(&device.id).map(|d| d.state), Ok(DeviceState::Ready)) {
        tokio::task::yield_now().await;
    }

    let second = pool.stop(&device.id).await.unwrap();
    assert_eq!(second.state, DeviceState::Stopped);
    assert_eq!(pool.free_port_count().await, pool.ports().capacity());
    assert_eq!(pool.active_count(), 0);

    assert_eq!(first.await.unwrap().unwrap().state, DeviceState::Stopped);
    assert_eq!(tool.termination_count(), 1);
}

#[tokio::test]
async fn test_wait_ready_on_stopping_device_is_cancelled() {
    let tool = Arc::new(SimulatedDeviceTool::with_boot_time(Duration::from_secs(3600)));
    tool.set_terminate_delay(Duration::from_millis(200));
    let pool = Arc::new(pool_with(tool, 4));
    let device = pool.launch(DeviceConfig::default()).await.unwrap();

    let stopper = {
        let pool = pool.clone();
        let id = device.id.clone();
        tokio::spawn(async move { pool.stop(&id).await })
    };
    while matches!(pool.get(&device.id).map(|d| d.state), Ok(DeviceState::Starting)) {
        tokio::task::yield_now().await;
    }

    assert!(matches!(pool.wait_ready(&device.id).await, Err(Error::Cancelled(_))));
    stopper.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_everything() {
    let tool = Arc::new(SimulatedDeviceTool::new());
    let pool = pool_with(tool.clone(), 4);
    for _ in 0..3 {
        pool.start(DeviceConfig::default()).await.unwrap();
    }

    pool.shutdown().await.unwrap();
    assert_eq!(pool.active_count(), 0);
    assert_eq!(tool.running(), 0);
    assert_eq!(pool.free_port_count().await, pool.ports().capacity());
}

#[test]
fn test_presets() {
    let pixel = DeviceConfig::preset("pixel_6").unwrap();
    assert_eq!(pixel.resolution, Resolution { width: 1080, height: 2400 });
    assert_eq!(pixel.density, 420);
    assert!(DeviceConfig::preset("nokia_3310").is_err());
    assert!(DeviceConfig::preset_names().any(|n| n == "tablet_10"));
}
