//! 功能验收测试
//!
//! End-to-end checks of the example scenarios and the guaranteed properties,
//! driven through the public API over simulated backends.

mod common;

use std::collections::HashSet;
use std::time::Duration;

use device_fleet::connection::HealthState;
use device_fleet::device::{DeviceConfig, DeviceState};
use device_fleet::session::{DeviceOrigin, ReleaseMode};
use device_fleet::timing::{AggressivenessTier, BehaviorProfile, BehaviorTimingModel, Personality, RunningState};
use device_fleet::touch::{GestureProfile, ScreenBounds, TouchSynthesizer};
use device_fleet::Error;
use futures_util::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;

use common::{assert_well_formed, profile, test_config, test_fleet, test_fleet_with_boot_time};

// ============= Scenario 1: tap =============

#[test]
fn test_tap_on_portrait_screen() {
    let bounds = ScreenBounds::new(1080, 1920);
    let gestures = GestureProfile::default();

    for seed in 0..200 {
        let pattern = TouchSynthesizer::seeded(seed).tap(540.0, 960.0, &bounds, &gestures);

        assert!(pattern.points.len() >= 3);
        assert_well_formed(&pattern, &bounds);
        assert!(pattern.total_duration >= Duration::from_millis(80));
        assert!(pattern.total_duration <= Duration::from_millis(450), "{:?}", pattern.total_duration);
    }
}

// ============= Scenario 2: swipe =============

#[test]
fn test_long_diagonal_swipe() {
    let bounds = ScreenBounds::new(1080, 1920);
    let gestures = GestureProfile::default();

    for seed in 0..200 {
        let pattern = TouchSynthesizer::seeded(seed).swipe((100.0, 100.0), (900.0, 1800.0), None, &bounds, &gestures);

        assert!(pattern.points.len() >= 10);
        assert_well_formed(&pattern, &bounds);
        assert!(pattern.total_duration >= gestures.min_swipe_duration);
        assert!(pattern.total_duration <= gestures.max_swipe_duration);
    }
}

#[test]
fn test_swipe_duration_grows_with_distance() {
    let bounds = ScreenBounds::new(1080, 1920);
    let gestures = GestureProfile::default();

    for seed in 0..50 {
        let durations: Vec<Duration> = [50.0, 200.0, 600.0, 1200.0, 1800.0]
            .iter()
            .map(|len| {
                TouchSynthesizer::seeded(seed)
                    .swipe((100.0, 100.0), (100.0, 100.0 + len), None, &bounds, &gestures)
                    .total_duration
            })
            .collect();
        assert!(durations.windows(2).all(|w| w[0] <= w[1]), "{:?}", durations);
    }
}

// ============= Scenario 3: health monitor removal =============

#[tokio::test]
async fn test_four_failed_probes_remove_connection() {
    let t = test_fleet(test_config(2));
    let sessions = t.fleet.sessions();
    let session = sessions
        .create_session(DeviceOrigin::Launch(DeviceConfig::default()), profile())
        .await
        .unwrap();
    let serial = format!("emulator-{}", t.fleet.pool().get(&session.device_id).unwrap().listen_port);

    t.bridge.set_probe_failing(&serial, true);
    for _ in 0..3 {
        t.fleet.connections().check_health().await.unwrap();
        assert!(t.fleet.connections().record(&session.device_id).is_some());
    }
    let report = t.fleet.connections().check_health().await.unwrap();

    assert_eq!(report.removed, vec![session.device_id.clone()]);
    assert!(t.fleet.connections().record(&session.device_id).is_none());
    assert!(!t.fleet.connections().list_connected().contains(&session.device_id));

    // The orchestrator treats the session as unusable and ends it.
    let tap = sessions.perform_tap(&session.id, 10.0, 10.0).await;
    assert!(matches!(tap, Err(Error::ConnectionRemoved(_))));
    assert_eq!(sessions.session_count(), 0);
    assert_eq!(t.fleet.pool().active_count(), 0);
}

// ============= Scenario 4: bounded session creation =============

#[tokio::test]
async fn test_five_concurrent_creates_with_three_slots() {
    let t = test_fleet(test_config(3));
    let sessions = t.fleet.sessions();
    let free = t.fleet.pool().free_port_count().await;

    let results = join_all((0..5).map(|_| {
        let sessions = sessions.clone();
        tokio::spawn(async move {
            sessions
                .create_session(DeviceOrigin::Launch(DeviceConfig::default()), profile())
                .await
        })
    }))
    .await;
    let results: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();

    let active: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    let exhausted = results
        .iter()
        .filter(|r| matches!(r, Err(Error::ResourceExhausted(_))))
        .count();

    assert_eq!(active.len(), 3);
    assert!(active.iter().all(|s| s.is_active()));
    assert_eq!(exhausted, 2);
    assert_eq!(t.fleet.pool().free_port_count().await, free - 3);

    t.fleet.shutdown().await.unwrap();
    assert_eq!(t.fleet.pool().free_port_count().await, free);
}

// ============= Scenario 5: stop before ready =============

#[test]
fn test_stop_before_ready_releases_port() {
    let t = test_fleet_with_boot_time(test_config(2), Duration::from_secs(120));
    let pool = t.fleet.pool();

    tokio_test::block_on(async {
        let free = pool.free_port_count().await;
        let device = pool.launch(DeviceConfig::preset("pixel_6").unwrap()).await.unwrap();
        assert_eq!(device.state, DeviceState::Starting);

        let stopped = pool.stop(&device.id).await.unwrap();
        assert_eq!(stopped.state, DeviceState::Stopped);
        assert_eq!(pool.free_port_count().await, free);
        assert!(matches!(pool.wait_ready(&device.id).await, Err(Error::Cancelled(_))));
    });
    assert_eq!(t.tool.running(), 0);
}

// ============= Properties =============

#[test]
fn test_delays_stay_in_tier_band() {
    let model = BehaviorTimingModel::default();
    let mut rng = StdRng::seed_from_u64(2024);

    for (aggressiveness, tier) in [
        (0.1, AggressivenessTier::Cautious),
        (0.4, AggressivenessTier::Moderate),
        (0.6, AggressivenessTier::Brisk),
        (0.9, AggressivenessTier::Aggressive),
    ] {
        let profile = BehaviorProfile::new(Personality::Impulsive, aggressiveness, 0.5).unwrap();
        assert_eq!(profile.tier(), tier);
        let (min, max) = tier.band();
        let mut state = RunningState::new();

        for hour in (0..10_000).map(|i| i % 24) {
            let delay = model.next_delay_at(&mut rng, &profile, &mut state, hour);
            assert!(delay >= min && delay <= max, "{:?} outside {:?}-{:?}", delay, min, max);
        }
    }
}

#[tokio::test]
async fn test_allocated_ports_skip_busy_and_are_unique() {
    let t = test_fleet(test_config(6));
    t.probe.mark_busy(5554);
    t.probe.mark_busy(5558);
    let sessions = t.fleet.sessions();

    let mut ports = HashSet::new();
    for _ in 0..6 {
        let session = sessions
            .create_session(DeviceOrigin::Launch(DeviceConfig::default()), profile())
            .await
            .unwrap();
        let port = t.fleet.pool().get(&session.device_id).unwrap().listen_port;
        assert!(port != 5554 && port != 5558);
        assert_eq!(port % 2, 0);
        assert!(ports.insert(port));
    }

    t.fleet.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_full_session_round_trip() {
    let t = test_fleet(test_config(2));
    t.fleet.init().await.unwrap();
    let sessions = t.fleet.sessions();

    let session = sessions
        .create_session(DeviceOrigin::preset("galaxy_s21").unwrap(), profile())
        .await
        .unwrap();
    assert_eq!(
        t.fleet.connections().record(&session.device_id).unwrap().health,
        HealthState::Connected
    );

    sessions.perform_tap(&session.id, 540.0, 1200.0).await.unwrap();
    sessions.perform_swipe(&session.id, (540.0, 2000.0), (540.0, 400.0), None).await.unwrap();
    sessions
        .perform_long_press(&session.id, 200.0, 200.0, Duration::from_millis(600))
        .await
        .unwrap();
    sessions
        .perform_pinch(&session.id, 540.0, 1200.0, 0.5, Duration::from_millis(400))
        .await
        .unwrap();

    let log = sessions.action_log(&session.id).unwrap();
    assert_eq!(log.len(), 4);
    let json = serde_json::to_string(&log).unwrap();
    assert!(json.contains("long_press"));

    sessions.end_session(&session.id, ReleaseMode::Stop).await.unwrap();
    sessions.end_session(&session.id, ReleaseMode::Stop).await.unwrap();
    assert_eq!(t.fleet.pool().active_count(), 0);

    t.fleet.shutdown().await.unwrap();
}
