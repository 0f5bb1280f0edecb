use std::sync::Arc;

use desk_config::load_device_cache;
use desk_core::mocks::RecordingReporter;
use desk_core::{CancelToken, DeskCfg, DeskError, run_to_position, run_with_session};
use desk_hardware::{SimSettings, SimulatedDesk};
use desk_traits::TestClock;
use tempfile::tempdir;

fn sim_from(start_height_mm: f32) -> SimulatedDesk {
    SimulatedDesk::new(SimSettings {
        start_height_mm,
        ..Default::default()
    })
}

#[test]
fn full_run_reaches_preset_and_disconnects() {
    let dir = tempdir().unwrap();
    let mut cfg = DeskCfg::default();
    cfg.device_cache = Some(dir.path().join("device.toml"));
    let target = cfg.position("position_3").unwrap();
    let sim = sim_from(700.0);
    let rec = RecordingReporter::new();

    let outcome = run_to_position(
        sim.clone(),
        &cfg,
        Arc::new(TestClock::new()),
        target,
        Arc::new(rec.clone()),
        &CancelToken::new(),
    )
    .unwrap();

    assert!(outcome.success());
    assert_eq!(sim.height_mm(), 1150.0);
    assert_eq!(rec.count("Done"), 1);
    let log = sim.log();
    assert_eq!(log.connect_attempts, 1);
    assert_eq!(log.disconnects, 1);
    assert_eq!(log.notify_starts, log.notify_stops);
    assert!(load_device_cache(cfg.device_cache.as_deref().unwrap()).is_some());
}

#[test]
fn silent_desk_surfaces_discovery_timeout() {
    let cfg = DeskCfg::default();
    let sim = SimulatedDesk::new(SimSettings {
        advertising: false,
        ..Default::default()
    });
    let err = run_to_position(
        sim.clone(),
        &cfg,
        Arc::new(TestClock::new()),
        900.0,
        Arc::new(RecordingReporter::new()),
        &CancelToken::new(),
    )
    .unwrap_err();
    assert!(matches!(err, DeskError::DiscoveryTimeout { .. }));
    assert_eq!(sim.log().connect_attempts, 0);
}

#[test]
fn refused_connections_exhaust_configured_attempts() {
    let mut cfg = DeskCfg::default();
    cfg.connection.attempts = 3;
    let sim = SimulatedDesk::new(SimSettings {
        fail_connects: 10,
        ..Default::default()
    });
    let clock = TestClock::new();
    let err = run_with_session(sim.clone(), &cfg, Arc::new(clock.clone()), |_, _| Ok(()))
        .unwrap_err();
    assert!(matches!(err, DeskError::ConnectionFailure { attempts: 3, .. }));
    assert_eq!(sim.log().connect_attempts, 3);
}

#[test]
fn session_is_closed_even_when_the_action_fails() {
    let cfg = DeskCfg::default();
    let sim = sim_from(800.0);
    let err = run_with_session(sim.clone(), &cfg, Arc::new(TestClock::new()), |_, _| {
        Err::<(), _>(DeskError::Busy)
    })
    .unwrap_err();
    assert_eq!(err, DeskError::Busy);
    assert_eq!(sim.log().disconnects, 1);
    assert!(!desk_traits::Transport::is_connected(&sim));
}
