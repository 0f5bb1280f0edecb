use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use desk_config::{CachedDevice, load_device_cache, store_device_cache};
use desk_core::codec::TelemetrySample;
use desk_core::{ConnectionManager, DeskCfg, DeskError, TelemetryHandler, notify};
use desk_hardware::{SimSettings, SimulatedDesk};
use desk_traits::{Characteristic, DeviceHandle, TestClock};
use rstest::rstest;
use tempfile::tempdir;

const ADDR: &str = "FD:46:77:A9:30:CA";

fn manager(clock: &TestClock) -> ConnectionManager {
    ConnectionManager::new(DeskCfg::default().connection).with_clock(Arc::new(clock.clone()))
}

struct Ignore;
impl TelemetryHandler for Ignore {
    fn on_sample(&self, _sample: &TelemetrySample) {}
}

#[test]
fn discover_matches_address_case_insensitively() {
    let clock = TestClock::new();
    let mut sim = SimulatedDesk::default();
    let handle = manager(&clock)
        .discover(&mut sim, "fd:46:77:a9:30:ca")
        .expect("discovered");
    assert_eq!(handle.address, ADDR);
    assert_eq!(handle.name.as_deref(), Some("Desk 4711"));
}

#[test]
fn discover_times_out_when_desk_is_silent() {
    let clock = TestClock::new();
    let mut sim = SimulatedDesk::new(SimSettings {
        advertising: false,
        ..Default::default()
    });
    let err = manager(&clock).discover(&mut sim, ADDR).unwrap_err();
    assert_eq!(
        err,
        DeskError::DiscoveryTimeout {
            address: ADDR.to_string(),
            timeout_sec: 5,
        }
    );
}

#[test]
fn scan_all_lists_advertisers() {
    let clock = TestClock::new();
    let mut sim = SimulatedDesk::default();
    let all = manager(&clock).scan_all(&mut sim).unwrap();
    assert_eq!(all, vec![DeviceHandle::new(ADDR).with_name("Desk 4711")]);
}

#[rstest]
#[case(0, 0)]
#[case(1, 0)]
#[case(3, 1500)]
#[case(5, 7500)]
#[case(7, 15500)]
fn connect_gives_up_after_exactly_max_attempts(
    #[case] max_attempts: u32,
    #[case] backoff_ms: u64,
) {
    let clock = TestClock::new();
    let sim = SimulatedDesk::new(SimSettings {
        fail_connects: u32::MAX,
        ..Default::default()
    });
    let err = manager(&clock)
        .connect(sim.clone(), &DeviceHandle::new(ADDR), max_attempts)
        .err()
        .expect("connect should fail");
    match err {
        DeskError::ConnectionFailure { attempts, cause } => {
            assert_eq!(attempts, max_attempts);
            if max_attempts > 0 {
                assert!(cause.contains("connection refused"), "{cause}");
            }
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(sim.log().connect_attempts, max_attempts);
    assert_eq!(clock.elapsed(), Duration::from_millis(backoff_ms));
}

#[test]
fn connect_recovers_from_transient_failures() {
    let clock = TestClock::new();
    let sim = SimulatedDesk::new(SimSettings {
        fail_connects: 2,
        ..Default::default()
    });
    let session = manager(&clock)
        .connect(sim.clone(), &DeviceHandle::new(ADDR), 5)
        .expect("third attempt connects");
    assert!(session.is_connected());
    assert_eq!(sim.log().connect_attempts, 3);
    assert_eq!(clock.elapsed(), Duration::from_millis(1500));
}

#[test]
fn disconnect_is_idempotent_and_unsubscribes_first() {
    let clock = TestClock::new();
    let sim = SimulatedDesk::default();
    let mgr = manager(&clock);
    let mut session = mgr.connect(sim.clone(), &DeviceHandle::new(ADDR), 1).unwrap();
    notify::subscribe(&mut session, Characteristic::Height, Arc::new(Ignore)).unwrap();

    mgr.disconnect(&mut session).unwrap();
    mgr.disconnect(&mut session).unwrap();

    let log = sim.log();
    assert_eq!(log.notify_stops, 1);
    assert_eq!(log.disconnects, 1);
    assert!(!session.is_connected());
    assert!(!session.is_subscribed());
}

#[test]
fn cached_device_skips_the_scan() {
    let dir = tempdir().unwrap();
    let cache = dir.path().join("device.toml");
    let clock = TestClock::new();
    let mgr = manager(&clock);

    let mut advertising = SimulatedDesk::default();
    let first = mgr
        .discover_cached(&mut advertising, ADDR, Some(cache.as_path()))
        .unwrap();
    assert_eq!(
        load_device_cache(&cache),
        Some(CachedDevice {
            address: first.address.clone(),
            name: first.name.clone(),
        })
    );

    let mut silent = SimulatedDesk::new(SimSettings {
        advertising: false,
        ..Default::default()
    });
    let second = mgr.discover_cached(&mut silent, ADDR, Some(cache.as_path())).unwrap();
    assert_eq!(second, first);
}

#[test]
fn cache_for_another_desk_is_ignored() {
    let dir = tempdir().unwrap();
    let cache = dir.path().join("device.toml");
    store_device_cache(
        &cache,
        &CachedDevice {
            address: "00:11:22:33:44:55".into(),
            name: None,
        },
    )
    .unwrap();
    let clock = TestClock::new();
    let mut silent = SimulatedDesk::new(SimSettings {
        advertising: false,
        ..Default::default()
    });
    let err = manager(&clock)
        .discover_cached(&mut silent, ADDR, Some(cache.as_path()))
        .unwrap_err();
    assert!(matches!(err, DeskError::DiscoveryTimeout { .. }));
}

struct Counting(AtomicUsize);
impl TelemetryHandler for Counting {
    fn on_sample(&self, _sample: &TelemetrySample) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn notifications_stop_after_disconnect() {
    let clock = TestClock::new();
    let sim = SimulatedDesk::default();
    let mgr = manager(&clock);
    let mut session = mgr.connect(sim.clone(), &DeviceHandle::new(ADDR), 1).unwrap();
    let counter = Arc::new(Counting(AtomicUsize::new(0)));
    notify::subscribe(&mut session, Characteristic::Height, counter.clone()).unwrap();
    sim.inject_notification(&[0, 0, 0, 0]);
    mgr.disconnect(&mut session).unwrap();
    sim.inject_notification(&[0, 0, 0, 0]);
    assert_eq!(counter.0.load(Ordering::SeqCst), 1);
}
