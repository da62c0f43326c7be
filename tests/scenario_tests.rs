//! End-to-end scenarios through the Updater
//!
//! Each test runs the real discovery and reconciliation loops with short
//! intervals against scripted enumerators and drivers, and observes the
//! result the way a presenter would.

mod common;

use common::{Listing, Outcome, TestDriver, firmware_dir, wait_for};
use serial_updater::ui::ProgressIndicator;
use serial_updater::{StartRejection, Updater, UpdaterConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

const WAIT: Duration = Duration::from_secs(2);

struct Fixture {
    updater: Updater,
    devices: Arc<Listing>,
    firmware: Arc<Listing>,
    driver: Arc<TestDriver>,
    _temp_dir: tempfile::TempDir,
}

fn fixture(driver: TestDriver) -> Fixture {
    let (temp_dir, dir) = firmware_dir(&[("fw_v1.bin", b"v1"), ("fw_v2.bin", b"v2-image")]);
    let config = UpdaterConfig {
        firmware_dir: dir.to_string(),
        discovery_interval_ms: 10,
        reconcile_interval_ms: 5,
        ..Default::default()
    };

    let devices = Arc::new(Listing::new(&["/dev/ttyACM0"]));
    let firmware = Arc::new(Listing::new(&["fw_v1.bin", "fw_v2.bin"]));
    let driver = Arc::new(driver);

    let updater = Updater::new(
        &config,
        devices.clone(),
        firmware.clone(),
        driver.clone(),
        Handle::current(),
    );

    Fixture {
        updater,
        devices,
        firmware,
        driver,
        _temp_dir: temp_dir,
    }
}

async fn wait_until_listed(updater: &Updater) {
    let listed = wait_for(
        || {
            let display = updater.current_display_state();
            !display.device_list.items.is_empty() && !display.firmware_list.items.is_empty()
        },
        WAIT,
    )
    .await;
    assert!(listed, "discovery never filled the display");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_successful_update() {
    let f = fixture(TestDriver::immediate(Outcome::Succeed));
    wait_until_listed(&f.updater).await;

    let display = f.updater.current_display_state();
    assert_eq!(display.device_list.items, vec!["/dev/ttyACM0"]);
    assert_eq!(display.firmware_list.items, vec!["fw_v2.bin", "fw_v1.bin"]);

    f.updater.start("/dev/ttyACM0", "fw_v2.bin").unwrap();

    let mut completed = None;
    wait_for(
        || {
            completed = f.updater.current_display_state().run_completed;
            completed.is_some()
        },
        WAIT,
    )
    .await;

    let completed = completed.expect("no completion notification");
    assert!(completed.succeeded());

    let status = f.updater.shared_state().process_status();
    assert!(!status.running);
    assert!(status.error_message.is_none());

    let calls = f.driver.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "/dev/ttyACM0");
    assert_eq!(calls[0].1, b"v2-image");
    assert_eq!(calls[0].2, b"\r\n\r\nbootloader\r\n");

    f.updater.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_driver_timeout_is_reported() {
    let f = fixture(TestDriver::immediate(Outcome::Timeout));
    wait_until_listed(&f.updater).await;

    f.updater.start("/dev/ttyACM0", "fw_v2.bin").unwrap();

    let mut completed = None;
    wait_for(
        || {
            completed = f.updater.current_display_state().run_completed;
            completed.is_some()
        },
        WAIT,
    )
    .await;

    let completed = completed.expect("no completion notification");
    assert_eq!(completed.error_message.as_deref(), Some("TimeoutError no response"));
    assert_eq!(
        f.updater.shared_state().process_status().error_message.as_deref(),
        Some("TimeoutError no response")
    );

    // Consumed by the read above
    assert!(f.updater.current_display_state().run_completed.is_none());

    f.updater.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_firmware_file_is_rejected() {
    let f = fixture(TestDriver::immediate(Outcome::Succeed));
    f.firmware.set(&["fw_v1.bin", "fw_v2.bin", "fw_v3.bin"]);
    wait_until_listed(&f.updater).await;

    let result = f.updater.start("/dev/ttyACM0", "fw_v3.bin");

    assert!(matches!(result, Err(StartRejection::FirmwareNotFound(_))));
    assert!(!f.updater.shared_state().is_running());
    assert_eq!(f.updater.shared_state().process_status().runs_completed, 0);
    assert!(f.driver.calls().is_empty());

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(f.updater.current_display_state().run_completed.is_none());

    f.updater.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_selection_cleared_only_when_device_list_empties() {
    let f = fixture(TestDriver::immediate(Outcome::Succeed));
    wait_until_listed(&f.updater).await;
    assert!(f.updater.select_device("/dev/ttyACM0"));

    // Failing enumerations keep the previous list, so the selection stays
    f.devices.fail("port scan failed");
    tokio::time::sleep(Duration::from_millis(60)).await;
    let display = f.updater.current_display_state();
    assert_eq!(display.device_list.current_selection.as_deref(), Some("/dev/ttyACM0"));

    // Three empty cycles and beyond
    f.devices.set(&[]);
    let cleared = wait_for(
        || {
            f.updater
                .current_display_state()
                .device_list
                .current_selection
                .is_none()
        },
        WAIT,
    )
    .await;
    assert!(cleared);
    assert!(f.updater.current_display_state().device_list.items.is_empty());

    f.updater.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_while_running_is_rejected() {
    let (driver, release) = TestDriver::gated(Outcome::Succeed);
    let f = fixture(driver);
    wait_until_listed(&f.updater).await;

    f.updater.start("/dev/ttyACM0", "fw_v1.bin").unwrap();

    // Progress from the driver reaches the display while it is blocked
    let bounded = wait_for(
        || f.updater.current_display_state().progress_indicator == ProgressIndicator::Bounded(50),
        WAIT,
    )
    .await;
    assert!(bounded);
    assert_eq!(f.updater.current_display_state().status_text, "Writing");

    let before = f.updater.shared_state().process_status();
    assert!(before.running);

    let result = f.updater.start("/dev/ttyACM0", "fw_v2.bin");
    assert!(matches!(result, Err(StartRejection::AlreadyRunning)));
    assert_eq!(f.updater.shared_state().process_status(), before);

    release.send(()).unwrap();
    let finished = wait_for(
        || f.updater.current_display_state().run_completed.is_some(),
        WAIT,
    )
    .await;
    assert!(finished);
    assert_eq!(f.driver.calls().len(), 1);

    f.updater.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panicking_driver_ends_run() {
    let f = fixture(TestDriver::immediate(Outcome::Panic));
    wait_until_listed(&f.updater).await;

    f.updater.start("/dev/ttyACM0", "fw_v1.bin").unwrap();

    let mut completed = None;
    wait_for(
        || {
            completed = f.updater.current_display_state().run_completed;
            completed.is_some()
        },
        WAIT,
    )
    .await;

    let message = completed.and_then(|c| c.error_message).unwrap_or_default();
    assert!(message.starts_with("Panic"), "unexpected message: {message}");
    assert!(!f.updater.shared_state().is_running());

    // The slot is free again
    assert!(f.updater.start("/dev/ttyACM0", "fw_v1.bin").is_ok());
    f.updater.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_only_latest_unconsumed_outcome_is_surfaced() {
    let f = fixture(TestDriver::immediate(Outcome::Timeout));
    wait_until_listed(&f.updater).await;

    f.updater.start("/dev/ttyACM0", "fw_v1.bin").unwrap();
    wait_for(|| f.updater.shared_state().process_status().runs_completed == 1, WAIT).await;
    f.updater.start("/dev/ttyACM0", "fw_v2.bin").unwrap();
    wait_for(|| f.updater.shared_state().process_status().runs_completed == 2, WAIT).await;

    // Give the reconciler a few ticks, without consuming anything
    tokio::time::sleep(Duration::from_millis(40)).await;

    let completed = f.updater.current_display_state().run_completed;
    assert!(completed.is_some());
    assert!(f.updater.current_display_state().run_completed.is_none());

    f.updater.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_waits_for_running_update() {
    let (driver, release) = TestDriver::gated(Outcome::Succeed);
    let f = fixture(driver);
    wait_until_listed(&f.updater).await;

    f.updater.start("/dev/ttyACM0", "fw_v1.bin").unwrap();
    let state = f.updater.shared_state().clone();
    assert!(state.is_running());

    let shutdown = tokio::spawn(f.updater.shutdown());
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!shutdown.is_finished());

    release.send(()).unwrap();
    tokio::time::timeout(WAIT, shutdown)
        .await
        .expect("shutdown did not finish")
        .unwrap();
    assert!(!state.is_running());
}
