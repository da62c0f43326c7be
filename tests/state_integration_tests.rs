//! Integration tests for SharedState under concurrent access
//!
//! These tests verify that SharedState:
//! - Hands the run slot to exactly one of many concurrent claimants
//! - Never exposes a torn record to readers while writers are busy
//! - Keeps the two records independent of each other

use serial_updater::SharedState;
use serial_updater::models::{Percent, Progress};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

#[test]
fn test_only_one_concurrent_claim_wins() {
    for _ in 0..50 {
        let state = SharedState::new();
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                let winners = Arc::clone(&winners);
                thread::spawn(move || {
                    if state.try_begin_run() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(state.is_running());
    }
}

#[test]
fn test_readers_see_whole_progress_values() {
    let state = SharedState::new();
    state.try_begin_run();

    let writer = {
        let state = state.clone();
        thread::spawn(move || {
            for i in 0..=100u8 {
                // Text and percent always agree within one report
                state.set_progress(Progress::new(Some(format!("step {i}")), Percent::known(i)));
            }
        })
    };

    let reader = {
        let state = state.clone();
        thread::spawn(move || {
            for _ in 0..1000 {
                if let Some(progress) = state.process_status().progress {
                    let expected = progress.percent.value().map(|p| format!("step {p}"));
                    assert_eq!(progress.status_text, expected);
                }
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
}

#[test]
fn test_discovery_writes_do_not_touch_status() {
    let state = SharedState::new();
    state.try_begin_run();
    state.set_progress(Progress::new(Some("Writing".into()), Percent::known(30)));
    let before = state.process_status();

    let discovery = {
        let state = state.clone();
        thread::spawn(move || {
            for i in 0..100 {
                state.set_available_devices(vec![format!("COM{i}")]);
                state.set_available_firmware_images(vec![format!("fw_{i}.bin")]);
            }
        })
    };
    discovery.join().unwrap();

    assert_eq!(state.process_status(), before);
    assert_eq!(state.resources().available_devices, vec!["COM99".to_string()]);
}

#[test]
fn test_run_lifecycle_counts_completions() {
    let state = SharedState::new();

    for round in 1..=3u64 {
        assert!(state.try_begin_run());
        assert!(!state.try_begin_run());
        state.finish_run(if round == 2 { Some("DriverError exited".into()) } else { None });

        let status = state.process_status();
        assert!(!status.running);
        assert_eq!(status.runs_completed, round);
    }

    // The last run succeeded, so the earlier error is gone
    assert!(state.process_status().error_message.is_none());
}
