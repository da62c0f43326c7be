//! Shared fixtures for the integration tests

#![allow(dead_code)]

use camino::Utf8PathBuf;
use serial_updater::services::{DiscoveryError, DriverError, ProgressSink, UpdateDriver};
use serial_updater::services::{DeviceEnumerator, FirmwareEnumerator};
use std::fs;
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Temporary firmware directory holding the given images
pub fn firmware_dir(images: &[(&str, &[u8])]) -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    for (name, contents) in images {
        fs::write(temp_dir.path().join(name), contents).unwrap();
    }
    let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, dir)
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes
pub async fn wait_for<F: FnMut() -> bool>(mut condition: F, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Enumerator whose result the test can change at any time
pub struct Listing(Mutex<Result<Vec<String>, String>>);

impl Listing {
    pub fn new(items: &[&str]) -> Self {
        Self(Mutex::new(Ok(strings(items))))
    }

    pub fn set(&self, items: &[&str]) {
        *self.0.lock().unwrap() = Ok(strings(items));
    }

    pub fn fail(&self, message: &str) {
        *self.0.lock().unwrap() = Err(message.to_string());
    }

    fn current(&self) -> Result<Vec<String>, DiscoveryError> {
        self.0
            .lock()
            .unwrap()
            .clone()
            .map_err(DiscoveryError::Enumeration)
    }
}

impl DeviceEnumerator for Listing {
    fn list_devices(&self) -> Result<Vec<String>, DiscoveryError> {
        self.current()
    }
}

impl FirmwareEnumerator for Listing {
    fn list_images(&self) -> Result<Vec<String>, DiscoveryError> {
        self.current()
    }
}

/// What a [`TestDriver`] does once released
#[derive(Clone, Copy, Debug)]
pub enum Outcome {
    Succeed,
    Timeout,
    Panic,
}

/// Driver that reports some progress, waits for the test to release it and
/// then ends with the configured outcome
pub struct TestDriver {
    outcome: Outcome,
    release: Option<Mutex<Receiver<()>>>,
    calls: Mutex<Vec<(String, Vec<u8>, Vec<u8>)>>,
}

impl TestDriver {
    /// Driver that finishes without waiting
    pub fn immediate(outcome: Outcome) -> Self {
        Self {
            outcome,
            release: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Driver that blocks until the returned sender sends (or is dropped)
    pub fn gated(outcome: Outcome) -> (Self, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let driver = Self {
            outcome,
            release: Some(Mutex::new(rx)),
            calls: Mutex::new(Vec::new()),
        };
        (driver, tx)
    }

    /// `(device_id, image, sync_prefix)` of every call so far
    pub fn calls(&self) -> Vec<(String, Vec<u8>, Vec<u8>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl UpdateDriver for TestDriver {
    fn update(
        &self,
        device_id: &str,
        image: &[u8],
        progress: &dyn ProgressSink,
        sync_prefix: &[u8],
    ) -> Result<(), DriverError> {
        self.calls
            .lock()
            .unwrap()
            .push((device_id.to_string(), image.to_vec(), sync_prefix.to_vec()));

        progress.report(Some("Synchronizing"), None);
        progress.report(Some("Writing"), Some(0.5));

        if let Some(release) = &self.release {
            let _ = release.lock().unwrap().recv();
        }

        match self.outcome {
            Outcome::Succeed => Ok(()),
            Outcome::Timeout => Err(DriverError::Timeout("no response".to_string())),
            Outcome::Panic => panic!("serial port vanished"),
        }
    }
}
