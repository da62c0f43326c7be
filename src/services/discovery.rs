use crate::metrics::Metrics;
use crate::state::SharedState;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Errors from device or firmware enumeration.
///
/// Always transient from the updater's point of view: they are logged and the
/// previous snapshot is kept until the next cycle.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("device enumeration is not supported on this platform: {0}")]
    Unsupported(String),

    #[error("enumeration failed: {0}")]
    Enumeration(String),

    #[error("failed to read firmware directory {path}: {source}")]
    FirmwareDir {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Lists the communication endpoints a device can be updated through.
pub trait DeviceEnumerator: Send + Sync {
    /// Device identifiers, sorted ascending
    fn list_devices(&self) -> Result<Vec<String>, DiscoveryError>;
}

/// Lists the firmware images available for flashing.
pub trait FirmwareEnumerator: Send + Sync {
    /// Image file names (not paths), sorted ascending
    fn list_images(&self) -> Result<Vec<String>, DiscoveryError>;
}

/// Enumerates serial ports through the `serialport` crate
#[derive(Debug, Default, Clone)]
pub struct SerialPortEnumerator;

impl DeviceEnumerator for SerialPortEnumerator {
    fn list_devices(&self) -> Result<Vec<String>, DiscoveryError> {
        let ports = serialport::available_ports().map_err(|e| match e.kind() {
            serialport::ErrorKind::Unknown => DiscoveryError::Unsupported(e.to_string()),
            _ => DiscoveryError::Enumeration(e.to_string()),
        })?;

        let mut devices: Vec<String> = ports.into_iter().map(|p| p.port_name).collect();
        devices.sort();
        devices.dedup();
        Ok(devices)
    }
}

/// Enumerates firmware images in a directory by file extension
#[derive(Debug, Clone)]
pub struct FirmwareDirEnumerator {
    dir: Utf8PathBuf,
    extension: String,
}

impl FirmwareDirEnumerator {
    /// `extension` is matched case-insensitively, with or without a leading dot.
    pub fn new<P: AsRef<Utf8Path>>(dir: P, extension: &str) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }
}

impl FirmwareEnumerator for FirmwareDirEnumerator {
    fn list_images(&self) -> Result<Vec<String>, DiscoveryError> {
        let dir_error = |source| DiscoveryError::FirmwareDir {
            path: self.dir.clone(),
            source,
        };

        let mut images = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(dir_error)? {
            let entry = entry.map_err(dir_error)?;

            // Follows symlinks, so a linked image still counts
            if !entry.path().is_file() {
                continue;
            }

            let Ok(name) = entry.file_name().into_string() else {
                tracing::debug!("Skipping non-UTF-8 file name in {}", self.dir);
                continue;
            };

            let matches = Utf8Path::new(&name)
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension));
            if matches {
                images.push(name);
            }
        }

        images.sort();
        Ok(images)
    }
}

/// Background activity that keeps the resource snapshot current.
///
/// Each cycle re-enumerates devices and firmware images independently; a
/// failing enumeration is logged and leaves its previous list in place.
pub struct DiscoveryLoop {
    state: SharedState,
    devices: Arc<dyn DeviceEnumerator>,
    firmware: Arc<dyn FirmwareEnumerator>,
    interval: Duration,
    metrics: Arc<Metrics>,
}

impl DiscoveryLoop {
    pub fn new(
        state: SharedState,
        devices: Arc<dyn DeviceEnumerator>,
        firmware: Arc<dyn FirmwareEnumerator>,
        interval: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            state,
            devices,
            firmware,
            interval,
            metrics,
        }
    }

    /// Run one discovery cycle. Blocks on enumeration I/O.
    pub fn run_cycle(&self) {
        match self.devices.list_devices() {
            Ok(devices) => {
                tracing::debug!("Discovered {} devices", devices.len());
                self.state.set_available_devices(devices);
            }
            Err(e) => {
                tracing::warn!("Device enumeration failed, keeping previous list: {}", e);
                self.metrics.record_discovery_failure();
            }
        }

        match self.firmware.list_images() {
            Ok(images) => {
                tracing::debug!("Discovered {} firmware images", images.len());
                self.state.set_available_firmware_images(images);
            }
            Err(e) => {
                tracing::warn!("Firmware enumeration failed, keeping previous list: {}", e);
                self.metrics.record_discovery_failure();
            }
        }

        self.metrics.record_discovery_cycle();
    }

    /// Run cycles at the configured interval until `stop` turns `true` or its
    /// sender is dropped. The first cycle runs immediately.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        tracing::info!("Discovery loop started (interval {:?})", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let this = Arc::new(self);

        loop {
            if *stop.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            // Enumeration may block, keep it off the async workers
            let cycle = Arc::clone(&this);
            if let Err(e) = tokio::task::spawn_blocking(move || cycle.run_cycle()).await {
                tracing::error!("Discovery cycle panicked: {}", e);
            }
        }

        tracing::info!("Discovery loop stopped");
    }
}
