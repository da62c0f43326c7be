use crate::metrics::Metrics;
use crate::models::{Percent, Progress, SYNC_PREFIX};
use crate::services::driver::{ProgressSink, UpdateDriver};
use crate::state::SharedState;
use camino::{Utf8Path, Utf8PathBuf};
use std::any::Any;
use std::fs;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Reasons a start request is refused before any run begins.
///
/// None of these change the shared state.
#[derive(Error, Debug)]
pub enum StartRejection {
    #[error("No device selected")]
    NoDevice,

    #[error("No firmware image selected")]
    NoFirmware,

    #[error("Invalid firmware image name: {0}")]
    InvalidFirmwareName(String),

    #[error("Firmware image not found: {0}")]
    FirmwareNotFound(Utf8PathBuf),

    #[error("Failed to read firmware image {path}: {source}")]
    FirmwareUnreadable {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("An update is already running")]
    AlreadyRunning,
}

/// [`ProgressSink`] that publishes every report into the shared state
#[derive(Clone)]
pub struct StateProgressSink {
    state: SharedState,
}

impl StateProgressSink {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

impl ProgressSink for StateProgressSink {
    fn report(&self, status_text: Option<&str>, fraction: Option<f64>) {
        let progress = Progress::new(status_text.map(str::to_string), Percent::from_fraction(fraction));
        tracing::debug!("Progress: {:?}", progress);
        self.state.set_progress(progress);
    }
}

/// Starts update runs, at most one at a time.
///
/// A run loads its image synchronously, then hands the device, image and a
/// [`StateProgressSink`] to the driver on a blocking task. The outcome is
/// published into the shared state; nothing is retried.
#[derive(Clone)]
pub struct UpdateWorker {
    state: SharedState,
    driver: Arc<dyn UpdateDriver>,
    firmware_dir: Utf8PathBuf,
    metrics: Arc<Metrics>,
}

impl UpdateWorker {
    pub fn new<P: AsRef<Utf8Path>>(
        state: SharedState,
        driver: Arc<dyn UpdateDriver>,
        firmware_dir: P,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            state,
            driver,
            firmware_dir: firmware_dir.as_ref().to_path_buf(),
            metrics,
        }
    }

    /// Read a firmware image from the firmware directory, all or nothing.
    ///
    /// `firmware_name` must be a bare file name.
    pub fn load_image(&self, firmware_name: &str) -> Result<Vec<u8>, StartRejection> {
        let name = Utf8Path::new(firmware_name);
        if name.file_name() != Some(firmware_name) {
            return Err(StartRejection::InvalidFirmwareName(firmware_name.to_string()));
        }

        let path = self.firmware_dir.join(name);
        match fs::read(&path) {
            Ok(image) => {
                tracing::info!("Loaded firmware image {} ({} bytes)", path, image.len());
                Ok(image)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StartRejection::FirmwareNotFound(path))
            }
            Err(source) => Err(StartRejection::FirmwareUnreadable { path, source }),
        }
    }

    /// Validate the request, load the image and spawn the run on `runtime`.
    ///
    /// Returns the handle of the spawned run. On rejection nothing is spawned
    /// and the shared state is untouched.
    ///
    /// Loading the image is blocking file I/O done on the calling thread.
    pub fn start(
        &self,
        runtime: &Handle,
        device_id: &str,
        firmware_name: &str,
    ) -> Result<JoinHandle<()>, StartRejection> {
        let result = self.prepare(device_id, firmware_name);
        let image = match result {
            Ok(image) => image,
            Err(rejection) => {
                tracing::warn!("Start rejected: {}", rejection);
                self.metrics.record_start_rejected();
                return Err(rejection);
            }
        };

        tracing::info!(
            "Starting update of {} with {} ({} bytes)",
            device_id,
            firmware_name,
            image.len()
        );
        self.metrics.record_run_started();

        let worker = self.clone();
        let device_id = device_id.to_string();
        Ok(runtime.spawn(async move { worker.run(device_id, image).await }))
    }

    fn prepare(&self, device_id: &str, firmware_name: &str) -> Result<Vec<u8>, StartRejection> {
        if device_id.is_empty() {
            return Err(StartRejection::NoDevice);
        }
        if firmware_name.is_empty() {
            return Err(StartRejection::NoFirmware);
        }
        if self.state.is_running() {
            return Err(StartRejection::AlreadyRunning);
        }

        let image = self.load_image(firmware_name)?;

        // Another request may have claimed the slot while the image was loading
        if !self.state.try_begin_run() {
            return Err(StartRejection::AlreadyRunning);
        }

        Ok(image)
    }

    /// Drive one claimed run to completion and release the run slot.
    async fn run(self, device_id: String, image: Vec<u8>) {
        let driver = Arc::clone(&self.driver);
        let sink = StateProgressSink::new(self.state.clone());
        let started = Instant::now();

        let outcome = tokio::task::spawn_blocking(move || {
            driver.update(&device_id, &image, &sink, SYNC_PREFIX)
        })
        .await;

        self.metrics.record_run_time(started.elapsed());

        let error_message = match outcome {
            Ok(Ok(())) => {
                tracing::info!("Update completed in {:.2}s", started.elapsed().as_secs_f32());
                None
            }
            Ok(Err(e)) => {
                tracing::error!("Update failed: {}", e.describe());
                Some(e.describe())
            }
            Err(join_error) => {
                let message = if join_error.is_panic() {
                    panic_message(join_error.into_panic())
                } else {
                    join_error.to_string()
                };
                tracing::error!("Update driver panicked: {}", message);
                Some(format!("Panic {message}"))
            }
        };

        if error_message.is_some() {
            self.metrics.record_run_failed();
        }
        self.state.finish_run(error_message);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "update driver panicked".to_string()),
    }
}
