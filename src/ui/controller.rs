// Updater controller - wires the background activities together
//
// This module contains the Updater which owns:
// - SharedState (process status + resource snapshot)
// - DiscoveryLoop and Reconciler, each on its own tokio task
// - UpdateWorker (one run at a time)
// - DisplayHandle (what the presentation layer draws)
//
// Presentation layers only talk to the Updater: they read the display state,
// change selections and request starts.

use crate::metrics::Metrics;
use crate::models::UpdaterConfig;
use crate::services::{
    CommandDriver, DeviceEnumerator, DiscoveryLoop, FirmwareDirEnumerator, FirmwareEnumerator,
    SerialPortEnumerator, StartRejection, UpdateDriver, UpdateWorker,
};
use crate::state::SharedState;
use crate::ui::reconciler::{DisplayHandle, DisplayState, Reconciler};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Orchestrates discovery, update runs and display reconciliation
///
/// # Example
/// ```ignore
/// let runtime = tokio::runtime::Runtime::new()?;
/// let updater = Updater::from_config(&config, runtime.handle().clone());
///
/// updater.select_device("/dev/ttyACM0");
/// updater.start_selected()?;
///
/// let display = updater.current_display_state();
/// runtime.block_on(updater.shutdown());
/// ```
pub struct Updater {
    state: SharedState,
    display: DisplayHandle,
    worker: UpdateWorker,
    metrics: Arc<Metrics>,
    runtime: Handle,

    /// Send `true` to stop both loops
    stop_tx: watch::Sender<bool>,
    discovery_task: JoinHandle<()>,
    reconcile_task: JoinHandle<()>,

    /// Most recently started run
    current_run: Mutex<Option<JoinHandle<()>>>,
}

impl Updater {
    /// Create the updater and start both loops on `runtime`
    ///
    /// The first discovery cycle runs immediately; the display fills in on
    /// the first reconciliation tick after it.
    pub fn new(
        config: &UpdaterConfig,
        devices: Arc<dyn DeviceEnumerator>,
        firmware: Arc<dyn FirmwareEnumerator>,
        driver: Arc<dyn UpdateDriver>,
        runtime: Handle,
    ) -> Self {
        let state = SharedState::new();
        let display = DisplayHandle::new();
        let metrics = Arc::new(Metrics::new());
        let (stop_tx, stop_rx) = watch::channel(false);

        let discovery = DiscoveryLoop::new(
            state.clone(),
            devices,
            firmware,
            config.discovery_interval(),
            Arc::clone(&metrics),
        );
        let discovery_task = runtime.spawn(discovery.run(stop_rx.clone()));

        let reconciler = Reconciler::new(state.clone(), display.clone(), Arc::clone(&metrics));
        let reconcile_task = runtime.spawn(reconciler.run(config.reconcile_interval(), stop_rx));

        let worker = UpdateWorker::new(
            state.clone(),
            driver,
            config.firmware_dir_path(),
            Arc::clone(&metrics),
        );

        tracing::info!(
            "Updater initialized (firmware dir: {}, extension: {})",
            config.firmware_dir,
            config.firmware_extension
        );

        Self {
            state,
            display,
            worker,
            metrics,
            runtime,
            stop_tx,
            discovery_task,
            reconcile_task,
            current_run: Mutex::new(None),
        }
    }

    /// Create the updater with the serial port enumerator, the firmware
    /// directory from `config` and the configured external driver
    pub fn from_config(config: &UpdaterConfig, runtime: Handle) -> Self {
        let firmware = FirmwareDirEnumerator::new(config.firmware_dir_path(), &config.firmware_extension);
        Self::new(
            config,
            Arc::new(SerialPortEnumerator),
            Arc::new(firmware),
            Arc::new(CommandDriver::new(&config.driver)),
            runtime,
        )
    }

    /// Request an update of `device_id` with `firmware_name`
    ///
    /// Returns once the run is accepted; its outcome arrives later as a
    /// completion notification in the display state.
    ///
    /// The firmware image is read synchronously before this returns, so
    /// async callers on a current-thread runtime stall while it loads.
    pub fn start(&self, device_id: &str, firmware_name: &str) -> Result<(), StartRejection> {
        let handle = self.worker.start(&self.runtime, device_id, firmware_name)?;
        *self
            .current_run
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Request an update with the currently selected device and firmware image
    pub fn start_selected(&self) -> Result<(), StartRejection> {
        let display = self.display.peek();
        let device = display
            .device_list
            .current_selection
            .ok_or(StartRejection::NoDevice)?;
        let firmware = display
            .firmware_list
            .current_selection
            .ok_or(StartRejection::NoFirmware)?;
        self.start(&device, &firmware)
    }

    /// Select a device; `false` if it is not currently listed
    pub fn select_device(&self, device_id: &str) -> bool {
        self.display.select_device(device_id)
    }

    /// Select a firmware image; `false` if it is not currently listed
    pub fn select_firmware(&self, firmware_name: &str) -> bool {
        self.display.select_firmware(firmware_name)
    }

    /// What the presentation layer should draw now.
    ///
    /// A completion notification is handed out once; later calls see `None`
    /// until the next run ends.
    pub fn current_display_state(&self) -> DisplayState {
        self.display.take()
    }

    pub fn shared_state(&self) -> &SharedState {
        &self.state
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Stop both loops and wait for an in-flight run to finish.
    ///
    /// Runs cannot be cancelled, so this returns only after the driver does.
    pub async fn shutdown(self) {
        tracing::info!("Shutting down updater");
        let _ = self.stop_tx.send(true);

        for (name, task) in [
            ("discovery", self.discovery_task),
            ("reconciliation", self.reconcile_task),
        ] {
            if let Err(e) = task.await {
                tracing::error!("{} loop ended abnormally: {}", name, e);
            }
        }

        let current_run = self
            .current_run
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(run) = current_run {
            if !run.is_finished() {
                tracing::info!("Waiting for the running update to finish");
            }
            if let Err(e) = run.await {
                tracing::error!("Update task ended abnormally: {}", e);
            }
        }

        tracing::info!("Updater shut down");
    }
}
