//! Serial Updater - firmware updates for serially attached devices
//!
//! Main entry point for the console application.
//!
//! # Overview
//!
//! This binary crate provides a terminal frontend for the updater. It initializes:
//! - Configuration loading ([`ConfigManager`], `updater.yaml` + `UPDATER__*` variables)
//! - Logging infrastructure (file rotation + optional console output)
//! - Tokio async runtime (discovery, reconciliation and the update worker)
//! - The [`Updater`] and a [`ConsolePresenter`] drawing its display state
//!
//! # Execution Flow
//!
//! 1. Load configuration from the config directory
//! 2. Initialize logging → logs/serial-updater.<date>
//! 3. Create tokio runtime with 4 worker threads
//! 4. Start the updater (discovery + reconciliation loops)
//! 5. Render the display state every reconciliation interval; with `--device`,
//!    start the update once the device and image are discovered
//! 6. On completion (or Ctrl+C) shut down, waiting for a running update

use anyhow::{Context, Result, anyhow};
use camino::Utf8PathBuf;
use clap::Parser;
use serial_updater::logging::{self, LOG_PREFIX};
use serial_updater::ui::{ConsolePresenter, RunCompleted};
use serial_updater::{APP_NAME, ConfigManager, DisplayState, StartRejection, Updater, VERSION};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

#[derive(Parser, Debug)]
#[command(name = "serial-updater")]
#[command(about = "Update the firmware of serially attached devices", version)]
struct Cli {
    /// Directory containing updater.yaml
    #[arg(short, long, default_value = "config")]
    config: Utf8PathBuf,

    /// Device to update once it is discovered (e.g. /dev/ttyACM0 or COM3)
    #[arg(short, long)]
    device: Option<String>,

    /// Firmware image to flash; defaults to the newest image
    #[arg(short, long, requires = "device")]
    firmware: Option<String>,

    /// Override the firmware directory from the configuration
    #[arg(long)]
    firmware_dir: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Also write log output to stderr
    #[arg(long)]
    console: bool,
}

/// Update requested on the command line
struct AutoStart {
    device: String,
    firmware: Option<String>,
}

impl AutoStart {
    /// Device and image to use, once both are listed
    fn resolve(&self, display: &DisplayState) -> Option<(String, String)> {
        if !display.device_list.items.contains(&self.device) {
            return None;
        }

        let firmware = match &self.firmware {
            Some(name) => display.firmware_list.items.iter().find(|item| *item == name),
            // Display order puts the newest image first
            None => display.firmware_list.items.first(),
        }?;

        Some((self.device.clone(), firmware.clone()))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new(&cli.config)?;
    let mut config = config_manager.load_config()?;
    if let Some(dir) = &cli.firmware_dir {
        config.firmware_dir = dir.clone();
    }
    let debug_mode = cli.debug || config.debug_mode;

    let _guard =
        logging::setup_logging_with_console(&config.log_dir, LOG_PREFIX, debug_mode, cli.console)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(4)
        .thread_name("updater-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    tracing::info!("Tokio runtime initialized with {} worker threads", 4);

    let updater = Updater::from_config(&config, runtime.handle().clone());
    let metrics = Arc::clone(updater.metrics());

    let auto_start = cli.device.map(|device| AutoStart {
        device,
        firmware: cli.firmware,
    });
    if let Some(request) = &auto_start {
        println!(
            "Waiting for {} and {}...",
            request.device,
            request.firmware.as_deref().unwrap_or("the newest firmware image")
        );
    }

    let result = runtime.block_on(present(&updater, auto_start, config.reconcile_interval()));

    if updater.shared_state().is_running() {
        println!("Waiting for the running update to finish...");
    }
    runtime.block_on(updater.shutdown());
    metrics.log_summary();

    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Application shutdown complete");

    match result? {
        Some(RunCompleted {
            error_message: Some(message),
        }) => Err(anyhow!("Update failed: {}", message)),
        _ => Ok(()),
    }
}

/// Draw the display state until the requested update completes or Ctrl+C.
///
/// Without an update request this only monitors and returns `None` on Ctrl+C.
async fn present(
    updater: &Updater,
    mut auto_start: Option<AutoStart>,
    interval: Duration,
) -> Result<Option<RunCompleted>> {
    let mut presenter = ConsolePresenter::new();

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            signal = &mut ctrl_c => {
                signal.context("Failed to listen for Ctrl+C")?;
                tracing::info!("Interrupted by user");
                return Ok(None);
            }
        }

        let display = updater.current_display_state();
        if let Some(completed) = presenter.render(&display)? {
            return Ok(Some(completed));
        }

        let Some((device, firmware)) = auto_start.as_ref().and_then(|r| r.resolve(&display)) else {
            continue;
        };

        updater.select_device(&device);
        updater.select_firmware(&firmware);
        match updater.start_selected() {
            Ok(()) => {
                println!("Updating {} with {}", device, firmware);
                auto_start = None;
            }
            // Selection moved or the run slot is busy; retry on the next tick
            Err(StartRejection::AlreadyRunning | StartRejection::NoDevice | StartRejection::NoFirmware) => {}
            Err(rejection) => return Err(rejection).context("Update could not be started"),
        }
    }
}
