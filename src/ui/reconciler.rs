// Reconciliation loop - turns the shared state into what the user sees
//
// Runs at a fixed cadence and never blocks on I/O. Each tick:
// 1. Detects the end of a run and raises a one-time completion notification
// 2. Mirrors the run's progress into the status text and indicator
// 3. Merges the latest discovery results into the selectable lists

use crate::metrics::Metrics;
use crate::models::{Percent, SelectableList};
use crate::state::SharedState;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// What the reconciler believed about the run on its previous tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPhase {
    /// No tick has happened yet
    Uninitialized,
    Idle,
    Running,
}

/// Progress indicator as it should be drawn
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProgressIndicator {
    #[default]
    Hidden,
    /// Animating indicator without a known completion
    Unbounded,
    /// Bar filled to the given percentage
    Bounded(u8),
}

/// One-time notification that a run ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunCompleted {
    /// `None` when the run succeeded
    pub error_message: Option<String>,
}

impl RunCompleted {
    pub fn succeeded(&self) -> bool {
        self.error_message.is_none()
    }
}

/// Everything the presentation layer draws
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DisplayState {
    pub device_list: SelectableList,
    pub firmware_list: SelectableList,
    pub status_text: String,
    pub progress_indicator: ProgressIndicator,
    pub run_completed: Option<RunCompleted>,
}

/// Display state shared between the reconciler and the presentation layer.
///
/// The reconciler writes lists, status and notifications; the presentation
/// layer reads, changes selections and consumes the notification.
#[derive(Clone, Default)]
pub struct DisplayHandle {
    inner: Arc<Mutex<DisplayState>>,
}

impl DisplayHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DisplayState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the display state, leaving any pending notification in place
    pub fn peek(&self) -> DisplayState {
        self.lock().clone()
    }

    /// Copy of the display state, consuming the pending notification.
    ///
    /// A notification is returned by exactly one call.
    pub fn take(&self) -> DisplayState {
        let mut display = self.lock();
        let snapshot = display.clone();
        display.run_completed = None;
        snapshot
    }

    /// Select a device; `false` if it is not in the device list
    pub fn select_device(&self, device_id: &str) -> bool {
        self.lock().device_list.select(device_id)
    }

    /// Select a firmware image; `false` if it is not in the firmware list
    pub fn select_firmware(&self, firmware_name: &str) -> bool {
        self.lock().firmware_list.select(firmware_name)
    }

    /// Execute a function with mutable access to the display state
    pub fn update<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut DisplayState) -> R,
    {
        let mut display = self.lock();
        f(&mut display)
    }
}

/// What changed during one tick
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub run_completed: bool,
    pub devices_changed: bool,
    pub firmware_changed: bool,
}

/// Read-only consumer of the shared state that drives the display
pub struct Reconciler {
    state: SharedState,
    display: DisplayHandle,
    phase: RunPhase,
    /// `runs_completed` value already reported
    seen_runs: u64,
    metrics: Arc<Metrics>,
}

impl Reconciler {
    pub fn new(state: SharedState, display: DisplayHandle, metrics: Arc<Metrics>) -> Self {
        Self {
            state,
            display,
            phase: RunPhase::Uninitialized,
            seen_runs: 0,
            metrics,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Perform one reconciliation pass
    pub fn tick(&mut self) -> TickOutcome {
        let status = self.state.process_status();
        let resources = self.state.resources();
        let mut outcome = TickOutcome::default();

        self.display.update(|display| {
            // A run ended since the last tick. The counter also catches runs
            // that started and finished between two ticks.
            let finished = self.phase != RunPhase::Uninitialized
                && !status.running
                && status.runs_completed != self.seen_runs;

            if finished {
                match &status.error_message {
                    Some(message) => tracing::warn!("Run completed with error: {}", message),
                    None => tracing::info!("Run completed successfully"),
                }
                // Replaces an unconsumed notification: only the latest run is surfaced
                display.run_completed = Some(RunCompleted {
                    error_message: status.error_message.clone(),
                });
                display.progress_indicator = ProgressIndicator::Hidden;
                display.status_text.clear();
                outcome.run_completed = true;
            } else if self.phase == RunPhase::Uninitialized && !status.running {
                display.progress_indicator = ProgressIndicator::Hidden;
            }

            if !status.running {
                self.seen_runs = status.runs_completed;
            }

            if status.running {
                // Progress may lag behind `running` by a tick; show activity meanwhile
                let (text, indicator) = match &status.progress {
                    Some(progress) => (
                        progress.status_text.clone().unwrap_or_default(),
                        match progress.percent {
                            Percent::Indeterminate => ProgressIndicator::Unbounded,
                            Percent::Known(p) => ProgressIndicator::Bounded(p.min(100)),
                        },
                    ),
                    None => (String::new(), ProgressIndicator::Unbounded),
                };
                display.status_text = text;
                display.progress_indicator = indicator;
            }

            outcome.devices_changed = display
                .device_list
                .merge_in_place(&resources.available_devices);
            outcome.firmware_changed = display
                .firmware_list
                .merge_in_place(&resources.firmware_display_order());
        });

        if outcome.devices_changed {
            tracing::debug!("Device list updated: {:?}", resources.available_devices);
        }
        if outcome.firmware_changed {
            tracing::debug!(
                "Firmware list updated: {:?}",
                resources.available_firmware_images
            );
        }

        self.phase = if status.running {
            RunPhase::Running
        } else {
            RunPhase::Idle
        };
        self.metrics.record_reconcile_tick();

        outcome
    }

    /// Tick at `interval` until `stop` turns `true` or its sender is dropped
    pub async fn run(mut self, interval: Duration, mut stop: watch::Receiver<bool>) {
        tracing::info!("Reconciliation loop started (interval {:?})", interval);

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *stop.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                }
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Reconciliation loop stopped");
    }
}
