// State management module
//
// SharedState holds the two records the background activities exchange:
// - ProcessStatus, written only by the update worker
// - ResourceSnapshot, written only by the discovery loop
// The reconciliation loop only reads. Each record sits behind its own lock and
// is always replaced as a whole value, so a reader never sees a torn write.

use crate::models::{ProcessStatus, Progress, ResourceSnapshot};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Thread-safe holder for the state shared by discovery, worker and reconciliation.
///
/// Locks are only held for the duration of a field copy, never across I/O,
/// so no method blocks for any meaningful time.
///
/// There is no ordering guarantee between fields: a reader may observe
/// `running == true` one tick before the first progress report, or a stale
/// progress right after the run ends.
///
/// # Usage
///
/// - [`process_status()`](Self::process_status) / [`resources()`](Self::resources) for snapshots
/// - [`try_begin_run()`](Self::try_begin_run), [`set_progress()`](Self::set_progress),
///   [`finish_run()`](Self::finish_run) from the update worker
/// - [`set_available_devices()`](Self::set_available_devices) and
///   [`set_available_firmware_images()`](Self::set_available_firmware_images) from discovery
pub struct SharedState {
    status: Arc<RwLock<ProcessStatus>>,
    resources: Arc<RwLock<ResourceSnapshot>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    // Writers only ever assign whole values, so a poisoned lock still holds a complete one
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl SharedState {
    /// Create the state in its start-of-process form: idle, nothing discovered.
    pub fn new() -> Self {
        Self {
            status: Arc::new(RwLock::new(ProcessStatus::default())),
            resources: Arc::new(RwLock::new(ResourceSnapshot::default())),
        }
    }

    /// Copy of the current process status
    pub fn process_status(&self) -> ProcessStatus {
        read(&self.status).clone()
    }

    /// Copy of the current resource snapshot
    pub fn resources(&self) -> ResourceSnapshot {
        read(&self.resources).clone()
    }

    /// Execute a function with read access to the process status
    ///
    /// # Example
    /// ```ignore
    /// let running = state.read_status(|s| s.running);
    /// ```
    pub fn read_status<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&ProcessStatus) -> R,
    {
        let status = read(&self.status);
        f(&status)
    }

    pub fn is_running(&self) -> bool {
        self.read_status(|s| s.running)
    }

    /// Claim the single run slot.
    ///
    /// If no run is active, resets the status to `running=true` with no
    /// progress and no error and returns `true`. Otherwise leaves the status
    /// untouched and returns `false`. Check and reset happen under one lock.
    pub fn try_begin_run(&self) -> bool {
        let mut status = write(&self.status);
        if status.running {
            return false;
        }
        *status = status.run_started();
        true
    }

    /// Overwrite the progress of the current run
    pub fn set_progress(&self, progress: Progress) {
        write(&self.status).progress = Some(progress);
    }

    /// Publish the outcome of the current run and release the run slot.
    ///
    /// Progress is cleared regardless of the outcome.
    pub fn finish_run(&self, error_message: Option<String>) {
        let mut status = write(&self.status);
        *status = status.run_finished(error_message);
    }

    /// Replace the discovered device list
    pub fn set_available_devices(&self, devices: Vec<String>) {
        write(&self.resources).available_devices = devices;
    }

    /// Replace the discovered firmware image list
    pub fn set_available_firmware_images(&self, images: Vec<String>) {
        write(&self.resources).available_firmware_images = images;
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

// Clones share the same underlying records
impl Clone for SharedState {
    fn clone(&self) -> Self {
        Self {
            status: Arc::clone(&self.status),
            resources: Arc::clone(&self.resources),
        }
    }
}
