//! Data models for the serial updater.
//!
//! - [`ProcessStatus`] / [`Progress`] / [`Percent`]: status of the update run, owned by the worker
//! - [`ResourceSnapshot`]: devices and firmware images found by discovery
//! - [`SelectableList`] and [`merge`]: user-facing lists that survive rediscovery
//! - [`UpdaterConfig`]: settings loaded from `updater.yaml`
//! - [`SYNC_PREFIX`]: preamble the driver sends before the update proper

pub mod config;
pub mod process;
pub mod resources;
pub mod selection;

pub use config::{DriverConfig, UpdaterConfig};
pub use process::{Percent, ProcessStatus, Progress};
pub use resources::ResourceSnapshot;
pub use selection::{SelectableList, merge};

/// Synchronization preamble sent to the device before the update begins.
///
/// Protocol constant of the bootloader; not negotiable.
pub const SYNC_PREFIX: &[u8] = b"\r\n\r\nbootloader\r\n";
