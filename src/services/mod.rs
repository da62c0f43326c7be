//! Services module - the background activities and their collaborators.
//!
//! Everything here is framework-agnostic: no presentation code, only the
//! discovery and update logic plus the contracts of the external pieces it
//! relies on.
//!
//! # Components
//!
//! - [`DiscoveryLoop`]: re-enumerates devices and firmware images at a fixed
//!   interval and publishes them into [`SharedState`](crate::state::SharedState).
//!   Enumeration goes through [`DeviceEnumerator`] ([`SerialPortEnumerator`] by
//!   default) and [`FirmwareEnumerator`] ([`FirmwareDirEnumerator`] by default).
//!
//! - [`UpdateWorker`]: validates a start request, loads the image and runs the
//!   [`UpdateDriver`] exactly once on a blocking task, reporting progress through
//!   a [`StateProgressSink`].
//!
//! - [`CommandDriver`]: [`UpdateDriver`] that delegates the flashing to an
//!   external program and parses its output into progress reports.
//!
//! # Error Handling
//!
//! - [`DiscoveryError`]: transient, logged by the discovery loop and never surfaced
//! - [`StartRejection`]: synchronous refusal of a start request
//! - [`DriverError`]: run failure, published as the run's error message

pub mod discovery;
pub mod driver;
pub mod worker;

pub use discovery::{
    DeviceEnumerator, DiscoveryError, DiscoveryLoop, FirmwareDirEnumerator, FirmwareEnumerator,
    SerialPortEnumerator,
};
pub use driver::{CommandDriver, DriverError, ProgressSink, SYNC_PREFIX_ENV, UpdateDriver};
pub use worker::{StartRejection, StateProgressSink, UpdateWorker};
