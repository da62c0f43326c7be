// Serial Updater - firmware update orchestration for serially attached devices
//
// This is the library crate containing the shared state, the discovery,
// update and reconciliation activities and the presentation-facing controller.
// The binary crate (main.rs) provides the console entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::Metrics;
pub use models::{ProcessStatus, Progress, ResourceSnapshot, SelectableList, UpdaterConfig};
pub use services::{StartRejection, UpdateDriver};
pub use state::SharedState;
pub use ui::{DisplayState, Updater};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
