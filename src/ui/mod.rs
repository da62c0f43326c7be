// UI module - everything between the shared state and the user
//
// This module contains:
// - Reconciler: periodic loop that turns the shared state into a DisplayState
// - Updater: owns the loops and the worker, the single entry point for presenters
// - ConsolePresenter: terminal rendering of the display state

pub mod console;
pub mod controller;
pub mod reconciler;

pub use console::ConsolePresenter;
pub use controller::Updater;
pub use reconciler::{
    DisplayHandle, DisplayState, ProgressIndicator, Reconciler, RunCompleted, RunPhase,
    TickOutcome,
};
