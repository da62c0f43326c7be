// Console presenter - draws the display state on a terminal
//
// Prints list changes as they happen and renders the progress indicator with
// indicatif: a spinner while the run gives no percentage, a bar once it does.

use crate::models::SelectableList;
use crate::ui::reconciler::{DisplayState, ProgressIndicator, RunCompleted};
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Which kind of indicator is currently on screen
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Shown {
    Spinner,
    Bar,
}

/// Renders successive [`DisplayState`]s to stdout
pub struct ConsolePresenter {
    last_devices: Option<SelectableList>,
    last_firmware: Option<SelectableList>,
    indicator: Option<(Shown, ProgressBar)>,
}

impl ConsolePresenter {
    pub fn new() -> Self {
        Self {
            last_devices: None,
            last_firmware: None,
            indicator: None,
        }
    }

    /// Draw one display state.
    ///
    /// Returns the completion notification, if the state carried one.
    pub fn render(&mut self, display: &DisplayState) -> Result<Option<RunCompleted>> {
        if self.last_devices.as_ref() != Some(&display.device_list) {
            self.print_list("Devices", &display.device_list);
            self.last_devices = Some(display.device_list.clone());
        }
        if self.last_firmware.as_ref() != Some(&display.firmware_list) {
            self.print_list("Firmware images", &display.firmware_list);
            self.last_firmware = Some(display.firmware_list.clone());
        }

        match display.progress_indicator {
            ProgressIndicator::Hidden => self.clear_indicator(),
            ProgressIndicator::Unbounded => {
                let bar = self.indicator(Shown::Spinner)?;
                bar.set_message(display.status_text.clone());
            }
            ProgressIndicator::Bounded(percent) => {
                let bar = self.indicator(Shown::Bar)?;
                bar.set_position(u64::from(percent));
                bar.set_message(display.status_text.clone());
            }
        }

        if let Some(completed) = &display.run_completed {
            self.clear_indicator();
            match &completed.error_message {
                None => println!("Update finished successfully"),
                Some(message) => println!("Update failed: {message}"),
            }
        }

        Ok(display.run_completed.clone())
    }

    fn print_list(&self, title: &str, list: &SelectableList) {
        self.suspend(|| {
            if list.items.is_empty() {
                println!("{title}: none");
                return;
            }
            println!("{title}:");
            for item in &list.items {
                let marker = if list.current_selection.as_deref() == Some(item.as_str()) {
                    '*'
                } else {
                    ' '
                };
                println!("  {marker} {item}");
            }
        });
    }

    fn suspend<F: FnOnce()>(&self, f: F) {
        match &self.indicator {
            Some((_, bar)) => bar.suspend(f),
            None => f(),
        }
    }

    /// Indicator of the requested kind, replacing one of the other kind
    fn indicator(&mut self, kind: Shown) -> Result<ProgressBar> {
        if let Some((shown, bar)) = &self.indicator {
            if *shown == kind {
                return Ok(bar.clone());
            }
        }
        self.clear_indicator();

        let bar = match kind {
            Shown::Spinner => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
                bar.enable_steady_tick(Duration::from_millis(100));
                bar
            }
            Shown::Bar => {
                let bar = ProgressBar::new(100);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")?
                        .progress_chars("#>-"),
                );
                bar
            }
        };
        self.indicator = Some((kind, bar.clone()));
        Ok(bar)
    }

    fn clear_indicator(&mut self) {
        if let Some((_, bar)) = self.indicator.take() {
            bar.finish_and_clear();
        }
    }
}

impl Default for ConsolePresenter {
    fn default() -> Self {
        Self::new()
    }
}
