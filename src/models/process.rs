/// Completion of the running update, as shown by the progress indicator.
///
/// `Known` values are always within `0..=100`; every constructor clamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Percent {
    /// Activity is ongoing but the completion fraction is unknown
    Indeterminate,
    /// Completion in percent
    Known(u8),
}

impl Percent {
    /// Build a bounded percentage, clamping anything above 100.
    pub fn known(value: u8) -> Self {
        Percent::Known(value.min(100))
    }

    /// Convert a driver-reported fraction into a percentage.
    ///
    /// `None` and non-finite fractions map to [`Percent::Indeterminate`].
    /// Finite fractions are clamped to `[0, 1]` and rounded to the nearest percent.
    pub fn from_fraction(fraction: Option<f64>) -> Self {
        match fraction {
            Some(f) if f.is_finite() => {
                let scaled = (f.clamp(0.0, 1.0) * 100.0).round();
                Percent::Known(scaled as u8)
            }
            _ => Percent::Indeterminate,
        }
    }

    /// Numeric value, if known
    pub fn value(self) -> Option<u8> {
        match self {
            Percent::Indeterminate => None,
            Percent::Known(v) => Some(v),
        }
    }
}

/// Latest progress report from the update driver
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Progress {
    /// Human-readable phase description
    pub status_text: Option<String>,
    pub percent: Percent,
}

impl Progress {
    pub fn new(status_text: Option<String>, percent: Percent) -> Self {
        Self {
            status_text,
            percent,
        }
    }
}

/// Status of the update process.
///
/// Always replaced as a unit by the update worker, which is its only writer.
///
/// `error_message` is only meaningful right after a running → not-running
/// transition. `None` means success or that no run has happened yet.
/// `runs_completed` counts finished runs so an observer can notice a run that
/// started and ended between two of its polls.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessStatus {
    pub running: bool,
    pub progress: Option<Progress>,
    pub error_message: Option<String>,
    pub runs_completed: u64,
}

impl ProcessStatus {
    /// Status published when a run begins
    pub fn run_started(&self) -> Self {
        Self {
            running: true,
            progress: None,
            error_message: None,
            runs_completed: self.runs_completed,
        }
    }

    /// Status published when a run ends, successful when `error_message` is `None`
    pub fn run_finished(&self, error_message: Option<String>) -> Self {
        Self {
            running: false,
            progress: None,
            error_message,
            runs_completed: self.runs_completed.saturating_add(1),
        }
    }
}
