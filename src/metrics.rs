// Performance metrics module
//
// Provides lightweight counters for the discovery, update and reconciliation activities

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Process-wide activity counters
///
/// Uses atomic operations so every activity can record without locks.
/// The summary is logged on shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Completed discovery cycles
    pub discovery_cycles: AtomicU64,

    /// Device or firmware enumerations that failed (each counted separately)
    pub discovery_failures: AtomicU64,

    /// Runs accepted and handed to the update driver
    pub runs_started: AtomicU64,

    /// Runs that ended with an error message
    pub runs_failed: AtomicU64,

    /// Start requests rejected before a run began
    pub starts_rejected: AtomicU64,

    /// Total time spent inside the update driver, in milliseconds
    pub total_run_time_ms: AtomicU64,

    /// Reconciliation ticks executed
    pub reconcile_ticks: AtomicU64,

    /// Application start time
    start_time: Instant,
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self {
            discovery_cycles: AtomicU64::new(0),
            discovery_failures: AtomicU64::new(0),
            runs_started: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            starts_rejected: AtomicU64::new(0),
            total_run_time_ms: AtomicU64::new(0),
            reconcile_ticks: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_discovery_cycle(&self) {
        self.discovery_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discovery_failure(&self) {
        self.discovery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_start_rejected(&self) {
        self.starts_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how long the driver took for one run
    pub fn record_run_time(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.total_run_time_ms.fetch_add(millis, Ordering::Relaxed);
    }

    pub fn record_reconcile_tick(&self) {
        self.reconcile_ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        let uptime = self.uptime();
        tracing::info!("=== Activity Summary ===");
        tracing::info!("Uptime: {:.2}s", uptime.as_secs_f64());
        tracing::info!(
            "Discovery: {} cycles, {} enumeration failures",
            self.discovery_cycles.load(Ordering::Relaxed),
            self.discovery_failures.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Runs: {} started, {} failed, {} rejected, {:.2}s in driver",
            self.runs_started.load(Ordering::Relaxed),
            self.runs_failed.load(Ordering::Relaxed),
            self.starts_rejected.load(Ordering::Relaxed),
            self.total_run_time_ms.load(Ordering::Relaxed) as f64 / 1000.0
        );
        tracing::info!(
            "Reconciliation ticks: {}",
            self.reconcile_ticks.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
