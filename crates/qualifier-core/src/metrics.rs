//! Global atomic counters for qualification runs.
//!
//! Counters are bumped silently while the tree executes. Call
//! [`Metrics::flush`] to emit them as a single `tracing::info!` event; the
//! run entry point does so once the root action completes.
//!
//! Counters are cumulative for the whole process. Runs may overlap, so no
//! run resets them; a flush reports totals across every run so far.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lock-free counters.
pub struct Metrics {
    scenarios_executed: AtomicU64,
    scenario_errors: AtomicU64,
    actions_skipped: AtomicU64,
    failed_checks: AtomicU64,
    capabilities_granted: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            scenarios_executed: AtomicU64::new(0),
            scenario_errors: AtomicU64::new(0),
            actions_skipped: AtomicU64::new(0),
            failed_checks: AtomicU64::new(0),
            capabilities_granted: AtomicU64::new(0),
        }
    }

    pub fn inc_scenarios_executed(&self) {
        self.scenarios_executed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "scenarios_executed", "counter incremented");
    }

    /// A scenario whose run or cleanup returned an error or panicked.
    pub fn inc_scenario_errors(&self) {
        self.scenario_errors.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "scenario_errors", "counter incremented");
    }

    pub fn inc_actions_skipped(&self) {
        self.actions_skipped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "actions_skipped", "counter incremented");
    }

    pub fn add_failed_checks(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.failed_checks.fetch_add(count, Ordering::Relaxed);
        tracing::trace!(metric = "failed_checks", count, "counter incremented");
    }

    pub fn inc_capabilities_granted(&self) {
        self.capabilities_granted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "capabilities_granted", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Values are process totals, not per-run figures.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            scenarios_executed = self.scenarios_executed(),
            scenario_errors = self.scenario_errors(),
            actions_skipped = self.actions_skipped(),
            failed_checks = self.failed_checks(),
            capabilities_granted = self.capabilities_granted(),
        );
    }

    pub fn scenarios_executed(&self) -> u64 {
        self.scenarios_executed.load(Ordering::Relaxed)
    }

    pub fn scenario_errors(&self) -> u64 {
        self.scenario_errors.load(Ordering::Relaxed)
    }

    pub fn actions_skipped(&self) -> u64 {
        self.actions_skipped.load(Ordering::Relaxed)
    }

    pub fn failed_checks(&self) -> u64 {
        self.failed_checks.load(Ordering::Relaxed)
    }

    pub fn capabilities_granted(&self) -> u64 {
        self.capabilities_granted.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero. Never called by a run.
    pub fn reset(&self) {
        self.scenarios_executed.store(0, Ordering::Relaxed);
        self.scenario_errors.store(0, Ordering::Relaxed);
        self.actions_skipped.store(0, Ordering::Relaxed);
        self.failed_checks.store(0, Ordering::Relaxed);
        self.capabilities_granted.store(0, Ordering::Relaxed);
    }
}
