// Build metrics module
//
// Lightweight counters for build sessions, logged on shutdown

use crate::models::BuildOutcome;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Process-wide build metrics
///
/// Uses atomic operations so the orchestrator and the binary can share one
/// instance behind an `Arc` without locking.
#[derive(Debug)]
pub struct Metrics {
    /// Sessions handed to the supervisor
    pub sessions_started: AtomicUsize,

    pub sessions_succeeded: AtomicUsize,

    pub sessions_failed: AtomicUsize,

    pub sessions_cancelled: AtomicUsize,

    /// Start requests rejected by validation
    pub validation_failures: AtomicUsize,

    /// Commands the supervisor spawned (or tried to)
    pub commands_started: AtomicU64,

    /// Output lines relayed to the presenter
    pub output_lines: AtomicU64,

    /// Wall-clock time spent in sessions, in milliseconds
    pub total_build_time_ms: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            sessions_started: AtomicUsize::new(0),
            sessions_succeeded: AtomicUsize::new(0),
            sessions_failed: AtomicUsize::new(0),
            sessions_cancelled: AtomicUsize::new(0),
            validation_failures: AtomicUsize::new(0),
            commands_started: AtomicU64::new(0),
            output_lines: AtomicU64::new(0),
            total_build_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished session and how long it ran
    pub fn record_session_finished(&self, outcome: BuildOutcome, duration: Duration) {
        let counter = match outcome {
            BuildOutcome::Succeeded => &self.sessions_succeeded,
            BuildOutcome::Failed => &self.sessions_failed,
            BuildOutcome::Cancelled => &self.sessions_cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.total_build_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_validation_failure(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command_started(&self) {
        self.commands_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_output_line(&self) {
        self.output_lines.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Sessions that reached `Completed`
    pub fn sessions_finished(&self) -> usize {
        self.sessions_succeeded.load(Ordering::Relaxed)
            + self.sessions_failed.load(Ordering::Relaxed)
            + self.sessions_cancelled.load(Ordering::Relaxed)
    }

    /// Average session duration in milliseconds
    pub fn avg_build_time_ms(&self) -> f64 {
        let total = self.total_build_time_ms.load(Ordering::Relaxed);
        let count = self.sessions_finished();
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Build Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Sessions: {} started, {} succeeded, {} failed, {} cancelled, {} rejected",
            self.sessions_started.load(Ordering::Relaxed),
            self.sessions_succeeded.load(Ordering::Relaxed),
            self.sessions_failed.load(Ordering::Relaxed),
            self.sessions_cancelled.load(Ordering::Relaxed),
            self.validation_failures.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Total build time: {:.2}s (avg: {:.2}ms per session)",
            self.total_build_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_build_time_ms()
        );
        tracing::info!(
            "Commands: {}, output lines: {}",
            self.commands_started.load(Ordering::Relaxed),
            self.output_lines.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
