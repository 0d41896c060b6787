// Threading metrics module
//
// Lightweight counters for pool and main-thread executor activity

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Pool and executor counters
///
/// Uses atomic operations for thread-safe tracking without locks. A single
/// instance is usually shared (`Arc`) between a pool and the executors built on
/// top of it, and logged on shutdown.
#[derive(Debug)]
pub struct ThreadingMetrics {
    /// Tasks accepted by a pool
    pub tasks_submitted: AtomicU64,

    /// Tasks whose `run` returned normally
    pub tasks_completed: AtomicU64,

    /// Tasks whose `run` failed with an error (panics included)
    pub tasks_failed: AtomicU64,

    /// Tasks whose `run` ended with the interruption signal
    pub tasks_interrupted: AtomicU64,

    /// Tasks interrupted before a worker started them (`on_cancelled` path)
    pub tasks_cancelled: AtomicU64,

    /// Task bodies that panicked
    pub tasks_panicked: AtomicU64,

    /// Actions queued for the main thread
    pub actions_submitted: AtomicU64,

    /// Actions executed by the main-thread pump
    pub actions_executed: AtomicU64,

    /// Executed actions that returned an error or panicked
    pub actions_failed: AtomicU64,

    start_time: Instant,
}

impl ThreadingMetrics {
    pub fn new() -> Self {
        Self {
            tasks_submitted: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            tasks_interrupted: AtomicU64::new(0),
            tasks_cancelled: AtomicU64::new(0),
            tasks_panicked: AtomicU64::new(0),
            actions_submitted: AtomicU64::new(0),
            actions_executed: AtomicU64::new(0),
            actions_failed: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_task_submitted(&self) {
        self.tasks_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_completed(&self) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_interrupted(&self) {
        self.tasks_interrupted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_cancelled(&self) {
        self.tasks_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_panicked(&self) {
        self.tasks_panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_action_submitted(&self) {
        self.actions_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an executed main-thread action and whether it failed
    pub fn record_action_executed(&self, failed: bool) {
        self.actions_executed.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.actions_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Tasks that reached any end state
    pub fn tasks_finished(&self) -> u64 {
        self.tasks_completed.load(Ordering::Relaxed)
            + self.tasks_failed.load(Ordering::Relaxed)
            + self.tasks_interrupted.load(Ordering::Relaxed)
            + self.tasks_cancelled.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Threading Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Tasks: {} submitted, {} completed, {} failed ({} panicked), {} interrupted, {} cancelled",
            self.tasks_submitted.load(Ordering::Relaxed),
            self.tasks_completed.load(Ordering::Relaxed),
            self.tasks_failed.load(Ordering::Relaxed),
            self.tasks_panicked.load(Ordering::Relaxed),
            self.tasks_interrupted.load(Ordering::Relaxed),
            self.tasks_cancelled.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Main-thread actions: {} submitted, {} executed, {} failed",
            self.actions_submitted.load(Ordering::Relaxed),
            self.actions_executed.load(Ordering::Relaxed),
            self.actions_failed.load(Ordering::Relaxed)
        );
    }
}

impl Default for ThreadingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_creation() {
        let metrics = ThreadingMetrics::new();
        assert_eq!(metrics.tasks_submitted.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.tasks_finished(), 0);
    }

    #[test]
    fn test_task_counters() {
        let metrics = ThreadingMetrics::new();

        metrics.record_task_submitted();
        metrics.record_task_submitted();
        metrics.record_task_submitted();
        metrics.record_task_completed();
        metrics.record_task_failed();
        metrics.record_task_cancelled();

        assert_eq!(metrics.tasks_submitted.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.tasks_finished(), 3);
    }

    #[test]
    fn test_action_counters() {
        let metrics = ThreadingMetrics::new();

        metrics.record_action_submitted();
        metrics.record_action_executed(false);
        metrics.record_action_executed(true);

        assert_eq!(metrics.actions_submitted.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.actions_executed.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.actions_failed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_uptime() {
        let metrics = ThreadingMetrics::new();
        thread::sleep(Duration::from_millis(10));
        assert!(metrics.uptime().as_millis() >= 10);
    }
}
