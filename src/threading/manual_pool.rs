// Single-thread pool driven by the caller
//
// Tasks are queued by `add_task` and only run when the owner calls `run_next`
// or `run_all`. Tests use it to make scheduling deterministic.

use super::error::ThreadPoolError;
use super::pool::{PoolErrorHandler, ThreadPool, execute_task};
use super::sync::{Lock, StdLock, StdSyncFactory, StdWaitCondition, SyncFactory};
use super::task::Task;
use crate::metrics::ThreadingMetrics;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Deterministic pool: tasks run on whichever thread calls
/// [`run_next`](Self::run_next), in submission order.
pub struct ManualThreadPool {
    queue: StdLock<VecDeque<Arc<dyn Task>>>,
    running: AtomicUsize,
    shut_down: AtomicBool,
    error_handler: Option<PoolErrorHandler>,
    metrics: Arc<ThreadingMetrics>,
}

impl ManualThreadPool {
    pub fn new() -> Self {
        Self {
            queue: StdLock::new(VecDeque::new()),
            running: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
            error_handler: None,
            metrics: Arc::new(ThreadingMetrics::new()),
        }
    }

    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &anyhow::Error, &str) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    pub fn metrics(&self) -> Arc<ThreadingMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Number of queued tasks, not counting one currently running
    pub fn queued(&self) -> usize {
        self.queue.with(|queue| queue.len())
    }

    /// Run the oldest queued task. Returns false when the queue was empty.
    pub fn run_next(&self) -> bool {
        let Some(task) = self.queue.with(VecDeque::pop_front) else {
            return false;
        };

        self.running.fetch_add(1, Ordering::SeqCst);
        execute_task(task.as_ref(), self.error_handler.as_ref(), &self.metrics);
        self.running.fetch_sub(1, Ordering::SeqCst);
        true
    }

    /// Run tasks until the queue is empty, including tasks queued while
    /// running. Returns how many ran.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }
}

impl Default for ManualThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadPool for ManualThreadPool {
    fn add_task(&self, task: Arc<dyn Task>) -> Result<(), ThreadPoolError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(ThreadPoolError::ShutDown(task.task_name().to_string()));
        }
        self.queue.with(|queue| queue.push_back(task));
        self.metrics.record_task_submitted();
        Ok(())
    }

    fn has_tasks(&self) -> bool {
        self.running.load(Ordering::SeqCst) > 0 || self.queued() > 0
    }

    fn shutdown(&self, wait: bool) {
        self.shut_down.store(true, Ordering::SeqCst);
        if wait {
            self.run_all();
        }
    }
}

impl SyncFactory for ManualThreadPool {
    type Lock<T: Send + 'static> = StdLock<T>;
    type WaitCondition<T: Send + 'static> = StdWaitCondition<T>;

    fn create_lock<T: Send + 'static>(&self, value: T) -> StdLock<T> {
        StdSyncFactory.create_lock(value)
    }

    fn create_wait_condition<T: Send + 'static>(&self, value: T) -> StdWaitCondition<T> {
        StdSyncFactory.create_wait_condition(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threading::task::{FnTask, Interruptible, TaskBase};
    use std::sync::Mutex;

    fn recording_task(log: &Arc<Mutex<Vec<String>>>, name: &str) -> Arc<dyn Task> {
        let log = Arc::clone(log);
        Arc::new(FnTask::new(TaskBase::named(name), move |base| {
            log.lock().unwrap().push(base.name().to_string());
            Ok(())
        }))
    }

    #[test]
    fn test_tasks_run_only_when_driven() {
        let pool = ManualThreadPool::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        pool.add_task(recording_task(&log, "a")).unwrap();
        pool.add_task(recording_task(&log, "b")).unwrap();

        assert!(pool.has_tasks());
        assert!(log.lock().unwrap().is_empty());

        assert!(pool.run_next());
        assert_eq!(*log.lock().unwrap(), vec!["a"]);

        assert_eq!(pool.run_all(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
        assert!(!pool.has_tasks());
        assert!(!pool.run_next());
    }

    #[test]
    fn test_interrupted_task_is_cancelled() {
        let pool = ManualThreadPool::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let task = recording_task(&log, "skipped");
        task.interrupt();
        pool.add_task(task).unwrap();
        pool.run_all();

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(pool.metrics().tasks_cancelled.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_shutdown_with_wait_drains_queue() {
        let pool = ManualThreadPool::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        pool.add_task(recording_task(&log, "queued")).unwrap();

        pool.shutdown(true);

        assert_eq!(*log.lock().unwrap(), vec!["queued"]);
        assert!(pool.add_task(recording_task(&log, "late")).is_err());
    }
}
