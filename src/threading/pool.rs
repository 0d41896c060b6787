// Thread pools
//
// `ThreadPool` is the substrate interface the rest of the crate depends on.
// `DefaultThreadPool` runs tasks on a fixed set of OS worker threads fed by a
// channel, the same std::thread + tokio mpsc `blocking_recv` arrangement used to
// bridge background work into an event loop.

use super::error::{ActionError, TaskError, ThreadPoolError};
use super::sync::{Lock, StdLock, StdSyncFactory, StdWaitCondition, SyncFactory};
use super::task::Task;
use crate::metrics::ThreadingMetrics;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;

/// Pool-level error handler: task name, error, rendered trace.
pub type PoolErrorHandler = Arc<dyn Fn(&str, &anyhow::Error, &str) + Send + Sync>;

/// Worker substrate for tasks.
///
/// A pool is also the factory for the synchronization primitives that tasks
/// running on it should use.
pub trait ThreadPool: SyncFactory {
    /// Queue a task. Returns immediately; safe to call from any thread, including
    /// from a task running on this pool.
    fn add_task(&self, task: Arc<dyn Task>) -> Result<(), ThreadPoolError>;

    /// True while at least one task is queued or running.
    fn has_tasks(&self) -> bool;

    /// Stop accepting tasks. With `wait`, block until queued and running tasks
    /// have finished.
    fn shutdown(&self, wait: bool);
}

/// Run one task the way every pool does: `on_cancelled` if it was interrupted
/// before starting, `run` otherwise, with failures routed through the handler
/// chain. Never panics.
pub(crate) fn execute_task(
    task: &dyn Task,
    error_handler: Option<&PoolErrorHandler>,
    metrics: &ThreadingMetrics,
) {
    if task.is_interrupted() {
        tracing::debug!(task = task.task_name(), "Task interrupted before start, cancelling");
        metrics.record_task_cancelled();
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task.on_cancelled())) {
            report_failure(task, ActionError::from_panic(payload).into(), error_handler);
        }
        return;
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.run())).unwrap_or_else(|payload| {
        metrics.record_task_panicked();
        Err(TaskError::Failed(ActionError::from_panic(payload).into()))
    });

    match outcome {
        Ok(()) => metrics.record_task_completed(),
        Err(TaskError::Interrupted { .. }) => {
            tracing::debug!(task = task.task_name(), "Task stopped after interruption");
            metrics.record_task_interrupted();
        }
        Err(TaskError::Failed(error)) => {
            metrics.record_task_failed();
            report_failure(task, error, error_handler);
        }
    }
}

fn report_failure(task: &dyn Task, error: anyhow::Error, error_handler: Option<&PoolErrorHandler>) {
    let trace = format!("{:?}", error);
    let unhandled = panic::catch_unwind(AssertUnwindSafe(|| task.on_error(error, &trace)))
        .unwrap_or_else(|payload| Err(ActionError::from_panic(payload).into()));

    let Err(error) = unhandled else {
        return;
    };

    let trace = format!("{:?}", error);
    match error_handler {
        Some(handler) => {
            let handled = panic::catch_unwind(AssertUnwindSafe(|| {
                handler(task.task_name(), &error, &trace)
            }));
            if handled.is_err() {
                tracing::error!(
                    task = task.task_name(),
                    "Pool error handler panicked while reporting: {}",
                    error
                );
            }
        }
        None => {
            tracing::error!(task = task.task_name(), "Unhandled task error: {}\n{}", error, trace);
        }
    }
}

/// Builder for [`DefaultThreadPool`]
pub struct ThreadPoolBuilder {
    concurrency_level: Option<usize>,
    error_handler: Option<PoolErrorHandler>,
    metrics: Option<Arc<ThreadingMetrics>>,
    thread_name: String,
}

impl ThreadPoolBuilder {
    pub fn new() -> Self {
        Self {
            concurrency_level: None,
            error_handler: None,
            metrics: None,
            thread_name: "farmtask-worker".to_string(),
        }
    }

    /// Number of worker threads. `None` uses the host CPU count.
    pub fn concurrency_level(mut self, level: Option<usize>) -> Self {
        self.concurrency_level = level;
        self
    }

    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &anyhow::Error, &str) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    pub fn metrics(mut self, metrics: Arc<ThreadingMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Spawn the workers
    pub fn build(self) -> Result<DefaultThreadPool, ThreadPoolError> {
        let concurrency_level = self
            .concurrency_level
            .filter(|level| *level > 0)
            .unwrap_or_else(default_concurrency_level);

        let (sender, receiver) = mpsc::unbounded_channel::<Job>();
        let shared = Arc::new(PoolShared {
            receiver: StdLock::new(receiver),
            tasks: StdLock::new(HashMap::new()),
            error_handler: self.error_handler,
            metrics: self.metrics.unwrap_or_default(),
        });

        let mut workers = Vec::with_capacity(concurrency_level);
        for index in 0..concurrency_level {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("{}-{}", self.thread_name, index))
                .spawn(move || worker_loop(&shared))?;
            workers.push(handle);
        }

        tracing::debug!("Thread pool started with {} workers", concurrency_level);

        Ok(DefaultThreadPool {
            sender: StdLock::new(Some(sender)),
            workers: StdLock::new(workers),
            shared,
            next_key: AtomicU64::new(0),
            concurrency_level,
        })
    }
}

impl Default for ThreadPoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_concurrency_level() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

struct Job {
    key: u64,
    task: Arc<dyn Task>,
}

struct PoolShared {
    receiver: StdLock<mpsc::UnboundedReceiver<Job>>,
    /// Names of queued or running tasks, keyed by submission
    tasks: StdLock<HashMap<u64, String>>,
    error_handler: Option<PoolErrorHandler>,
    metrics: Arc<ThreadingMetrics>,
}

fn worker_loop(shared: &PoolShared) {
    tracing::debug!("Worker thread started");

    loop {
        // Idle workers queue up on the receiver lock; the one holding it blocks
        // on the channel.
        let Some(job) = shared.receiver.with(|receiver| receiver.blocking_recv()) else {
            break;
        };

        execute_task(job.task.as_ref(), shared.error_handler.as_ref(), &shared.metrics);

        // Release the task before it stops counting as outstanding
        drop(job.task);
        shared.tasks.with(|tasks| {
            tasks.remove(&job.key);
        });
    }

    tracing::debug!("Worker thread terminated");
}

/// Fixed-size pool of OS worker threads.
///
/// A started task runs to completion before its worker picks up another one.
/// Scheduling order among workers is not specified.
///
/// # Example
/// ```ignore
/// let pool = DefaultThreadPool::builder()
///     .concurrency_level(Some(4))
///     .error_handler(|name, err, _trace| tracing::error!("{}: {}", name, err))
///     .build()?;
/// pool.add_task(Arc::new(my_task))?;
/// ```
pub struct DefaultThreadPool {
    sender: StdLock<Option<mpsc::UnboundedSender<Job>>>,
    workers: StdLock<Vec<JoinHandle<()>>>,
    shared: Arc<PoolShared>,
    next_key: AtomicU64,
    concurrency_level: usize,
}

impl DefaultThreadPool {
    pub fn builder() -> ThreadPoolBuilder {
        ThreadPoolBuilder::new()
    }

    /// Pool with `concurrency_level` workers (CPU count when `None`) and no
    /// error handler.
    pub fn new(concurrency_level: Option<usize>) -> Result<Self, ThreadPoolError> {
        ThreadPoolBuilder::new()
            .concurrency_level(concurrency_level)
            .build()
    }

    pub fn concurrency_level(&self) -> usize {
        self.concurrency_level
    }

    pub fn metrics(&self) -> Arc<ThreadingMetrics> {
        Arc::clone(&self.shared.metrics)
    }

    /// Names of queued or running tasks
    pub fn outstanding_task_names(&self) -> Vec<String> {
        self.shared
            .tasks
            .with(|tasks| tasks.values().cloned().collect())
    }
}

impl ThreadPool for DefaultThreadPool {
    fn add_task(&self, task: Arc<dyn Task>) -> Result<(), ThreadPoolError> {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        let name = task.task_name().to_string();

        self.sender.with(|sender| {
            let Some(sender) = sender.as_ref() else {
                tracing::warn!(task = %name, "Task submitted after pool shutdown");
                return Err(ThreadPoolError::ShutDown(name.clone()));
            };

            // Register before sending so `has_tasks` never misses a queued task
            self.shared.tasks.with(|tasks| {
                tasks.insert(key, name.clone());
            });

            if sender.send(Job { key, task }).is_err() {
                self.shared.tasks.with(|tasks| {
                    tasks.remove(&key);
                });
                return Err(ThreadPoolError::ShutDown(name.clone()));
            }

            self.shared.metrics.record_task_submitted();
            tracing::debug!(task = %name, "Task queued");
            Ok(())
        })
    }

    fn has_tasks(&self) -> bool {
        self.shared.tasks.with(|tasks| !tasks.is_empty())
    }

    fn shutdown(&self, wait: bool) {
        let closed = self.sender.with(Option::take).is_some();
        if closed {
            tracing::debug!("Thread pool shutting down, wait={}", wait);
        }

        if !wait {
            return;
        }

        let workers = self.workers.with(std::mem::take);
        let current = thread::current().id();
        for worker in workers {
            // A task shutting down its own pool cannot join its own worker
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                tracing::warn!("Worker thread exited with a panic");
            }
        }
    }
}

impl SyncFactory for DefaultThreadPool {
    type Lock<T: Send + 'static> = StdLock<T>;
    type WaitCondition<T: Send + 'static> = StdWaitCondition<T>;

    fn create_lock<T: Send + 'static>(&self, value: T) -> StdLock<T> {
        StdSyncFactory.create_lock(value)
    }

    fn create_wait_condition<T: Send + 'static>(&self, value: T) -> StdWaitCondition<T> {
        StdSyncFactory.create_wait_condition(value)
    }
}

impl Drop for DefaultThreadPool {
    fn drop(&mut self) {
        // Workers drain the queue and exit once the sender is gone
        self.shutdown(false);
    }
}
