// Main-thread executor
//
// Worker threads queue callables for the designated main thread and block until
// the main thread's pump executes them. Waits poll the caller's interrupted flag
// so an interrupted task stops waiting even if the main thread never pumps.

use super::action::{ActionResult, MainThreadAction, ResultSink};
use super::error::{MainThreadError, TaskError, TaskResult};
use super::pool::DefaultThreadPool;
use super::sync::{Lock, SyncFactory, WaitCondition};
use super::task::Interruptible;
use crate::metrics::ThreadingMetrics;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

/// How often a waiting worker re-checks its interrupted flag.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Sleep between empty polls in [`MainThreadExecutor::pump_while`].
const IDLE_PUMP_INTERVAL: Duration = Duration::from_millis(1);

/// Notification hook, called synchronously on the thread that triggered it.
pub type ExecutorHook = Box<dyn Fn() + Send + Sync>;

/// FIFO queue of actions executed on one designated thread.
///
/// The main thread is the thread that constructs the executor, unless set with
/// [`with_main_thread`](Self::with_main_thread). Only that thread may execute
/// queued actions.
pub struct MainThreadExecutor<F: SyncFactory = DefaultThreadPool> {
    sync: Arc<F>,
    main_thread: ThreadId,
    queue: F::Lock<VecDeque<MainThreadAction>>,
    on_action_submitted: Option<ExecutorHook>,
    on_actions_pending: Option<ExecutorHook>,
    poll_interval: Duration,
    metrics: Arc<ThreadingMetrics>,
}

impl<F: SyncFactory> MainThreadExecutor<F> {
    /// Create an executor bound to the calling thread, using `sync` for its
    /// queue lock and per-call wait conditions.
    pub fn new(sync: Arc<F>) -> Self {
        let queue = sync.create_lock(VecDeque::new());
        Self {
            sync,
            main_thread: thread::current().id(),
            queue,
            on_action_submitted: None,
            on_actions_pending: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            metrics: Arc::new(ThreadingMetrics::new()),
        }
    }

    pub fn with_main_thread(mut self, main_thread: ThreadId) -> Self {
        self.main_thread = main_thread;
        self
    }

    /// Hook fired on the submitting thread every time an action is queued.
    pub fn with_on_action_submitted(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_action_submitted = Some(Box::new(hook));
        self
    }

    /// Hook fired on the main thread when actions remain after one was executed.
    pub fn with_on_actions_pending(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_actions_pending = Some(Box::new(hook));
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ThreadingMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn main_thread_id(&self) -> ThreadId {
        self.main_thread
    }

    pub fn is_main_thread(&self) -> bool {
        thread::current().id() == self.main_thread
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn metrics(&self) -> Arc<ThreadingMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Number of queued, not yet executed actions
    pub fn size(&self) -> usize {
        self.queue.with(|queue| queue.len())
    }

    /// Run `func` on the main thread and return its outcome.
    ///
    /// On the main thread `func` runs inline. Anywhere else it is queued and the
    /// caller blocks until the main thread has executed it. A panic in `func` is
    /// returned as an error on both paths.
    ///
    /// With an `interruptible`, the caller's flag is checked before queueing and
    /// every poll interval while waiting; on interruption the wait is abandoned with
    /// the interruption signal and the queued action is left to run unobserved.
    ///
    /// Errors raised by `func` are returned unchanged as [`TaskError::Failed`].
    pub fn run_on_main_thread<T, Func>(
        &self,
        func: Func,
        interruptible: Option<&dyn Interruptible>,
    ) -> TaskResult<T>
    where
        T: Send + 'static,
        Func: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        if self.is_main_thread() {
            return ActionResult::capture(func)
                .into_result()
                .map_err(TaskError::Failed);
        }

        if let Some(task) = interruptible {
            task.check_interrupted()?;
        }

        let slot = Arc::new(self.sync.create_wait_condition(None::<ActionResult<T>>));
        let sink: ResultSink<T> = {
            let slot = Arc::clone(&slot);
            Box::new(move |result: ActionResult<T>| {
                slot.with(|value| *value = Some(result));
                slot.notify_all();
            })
        };

        self.queue
            .with(|queue| queue.push_back(MainThreadAction::new(func, Some(sink))));
        self.metrics.record_action_submitted();
        if let Some(hook) = &self.on_action_submitted {
            hook();
        }

        loop {
            if let Some(result) = slot.wait_until(Some(self.poll_interval), Option::take) {
                return result.into_result().map_err(TaskError::Failed);
            }
            if let Some(task) = interruptible {
                if let Err(interrupted) = task.check_interrupted() {
                    tracing::debug!(
                        task = task.task_name(),
                        "Abandoning main-thread wait after interruption"
                    );
                    return Err(interrupted);
                }
            }
        }
    }

    /// Execute the oldest queued action, if any. Main thread only.
    ///
    /// Returns whether an action was executed. Fires the pending hook when more
    /// actions remain afterwards.
    pub fn maybe_execute_action(&self) -> Result<bool, MainThreadError> {
        self.ensure_main_thread()?;

        // Pop under the lock, execute outside it so the action may queue more
        let Some(action) = self.queue.with(VecDeque::pop_front) else {
            return Ok(false);
        };

        let failed = action.execute_and_submit();
        self.metrics.record_action_executed(failed);

        if self.size() > 0 {
            if let Some(hook) = &self.on_actions_pending {
                hook();
            }
        }
        Ok(true)
    }

    /// Execute queued actions for as long as `keep_going` returns true.
    ///
    /// Main thread only. Returns how many actions were executed.
    pub fn pump_while(&self, mut keep_going: impl FnMut() -> bool) -> Result<usize, MainThreadError> {
        self.ensure_main_thread()?;

        let mut executed = 0;
        while keep_going() {
            if self.maybe_execute_action()? {
                executed += 1;
            } else {
                thread::sleep(IDLE_PUMP_INTERVAL);
            }
        }
        Ok(executed)
    }

    fn ensure_main_thread(&self) -> Result<(), MainThreadError> {
        let actual = thread::current().id();
        if actual == self.main_thread {
            Ok(())
        } else {
            Err(MainThreadError::NotMainThread {
                expected: self.main_thread,
                actual,
            })
        }
    }
}
