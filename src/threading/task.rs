// Task and interruption model
//
// A task is a named unit of work with a monotonic interrupted flag. Cancellation
// is cooperative: `interrupt()` only sets the flag and the task body observes it
// at its own checkpoints through `check_interrupted()`.

use super::error::{TaskError, TaskResult};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Per-task error handler. Receives the error and its rendered trace.
///
/// Returning `Ok(())` marks the error as handled. Returning an error passes that
/// error on to the pool-level handler instead.
pub type TaskErrorHandler = Box<dyn Fn(&anyhow::Error, &str) -> anyhow::Result<()> + Send + Sync>;

/// Identity and interruption state shared by every task implementation.
///
/// Concrete tasks embed a `TaskBase` and return it from
/// [`Interruptible::task_base`]. A wrapper task can return the base of the task
/// it wraps, in which case interrupting either one interrupts both.
pub struct TaskBase {
    id: u64,
    name: String,
    interrupted: AtomicBool,
    error_handler: Option<TaskErrorHandler>,
}

impl TaskBase {
    /// Create a base with a process-unique default name (`Task <id>`).
    pub fn new() -> Self {
        let id = NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            id,
            name: format!("Task {}", id),
            interrupted: AtomicBool::new(false),
            error_handler: None,
        }
    }

    /// Create a named base
    pub fn named(name: impl Into<String>) -> Self {
        let mut base = Self::new();
        base.name = name.into();
        base
    }

    /// Create a base using `name` when given, the default name otherwise.
    pub fn with_optional_name(name: Option<String>) -> Self {
        match name {
            Some(name) => Self::named(name),
            None => Self::new(),
        }
    }

    /// Attach a per-task error handler
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&anyhow::Error, &str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.error_handler = Some(Box::new(handler));
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the interrupted flag. Idempotent, callable from any thread at any time.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Run the per-task error handler, or give the error back when there is none.
    pub fn handle_error(&self, error: anyhow::Error, trace: &str) -> anyhow::Result<()> {
        match &self.error_handler {
            Some(handler) => handler(&error, trace),
            None => Err(error),
        }
    }
}

impl Default for TaskBase {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TaskBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskBase")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("interrupted", &self.is_interrupted())
            .field("has_error_handler", &self.error_handler.is_some())
            .finish()
    }
}

/// Something that can be interrupted and checked for interruption.
///
/// Only [`task_base`](Self::task_base) is required; the rest delegates to it.
pub trait Interruptible: Send + Sync {
    fn task_base(&self) -> &TaskBase;

    fn task_name(&self) -> &str {
        self.task_base().name()
    }

    fn interrupt(&self) {
        self.task_base().interrupt()
    }

    fn is_interrupted(&self) -> bool {
        self.task_base().is_interrupted()
    }

    /// The interruption signal for this task, for bodies that bail out on their own.
    fn interrupted_error(&self) -> TaskError {
        TaskError::interrupted(self.task_name())
    }

    /// Checkpoint: returns the interruption signal if the task was interrupted.
    fn check_interrupted(&self) -> TaskResult<()> {
        if self.is_interrupted() {
            Err(self.interrupted_error())
        } else {
            Ok(())
        }
    }
}

impl Interruptible for TaskBase {
    fn task_base(&self) -> &TaskBase {
        self
    }
}

/// A unit of work a thread pool can run.
///
/// The pool calls exactly one of [`run`](Self::run) or
/// [`on_cancelled`](Self::on_cancelled): `on_cancelled` when the task was
/// interrupted before a worker picked it up, `run` otherwise.
pub trait Task: Interruptible {
    fn run(&self) -> TaskResult<()>;

    /// Called instead of `run` when the task was interrupted before starting.
    fn on_cancelled(&self) {}

    /// Per-task error handling for failures escaping `run`.
    ///
    /// Defaults to the handler stored in the task base.
    fn on_error(&self, error: anyhow::Error, trace: &str) -> anyhow::Result<()> {
        self.task_base().handle_error(error, trace)
    }
}

/// Task built from a closure, for work that needs no state of its own.
pub struct FnTask<F> {
    base: TaskBase,
    body: F,
}

impl<F> FnTask<F>
where
    F: Fn(&TaskBase) -> TaskResult<()> + Send + Sync,
{
    pub fn new(base: TaskBase, body: F) -> Self {
        Self { base, body }
    }
}

impl<F> Interruptible for FnTask<F>
where
    F: Fn(&TaskBase) -> TaskResult<()> + Send + Sync,
{
    fn task_base(&self) -> &TaskBase {
        &self.base
    }
}

impl<F> Task for FnTask<F>
where
    F: Fn(&TaskBase) -> TaskResult<()> + Send + Sync,
{
    fn run(&self) -> TaskResult<()> {
        (self.body)(&self.base)
    }
}
