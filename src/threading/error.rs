use std::any::Any;
use std::thread::ThreadId;
use thiserror::Error;

/// Result type returned by task bodies and main-thread calls.
pub type TaskResult<T = ()> = Result<T, TaskError>;

/// Outcome of a task body that did not return normally.
///
/// `Interrupted` is the cooperative cancellation signal. It is not a failure:
/// pools, suites and async callers record it as a cancellation and never hand
/// it to error handlers. Everything else is `Failed`.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task {task} was terminated due to external event.")]
    Interrupted { task: String },

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl TaskError {
    /// Build the interruption signal for the named task.
    pub fn interrupted(task: impl Into<String>) -> Self {
        TaskError::Interrupted { task: task.into() }
    }

    /// Check whether this is the interruption signal
    pub fn is_interrupted(&self) -> bool {
        matches!(self, TaskError::Interrupted { .. })
    }
}

/// Errors returned by thread pools
#[derive(Error, Debug)]
pub enum ThreadPoolError {
    #[error("Thread pool has been shut down, task {0} was rejected")]
    ShutDown(String),

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Errors returned when the main-thread queue is used from the wrong thread
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MainThreadError {
    #[error("Main-thread actions must be executed on {expected:?}, called from {actual:?}")]
    NotMainThread { expected: ThreadId, actual: ThreadId },
}

/// Errors produced while running a callable on behalf of someone else
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Panicked: {0}")]
    Panicked(String),
}

impl ActionError {
    /// Wrap a panic payload caught by `catch_unwind`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        ActionError::Panicked(message)
    }
}
