// Main-thread actions
//
// An action is a callable queued for the main thread together with the sink
// that receives its outcome.

use super::error::ActionError;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Outcome of a callable run on behalf of another thread.
///
/// Either the returned value or the error it raised, never both and never neither.
#[derive(Debug)]
pub enum ActionResult<T> {
    Returned(T),
    Raised(anyhow::Error),
}

impl<T> ActionResult<T> {
    /// Run `func`, capturing its value, its error or its panic.
    pub fn capture<F>(func: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<T>,
    {
        match panic::catch_unwind(AssertUnwindSafe(func)) {
            Ok(Ok(value)) => ActionResult::Returned(value),
            Ok(Err(error)) => ActionResult::Raised(error),
            Err(payload) => ActionResult::Raised(ActionError::from_panic(payload).into()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ActionResult::Raised(_))
    }

    pub fn into_result(self) -> anyhow::Result<T> {
        match self {
            ActionResult::Returned(value) => Ok(value),
            ActionResult::Raised(error) => Err(error),
        }
    }
}

/// Receives the outcome of an executed action.
pub type ResultSink<T> = Box<dyn FnOnce(ActionResult<T>) + Send>;

/// A type-erased callable waiting in the main-thread queue.
pub struct MainThreadAction {
    job: Box<dyn FnOnce() -> bool + Send>,
}

impl MainThreadAction {
    /// Pair `func` with the sink its outcome is delivered to.
    ///
    /// Without a sink nobody waits for the outcome; a failure is only logged.
    pub fn new<T, F>(func: F, sink: Option<ResultSink<T>>) -> Self
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let job = move || {
            let result = ActionResult::capture(func);
            let failed = result.is_error();
            match sink {
                Some(sink) => sink(result),
                None => {
                    if let ActionResult::Raised(error) = result {
                        tracing::warn!("Main-thread action failed with nobody waiting: {}", error);
                    }
                }
            }
            failed
        };
        Self { job: Box::new(job) }
    }

    /// Execute the callable and hand its outcome to the sink. Never panics.
    ///
    /// Returns whether the callable failed.
    pub fn execute_and_submit(self) -> bool {
        (self.job)()
    }
}

impl fmt::Debug for MainThreadAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainThreadAction").finish_non_exhaustive()
    }
}
