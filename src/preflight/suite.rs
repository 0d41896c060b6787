// Preflight check suite
//
// Runs a set of checks on a thread pool, reports every status transition, and
// signals once when the last check has finished. Each check is submitted inside
// a wrapper task that shares the check's interruption state, so interrupting the
// check interrupts the wrapper and the pool's `on_cancelled` path still reports.

use super::check::{FinishedCallback, PreflightCheck, StatusListener};
use crate::models::PreflightCheckExecutionStatus;
use crate::threading::{
    ActionError, DefaultThreadPool, Interruptible, Lock, Task, TaskBase, TaskError, TaskResult,
    ThreadPool, ThreadPoolError,
};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreflightError {
    #[error("Preflight check suite has already been started")]
    AlreadyStarted,

    #[error(transparent)]
    Pool(#[from] ThreadPoolError),
}

type TrackedChecks = IndexMap<u64, Arc<dyn PreflightCheck>>;

struct SuiteShared<P: ThreadPool> {
    checks: P::Lock<TrackedChecks>,
    status_listener: StatusListener,
    on_checks_finished: Option<FinishedCallback>,
}

impl<P: ThreadPool> SuiteShared<P> {
    /// Stop tracking a check. Fires the finished callback when this removal
    /// emptied the set.
    fn finalize(&self, check_id: u64) {
        let emptied = self
            .checks
            .with(|checks| checks.shift_remove(&check_id).is_some() && checks.is_empty());
        if emptied {
            self.fire_finished();
        }
    }

    fn fire_finished(&self) {
        tracing::debug!("All preflight checks finished");
        if let Some(callback) = &self.on_checks_finished {
            callback();
        }
    }
}

/// Task submitted to the pool on behalf of one check.
struct PreflightCheckTask<P: ThreadPool> {
    check: Arc<dyn PreflightCheck>,
    suite: Arc<SuiteShared<P>>,
    status: P::Lock<PreflightCheckExecutionStatus>,
}

impl<P: ThreadPool> PreflightCheckTask<P> {
    fn change_status(&self, status: PreflightCheckExecutionStatus) {
        let changed = self.status.with(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
        if changed {
            (self.suite.status_listener)(self.check.as_ref(), status);
        }
    }

    fn check_id(&self) -> u64 {
        self.check.task_base().id()
    }
}

impl<P: ThreadPool> Interruptible for PreflightCheckTask<P> {
    fn task_base(&self) -> &TaskBase {
        self.check.task_base()
    }
}

impl<P: ThreadPool> Task for PreflightCheckTask<P> {
    fn run(&self) -> TaskResult<()> {
        self.change_status(PreflightCheckExecutionStatus::Running);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.check.run()))
            .unwrap_or_else(|payload| Err(TaskError::Failed(ActionError::from_panic(payload).into())));

        match &outcome {
            Ok(()) => self.change_status(PreflightCheckExecutionStatus::Completed),
            Err(TaskError::Interrupted { .. }) => {
                self.change_status(PreflightCheckExecutionStatus::Cancelled)
            }
            Err(TaskError::Failed(error)) => {
                tracing::debug!(check = self.check.preflight_name(), "Preflight check failed: {}", error);
                self.change_status(PreflightCheckExecutionStatus::Errored)
            }
        }

        self.suite.finalize(self.check_id());
        outcome
    }

    fn on_cancelled(&self) {
        self.check.on_cancelled();
        self.change_status(PreflightCheckExecutionStatus::Cancelled);
        self.suite.finalize(self.check_id());
    }

    fn on_error(&self, error: anyhow::Error, trace: &str) -> anyhow::Result<()> {
        self.check.on_error(error, trace)
    }
}

/// Runs preflight checks concurrently on a pool.
///
/// Status transitions are reported to the listener from whichever thread
/// causes them (the caller of `start` for `Pending`, pool workers for the rest).
/// The finished callback fires exactly once, after every check reached
/// `Completed`, `Errored` or `Cancelled`.
///
/// Checks are tracked by task id, so two checks sharing a name both run.
/// Name them uniquely anyway when the listener is a
/// [`PreflightStateManager`](crate::state::PreflightStateManager).
///
/// # Example
/// ```ignore
/// let suite = PreflightCheckSuite::new(pool, checks, status_listener, Some(on_finished));
/// suite.start()?;
/// // later, from any thread
/// suite.cancel();
/// ```
pub struct PreflightCheckSuite<P: ThreadPool = DefaultThreadPool> {
    pool: Arc<P>,
    shared: Arc<SuiteShared<P>>,
    started: AtomicBool,
}

impl<P: ThreadPool> PreflightCheckSuite<P> {
    pub fn new(
        pool: Arc<P>,
        checks: Vec<Arc<dyn PreflightCheck>>,
        status_listener: StatusListener,
        on_checks_finished: Option<FinishedCallback>,
    ) -> Self {
        let mut names = HashSet::new();
        for check in &checks {
            if !names.insert(check.preflight_name()) {
                tracing::warn!(
                    check = check.preflight_name(),
                    "Duplicate preflight check name, listeners keyed by name will merge them"
                );
            }
        }

        let tracked: TrackedChecks = checks
            .into_iter()
            .map(|check| (check.task_base().id(), check))
            .collect();
        let shared = Arc::new(SuiteShared {
            checks: pool.create_lock(tracked),
            status_listener,
            on_checks_finished,
        });
        Self {
            pool,
            shared,
            started: AtomicBool::new(false),
        }
    }

    /// Report every check as `Pending` and submit it to the pool.
    ///
    /// A suite can only be started once. With no checks, the finished callback
    /// fires before this returns. Checks the pool rejects are reported
    /// `Cancelled` and the first rejection is returned.
    pub fn start(&self) -> Result<(), PreflightError> {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("Preflight check suite started twice");
            return Err(PreflightError::AlreadyStarted);
        }

        let (emptied, rejection) = self.shared.checks.with(|checks| {
            let mut rejection = None;
            let mut rejected = Vec::new();

            for (id, check) in checks.iter() {
                (self.shared.status_listener)(check.as_ref(), PreflightCheckExecutionStatus::Pending);
                let task = Arc::new(PreflightCheckTask::<P> {
                    check: Arc::clone(check),
                    suite: Arc::clone(&self.shared),
                    status: self.pool.create_lock(PreflightCheckExecutionStatus::Pending),
                });
                if let Err(err) = self.pool.add_task(task) {
                    (self.shared.status_listener)(
                        check.as_ref(),
                        PreflightCheckExecutionStatus::Cancelled,
                    );
                    rejected.push(*id);
                    rejection.get_or_insert(err);
                }
            }

            for id in rejected {
                checks.shift_remove(&id);
            }
            (checks.is_empty(), rejection)
        });

        tracing::debug!("Preflight check suite started");
        if emptied {
            self.shared.fire_finished();
        }
        match rejection {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Interrupt every check that is still tracked. Returns how many were
    /// interrupted; finished checks are unaffected.
    pub fn cancel(&self) -> usize {
        let interrupted = self.shared.checks.with(|checks| {
            for check in checks.values() {
                check.interrupt();
            }
            checks.len()
        });
        tracing::debug!("Cancelled {} preflight checks", interrupted);
        interrupted
    }

    /// Number of checks not yet finished
    pub fn len(&self) -> usize {
        self.shared.checks.with(|checks| checks.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once the suite was started and every check finished
    pub fn is_finished(&self) -> bool {
        self.started.load(Ordering::SeqCst) && self.is_empty()
    }
}
