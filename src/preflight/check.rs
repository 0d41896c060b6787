use crate::models::{PreflightCheckExecutionStatus, PreflightCheckResult};
use crate::threading::Task;
use std::sync::Arc;

/// A task run by a [`PreflightCheckSuite`](super::PreflightCheckSuite).
///
/// Checks report findings through a [`ResultListener`] they were built with,
/// and should call `check_interrupted()` between units of work so that a
/// cancelled suite stops publishing.
pub trait PreflightCheck: Task {
    /// Display name; also the `name` of every result the check publishes
    fn preflight_name(&self) -> &str;

    fn preflight_description(&self) -> &str;
}

/// Receives each result a check publishes, on the check's worker thread.
pub type ResultListener = Arc<dyn Fn(PreflightCheckResult) + Send + Sync>;

/// Receives every status transition of every check in a suite.
pub type StatusListener = Arc<dyn Fn(&dyn PreflightCheck, PreflightCheckExecutionStatus) + Send + Sync>;

/// Fired once when the last tracked check of a suite has finished.
pub type FinishedCallback = Arc<dyn Fn() + Send + Sync>;
