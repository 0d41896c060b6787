// Preflight module
//
// Checks that run before a long operation, executed concurrently by a suite

pub mod check;
pub mod checks;
pub mod suite;

pub use check::{FinishedCallback, PreflightCheck, ResultListener, StatusListener};
pub use checks::{DEPENDENCY_CHECK_NAME, DependencyCheck};
pub use suite::{PreflightCheckSuite, PreflightError};
