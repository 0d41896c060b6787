use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one check inside a [`PreflightCheckSuite`](crate::preflight::PreflightCheckSuite).
///
/// A check moves `Pending -> Running -> Completed | Errored | Cancelled`, or
/// `Pending -> Cancelled` when it is cancelled before a worker starts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PreflightCheckExecutionStatus {
    Pending,
    Running,
    Completed,
    Errored,
    Cancelled,
}

impl PreflightCheckExecutionStatus {
    /// Whether the check has reached an end state
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PreflightCheckExecutionStatus::Completed
                | PreflightCheckExecutionStatus::Errored
                | PreflightCheckExecutionStatus::Cancelled
        )
    }
}

impl fmt::Display for PreflightCheckExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PreflightCheckExecutionStatus::Pending => "PENDING",
            PreflightCheckExecutionStatus::Running => "RUNNING",
            PreflightCheckExecutionStatus::Completed => "COMPLETED",
            PreflightCheckExecutionStatus::Errored => "ERRORED",
            PreflightCheckExecutionStatus::Cancelled => "CANCELLED",
        };
        f.write_str(label)
    }
}

/// Severity of a published check result, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PreflightCheckResultSeverity {
    Success,
    Info,
    Warning,
    Error,
}

/// One finding published by a check while it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightCheckResult {
    /// Name of the check that published it
    pub name: String,
    pub severity: PreflightCheckResultSeverity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
}

impl PreflightCheckResult {
    pub fn new(
        name: impl Into<String>,
        severity: PreflightCheckResultSeverity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            severity,
            description: description.into(),
            fix_hint: None,
        }
    }

    pub fn with_fix_hint(mut self, fix_hint: impl Into<String>) -> Self {
        self.fix_hint = Some(fix_hint.into());
        self
    }
}

/// Everything known about one check: its latest status and its results so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub description: String,
    pub status: PreflightCheckExecutionStatus,
    pub results: Vec<PreflightCheckResult>,
}

impl CheckRecord {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            status: PreflightCheckExecutionStatus::Pending,
            results: Vec::new(),
        }
    }
}

/// Snapshot of a preflight run, keyed by check name in first-seen order.
///
/// Held behind `Arc<RwLock<>>` by [`PreflightStateManager`](crate::state::PreflightStateManager);
/// mutate it through the manager so subscribers are notified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightState {
    pub checks: IndexMap<String, CheckRecord>,
    pub finished: bool,
}

impl PreflightState {
    pub fn status_of(&self, check: &str) -> Option<PreflightCheckExecutionStatus> {
        self.checks.get(check).map(|record| record.status)
    }

    pub fn results_of(&self, check: &str) -> &[PreflightCheckResult] {
        self.checks
            .get(check)
            .map(|record| record.results.as_slice())
            .unwrap_or_default()
    }

    /// All results across checks, in check order
    pub fn all_results(&self) -> impl Iterator<Item = &PreflightCheckResult> {
        self.checks.values().flat_map(|record| record.results.iter())
    }

    pub fn count_with_status(&self, status: PreflightCheckExecutionStatus) -> usize {
        self.checks
            .values()
            .filter(|record| record.status == status)
            .count()
    }

    /// Most severe result published so far
    pub fn worst_severity(&self) -> Option<PreflightCheckResultSeverity> {
        self.all_results().map(|result| result.severity).max()
    }

    /// True when every known check reached an end state
    pub fn all_terminal(&self) -> bool {
        self.checks.values().all(|record| record.status.is_terminal())
    }
}
