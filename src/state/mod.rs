// State management module
//
// This module provides the PreflightStateManager which records suite progress in
// a PreflightState behind Arc<RwLock<T>> and emits change events for whoever
// displays it.

use crate::models::{
    CheckRecord, PreflightCheckExecutionStatus, PreflightCheckResult, PreflightState,
};
use crate::preflight::{FinishedCallback, PreflightCheck, ResultListener, StatusListener};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when preflight state is modified
///
/// These events let a display follow a preflight run without polling.
#[derive(Clone, Debug, PartialEq)]
pub enum PreflightChange {
    /// A check moved to a new status (first sighting included)
    StatusChanged {
        check: String,
        status: PreflightCheckExecutionStatus,
    },

    /// A check published a result
    ResultPublished { result: PreflightCheckResult },

    /// Every check finished
    ChecksFinished {
        completed: usize,
        errored: usize,
        cancelled: usize,
    },

    /// State has been reset
    StateReset,
}

/// Thread-safe preflight status board with event emission
///
/// - Holds a [`PreflightState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`PreflightChange`] events
/// - Hands out listener adapters for wiring a
///   [`PreflightCheckSuite`](crate::preflight::PreflightCheckSuite) and its checks
/// - Keys checks by name, so checks wired to one board need unique names
///
/// # Usage
///
/// - [`read()`](Self::read) for reading state through a closure
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to changes
///
/// ```ignore
/// let board = Arc::new(PreflightStateManager::new());
/// let check = DependencyCheck::new(paths, board.result_listener());
/// let suite = PreflightCheckSuite::new(pool, vec![Arc::new(check)],
///     board.status_listener(), Some(board.finished_callback()));
/// ```
pub struct PreflightStateManager {
    /// The preflight state protected by RwLock for thread-safe access
    state: Arc<RwLock<PreflightState>>,

    /// Broadcast channel for emitting change events
    state_tx: broadcast::Sender<PreflightChange>,
}

impl PreflightStateManager {
    /// Create a new manager with empty state
    ///
    /// # Returns
    /// A new PreflightStateManager with a broadcast channel buffer of 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(PreflightState::default())),
            state_tx,
        }
    }

    /// Get a clone of the current state
    pub fn snapshot(&self) -> PreflightState {
        self.read(PreflightState::clone)
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let worst = manager.read(|state| state.worst_severity());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&PreflightState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// # Arguments
    /// * `update_fn` - A function that mutates the state
    ///
    /// # Returns
    /// The PreflightChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<PreflightChange>
    where
        F: FnOnce(&mut PreflightState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);
        for change in &changes {
            // No subscribers is fine
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to change events
    pub fn subscribe(&self) -> broadcast::Receiver<PreflightChange> {
        self.state_tx.subscribe()
    }

    fn detect_changes(old: &PreflightState, new: &PreflightState) -> Vec<PreflightChange> {
        let mut changes = Vec::new();

        for (name, record) in &new.checks {
            let previous = old.checks.get(name);

            if previous.map(|p| p.status) != Some(record.status) {
                changes.push(PreflightChange::StatusChanged {
                    check: name.clone(),
                    status: record.status,
                });
            }

            let already_seen = previous.map_or(0, |p| p.results.len());
            for result in record.results.iter().skip(already_seen) {
                changes.push(PreflightChange::ResultPublished {
                    result: result.clone(),
                });
            }
        }

        if !old.finished && new.finished {
            changes.push(PreflightChange::ChecksFinished {
                completed: new.count_with_status(PreflightCheckExecutionStatus::Completed),
                errored: new.count_with_status(PreflightCheckExecutionStatus::Errored),
                cancelled: new.count_with_status(PreflightCheckExecutionStatus::Cancelled),
            });
        }

        changes
    }

    // Convenience methods used by the listener adapters

    /// Record a status transition of a check
    ///
    /// Checks are identified by name. Two checks sharing one name share one
    /// record and overwrite each other's status.
    pub fn record_status(
        &self,
        check: &str,
        description: &str,
        status: PreflightCheckExecutionStatus,
    ) -> Vec<PreflightChange> {
        self.update(|state| {
            state
                .checks
                .entry(check.to_string())
                .or_insert_with(|| CheckRecord::new(description))
                .status = status;
        })
    }

    /// Record a result published by a check
    pub fn publish_result(&self, result: PreflightCheckResult) -> Vec<PreflightChange> {
        self.update(|state| {
            state
                .checks
                .entry(result.name.clone())
                .or_insert_with(|| CheckRecord::new(""))
                .results
                .push(result);
        })
    }

    /// Mark the run as finished
    pub fn mark_finished(&self) -> Vec<PreflightChange> {
        self.update(|state| state.finished = true)
    }

    /// Forget every check and result
    pub fn reset(&self) -> Vec<PreflightChange> {
        let mut changes = self.update(|state| *state = PreflightState::default());

        let reset_event = PreflightChange::StateReset;
        let _ = self.state_tx.send(reset_event.clone());
        changes.push(reset_event);

        changes
    }

    /// Status listener for a suite, recording into this manager
    pub fn status_listener(self: &Arc<Self>) -> StatusListener {
        let manager = Arc::clone(self);
        Arc::new(move |check: &dyn PreflightCheck, status| {
            tracing::debug!(check = check.preflight_name(), "Preflight check is {}", status);
            manager.record_status(check.preflight_name(), check.preflight_description(), status);
        })
    }

    /// Result listener for checks, recording into this manager
    pub fn result_listener(self: &Arc<Self>) -> ResultListener {
        let manager = Arc::clone(self);
        Arc::new(move |result| {
            manager.publish_result(result);
        })
    }

    /// Finished callback for a suite, marking this manager finished
    pub fn finished_callback(self: &Arc<Self>) -> FinishedCallback {
        let manager = Arc::clone(self);
        Arc::new(move || {
            manager.mark_finished();
        })
    }

    /// Get an Arc reference to the state for use in worker threads
    pub fn state_arc(&self) -> Arc<RwLock<PreflightState>> {
        Arc::clone(&self.state)
    }
}

impl Default for PreflightStateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for PreflightStateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
