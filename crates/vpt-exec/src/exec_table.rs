// crates/vpt-exec/src/exec_table.rs
// ============================================================================
// Module: Async Execution Table
// Description: Process-wide execution_id -> status/progress table polled by
//              external callers of route-driven action execution (§4.4
//              "Async handle").
// Purpose: Let a host expose a non-blocking "start action, poll status" API
//          on top of the otherwise synchronous ActionExecutor.
// Dependencies: std::sync, serde_json
// ============================================================================

//! ## Overview
//! Mirrors `vpt_graph::GraphCache`'s shape: a single `RwLock<BTreeMap<..>>`
//! guarding process-wide state, read far more often than written, with the
//! lock-poisoning recovery idiom used throughout this workspace.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde_json::Value;

// ============================================================================
// SECTION: ExecutionStatus
// ============================================================================

/// Lifecycle status of a tracked asynchronous execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// The execution is still in flight.
    Running,
    /// The execution finished successfully.
    Completed,
    /// The execution finished with an error.
    Error,
}

/// A single tracked execution's state (§4.4 "Async handle").
#[derive(Debug, Clone)]
pub struct ExecutionHandle {
    /// Current lifecycle status.
    pub status: ExecutionStatus,
    /// Completion percentage, `0..=100`.
    pub progress: u8,
    /// Result payload, present once `status == Completed`.
    pub result: Option<Value>,
    /// Error message, present once `status == Error`.
    pub error: Option<String>,
    /// Milliseconds elapsed since the execution was registered.
    pub elapsed_ms: u64,
}

impl ExecutionHandle {
    /// Creates a freshly started, zero-progress handle.
    fn started() -> Self {
        Self { status: ExecutionStatus::Running, progress: 0, result: None, error: None, elapsed_ms: 0 }
    }
}

// ============================================================================
// SECTION: ExecutionTable
// ============================================================================

/// A process-wide table of in-flight and completed executions, keyed by an
/// opaque `execution_id` the caller chooses.
#[derive(Debug, Default)]
pub struct ExecutionTable {
    /// Tracked executions.
    entries: RwLock<BTreeMap<String, ExecutionHandle>>,
}

impl ExecutionTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self { entries: RwLock::new(BTreeMap::new()) }
    }

    /// Registers a new running execution under `execution_id`.
    pub fn start(&self, execution_id: impl Into<String>) {
        let mut guard = self.entries.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.insert(execution_id.into(), ExecutionHandle::started());
    }

    /// Updates the progress percentage and elapsed time of a running execution.
    pub fn update_progress(&self, execution_id: &str, progress: u8, elapsed_ms: u64) {
        let mut guard = self.entries.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(handle) = guard.get_mut(execution_id) {
            handle.progress = progress.min(100);
            handle.elapsed_ms = elapsed_ms;
        }
    }

    /// Marks an execution completed with its result payload.
    pub fn complete(&self, execution_id: &str, result: Value, elapsed_ms: u64) {
        let mut guard = self.entries.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(handle) = guard.get_mut(execution_id) {
            handle.status = ExecutionStatus::Completed;
            handle.progress = 100;
            handle.result = Some(result);
            handle.elapsed_ms = elapsed_ms;
        }
    }

    /// Marks an execution failed with an error message.
    pub fn fail(&self, execution_id: &str, error: impl Into<String>, elapsed_ms: u64) {
        let mut guard = self.entries.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(handle) = guard.get_mut(execution_id) {
            handle.status = ExecutionStatus::Error;
            handle.error = Some(error.into());
            handle.elapsed_ms = elapsed_ms;
        }
    }

    /// Returns a snapshot of the named execution's state, if tracked.
    #[must_use]
    pub fn get(&self, execution_id: &str) -> Option<ExecutionHandle> {
        let guard = self.entries.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.get(execution_id).cloned()
    }
}

#[cfg(test)]
#[allow(clippy::missing_docs_in_private_items, reason = "test helpers are self-explanatory from their names")]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn lifecycle_transitions_are_observable() {
        let table = ExecutionTable::new();
        table.start("exec-1");
        assert_eq!(table.get("exec-1").unwrap().status, ExecutionStatus::Running);

        table.update_progress("exec-1", 50, 120);
        assert_eq!(table.get("exec-1").unwrap().progress, 50);

        table.complete("exec-1", json!({"ok": true}), 240);
        let handle = table.get("exec-1").unwrap();
        assert_eq!(handle.status, ExecutionStatus::Completed);
        assert_eq!(handle.progress, 100);
    }

    #[test]
    fn unknown_execution_is_none() {
        let table = ExecutionTable::new();
        assert!(table.get("ghost").is_none());
    }

    #[test]
    fn failure_records_error_message() {
        let table = ExecutionTable::new();
        table.start("exec-2");
        table.fail("exec-2", "controller unreachable", 10);
        let handle = table.get("exec-2").unwrap();
        assert_eq!(handle.status, ExecutionStatus::Error);
        assert_eq!(handle.error.as_deref(), Some("controller unreachable"));
    }
}
