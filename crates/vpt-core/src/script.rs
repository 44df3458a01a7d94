// crates/vpt-core/src/script.rs
// ============================================================================
// Module: Script Execution State
// Description: Per-script-run append-only state: steps, screenshots, context.
// Purpose: Give NavigationExecutor/ActionExecutor/VerificationExecutor a
//          single owned record of everything a script run has done so far.
// Dependencies: crate::identifiers, crate::time, crate::model, serde
// ============================================================================

//! ## Overview
//! `ScriptContext` is an append-only, in-memory record that higher layers
//! mutate by calling narrow methods rather than poking fields directly.
//! Persistence (running-log writes, screenshot upload) lives one layer up
//! in `vpt-exec`, which owns the
//! filesystem and object-store side effects; this crate only owns the data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::identifiers::EdgeId;
use crate::identifiers::NodeId;
use crate::identifiers::ScriptResultId;
use crate::identifiers::TreeId;
use crate::model::Action;
use crate::model::Verification;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Step Result
// ============================================================================

/// The category of a single recorded step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepCategory {
    /// A navigation transition (action + verification).
    Navigation,
    /// A standalone action batch.
    Action,
    /// A standalone verification batch.
    Verification,
    /// A zap-analysis iteration.
    ZapAction,
    /// A validation-sweep step.
    Validation,
}

/// Screenshot paths captured around a single step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepScreenshots {
    /// Screenshot captured immediately before the step began.
    pub start: Option<String>,
    /// Screenshot captured immediately after the step completed.
    pub end: Option<String>,
    /// A single representative screenshot, when only one was captured.
    pub main: Option<String>,
}

/// The outcome of a single executed step, recorded into `ScriptContext`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Monotonic step number assigned at recording time.
    pub step_number: u64,
    /// The step's category.
    pub category: StepCategory,
    /// Whether the step succeeded.
    pub success: bool,
    /// Wall-clock execution time of the step, in milliseconds.
    pub execution_time_ms: u64,
    /// Origin node, when applicable.
    pub from_node: Option<NodeId>,
    /// Destination node, when applicable.
    pub to_node: Option<NodeId>,
    /// Human-readable summary message.
    pub message: String,
    /// Actions executed as part of this step.
    #[serde(default)]
    pub actions: Vec<Action>,
    /// Verifications requested as part of this step.
    #[serde(default)]
    pub verifications: Vec<Verification>,
    /// Per-verification pass/fail flags, aligned with `verifications`.
    #[serde(default)]
    pub verification_results: Vec<bool>,
    /// Screenshot paths captured around this step.
    #[serde(default)]
    pub screenshots: StepScreenshots,
    /// Error detail, when `success` is false.
    pub error: Option<String>,
    /// Whether a forced transition was inserted to reach this step's origin
    /// (validation-sweep recovery tracking; SPEC_FULL §9 Open Question c).
    #[serde(default)]
    pub forced_transition: bool,
}

// ============================================================================
// SECTION: Navigation Context
// ============================================================================

/// The mutable per-device navigation position and bookkeeping (§4.10
/// `DeviceHandle.navigation_context`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NavigationContext {
    /// The tree the device currently believes it is on.
    pub current_tree_id: Option<TreeId>,
    /// The node the device currently believes it is at.
    pub current_node_id: Option<NodeId>,
    /// Identifier of the in-flight script execution row.
    pub script_id: Option<ScriptResultId>,
    /// Display name of the running script.
    pub script_name: Option<String>,
    /// When true, §4.4/§4.5 database recording is suppressed.
    pub skip_db_recording: bool,
    /// Command name of the most recently executed action.
    pub last_action_executed: Option<String>,
    /// Timestamp of the most recently executed action's completion.
    pub last_action_timestamp: Option<Timestamp>,
}

impl NavigationContext {
    /// Updates the current position (§4.6 "Position update helper").
    pub fn update_position(&mut self, tree_id: TreeId, node_id: NodeId) {
        self.current_tree_id = Some(tree_id);
        self.current_node_id = Some(node_id);
    }

    /// Returns true when database recording should be skipped for this
    /// context (§7 `DBRecordingSkipped`), given the edge/node identifiers in
    /// play.
    #[must_use]
    pub fn should_skip_recording(&self, tree_id: Option<&TreeId>) -> bool {
        self.skip_db_recording || tree_id.is_none_or(|id| id.as_str().is_empty())
    }
}

// ============================================================================
// SECTION: Script Context
// ============================================================================

/// Per-script-run owned state (§4.8). Exclusively owns `screenshot_paths`,
/// `step_results`, and the stdout buffer for the lifetime of one script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptContext {
    /// Display name of the script.
    pub script_name: String,
    /// Wall-clock start time.
    pub start_time: Timestamp,
    /// Next step number to assign.
    next_step_number: u64,
    /// Ordered step results recorded so far.
    step_results: Vec<StepResult>,
    /// Ordered screenshot paths (local initially, rewritten after upload).
    screenshot_paths: Vec<Option<String>>,
    /// In-memory buffer mirroring everything written to stdout.
    stdout_buffer: String,
    /// Planned step count, used for running-log ETA estimates.
    pub planned_steps: u64,
    /// Arbitrary metadata persisted to the script-execution database row.
    pub metadata: BTreeMap<String, Value>,
    /// Ephemeral variables, never persisted.
    #[serde(skip)]
    pub variables: BTreeMap<String, Value>,
    /// Per-device navigation context.
    pub navigation: NavigationContext,
}

impl ScriptContext {
    /// Creates a new, empty script context.
    #[must_use]
    pub fn new(script_name: impl Into<String>, start_time: Timestamp, planned_steps: u64) -> Self {
        Self {
            script_name: script_name.into(),
            start_time,
            next_step_number: 1,
            step_results: Vec::new(),
            screenshot_paths: Vec::new(),
            stdout_buffer: String::new(),
            planned_steps,
            metadata: BTreeMap::new(),
            variables: BTreeMap::new(),
            navigation: NavigationContext::default(),
        }
    }

    /// Records a step, assigning it the next sequential step number.
    ///
    /// Returns the assigned step number.
    pub fn record_step(&mut self, mut step: StepResult) -> u64 {
        step.step_number = self.next_step_number;
        self.next_step_number += 1;
        self.step_results.push(step);
        self.next_step_number - 1
    }

    /// Returns all recorded steps in order.
    #[must_use]
    pub fn step_results(&self) -> &[StepResult] {
        &self.step_results
    }

    /// Appends a screenshot path at the next positional slot.
    pub fn push_screenshot(&mut self, path: Option<String>) {
        self.screenshot_paths.push(path);
    }

    /// Returns the current screenshot path list.
    #[must_use]
    pub fn screenshot_paths(&self) -> &[Option<String>] {
        &self.screenshot_paths
    }

    /// Replaces the screenshot path list wholesale (used after batch upload
    /// rewrites local paths to remote URLs).
    pub fn set_screenshot_paths(&mut self, paths: Vec<Option<String>>) {
        self.screenshot_paths = paths;
    }

    /// Appends text to the in-memory stdout mirror buffer.
    pub fn append_stdout(&mut self, text: &str) {
        self.stdout_buffer.push_str(text);
    }

    /// Returns the accumulated stdout mirror buffer.
    #[must_use]
    pub fn stdout_buffer(&self) -> &str {
        &self.stdout_buffer
    }

    /// Returns the running mean step duration in milliseconds, or `None`
    /// when no steps have finished yet.
    #[must_use]
    pub fn mean_step_duration_ms(&self) -> Option<f64> {
        if self.step_results.is_empty() {
            return None;
        }
        #[allow(
            clippy::cast_precision_loss,
            reason = "step counts and durations are far below f64's exact-integer range"
        )]
        let total: u64 = self.step_results.iter().map(|step| step.execution_time_ms).sum();
        #[allow(clippy::cast_precision_loss, reason = "see above")]
        let mean = total as f64 / self.step_results.len() as f64;
        Some(mean)
    }

    /// Estimates remaining wall-clock time in milliseconds using either the
    /// running mean step duration or a caller-provided historical average.
    #[must_use]
    pub fn estimated_remaining_ms(&self, historical_average_ms: Option<f64>) -> Option<f64> {
        let remaining = self.planned_steps.saturating_sub(self.step_results.len() as u64);
        if remaining == 0 {
            return Some(0.0);
        }
        let per_step = self.mean_step_duration_ms().or(historical_average_ms)?;
        #[allow(clippy::cast_precision_loss, reason = "remaining step counts are small")]
        Some(per_step * remaining as f64)
    }
}

#[cfg(test)]
#[allow(clippy::missing_docs_in_private_items, reason = "test helpers are self-explanatory from their names")]
mod tests {
    use super::*;

    fn step(success: bool, ms: u64) -> StepResult {
        StepResult {
            step_number: 0,
            category: StepCategory::Action,
            success,
            execution_time_ms: ms,
            from_node: None,
            to_node: None,
            message: "ok".to_string(),
            actions: Vec::new(),
            verifications: Vec::new(),
            verification_results: Vec::new(),
            screenshots: StepScreenshots::default(),
            error: None,
            forced_transition: false,
        }
    }

    #[test]
    fn step_numbers_are_monotonic() {
        let mut ctx = ScriptContext::new("s", Timestamp::from_millis(0), 3);
        assert_eq!(ctx.record_step(step(true, 10)), 1);
        assert_eq!(ctx.record_step(step(true, 20)), 2);
        assert_eq!(ctx.step_results().len(), 2);
    }

    #[test]
    fn screenshot_positions_are_preserved() {
        let mut ctx = ScriptContext::new("s", Timestamp::from_millis(0), 1);
        ctx.push_screenshot(Some("a.jpg".to_string()));
        ctx.push_screenshot(None);
        ctx.push_screenshot(Some("b.jpg".to_string()));
        assert_eq!(ctx.screenshot_paths().len(), 3);
        assert_eq!(ctx.screenshot_paths()[1], None);
    }

    #[test]
    fn estimated_remaining_uses_running_mean() {
        let mut ctx = ScriptContext::new("s", Timestamp::from_millis(0), 4);
        ctx.record_step(step(true, 100));
        ctx.record_step(step(true, 300));
        let remaining = ctx.estimated_remaining_ms(None);
        assert_eq!(remaining, Some(400.0));
    }

    #[test]
    fn estimated_remaining_falls_back_to_historical_average() {
        let ctx = ScriptContext::new("s", Timestamp::from_millis(0), 2);
        assert_eq!(ctx.estimated_remaining_ms(Some(150.0)), Some(300.0));
        assert_eq!(ctx.estimated_remaining_ms(None), None);
    }

    #[test]
    fn skip_recording_when_tree_id_missing() {
        let ctx = NavigationContext::default();
        assert!(ctx.should_skip_recording(None));
    }
}
