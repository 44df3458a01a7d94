// crates/vpt-exec/src/action.rs
// ============================================================================
// Module: Action Executor
// Description: Dispatches ordered action batches to the controller owning
//              each command, honoring iteration, retry/failure chains, and
//              the post-action side-effect sequence (§4.4).
// Purpose: The single place that turns a declared Action list into
//          controller calls plus the bookkeeping every caller expects
//          (completion timestamp, frame metadata, DB row, nav context,
//          screenshot).
// Dependencies: vpt-core, vpt-controllers, crate::context, crate::io,
//               crate::exec_table
// ============================================================================

//! ## Overview
//! `ActionExecutor` is a thin, stateless-except-for-the-registry wrapper
//! around [`vpt_controllers::ControllerRegistry::resolve_route`]: resolve
//! the route once, delegate the call, adapt the result.
//! The iteration/retry/failure state machine and the post-action side
//! effects are this module's own addition over that shape, since the broker
//! has no notion of repeated attempts or filesystem side effects.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde_json::Value;
use serde_json::json;
use tracing::debug;
use tracing::warn;
use vpt_controllers::ActionRoute;
use vpt_controllers::ControllerRegistry;
use vpt_core::Action;
use vpt_core::ActionType;
use vpt_core::ControllerResult;
use vpt_core::EdgeExecutionRecord;
use vpt_core::EdgeId;
use vpt_core::TreeId;
use vpt_core::VptError;

use crate::context::ExecutionContext;
use crate::exec_table::ExecutionTable;
use crate::io::write_json_atomic;
use crate::screenshot::capture_screenshot;

// ============================================================================
// SECTION: Results
// ============================================================================

/// The outcome of dispatching a single [`Action`] once.
#[derive(Debug, Clone)]
pub struct ActionResult {
    /// The command that was dispatched.
    pub command: String,
    /// Whether the command succeeded.
    pub success: bool,
    /// Optional human-readable message.
    pub message: Option<String>,
    /// Optional error detail, when `success` is false.
    pub error: Option<String>,
    /// Output data produced by the command.
    pub output_data: BTreeMap<String, Value>,
    /// Number of iterations actually run before stopping.
    pub iterations_run: u32,
}

/// The outcome of one `execute_actions` call (§4.4 "Contract").
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// Whether the batch, taken as a whole, succeeded.
    pub overall_success: bool,
    /// Per-action results, in execution order (main, then retry, then failure).
    pub results: Vec<ActionResult>,
    /// Aggregated output data; later successful actions override earlier keys.
    pub output_data: BTreeMap<String, Value>,
    /// Wall-clock execution time of the whole batch, in milliseconds.
    pub execution_time_ms: u64,
    /// Screenshot taken after each action, aligned with `results`.
    pub action_screenshots: Vec<Option<String>>,
    /// Screenshot taken once before the first action of the batch.
    pub before_action_screenshot: Option<String>,
    /// A consolidated message listing failed action names, if any failed.
    pub error: Option<String>,
}

// ============================================================================
// SECTION: Request
// ============================================================================

/// Per-call parameters for [`ActionExecutor::execute_actions`], distinct from
/// the longer-lived environment carried in [`ExecutionContext`].
pub struct ActionBatchRequest<'a> {
    /// Main action list, executed first.
    pub actions: &'a [Action],
    /// Fallback actions run if the main list fails.
    pub retry_actions: &'a [Action],
    /// Fallback actions run if the retry list also fails.
    pub failure_actions: &'a [Action],
    /// Tree the owning edge belongs to, when this batch is a navigation
    /// transition's actions.
    pub tree_id: Option<&'a TreeId>,
    /// The edge being executed, when this batch is a navigation transition's
    /// actions.
    pub edge_id: Option<&'a EdgeId>,
    /// The action set identifier used, for recording.
    pub action_set_id: Option<&'a str>,
}

// ============================================================================
// SECTION: ActionExecutor
// ============================================================================

/// Dispatches action batches via a shared [`ControllerRegistry`] (§4.4).
pub struct ActionExecutor {
    /// The device's attached controllers, shared with the other executors.
    controllers: Arc<ControllerRegistry>,
    /// Process-wide table of in-flight route-driven executions.
    executions: ExecutionTable,
}

impl ActionExecutor {
    /// Builds an executor over an already-assembled controller registry.
    #[must_use]
    pub fn new(controllers: Arc<ControllerRegistry>) -> Self {
        Self { controllers, executions: ExecutionTable::new() }
    }

    /// Returns the process-wide async execution table (§4.4 "Async handle").
    #[must_use]
    pub const fn executions(&self) -> &ExecutionTable {
        &self.executions
    }

    /// Executes a full action batch: main list, then retry, then failure,
    /// per §4.4's chain rules, running the post-action side effects after
    /// every dispatched action.
    ///
    /// # Errors
    ///
    /// Returns [`VptError`] only when a database write that was not supposed
    /// to be skipped fails; controller-level failures are reported via
    /// [`BatchResult::overall_success`], not an `Err`.
    pub fn execute_actions(
        &self,
        ctx: &mut ExecutionContext<'_>,
        request: &ActionBatchRequest<'_>,
    ) -> Result<BatchResult, VptError> {
        let start = SystemTime::now();
        let mut batch = BatchResult::default();
        batch.before_action_screenshot = capture_screenshot(self.controllers.av());

        let main_ok = self.run_chain(ctx, request.actions, &mut batch)?;
        batch.overall_success = if main_ok {
            true
        } else if request.retry_actions.is_empty() {
            false
        } else {
            self.run_chain(ctx, request.retry_actions, &mut batch)?
        };
        if !batch.overall_success && !request.failure_actions.is_empty() {
            let _ = self.run_chain(ctx, request.failure_actions, &mut batch)?;
        }

        batch.execution_time_ms = elapsed_ms(start);
        batch.error = failure_summary(&batch.results);

        self.record_edge_execution(ctx, request, &batch)?;
        Ok(batch)
    }

    /// Runs one ordered action list, stopping at the first failure whose
    /// action does not set `continue_on_fail`. Returns whether the whole
    /// list succeeded.
    fn run_chain(
        &self,
        ctx: &mut ExecutionContext<'_>,
        actions: &[Action],
        batch: &mut BatchResult,
    ) -> Result<bool, VptError> {
        let mut chain_ok = true;
        for action in actions {
            let result = self.run_action(ctx, action)?;
            let success = result.success;
            for (key, value) in &result.output_data {
                batch.output_data.insert(key.clone(), value.clone());
            }
            batch.action_screenshots.push(capture_screenshot(self.controllers.av()));
            batch.results.push(result);
            if !success {
                chain_ok = false;
                if !action.continue_on_fail {
                    break;
                }
            }
        }
        Ok(chain_ok)
    }

    /// Runs a single action through its full iteration loop and post-action
    /// side effects (§4.4 "Iteration", "Post-action side effects").
    fn run_action(&self, ctx: &mut ExecutionContext<'_>, action: &Action) -> Result<ActionResult, VptError> {
        let params = action.flattened_params();
        let iterations = action.effective_iterator();
        let mut last: Option<ControllerResult> = None;
        let mut iterations_run = 0_u32;

        for iteration in 0 .. iterations {
            iterations_run = iteration + 1;
            let outcome = self.dispatch(ctx, action, &params);
            let controller_result = match outcome {
                Ok(result) => result,
                Err(err) => ControllerResult { success: false, error: Some(err.to_string()), ..ControllerResult::default() },
            };
            let succeeded = controller_result.success;
            last = Some(controller_result);
            self.run_post_action_side_effects(ctx, action, succeeded)?;
            if !succeeded {
                break;
            }
            if iteration + 1 < iterations {
                thread::sleep(Duration::from_millis(action.wait_time_ms));
            }
        }

        let controller_result = last.unwrap_or_default();
        Ok(ActionResult {
            command: action.command.clone(),
            success: controller_result.success,
            message: controller_result.message,
            error: controller_result.error,
            output_data: controller_result.output_data,
            iterations_run,
        })
    }

    /// Routes and dispatches a single command through the controller
    /// registry (§4.4 "Dispatch").
    fn dispatch(
        &self,
        ctx: &ExecutionContext<'_>,
        action: &Action,
        params: &BTreeMap<String, Value>,
    ) -> Result<ControllerResult, VptError> {
        let action_type_tag = action.action_type.map(action_type_tag);
        let route = self.controllers.resolve_route(&action.command, action_type_tag.as_deref())?;
        match route {
            ActionRoute::Remote => {
                let controller = self.controllers.remote().ok_or_else(|| missing("remote"))?;
                controller.execute_command(&action.command, params)
            }
            ActionRoute::Web => {
                let controller = self.controllers.web().ok_or_else(|| missing("web"))?;
                let adjusted = rename_element_id_to_selector(params);
                controller.execute_command(&action.command, &adjusted)
            }
            ActionRoute::Desktop => {
                let controller = self.controllers.desktop().ok_or_else(|| missing("desktop"))?;
                controller.execute_command(&action.command, params)
            }
            ActionRoute::Power => {
                let controller = self.controllers.power().ok_or_else(|| missing("power"))?;
                let success = controller.execute_command(&action.command, params)?;
                Ok(ControllerResult { success, ..ControllerResult::default() })
            }
            ActionRoute::Verification(verification_type) => {
                self.dispatch_as_verification(ctx, action, params, &verification_type)
            }
            ActionRoute::Av => self.dispatch_av(&action.command),
            ActionRoute::StandardBlock => self.controllers.block().execute_command(&action.command, params),
        }
    }

    /// Dispatches an explicit `take_screenshot`/`take_video_for_report`
    /// command straight to the attached av controller.
    fn dispatch_av(&self, command: &str) -> Result<ControllerResult, VptError> {
        let controller = self.controllers.av().ok_or_else(|| missing("av"))?;
        let path = if command == "take_video_for_report" {
            controller.take_video_for_report(10.0, 0.0)?
        } else {
            controller.take_screenshot()?
        };
        let mut output_data = BTreeMap::new();
        output_data.insert("path".to_string(), json!(path));
        Ok(ControllerResult { success: true, output_data, ..ControllerResult::default() })
    }

    /// Delegates a `verification`-typed action to a single-shot verification
    /// call and adapts its outcome to a [`ControllerResult`] (§4.4 Dispatch,
    /// last-but-one bullet).
    fn dispatch_as_verification(
        &self,
        ctx: &ExecutionContext<'_>,
        action: &Action,
        params: &BTreeMap<String, Value>,
        verification_type: &str,
    ) -> Result<ControllerResult, VptError> {
        let controller = self.controllers.verification(verification_type).ok_or_else(|| {
            VptError::Controller(format!("no verification controller registered for '{verification_type}'"))
        })?;
        let config = vpt_core::VerificationConfig {
            command: &action.command,
            params,
            verification_type,
            team_id: ctx.team_id,
            userinterface_name: ctx.userinterface_name,
            source_image_path: None,
        };
        let outcome = controller.execute_verification(&config)?;
        let mut output_data = BTreeMap::new();
        if let Some(text) = &outcome.extracted_text {
            output_data.insert("extracted_text".to_string(), json!(text));
        }
        Ok(ControllerResult {
            success: outcome.success,
            message: outcome.message,
            error: outcome.error,
            output_data,
        })
    }

    /// Runs the §4.4 "Post-action side effects" sequence after one dispatched
    /// action (not one iteration of a batch — this runs per iteration too,
    /// since each iteration is itself a complete action attempt).
    fn run_post_action_side_effects(
        &self,
        ctx: &mut ExecutionContext<'_>,
        action: &Action,
        success: bool,
    ) -> Result<(), VptError> {
        let completion_timestamp = now_unix_millis();

        let record = json!({
            "command": action.command,
            "success": success,
            "timestamp": completion_timestamp,
        });
        let frame_metadata_path = format!("{}/frame_metadata.json", ctx.metadata_dir());
        if let Err(err) = write_json_atomic(std::path::Path::new(&frame_metadata_path), &record) {
            warn!(error = %err, "failed to write frame metadata");
        }
        if let Err(err) = write_json_atomic(std::path::Path::new(&ctx.last_action_path()), &record) {
            warn!(error = %err, "failed to write last_action.json");
        }

        thread::sleep(Duration::from_millis(action.wait_time_ms));

        ctx.navigation.last_action_executed = Some(action.command.clone());
        ctx.navigation.last_action_timestamp = Some(vpt_core::Timestamp::from_millis(completion_timestamp));

        let _ = capture_screenshot(self.controllers.av());
        Ok(())
    }

    /// Records one edge-execution row summarizing the whole batch, honoring
    /// the §7 `DBRecordingSkipped` policy.
    fn record_edge_execution(
        &self,
        ctx: &ExecutionContext<'_>,
        request: &ActionBatchRequest<'_>,
        batch: &BatchResult,
    ) -> Result<(), VptError> {
        let (Some(recorder), Some(tree_id), Some(edge_id)) = (ctx.recorder, request.tree_id, request.edge_id) else {
            return Ok(());
        };
        if ctx.navigation.should_skip_recording(Some(tree_id)) {
            debug!(%tree_id, %edge_id, "skipping edge execution recording");
            return Ok(());
        }
        recorder.record_edge_execution(&EdgeExecutionRecord {
            team_id: ctx.team_id,
            tree_id,
            edge_id,
            host_name: ctx.host_name,
            device_model: ctx.device_model,
            device_name: ctx.device_id,
            success: batch.overall_success,
            execution_time_ms: batch.execution_time_ms,
            message: batch.error.as_deref().unwrap_or("ok"),
            error_details: None,
            script_result_id: ctx.navigation.script_id.as_ref(),
            script_context: None,
            action_set_id: request.action_set_id,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps an [`ActionType`] to the wire tag `resolve_route` understands.
fn action_type_tag(action_type: ActionType) -> String {
    match action_type {
        ActionType::Remote => "remote",
        ActionType::Web => "web",
        ActionType::Desktop => "desktop",
        ActionType::Power => "power",
        ActionType::Verification => "verification",
        ActionType::StandardBlock => "standard_block",
    }
    .to_string()
}

/// Builds the `VptError::Controller` raised when a route resolves to a slot
/// with no attached controller.
fn missing(role: &str) -> VptError {
    VptError::Controller(format!("no {role} controller attached"))
}

/// Renames `element_id` to `selector` when `selector` is absent (§4.4
/// Dispatch, `web` bullet).
fn rename_element_id_to_selector(params: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    let mut adjusted = params.clone();
    if !adjusted.contains_key("selector")
        && let Some(element_id) = adjusted.remove("element_id")
    {
        adjusted.insert("selector".to_string(), element_id);
    }
    adjusted
}

/// Builds the consolidated failure message naming every failed action.
fn failure_summary(results: &[ActionResult]) -> Option<String> {
    let failed: Vec<&str> = results.iter().filter(|result| !result.success).map(|result| result.command.as_str()).collect();
    if failed.is_empty() { None } else { Some(format!("failed actions: {}", failed.join(", "))) }
}

/// Returns the current unix-millisecond timestamp.
fn now_unix_millis() -> i64 {
    i64::try_from(SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or_default())
        .unwrap_or(i64::MAX)
}

/// Returns milliseconds elapsed since `start`.
fn elapsed_ms(start: SystemTime) -> u64 {
    u64::try_from(SystemTime::now().duration_since(start).map(|d| d.as_millis()).unwrap_or_default()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::missing_docs_in_private_items, reason = "test helpers are self-explanatory from their names")]
mod tests {
    use vpt_controllers::ClosureActionController;
    use vpt_core::ControllerResult;

    use super::*;

    fn sample_action(command: &str, continue_on_fail: bool) -> Action {
        Action {
            command: command.to_string(),
            action_type: None,
            params: BTreeMap::new(),
            iterator: 1,
            wait_time_ms: 0,
            continue_on_fail,
        }
    }

    fn registry_with_remote(ok_commands: &[&str]) -> Arc<ControllerRegistry> {
        let ok: std::collections::BTreeSet<String> = ok_commands.iter().map(|c| (*c).to_string()).collect();
        Arc::new(ControllerRegistry::new().with_remote(ClosureActionController::new(ok_commands.iter().map(|c| (*c).to_string()), move |command, _params| {
            ControllerResult { success: ok.contains(command), ..ControllerResult::default() }
        })))
    }

    fn test_context<'a>(
        team_id: &'a vpt_core::TeamId,
        host_name: &'a vpt_core::HostName,
        device_model: &'a vpt_core::DeviceModel,
        device_id: &'a vpt_core::DeviceId,
        ui_name: &'a vpt_core::UserInterfaceName,
        capture_root: &'a str,
        navigation: &'a mut vpt_core::NavigationContext,
    ) -> ExecutionContext<'a> {
        ExecutionContext {
            team_id,
            host_name,
            device_model,
            device_id,
            userinterface_name: ui_name,
            capture_root,
            recorder: None,
            navigation,
        }
    }

    #[test]
    fn successful_batch_reports_overall_success() -> Result<(), VptError> {
        let registry = registry_with_remote(&["press"]);
        let executor = ActionExecutor::new(registry);
        let team_id = vpt_core::TeamId::new("team");
        let host_name = vpt_core::HostName::new("host");
        let device_model = vpt_core::DeviceModel::new("model");
        let device_id = vpt_core::DeviceId::new("device");
        let ui_name = vpt_core::UserInterfaceName::new("ui");
        let mut navigation = vpt_core::NavigationContext::default();
        let dir = tempfile::tempdir().map_err(|err| VptError::Io(err.to_string()))?;
        let capture_root = dir.path().to_string_lossy().into_owned();
        let mut ctx = test_context(&team_id, &host_name, &device_model, &device_id, &ui_name, &capture_root, &mut navigation);

        let actions = vec![sample_action("press", false)];
        let request = ActionBatchRequest { actions: &actions, retry_actions: &[], failure_actions: &[], tree_id: None, edge_id: None, action_set_id: None };
        let batch = executor.execute_actions(&mut ctx, &request)?;
        assert!(batch.overall_success);
        assert_eq!(batch.results.len(), 1);
        assert_eq!(ctx.navigation.last_action_executed.as_deref(), Some("press"));
        Ok(())
    }

    #[test]
    fn main_failure_falls_through_to_retry_list() -> Result<(), VptError> {
        let registry = registry_with_remote(&["retry_press"]);
        let executor = ActionExecutor::new(registry);
        let team_id = vpt_core::TeamId::new("team");
        let host_name = vpt_core::HostName::new("host");
        let device_model = vpt_core::DeviceModel::new("model");
        let device_id = vpt_core::DeviceId::new("device");
        let ui_name = vpt_core::UserInterfaceName::new("ui");
        let mut navigation = vpt_core::NavigationContext::default();
        let dir = tempfile::tempdir().map_err(|err| VptError::Io(err.to_string()))?;
        let capture_root = dir.path().to_string_lossy().into_owned();
        let mut ctx = test_context(&team_id, &host_name, &device_model, &device_id, &ui_name, &capture_root, &mut navigation);

        let actions = vec![sample_action("press", false)];
        let retry_actions = vec![sample_action("retry_press", false)];
        let request = ActionBatchRequest { actions: &actions, retry_actions: &retry_actions, failure_actions: &[], tree_id: None, edge_id: None, action_set_id: None };
        let batch = executor.execute_actions(&mut ctx, &request)?;
        assert!(batch.overall_success);
        assert_eq!(batch.results.len(), 2);
        Ok(())
    }

    #[test]
    fn continue_on_fail_keeps_running_the_main_list() -> Result<(), VptError> {
        let registry = registry_with_remote(&["second"]);
        let executor = ActionExecutor::new(registry);
        let team_id = vpt_core::TeamId::new("team");
        let host_name = vpt_core::HostName::new("host");
        let device_model = vpt_core::DeviceModel::new("model");
        let device_id = vpt_core::DeviceId::new("device");
        let ui_name = vpt_core::UserInterfaceName::new("ui");
        let mut navigation = vpt_core::NavigationContext::default();
        let dir = tempfile::tempdir().map_err(|err| VptError::Io(err.to_string()))?;
        let capture_root = dir.path().to_string_lossy().into_owned();
        let mut ctx = test_context(&team_id, &host_name, &device_model, &device_id, &ui_name, &capture_root, &mut navigation);

        let actions = vec![sample_action("first", true), sample_action("second", false)];
        let request = ActionBatchRequest { actions: &actions, retry_actions: &[], failure_actions: &[], tree_id: None, edge_id: None, action_set_id: None };
        let batch = executor.execute_actions(&mut ctx, &request)?;
        assert_eq!(batch.results.len(), 2);
        assert!(!batch.results[0].success);
        assert!(batch.results[1].success);
        assert!(!batch.overall_success, "an unrecoverable failure in the main list, even continue_on_fail, is not full success");
        Ok(())
    }

    #[test]
    fn rename_prefers_existing_selector() {
        let mut params = BTreeMap::new();
        params.insert("selector".to_string(), json!("#existing"));
        params.insert("element_id".to_string(), json!("ignored"));
        let adjusted = rename_element_id_to_selector(&params);
        assert_eq!(adjusted.get("selector"), Some(&json!("#existing")));
    }

    #[test]
    fn rename_moves_element_id_when_selector_absent() {
        let mut params = BTreeMap::new();
        params.insert("element_id".to_string(), json!("#target"));
        let adjusted = rename_element_id_to_selector(&params);
        assert_eq!(adjusted.get("selector"), Some(&json!("#target")));
        assert!(!adjusted.contains_key("element_id"));
    }
}
