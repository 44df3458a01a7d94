// crates/vpt-exec/src/verification.rs
// ============================================================================
// Module: Verification Executor
// Description: Filters, dispatches, and records ordered verification
//              batches (§4.5).
// Purpose: Pure dispatch/state-machine/recording over already-implemented
//          VerificationController backends; the concrete image/text/audio
//          matching algorithms live in vpt-controllers, not here.
// Dependencies: vpt-core, vpt-controllers, crate::context
// ============================================================================

//! ## Overview
//! Mirrors [`crate::action::ActionExecutor`]'s shape but with a simpler state
//! machine: filter eligible verifications, execute each in order against the
//! controller registered for its `verification_type`, record the outcome,
//! and aggregate into one [`crate::action::BatchResult`]. `verify_node` is a
//! thin convenience wrapper that looks a node's verifications up from a
//! cached graph before delegating to `execute_verifications`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use serde_json::json;
use tracing::debug;
use vpt_controllers::ControllerRegistry;
use vpt_core::NodeExecutionRecord;
use vpt_core::NodeId;
use vpt_core::TreeId;
use vpt_core::Verification;
use vpt_core::VerificationConfig;
use vpt_core::VptError;

use crate::action::ActionResult;
use crate::action::BatchResult;
use crate::context::ExecutionContext;
use crate::screenshot::capture_screenshot;

// ============================================================================
// SECTION: VerificationExecutor
// ============================================================================

/// Dispatches verification batches via a shared [`ControllerRegistry`] (§4.5).
pub struct VerificationExecutor {
    /// The device's attached controllers, shared with the other executors.
    controllers: Arc<ControllerRegistry>,
}

impl VerificationExecutor {
    /// Builds an executor over an already-assembled controller registry.
    #[must_use]
    pub fn new(controllers: Arc<ControllerRegistry>) -> Self {
        Self { controllers }
    }

    /// Executes an ordered verification batch (§4.5 "Contract").
    ///
    /// `image_source_url`, when given, is resolved to a local path and
    /// passed through as every image-type verification's `source_image_path`.
    ///
    /// # Errors
    ///
    /// Returns [`VptError`] only when a database write that was not supposed
    /// to be skipped fails; verification failures are reported via
    /// [`BatchResult::overall_success`], not an `Err`.
    pub fn execute_verifications(
        &self,
        ctx: &ExecutionContext<'_>,
        verifications: &[Verification],
        image_source_url: Option<&str>,
        tree_id: Option<&TreeId>,
        node_id: Option<&NodeId>,
    ) -> Result<BatchResult, VptError> {
        let start = SystemTime::now();
        let mut batch = BatchResult::default();
        batch.before_action_screenshot = capture_screenshot(self.controllers.av());

        let eligible: Vec<&Verification> = verifications.iter().filter(|verification| verification.is_eligible()).collect();
        let mut all_passed = true;
        for verification in eligible {
            let result = self.run_one(ctx, verification, image_source_url);
            if !result.success {
                all_passed = false;
            }
            for (key, value) in &result.output_data {
                batch.output_data.insert(key.clone(), value.clone());
            }
            batch.action_screenshots.push(capture_screenshot(self.controllers.av()));
            batch.results.push(result);
        }
        batch.overall_success = all_passed;
        batch.execution_time_ms = elapsed_ms(start);
        batch.error = failure_summary(&batch.results);

        self.record_node_execution(ctx, tree_id, node_id, &batch)?;
        Ok(batch)
    }

    /// Looks up `node_id`'s verifications from `node_verifications` and runs
    /// them as one batch, recording against `node_id` (§4.5 `verify_node`).
    ///
    /// # Errors
    ///
    /// Returns [`VptError`] for the same reasons as
    /// [`Self::execute_verifications`].
    pub fn verify_node(
        &self,
        ctx: &ExecutionContext<'_>,
        tree_id: &TreeId,
        node_id: &NodeId,
        node_verifications: &[Verification],
    ) -> Result<BatchResult, VptError> {
        self.execute_verifications(ctx, node_verifications, None, Some(tree_id), Some(node_id))
    }

    /// Dispatches one verification to its registered controller.
    fn run_one(&self, ctx: &ExecutionContext<'_>, verification: &Verification, image_source_url: Option<&str>) -> ActionResult {
        let type_tag = verification_type_tag(verification.verification_type);
        let Some(controller) = self.controllers.verification(type_tag) else {
            return ActionResult {
                command: verification.command.clone(),
                success: false,
                message: None,
                error: Some(format!("no verification controller registered for '{type_tag}'")),
                output_data: BTreeMap::new(),
                iterations_run: 1,
            };
        };

        let config = VerificationConfig {
            command: &verification.command,
            params: &verification.params,
            verification_type: type_tag,
            team_id: ctx.team_id,
            userinterface_name: ctx.userinterface_name,
            source_image_path: image_source_url,
        };

        match controller.execute_verification(&config) {
            Ok(outcome) => {
                let mut output_data = BTreeMap::new();
                if let Some(url) = &outcome.overlay_url {
                    output_data.insert("overlay_url".to_string(), json!(url));
                }
                if let Some(text) = &outcome.extracted_text {
                    output_data.insert("extracted_text".to_string(), json!(text));
                }
                ActionResult {
                    command: verification.command.clone(),
                    success: outcome.success,
                    message: outcome.message,
                    error: outcome.error,
                    output_data,
                    iterations_run: 1,
                }
            }
            Err(err) => ActionResult {
                command: verification.command.clone(),
                success: false,
                message: None,
                error: Some(err.to_string()),
                output_data: BTreeMap::new(),
                iterations_run: 1,
            },
        }
    }

    /// Records one node-execution row, honoring the §7 `DBRecordingSkipped`
    /// policy (no recording without both `tree_id` and `node_id`).
    fn record_node_execution(
        &self,
        ctx: &ExecutionContext<'_>,
        tree_id: Option<&TreeId>,
        node_id: Option<&NodeId>,
        batch: &BatchResult,
    ) -> Result<(), VptError> {
        let (Some(recorder), Some(tree_id), Some(node_id)) = (ctx.recorder, tree_id, node_id) else {
            return Ok(());
        };
        if ctx.navigation.should_skip_recording(Some(tree_id)) {
            debug!(%tree_id, %node_id, "skipping node execution recording");
            return Ok(());
        }
        recorder.record_node_execution(&NodeExecutionRecord {
            team_id: ctx.team_id,
            tree_id,
            node_id,
            host_name: ctx.host_name,
            device_model: ctx.device_model,
            device_name: ctx.device_id,
            success: batch.overall_success,
            execution_time_ms: batch.execution_time_ms,
            message: batch.error.as_deref().unwrap_or("ok"),
            error_details: None,
            script_result_id: ctx.navigation.script_id.as_ref(),
            script_context: None,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps a [`vpt_core::VerificationType`] to the wire tag used as the
/// verification-controller registry key.
fn verification_type_tag(verification_type: vpt_core::VerificationType) -> &'static str {
    match verification_type {
        vpt_core::VerificationType::Image => "image",
        vpt_core::VerificationType::Text => "text",
        vpt_core::VerificationType::Audio => "audio",
        vpt_core::VerificationType::Video => "video",
        vpt_core::VerificationType::Adb => "adb",
        vpt_core::VerificationType::Appium => "appium",
    }
}

/// Builds the consolidated failure message naming every failed verification.
fn failure_summary(results: &[ActionResult]) -> Option<String> {
    let failed: Vec<&str> = results.iter().filter(|result| !result.success).map(|result| result.command.as_str()).collect();
    if failed.is_empty() { None } else { Some(format!("failed verifications: {}", failed.join(", "))) }
}

/// Returns milliseconds elapsed since `start`.
fn elapsed_ms(start: SystemTime) -> u64 {
    u64::try_from(SystemTime::now().duration_since(start).map(|d| d.as_millis()).unwrap_or_default()).unwrap_or(u64::MAX)
}
