// crates/vpt-core/src/interfaces.rs
// ============================================================================
// Module: External Collaborator Interfaces
// Description: Trait boundaries for durable storage, object storage, and
//              device-attached controllers (§6 External Interfaces).
// Purpose: Keep the executors backend-agnostic; concrete implementations
//          live in vpt-store-sqlite, vpt-broker, and vpt-controllers.
// Dependencies: serde_json, crate::model, crate::identifiers, crate::zap,
//               crate::errors
// ============================================================================

//! ## Overview
//! Each external collaborator named in §6 gets one narrow trait here.
//! Executors depend only on these traits, never on a concrete backend, so
//! swapping SQLite for another store or R2 for a local filesystem stub
//! requires no executor changes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::Value;

use crate::errors::VptError;
use crate::identifiers::DeviceId;
use crate::identifiers::DeviceModel;
use crate::identifiers::EdgeId;
use crate::identifiers::HostName;
use crate::identifiers::NodeId;
use crate::identifiers::ScriptResultId;
use crate::identifiers::TeamId;
use crate::identifiers::TreeId;
use crate::identifiers::UserInterfaceName;
use crate::identifiers::ZapResultId;
use crate::model::Tree;

// ============================================================================
// SECTION: Tree Source (durable storage, read path)
// ============================================================================

/// Read-only access to navigation trees (§6 "Navigation tree source").
pub trait TreeSource {
    /// Fetches every tree belonging to a named user interface for a team.
    ///
    /// # Errors
    ///
    /// Returns [`VptError`] when the backing store is unreachable or the
    /// payload cannot be decoded.
    fn fetch_userinterface_trees(
        &self,
        name: &UserInterfaceName,
        team_id: &TeamId,
    ) -> Result<Vec<Tree>, VptError>;
}

// ============================================================================
// SECTION: Execution Recorder (durable storage, write path)
// ============================================================================

/// Parameters for [`ExecutionRecorder::record_edge_execution`].
#[derive(Debug, Clone)]
pub struct EdgeExecutionRecord<'a> {
    /// Tenant scope.
    pub team_id: &'a TeamId,
    /// Tree the edge belongs to.
    pub tree_id: &'a TreeId,
    /// The edge that was executed.
    pub edge_id: &'a EdgeId,
    /// Host running the script.
    pub host_name: &'a HostName,
    /// Device model under test.
    pub device_model: &'a DeviceModel,
    /// Device identifier under test.
    pub device_name: &'a DeviceId,
    /// Whether the edge execution succeeded.
    pub success: bool,
    /// Wall-clock execution time, in milliseconds.
    pub execution_time_ms: u64,
    /// Human-readable summary message.
    pub message: &'a str,
    /// Optional structured error detail.
    pub error_details: Option<&'a Value>,
    /// Owning script execution row, when recorded as part of a script.
    pub script_result_id: Option<&'a ScriptResultId>,
    /// Arbitrary script-context metadata to attach.
    pub script_context: Option<&'a Value>,
    /// The action set used for this execution.
    pub action_set_id: Option<&'a str>,
}

/// Parameters for [`ExecutionRecorder::record_node_execution`].
#[derive(Debug, Clone)]
pub struct NodeExecutionRecord<'a> {
    /// Tenant scope.
    pub team_id: &'a TeamId,
    /// Tree the node belongs to.
    pub tree_id: &'a TreeId,
    /// The node that was verified.
    pub node_id: &'a NodeId,
    /// Host running the script.
    pub host_name: &'a HostName,
    /// Device model under test.
    pub device_model: &'a DeviceModel,
    /// Device identifier under test.
    pub device_name: &'a DeviceId,
    /// Whether verification succeeded.
    pub success: bool,
    /// Wall-clock execution time, in milliseconds.
    pub execution_time_ms: u64,
    /// Human-readable summary message.
    pub message: &'a str,
    /// Optional structured error detail.
    pub error_details: Option<&'a Value>,
    /// Owning script execution row, when recorded as part of a script.
    pub script_result_id: Option<&'a ScriptResultId>,
    /// Arbitrary script-context metadata to attach.
    pub script_context: Option<&'a Value>,
}

/// Parameters for [`ExecutionRecorder::record_zap_iteration`].
#[derive(Debug, Clone)]
pub struct ZapIterationRecord<'a> {
    /// Owning script execution row, when recorded as part of a script.
    pub script_result_id: Option<&'a ScriptResultId>,
    /// Tenant scope.
    pub team_id: &'a TeamId,
    /// Host running the script.
    pub host_name: &'a HostName,
    /// Device identifier under test.
    pub device_name: &'a DeviceId,
    /// Device model under test.
    pub device_model: &'a DeviceModel,
    /// The user interface under test.
    pub userinterface_name: &'a UserInterfaceName,
    /// Zero-based iteration index.
    pub iteration_index: u32,
    /// The channel-change command that was executed.
    pub action_command: &'a str,
    /// Iteration start time, unix milliseconds.
    pub started_at: i64,
    /// Iteration completion time, unix milliseconds.
    pub completed_at: i64,
    /// Iteration duration in seconds.
    pub duration_seconds: f64,
    /// Whether motion was detected.
    pub motion_detected: bool,
    /// Whether subtitles were detected.
    pub subtitles_detected: bool,
    /// Whether audio/speech was detected.
    pub audio_detected: bool,
    /// Whether a zap event was detected.
    pub zapping_detected: bool,
    /// Subtitle languages detected, if any.
    pub languages: &'a [String],
    /// Extracted subtitle/OCR texts, if any.
    pub texts: &'a [String],
    /// Blackscreen/freeze duration in milliseconds, if known.
    pub bf_duration_ms: Option<u64>,
    /// Detection method name (`"blackscreen"` / `"freeze"`), if known.
    pub detection_method: Option<&'a str>,
    /// Resolved channel name, if known.
    pub channel_name: Option<&'a str>,
    /// Resolved channel number, if known.
    pub channel_number: Option<&'a str>,
    /// Program name at zap time, if known.
    pub program_name: Option<&'a str>,
    /// Program start time, if known.
    pub program_start_time: Option<&'a str>,
    /// Program end time, if known.
    pub program_end_time: Option<&'a str>,
}

/// Write-path access to script/edge/node/zap execution records (§6
/// "Execution records").
pub trait ExecutionRecorder {
    /// Starts a new script execution row and returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`VptError`] when the record cannot be written.
    fn record_script_execution_start(
        &self,
        team_id: &TeamId,
        script_name: &str,
        script_type: &str,
        userinterface_name: Option<&UserInterfaceName>,
        host_name: &HostName,
        device_name: &DeviceId,
        metadata: Option<&BTreeMap<String, Value>>,
    ) -> Result<ScriptResultId, VptError>;

    /// Finalizes a script execution row with its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`VptError`] when the update cannot be written.
    #[allow(clippy::too_many_arguments, reason = "mirrors the wire contract in SPEC_FULL §6")]
    fn update_script_execution_result(
        &self,
        script_result_id: &ScriptResultId,
        success: bool,
        execution_time_ms: Option<u64>,
        html_report_url: Option<&str>,
        logs_url: Option<&str>,
        error_msg: Option<&str>,
        metadata: Option<&BTreeMap<String, Value>>,
    ) -> Result<(), VptError>;

    /// Records one edge-execution row.
    ///
    /// # Errors
    ///
    /// Returns [`VptError`] when the record cannot be written.
    fn record_edge_execution(&self, record: &EdgeExecutionRecord<'_>) -> Result<(), VptError>;

    /// Records one node-execution (verification) row.
    ///
    /// # Errors
    ///
    /// Returns [`VptError`] when the record cannot be written.
    fn record_node_execution(&self, record: &NodeExecutionRecord<'_>) -> Result<(), VptError>;

    /// Records one zap-iteration row and returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`VptError`] when the record cannot be written.
    fn record_zap_iteration(
        &self,
        record: &ZapIterationRecord<'_>,
    ) -> Result<ZapResultId, VptError>;
}

// ============================================================================
// SECTION: Object Store
// ============================================================================

/// A single file to upload, paired with its destination.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Local filesystem path of the file to upload.
    pub local_path: String,
    /// Destination key in the object store.
    pub remote_path: String,
    /// Optional MIME content type.
    pub content_type: Option<String>,
}

/// The outcome of a batch upload request.
#[derive(Debug, Clone, Default)]
pub struct UploadOutcome {
    /// `(local_path, public_url)` pairs for files that uploaded successfully.
    pub uploaded_files: Vec<(String, String)>,
    /// Local paths that failed to upload.
    pub failed_uploads: Vec<String>,
}

/// R2-compatible object storage (§6 "Object storage").
pub trait ObjectStore {
    /// Uploads a batch of files, returning per-file outcomes.
    ///
    /// # Errors
    ///
    /// Returns [`VptError`] only for errors that abort the whole batch
    /// (e.g. the store is unreachable); per-file failures are reported in
    /// [`UploadOutcome::failed_uploads`].
    fn upload_files(&self, requests: &[UploadRequest]) -> Result<UploadOutcome, VptError>;

    /// Downloads a single remote file to a local path.
    ///
    /// # Errors
    ///
    /// Returns [`VptError`] when the download fails.
    fn download_file(&self, remote_path: &str, local_path: &str) -> Result<(), VptError>;

    /// Returns the public URL for a remote path.
    fn get_public_url(&self, remote_path: &str) -> String;
}

// ============================================================================
// SECTION: Device-Attached Controllers
// ============================================================================

/// The outcome of a single controller command.
#[derive(Debug, Clone, Default)]
pub struct ControllerResult {
    /// Whether the command succeeded.
    pub success: bool,
    /// Optional human-readable message.
    pub message: Option<String>,
    /// Optional error detail, when `success` is false.
    pub error: Option<String>,
    /// Output data produced by the command, merged into the batch's
    /// aggregated `output_data` map.
    pub output_data: BTreeMap<String, Value>,
}

/// An action-executing controller (remote/web/desktop/power) (§6, §9
/// "Dynamic per-controller routing").
pub trait ActionController {
    /// Executes a single command with flattened parameters.
    ///
    /// # Errors
    ///
    /// Returns [`VptError::Controller`] when the controller itself cannot be
    /// reached; domain-level failures are reported via
    /// [`ControllerResult::success`] being `false`, not an `Err`.
    fn execute_command(
        &self,
        command: &str,
        params: &BTreeMap<String, Value>,
    ) -> Result<ControllerResult, VptError>;

    /// Returns the set of command names this controller owns.
    fn available_actions(&self) -> Vec<String>;
}

/// The outcome of a single verification command.
#[derive(Debug, Clone, Default)]
pub struct VerificationOutcome {
    /// Whether the verification passed.
    pub success: bool,
    /// Optional human-readable message.
    pub message: Option<String>,
    /// Optional error detail.
    pub error: Option<String>,
    /// Structured detail fields (score, confidence, etc.).
    pub details: BTreeMap<String, Value>,
    /// Artifact URL for the captured source image, if produced.
    pub source_url: Option<String>,
    /// Artifact URL for the reference image, if produced.
    pub reference_url: Option<String>,
    /// Artifact URL for the overlay diff image, if produced.
    pub overlay_url: Option<String>,
    /// Extracted OCR text, for text verifications.
    pub extracted_text: Option<String>,
    /// The text that was searched for, for text verifications.
    pub searched_text: Option<String>,
    /// Detected language hint, when available.
    pub detected_language: Option<String>,
}

/// Configuration passed to a verification controller for a single check.
#[derive(Debug, Clone)]
pub struct VerificationConfig<'a> {
    /// The controller command name.
    pub command: &'a str,
    /// Flattened parameters.
    pub params: &'a BTreeMap<String, Value>,
    /// The verification's declared type, informational for multi-type
    /// controllers.
    pub verification_type: &'a str,
    /// Tenant scope.
    pub team_id: &'a TeamId,
    /// The user interface under test.
    pub userinterface_name: &'a UserInterfaceName,
    /// A resolved local path, when `image_source_url` was provided.
    pub source_image_path: Option<&'a str>,
}

/// A verification-executing controller (image/text/audio/video/adb/appium).
pub trait VerificationController {
    /// Executes a single verification.
    ///
    /// # Errors
    ///
    /// Returns [`VptError::Controller`] when the controller itself cannot be
    /// reached.
    fn execute_verification(
        &self,
        config: &VerificationConfig<'_>,
    ) -> Result<VerificationOutcome, VptError>;

    /// Returns the set of command names this controller owns.
    fn available_verifications(&self) -> Vec<String>;
}

/// The audio/video capture controller.
pub trait AvController {
    /// Captures a screenshot and returns its local path.
    ///
    /// # Errors
    ///
    /// Returns [`VptError`] when capture fails.
    fn take_screenshot(&self) -> Result<String, VptError>;

    /// Captures a short video clip for a report and returns its URL.
    ///
    /// # Errors
    ///
    /// Returns [`VptError`] when capture fails.
    fn take_video_for_report(&self, duration_s: f64, start_s: f64) -> Result<String, VptError>;

    /// Returns the device's video capture root path.
    fn video_capture_path(&self) -> String;
}

/// The power-control controller.
pub trait PowerController {
    /// Executes a power command, returning a plain success flag (§6 "Power
    /// controller").
    ///
    /// # Errors
    ///
    /// Returns [`VptError::Controller`] when the controller cannot be reached.
    fn execute_command(
        &self,
        command: &str,
        params: &BTreeMap<String, Value>,
    ) -> Result<bool, VptError>;
}

#[cfg(test)]
mod tests {
    use super::ControllerResult;

    #[test]
    fn controller_result_defaults_to_failure() {
        let result = ControllerResult::default();
        assert!(!result.success);
        assert!(result.output_data.is_empty());
    }
}
