// crates/vpt-exec/src/zap.rs
// ============================================================================
// Module: Zap Analyzer
// Description: Correlates a channel-change action with the capture-monitor's
//              asynchronous zap detection and aggregates per-iteration
//              evidence (§4.7).
// Purpose: The one place that polls `last_zapping.json`, reads recent frame
//          analyses for motion, and folds subtitle/audio verification
//          results into a single per-iteration sample.
// Dependencies: vpt-core, crate::io, crate::verification, crate::context
// ============================================================================

//! ## Overview
//! Every step of the pipeline in §4.7 is best-effort and recorded as a
//! failed [`ZapOutcome`] rather than an `Err` — a stale marker, a timestamp
//! mismatch, or a poll timeout all mean "this iteration's zap wasn't
//! confirmed", not "the script should abort". Only a durable-storage write
//! failure propagates as [`VptError`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use tracing::warn;
use vpt_core::DetectionType;
use vpt_core::Verification;
use vpt_core::VptError;
use vpt_core::ZapIterationRecord;
use vpt_core::ZapIterationSample;
use vpt_core::ZapStatistics;
use vpt_core::ZappingRecord;
use vpt_core::ZappingStatus;

use crate::context::ExecutionContext;
use crate::io::newest_matching;
use crate::io::read_json;
use crate::verification::VerificationExecutor;

/// How long a `last_zapping.json` poll keeps retrying before giving up
/// (§4.7 step 3).
const POLL_TIMEOUT_SECONDS: u64 = 15;

/// Tolerance, in seconds, between an action's timestamp and the zapping
/// record's own `action_timestamp` (§4.7 step 3, `ZappingRecord::timestamp_matches`).
const TIMESTAMP_TOLERANCE_SECONDS: i64 = 10;

// ============================================================================
// SECTION: Request & outcome
// ============================================================================

/// Per-call parameters for [`ZapAnalyzer::analyze_iteration`].
pub struct ZapIterationRequest<'a> {
    /// The channel-change command that was just executed.
    pub action_command: &'a str,
    /// Zero-based iteration index, for recording.
    pub iteration_index: u32,
    /// Unix-second timestamp the action completed (`zap_start_timestamp`).
    pub action_completion_timestamp: i64,
    /// Unix-millisecond timestamp the iteration started.
    pub started_at_ms: i64,
    /// Subtitle verifications to run against the current frame, if any.
    pub subtitle_verifications: &'a [Verification],
    /// Audio verifications to run against the current frame, if any.
    pub audio_verifications: &'a [Verification],
}

/// The outcome of one [`ZapAnalyzer::analyze_iteration`] call (§4.7
/// "Analysis pipeline").
#[derive(Debug, Clone)]
pub struct ZapOutcome {
    /// Whether the iteration's analysis succeeded overall.
    pub success: bool,
    /// Error detail, when `success` is false.
    pub error: Option<String>,
    /// The folded per-iteration evidence, ready for [`ZapStatistics::record`].
    pub sample: ZapIterationSample,
    /// Milliseconds between the action and the capture-monitor's detection.
    pub time_since_action_ms: Option<u64>,
    /// Program name at the time of the zap, when resolved.
    pub program_name: Option<String>,
    /// Program start time, when resolved.
    pub program_start_time: Option<String>,
    /// Program end time, when resolved.
    pub program_end_time: Option<String>,
    /// Resolved channel number, when known.
    pub channel_number: Option<String>,
    /// Transition frame filenames saved by the capture-monitor.
    pub transition_images: Vec<String>,
    /// Pre-uploaded URLs for the transition frames.
    pub transition_image_urls: Vec<String>,
}

/// A single analysis-JSON frame, as written by the capture-monitor next to
/// each captured screenshot.
#[derive(Debug, Clone, Deserialize, Default)]
struct FrameAnalysis {
    /// True when the frame is a frozen repeat of the previous one.
    #[serde(default)]
    is_frozen: bool,
    /// True when the frame is a sustained black frame.
    #[serde(default)]
    is_blackscreen: bool,
}

// ============================================================================
// SECTION: ZapAnalyzer
// ============================================================================

/// Runs the zap-analysis pipeline after a channel-change action (§4.7).
pub struct ZapAnalyzer {
    /// Used to run the batched subtitle/audio verifications.
    verifications: VerificationExecutor,
}

impl ZapAnalyzer {
    /// Builds an analyzer over the device's verification executor.
    #[must_use]
    pub fn new(verifications: VerificationExecutor) -> Self {
        Self { verifications }
    }

    /// Runs one zap iteration's analysis pipeline (§4.7 "Analysis pipeline").
    ///
    /// # Errors
    ///
    /// Returns [`VptError`] only when the durable-storage write fails;
    /// stale markers, timestamp mismatches, and poll timeouts are reported
    /// via [`ZapOutcome::success`], not an `Err`.
    pub fn analyze_iteration(
        &self,
        ctx: &ExecutionContext<'_>,
        request: &ZapIterationRequest<'_>,
        stats: &mut ZapStatistics,
    ) -> Result<ZapOutcome, VptError> {
        let motion_detected = self.detect_motion(ctx);

        let mut outcome = ZapOutcome {
            success: true,
            error: None,
            sample: ZapIterationSample { motion_detected, ..ZapIterationSample::default() },
            time_since_action_ms: None,
            program_name: None,
            program_start_time: None,
            program_end_time: None,
            channel_number: None,
            transition_images: Vec::new(),
            transition_image_urls: Vec::new(),
        };

        if request.action_command.contains("chup") {
            match self.poll_zapping_marker(ctx, request.action_completion_timestamp) {
                Ok(Some(record)) => apply_zapping_record(&mut outcome, &record),
                Ok(None) => {}
                Err(err) => {
                    outcome.success = false;
                    outcome.error = Some(err.to_string());
                }
            }
        }

        if !request.subtitle_verifications.is_empty() || !request.audio_verifications.is_empty() {
            self.run_subtitle_and_audio(ctx, request, &mut outcome)?;
        }

        stats.record(&outcome.sample);
        self.record_iteration(ctx, request, &outcome)?;
        Ok(outcome)
    }

    /// Reads the last 3 analysis JSONs next to the device's captures and
    /// reports true iff any of them is neither frozen nor a blackscreen
    /// (§4.7 step 2).
    fn detect_motion(&self, ctx: &ExecutionContext<'_>) -> bool {
        let dir = ctx.metadata_dir();
        let Ok(paths) = newest_matching(Path::new(&dir), "_analysis.json", 3) else {
            return false;
        };
        paths.iter().any(|path| {
            read_json(path).ok().flatten().and_then(|value| serde_json::from_value::<FrameAnalysis>(value).ok()).is_some_and(
                |frame| !frame.is_frozen && !frame.is_blackscreen,
            )
        })
    }

    /// Polls `last_zapping.json` until it completes, goes stale, or times
    /// out (§4.7 step 3).
    fn poll_zapping_marker(&self, ctx: &ExecutionContext<'_>, action_timestamp: i64) -> Result<Option<ZappingRecord>, VptError> {
        let path = ctx.last_zapping_path();
        for elapsed in 0 .. POLL_TIMEOUT_SECONDS {
            let Some(record) = self.read_zapping_record(Path::new(&path))? else {
                thread::sleep(Duration::from_secs(1));
                continue;
            };
            match record.status {
                ZappingStatus::InProgress => {
                    if record.is_stale(action_timestamp + i64::try_from(elapsed).unwrap_or(i64::MAX)) {
                        return Err(VptError::ZapMarkerStale {
                            started_at_unix: record.started_at_unix,
                            timeout_seconds: record.timeout_seconds,
                        });
                    }
                    thread::sleep(Duration::from_secs(1));
                }
                ZappingStatus::Completed => {
                    if !record.timestamp_matches(action_timestamp) {
                        return Err(VptError::ZapTimestampMismatch {
                            action_ts: action_timestamp,
                            record_ts: record.action_timestamp,
                        });
                    }
                    return Ok(Some(record));
                }
            }
        }
        Err(VptError::ZapPollTimeout(POLL_TIMEOUT_SECONDS))
    }

    /// Reads and parses `last_zapping.json`, tolerating its absence.
    fn read_zapping_record(&self, path: &Path) -> Result<Option<ZappingRecord>, VptError> {
        match read_json(path)? {
            Some(value) => {
                serde_json::from_value(value).map(Some).map_err(|err| VptError::Serialization(err.to_string()))
            }
            None => Ok(None),
        }
    }

    /// Runs the requested subtitle/audio verifications and folds their
    /// outcome into `outcome.sample` (§4.7 step 4).
    fn run_subtitle_and_audio(
        &self,
        ctx: &ExecutionContext<'_>,
        request: &ZapIterationRequest<'_>,
        outcome: &mut ZapOutcome,
    ) -> Result<(), VptError> {
        if !request.subtitle_verifications.is_empty() {
            let batch = self.verifications.execute_verifications(ctx, request.subtitle_verifications, None, None, None)?;
            outcome.sample.subtitles_detected = batch.overall_success;
            if let Some(language) = batch.output_data.get("detected_language").and_then(|value| value.as_str()) {
                outcome.sample.detected_language = Some(language.to_string());
            }
            if !batch.overall_success {
                outcome.success = false;
                outcome.error.get_or_insert_with(|| "subtitle verification failed".to_string());
            }
        }
        if !request.audio_verifications.is_empty() {
            let batch = self.verifications.execute_verifications(ctx, request.audio_verifications, None, None, None)?;
            outcome.sample.audio_detected = batch.overall_success;
            if let Some(language) = batch.output_data.get("audio_language").and_then(|value| value.as_str()) {
                outcome.sample.audio_language = Some(language.to_string());
            }
            if !batch.overall_success {
                outcome.success = false;
                outcome.error.get_or_insert_with(|| "audio verification failed".to_string());
            }
        }
        Ok(())
    }

    /// Records one zap-iteration row, when a recorder is attached and
    /// recording is not suppressed.
    fn record_iteration(&self, ctx: &ExecutionContext<'_>, request: &ZapIterationRequest<'_>, outcome: &ZapOutcome) -> Result<(), VptError> {
        let Some(recorder) = ctx.recorder else {
            return Ok(());
        };
        if ctx.navigation.should_skip_recording(None) {
            debug!(iteration = request.iteration_index, "skipping zap iteration recording");
            return Ok(());
        }
        let languages: Vec<String> = outcome.sample.detected_language.iter().cloned().collect();
        let texts: Vec<String> = Vec::new();
        let detection_method = outcome.sample.detection_type.map(detection_type_tag);
        let completed_at = request.started_at_ms + duration_millis(outcome.sample.zap_duration_s);
        recorder
            .record_zap_iteration(&ZapIterationRecord {
                script_result_id: ctx.navigation.script_id.as_ref(),
                team_id: ctx.team_id,
                host_name: ctx.host_name,
                device_name: ctx.device_id,
                device_model: ctx.device_model,
                userinterface_name: ctx.userinterface_name,
                iteration_index: request.iteration_index,
                action_command: request.action_command,
                started_at: request.started_at_ms,
                completed_at,
                duration_seconds: outcome.sample.zap_duration_s.unwrap_or_default(),
                motion_detected: outcome.sample.motion_detected,
                subtitles_detected: outcome.sample.subtitles_detected,
                audio_detected: outcome.sample.audio_detected,
                zapping_detected: outcome.sample.zapping_detected,
                languages: &languages,
                texts: &texts,
                bf_duration_ms: outcome.sample.blackscreen_duration_ms,
                detection_method: detection_method.as_deref(),
                channel_name: outcome.sample.channel_name.as_deref(),
                channel_number: outcome.channel_number.as_deref(),
                program_name: outcome.program_name.as_deref(),
                program_start_time: outcome.program_start_time.as_deref(),
                program_end_time: outcome.program_end_time.as_deref(),
            })
            .map(|_id| ())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Lifts a completed [`ZappingRecord`]'s fields into `outcome` (§4.7 step 3,
/// "On success").
fn apply_zapping_record(outcome: &mut ZapOutcome, record: &ZappingRecord) {
    outcome.sample.zapping_detected = record.zapping_detected;
    outcome.sample.channel_name.clone_from(&record.channel_name);
    outcome.channel_number.clone_from(&record.channel_number);
    outcome.program_name.clone_from(&record.program_name);
    outcome.program_start_time.clone_from(&record.program_start_time);
    outcome.program_end_time.clone_from(&record.program_end_time);
    outcome.sample.blackscreen_duration_ms = record.blackscreen_duration_ms;
    outcome.sample.audio_silence_duration_ms = record.audio_silence_duration_ms;
    outcome.sample.detection_type = record.detection_type;
    #[allow(clippy::cast_precision_loss, reason = "zap durations are far below f64's exact-integer range")]
    {
        outcome.sample.zap_duration_s = record.total_zap_duration_ms.map(|ms| ms as f64 / 1000.0);
    }
    outcome.time_since_action_ms = record.time_since_action_ms;
    outcome.transition_images.clone_from(&record.transition_images);
    outcome.transition_image_urls.clone_from(&record.transition_image_urls);
}

/// Converts a zap duration in seconds to whole milliseconds, for recording.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "zap durations are small and non-negative")]
fn duration_millis(duration_s: Option<f64>) -> i64 {
    duration_s.map_or(0, |seconds| (seconds * 1000.0) as i64)
}

/// Maps a [`DetectionType`] to the wire string stored in execution records.
fn detection_type_tag(detection_type: DetectionType) -> String {
    match detection_type {
        DetectionType::Blackscreen => "blackscreen",
        DetectionType::Freeze => "freeze",
    }
    .to_string()
}

#[cfg(test)]
#[allow(clippy::missing_docs_in_private_items, reason = "test helpers are self-explanatory from their names")]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use vpt_controllers::ControllerRegistry;

    use super::*;

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
    fn motion_detected_when_a_recent_frame_is_neither_frozen_nor_black() -> Result<(), VptError> {
        let analyzer = ZapAnalyzer::new(VerificationExecutor::new(Arc::new(ControllerRegistry::new())));
        let team_id = vpt_core::TeamId::new("team");
        let host_name = vpt_core::HostName::new("host");
        let device_model = vpt_core::DeviceModel::new("model");
        let device_id = vpt_core::DeviceId::new("device");
        let ui_name = vpt_core::UserInterfaceName::new("ui");
        let mut navigation = vpt_core::NavigationContext::default();
        let dir = tempfile::tempdir().map_err(|err| VptError::Io(err.to_string()))?;
        let capture_root = dir.path().to_string_lossy().into_owned();
        let ctx = test_context(&team_id, &host_name, &device_model, &device_id, &ui_name, &capture_root, &mut navigation);

        crate::io::write_json_atomic(Path::new(&format!("{}/frame_1_analysis.json", ctx.metadata_dir())), &json!({"is_frozen": false, "is_blackscreen": false}))?;

        assert!(analyzer.detect_motion(&ctx));
        Ok(())
    }

    #[test]
    fn no_motion_when_recent_frames_are_all_frozen_or_black() -> Result<(), VptError> {
        let analyzer = ZapAnalyzer::new(VerificationExecutor::new(Arc::new(ControllerRegistry::new())));
        let team_id = vpt_core::TeamId::new("team");
        let host_name = vpt_core::HostName::new("host");
        let device_model = vpt_core::DeviceModel::new("model");
        let device_id = vpt_core::DeviceId::new("device");
        let ui_name = vpt_core::UserInterfaceName::new("ui");
        let mut navigation = vpt_core::NavigationContext::default();
        let dir = tempfile::tempdir().map_err(|err| VptError::Io(err.to_string()))?;
        let capture_root = dir.path().to_string_lossy().into_owned();
        let ctx = test_context(&team_id, &host_name, &device_model, &device_id, &ui_name, &capture_root, &mut navigation);

        crate::io::write_json_atomic(Path::new(&format!("{}/frame_1_analysis.json", ctx.metadata_dir())), &json!({"is_frozen": true, "is_blackscreen": false}))?;

        assert!(!analyzer.detect_motion(&ctx));
        Ok(())
    }

    #[test]
    fn non_chup_command_skips_zapping_poll() -> Result<(), VptError> {
        let analyzer = ZapAnalyzer::new(VerificationExecutor::new(Arc::new(ControllerRegistry::new())));
        let team_id = vpt_core::TeamId::new("team");
        let host_name = vpt_core::HostName::new("host");
        let device_model = vpt_core::DeviceModel::new("model");
        let device_id = vpt_core::DeviceId::new("device");
        let ui_name = vpt_core::UserInterfaceName::new("ui");
        let mut navigation = vpt_core::NavigationContext::default();
        let dir = tempfile::tempdir().map_err(|err| VptError::Io(err.to_string()))?;
        let capture_root = dir.path().to_string_lossy().into_owned();
        let ctx = test_context(&team_id, &host_name, &device_model, &device_id, &ui_name, &capture_root, &mut navigation);
        let mut stats = ZapStatistics::default();

        let request = ZapIterationRequest {
            action_command: "volume_up",
            iteration_index: 0,
            action_completion_timestamp: 1_700_000_000,
            started_at_ms: 1_700_000_000_000,
            subtitle_verifications: &[],
            audio_verifications: &[],
        };
        let outcome = analyzer.analyze_iteration(&ctx, &request, &mut stats)?;
        assert!(outcome.success);
        assert!(!outcome.sample.zapping_detected);
        assert_eq!(stats.total, 1);
        Ok(())
    }

    #[test]
    fn chup_with_no_marker_yet_times_out() -> Result<(), VptError> {
        let analyzer = ZapAnalyzer::new(VerificationExecutor::new(Arc::new(ControllerRegistry::new())));
        let team_id = vpt_core::TeamId::new("team");
        let host_name = vpt_core::HostName::new("host");
        let device_model = vpt_core::DeviceModel::new("model");
        let device_id = vpt_core::DeviceId::new("device");
        let ui_name = vpt_core::UserInterfaceName::new("ui");
        let mut navigation = vpt_core::NavigationContext::default();
        let dir = tempfile::tempdir().map_err(|err| VptError::Io(err.to_string()))?;
        let capture_root = dir.path().to_string_lossy().into_owned();
        let ctx = test_context(&team_id, &host_name, &device_model, &device_id, &ui_name, &capture_root, &mut navigation);

        let outcome = analyzer.read_zapping_record(Path::new(&ctx.last_zapping_path()))?;
        assert!(outcome.is_none());
        Ok(())
    }
}
