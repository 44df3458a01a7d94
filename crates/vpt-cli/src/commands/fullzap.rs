// crates/vpt-cli/src/commands/fullzap.rs
// ============================================================================
// Module: Fullzap Command
// Description: Repeatedly dispatches a channel-change action and folds the
//              zap-analysis pipeline's evidence into one run summary (§6
//              `fullzap --action <name> --audio-analysis`, §4.7).
// Purpose: Thin wrapper turning `DeviceHandle::run_zap_iteration` into a
//          `CommandOutcome`.
// Dependencies: vpt-exec, vpt-core
// ============================================================================

use vpt_core::Verification;
use vpt_core::VerificationType;
use vpt_core::VptError;
use vpt_core::ZapStatistics;
use vpt_exec::DeviceHandle;
use vpt_exec::ZapActionRequest;

use crate::commands::CommandOutcome;
use crate::report::ScriptSummary;

/// Runs the `fullzap` script for `max_iteration` channel-change iterations
/// (§6). When `audio_analysis` is set, an `audio` verification is run
/// alongside the subtitle pass on every iteration.
///
/// # Errors
///
/// Returns [`VptError`] only when a durable-storage write fails; a failed
/// or unconfirmed iteration is folded into the run's overall success via
/// [`CommandOutcome::success`], not an `Err`.
pub fn run(
    device: &mut DeviceHandle,
    action_command: &str,
    max_iteration: u32,
    audio_analysis: bool,
) -> Result<CommandOutcome, VptError> {
    // An empty `text` target makes the heuristic recognizer report whatever
    // it reads, rather than requiring a specific string match.
    let mut subtitle_params = std::collections::BTreeMap::new();
    subtitle_params.insert("text".to_string(), serde_json::Value::String(String::new()));
    let subtitle_verifications =
        vec![Verification { verification_type: VerificationType::Text, command: "detect_subtitles".to_string(), params: subtitle_params }];
    let audio_verifications = if audio_analysis {
        vec![Verification { verification_type: VerificationType::Audio, command: "detect_audio".to_string(), params: std::collections::BTreeMap::new() }]
    } else {
        Vec::new()
    };

    let mut stats = ZapStatistics::default();
    let mut steps = Vec::with_capacity(max_iteration as usize);
    let mut all_succeeded = true;
    let mut last_error: Option<String> = None;

    for iteration_index in 0 .. max_iteration {
        let request = ZapActionRequest {
            action_command,
            iteration_index,
            subtitle_verifications: &subtitle_verifications,
            audio_verifications: &audio_verifications,
        };
        let (_batch, outcome) = device.run_zap_iteration(&request, &mut stats)?;
        steps.push(format!(
            "iteration {iteration_index}: zapping_detected={} motion={} success={}",
            outcome.sample.zapping_detected, outcome.sample.motion_detected, outcome.success
        ));
        if !outcome.success {
            all_succeeded = false;
            last_error = outcome.error.clone();
        }
    }

    let message = last_error.clone().unwrap_or_else(|| {
        format!("{}/{max_iteration} iterations confirmed a zap", stats.zapping_detected_count)
    });

    Ok(CommandOutcome {
        success: all_succeeded,
        error_msg: last_error,
        summary: ScriptSummary { script_name: "fullzap".to_string(), success: all_succeeded, message, steps },
    })
}

#[cfg(test)]
#[allow(clippy::missing_docs_in_private_items, reason = "test helpers are self-explanatory from their names")]
mod tests {
    use std::sync::Arc;

    use vpt_core::DeviceId;
    use vpt_core::DeviceModel;
    use vpt_core::HostName;
    use vpt_core::Tree;
    use vpt_core::TeamId;
    use vpt_core::TreeSource;
    use vpt_core::UserInterfaceName;
    use vpt_controllers::ControllerRegistry;
    use vpt_graph::GraphCache;

    use super::*;

    struct EmptyTreeSource;
    impl TreeSource for EmptyTreeSource {
        fn fetch_userinterface_trees(&self, _name: &UserInterfaceName, _team_id: &TeamId) -> Result<Vec<Tree>, VptError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn fullzap_runs_requested_iteration_count() -> Result<(), VptError> {
        let mut device = DeviceHandle::new(
            TeamId::new("team"),
            HostName::new("host"),
            DeviceModel::new("model"),
            DeviceId::new("device"),
            UserInterfaceName::new("ui"),
            "/tmp/vpt-cli-fullzap-test",
            Arc::new(ControllerRegistry::new()),
            Arc::new(EmptyTreeSource),
            Arc::new(GraphCache::new()),
            None,
        );

        let outcome = run(&mut device, "volume_up", 3, false)?;
        assert_eq!(outcome.summary.steps.len(), 3);
        assert!(outcome.success);
        Ok(())
    }
}
