// crates/vpt-exec/src/device.rs
// ============================================================================
// Module: Device Handle
// Description: Per-device composition root holding the controller set, the
//              three executor singletons, and the mutable navigation
//              context (§4.10).
// Purpose: One object a script run selects once and drives end to end,
//          instead of wiring ActionExecutor/VerificationExecutor/
//          NavigationExecutor by hand at every call site.
// Dependencies: vpt-core, vpt-controllers, vpt-graph, crate::*
// ============================================================================

//! ## Overview
//! `DeviceHandle` is the composition record called for in §4.10: it owns
//! its controllers, its three executor singletons, and one mutable
//! [`NavigationContext`]. A script run selects a `DeviceHandle`, calls
//! `goto`/`run_actions`/`verify` through it, and the executors' own caches
//! (action-route cache, zap statistics) persist for the device's whole
//! lifetime rather than being rebuilt per call. §5 forbids two scripts
//! sharing one handle concurrently; this type does nothing to enforce that
//! itself, since enforcement is external (one subprocess per script run).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use vpt_controllers::ControllerRegistry;
use vpt_core::Action;
use vpt_core::ActionType;
use vpt_core::DeviceId;
use vpt_core::DeviceModel;
use vpt_core::ExecutionRecorder;
use vpt_core::HostName;
use vpt_core::NavigationContext;
use vpt_core::TeamId;
use vpt_core::TreeId;
use vpt_core::TreeSource;
use vpt_core::UserInterfaceName;
use vpt_core::Verification;
use vpt_core::VptError;
use vpt_core::ZapStatistics;
use vpt_graph::GraphCache;

use crate::action::ActionBatchRequest;
use crate::action::ActionExecutor;
use crate::action::BatchResult;
use crate::context::ExecutionContext;
use crate::navigation::NavResult;
use crate::navigation::NavigationExecutor;
use crate::navigation::TreeLoadResult;
use crate::verification::VerificationExecutor;
use crate::zap::ZapAnalyzer;
use crate::zap::ZapIterationRequest;
use crate::zap::ZapOutcome;

// ============================================================================
// SECTION: DeviceHandle
// ============================================================================

/// Per-device singleton set: controllers, executors, and navigation state
/// (§4.10).
pub struct DeviceHandle {
    /// Tenant scope.
    team_id: TeamId,
    /// Host running the script subprocess.
    host_name: HostName,
    /// Device model under test.
    device_model: DeviceModel,
    /// Device identifier under test.
    device_id: DeviceId,
    /// The user interface under test.
    userinterface_name: UserInterfaceName,
    /// Root of the device's capture directory tree (hot storage).
    capture_root: String,
    /// Durable-storage write path, when execution records should be kept.
    recorder: Option<Arc<dyn ExecutionRecorder + Send + Sync>>,
    /// This device's action executor, reused across navigation steps.
    actions: ActionExecutor,
    /// This device's verification executor.
    verifications: VerificationExecutor,
    /// This device's navigation executor, over the shared graph cache.
    navigation_executor: NavigationExecutor,
    /// This device's zap analyzer.
    zap: ZapAnalyzer,
    /// Mutable navigation position and bookkeeping.
    navigation: NavigationContext,
}

impl DeviceHandle {
    /// Builds a device handle over an assembled controller registry, a
    /// tree source, and a shared graph cache.
    #[must_use]
    pub fn new(
        team_id: TeamId,
        host_name: HostName,
        device_model: DeviceModel,
        device_id: DeviceId,
        userinterface_name: UserInterfaceName,
        capture_root: impl Into<String>,
        controllers: Arc<ControllerRegistry>,
        tree_source: Arc<dyn TreeSource + Send + Sync>,
        graphs: Arc<GraphCache>,
        recorder: Option<Arc<dyn ExecutionRecorder + Send + Sync>>,
    ) -> Self {
        Self {
            team_id,
            host_name,
            device_model,
            device_id,
            userinterface_name,
            capture_root: capture_root.into(),
            recorder,
            actions: ActionExecutor::new(Arc::clone(&controllers)),
            verifications: VerificationExecutor::new(Arc::clone(&controllers)),
            navigation_executor: NavigationExecutor::new(tree_source, graphs, Arc::clone(&controllers)),
            zap: ZapAnalyzer::new(VerificationExecutor::new(controllers)),
            navigation: NavigationContext::default(),
        }
    }

    /// The device's action executor.
    #[must_use]
    pub const fn actions(&self) -> &ActionExecutor {
        &self.actions
    }

    /// The device's verification executor.
    #[must_use]
    pub const fn verifications(&self) -> &VerificationExecutor {
        &self.verifications
    }

    /// The device's zap analyzer.
    #[must_use]
    pub const fn zap(&self) -> &ZapAnalyzer {
        &self.zap
    }

    /// The device's mutable navigation context, for scripts that declare
    /// their starting position explicitly.
    pub fn navigation_mut(&mut self) -> &mut NavigationContext {
        &mut self.navigation
    }

    /// The device's navigation context, read-only.
    #[must_use]
    pub const fn navigation(&self) -> &NavigationContext {
        &self.navigation
    }

    /// Loads (or reloads) the navigation tree for this device's user
    /// interface (§4.6 `load_navigation_tree`).
    ///
    /// # Errors
    ///
    /// Returns [`VptError`] when the tree source is unreachable or the
    /// trees fail to unify.
    pub fn load_navigation_tree(&self) -> Result<TreeLoadResult, VptError> {
        self.navigation_executor.load_navigation_tree(&self.userinterface_name, &self.team_id)
    }

    /// Navigates to `target` from the device's current position (§4.6
    /// `execute_navigation`).
    ///
    /// # Errors
    ///
    /// Returns [`VptError`] when the graph is not cached, the target does
    /// not resolve, or no route exists.
    pub fn goto(&mut self, tree_id: &TreeId, target: &str) -> Result<NavResult, VptError> {
        let team_id = self.team_id.clone();
        let mut ctx = ExecutionContext {
            team_id: &self.team_id,
            host_name: &self.host_name,
            device_model: &self.device_model,
            device_id: &self.device_id,
            userinterface_name: &self.userinterface_name,
            capture_root: &self.capture_root,
            recorder: self.recorder.as_deref().map(|recorder| recorder as &dyn ExecutionRecorder),
            navigation: &mut self.navigation,
        };
        self.navigation_executor.execute_navigation(tree_id, target, &team_id, &mut ctx)
    }

    /// Dispatches a single channel-change action, then runs the zap-analysis
    /// pipeline over its outcome (§4.7, §6 "CLI surface (scripts)" `fullzap`).
    ///
    /// # Errors
    ///
    /// Returns [`VptError`] when the action dispatch or a durable-storage
    /// write fails.
    pub fn run_zap_iteration(
        &mut self,
        request: &ZapActionRequest<'_>,
        stats: &mut ZapStatistics,
    ) -> Result<(BatchResult, ZapOutcome), VptError> {
        // Channel-change commands always dispatch through the remote control,
        // so the route is tagged explicitly rather than resolved by command set.
        let action = Action {
            command: request.action_command.to_string(),
            action_type: Some(ActionType::Remote),
            params: BTreeMap::new(),
            iterator: 1,
            wait_time_ms: 0,
            continue_on_fail: false,
        };
        let started_at_ms = now_unix_millis();
        let mut ctx = ExecutionContext {
            team_id: &self.team_id,
            host_name: &self.host_name,
            device_model: &self.device_model,
            device_id: &self.device_id,
            userinterface_name: &self.userinterface_name,
            capture_root: &self.capture_root,
            recorder: self.recorder.as_deref().map(|recorder| recorder as &dyn ExecutionRecorder),
            navigation: &mut self.navigation,
        };
        let batch_request = ActionBatchRequest {
            actions: std::slice::from_ref(&action),
            retry_actions: &[],
            failure_actions: &[],
            tree_id: None,
            edge_id: None,
            action_set_id: None,
        };
        let batch = self.actions.execute_actions(&mut ctx, &batch_request)?;

        let zap_request = ZapIterationRequest {
            action_command: request.action_command,
            iteration_index: request.iteration_index,
            action_completion_timestamp: started_at_ms / 1000,
            started_at_ms,
            subtitle_verifications: request.subtitle_verifications,
            audio_verifications: request.audio_verifications,
        };
        let outcome = self.zap.analyze_iteration(&ctx, &zap_request, stats)?;
        Ok((batch, outcome))
    }
}

/// Per-call parameters for [`DeviceHandle::run_zap_iteration`].
pub struct ZapActionRequest<'a> {
    /// The channel-change command to dispatch before analysis.
    pub action_command: &'a str,
    /// Zero-based iteration index, for recording.
    pub iteration_index: u32,
    /// Subtitle verifications to run against the current frame, if any.
    pub subtitle_verifications: &'a [Verification],
    /// Audio verifications to run against the current frame, if any.
    pub audio_verifications: &'a [Verification],
}

/// Returns the current unix-millisecond timestamp.
fn now_unix_millis() -> i64 {
    i64::try_from(SystemTime::now().duration_since(UNIX_EPOCH).map(|duration| duration.as_millis()).unwrap_or_default())
        .unwrap_or(i64::MAX)
}

#[cfg(test)]
#[allow(clippy::missing_docs_in_private_items, reason = "test helpers are self-explanatory from their names")]
mod tests {
    use vpt_core::Tree;
    use vpt_core::VptError;

    use super::*;

    struct EmptyTreeSource;
    impl TreeSource for EmptyTreeSource {
        fn fetch_userinterface_trees(&self, _name: &UserInterfaceName, _team_id: &TeamId) -> Result<Vec<Tree>, VptError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn fresh_handle_starts_with_no_navigation_position() {
        let handle = DeviceHandle::new(
            TeamId::new("team"),
            HostName::new("host"),
            DeviceModel::new("model"),
            DeviceId::new("device"),
            UserInterfaceName::new("ui"),
            "/captures",
            Arc::new(ControllerRegistry::new()),
            Arc::new(EmptyTreeSource),
            Arc::new(GraphCache::new()),
            None,
        );
        assert!(handle.navigation().current_node_id.is_none());
    }

    #[test]
    fn run_zap_iteration_records_one_sample_for_a_non_chup_command() -> Result<(), VptError> {
        let mut handle = DeviceHandle::new(
            TeamId::new("team"),
            HostName::new("host"),
            DeviceModel::new("model"),
            DeviceId::new("device"),
            UserInterfaceName::new("ui"),
            "/captures",
            Arc::new(ControllerRegistry::new()),
            Arc::new(EmptyTreeSource),
            Arc::new(GraphCache::new()),
            None,
        );
        let mut stats = vpt_core::ZapStatistics::default();
        let request = ZapActionRequest {
            action_command: "volume_up",
            iteration_index: 0,
            subtitle_verifications: &[],
            audio_verifications: &[],
        };
        let (_batch, outcome) = handle.run_zap_iteration(&request, &mut stats)?;
        assert!(outcome.success);
        assert_eq!(stats.total, 1);
        Ok(())
    }
}
