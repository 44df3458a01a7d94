// crates/vpt-exec/src/navigation.rs
// ============================================================================
// Module: Navigation Executor
// Description: Loads trees into the unified graph cache and walks resolved
//              paths transition by transition (§4.6).
// Purpose: Turn a target label/id into a sequence of action-batch and
//          verification-batch calls, keeping the device's believed position
//          in sync as it goes.
// Dependencies: vpt-core, vpt-graph, vpt-controllers, crate::action,
//               crate::verification, crate::context
// ============================================================================

//! ## Overview
//! `NavigationExecutor` owns no state of its own beyond the shared
//! [`vpt_graph::GraphCache`] and the [`crate::action::ActionExecutor`] /
//! [`crate::verification::VerificationExecutor`] pair it drives; all
//! mutable position tracking lives in the caller's
//! [`vpt_core::NavigationContext`], threading one mutable run-state through
//! every step rather than each subsystem keeping its own copy.
//!
//! [`vpt_graph::pathfinder::Transition`] carries a transition's main and
//! retry actions but not edge-level failure actions (that field lives only
//! on [`vpt_core::Edge`]/[`vpt_core::ActionSet`], not on the flattened
//! traversal step) — navigation-driven action batches therefore run with an
//! empty failure list; only the explicit action/verification executor
//! entry points support the full three-tier chain.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;
use std::thread;

use tracing::info;
use vpt_controllers::ControllerRegistry;
use vpt_core::NodeKind;
use vpt_core::TeamId;
use vpt_core::TreeId;
use vpt_core::TreeSource;
use vpt_core::UserInterfaceName;
use vpt_core::VptError;
use vpt_graph::GraphCache;
use vpt_graph::NavigationGraph;
use vpt_graph::Transition;
use vpt_graph::shortest_path;

use crate::action::ActionBatchRequest;
use crate::action::ActionExecutor;
use crate::context::ExecutionContext;
use crate::verification::VerificationExecutor;

// ============================================================================
// SECTION: Results
// ============================================================================

/// The outcome of [`NavigationExecutor::load_navigation_tree`].
#[derive(Debug, Clone)]
pub struct TreeLoadResult {
    /// Identifier of the root tree now cached for this user interface/team.
    pub tree_id: TreeId,
    /// Total node count across every unified tree.
    pub node_count: usize,
    /// Total declared edge count across every unified tree.
    pub edge_count: usize,
}

/// The outcome of [`NavigationExecutor::execute_navigation`] (§4.6 "Returns").
#[derive(Debug, Clone)]
pub struct NavResult {
    /// Whether the whole path executed successfully.
    pub success: bool,
    /// Total number of transitions in the resolved path.
    pub total_transitions: usize,
    /// Number of transitions actually executed before success or failure.
    pub transitions_executed: usize,
    /// Number of individual actions executed across all transitions.
    pub actions_executed: usize,
    /// Total number of individual actions declared across the resolved path.
    pub total_actions: usize,
    /// Wall-clock execution time, in seconds.
    pub execution_time_s: f64,
    /// Error detail, naming the failing transition, when `success` is false.
    pub error: Option<String>,
}

// ============================================================================
// SECTION: NavigationExecutor
// ============================================================================

/// Loads navigation trees and walks resolved paths (§4.6).
pub struct NavigationExecutor {
    /// Read-only access to durable tree storage.
    tree_source: Arc<dyn TreeSource + Send + Sync>,
    /// Process-wide unified-graph cache, shared across scripts.
    graphs: Arc<GraphCache>,
    /// The device's action executor, reused so its own caches persist.
    actions: ActionExecutor,
    /// The device's verification executor.
    verifications: VerificationExecutor,
}

impl NavigationExecutor {
    /// Builds an executor over a tree source, a shared graph cache, and the
    /// device's controller registry.
    #[must_use]
    pub fn new(
        tree_source: Arc<dyn TreeSource + Send + Sync>,
        graphs: Arc<GraphCache>,
        controllers: Arc<ControllerRegistry>,
    ) -> Self {
        Self {
            tree_source,
            graphs,
            actions: ActionExecutor::new(Arc::clone(&controllers)),
            verifications: VerificationExecutor::new(controllers),
        }
    }

    /// Fetches every tree for `userinterface_name`, unifies them into one
    /// graph, and caches it keyed by the root tree's id (§4.6
    /// `load_navigation_tree`). Idempotent: reloading simply overwrites the
    /// cache entry.
    ///
    /// # Errors
    ///
    /// Returns [`VptError`] when the tree source is unreachable or the trees
    /// fail to unify (e.g. an edge with no resolvable default action set).
    pub fn load_navigation_tree(
        &self,
        userinterface_name: &UserInterfaceName,
        team_id: &TeamId,
    ) -> Result<TreeLoadResult, VptError> {
        let trees = self.tree_source.fetch_userinterface_trees(userinterface_name, team_id)?;
        let root_tree_id = trees
            .iter()
            .find(|tree| tree.is_root_tree)
            .or_else(|| trees.first())
            .map(|tree| tree.tree_id.clone())
            .unwrap_or_else(|| TreeId::new(userinterface_name.as_str()));

        let node_count: usize = trees.iter().map(|tree| tree.nodes.len()).sum();
        let edge_count: usize = trees.iter().map(|tree| tree.edges.len()).sum();

        let graph = NavigationGraph::unify(&trees)?;
        self.graphs.put(root_tree_id.clone(), team_id.clone(), graph);

        Ok(TreeLoadResult { tree_id: root_tree_id, node_count, edge_count })
    }

    /// Resolves the shortest path from the device's current position (or the
    /// graph's default entry) to `target`, then walks it transition by
    /// transition, running the destination's verifications after each
    /// successful action batch and stopping at the first failure (§4.6
    /// `execute_navigation`).
    ///
    /// # Errors
    ///
    /// Returns [`VptError`] when the graph is not cached, the target does not
    /// resolve, or no route exists; per-transition action/verification
    /// failures are reported via [`NavResult::success`], not an `Err`.
    pub fn execute_navigation(
        &self,
        tree_id: &TreeId,
        target: &str,
        team_id: &TeamId,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<NavResult, VptError> {
        let start = SystemTime::now();
        let graph = self.graphs.get(tree_id, team_id)?;
        let start_label = ctx.navigation.current_node_id.as_ref().map(vpt_core::NodeId::as_str);
        let transitions = shortest_path(&graph, target, start_label)?;

        let total_actions: usize = transitions.iter().map(|transition| transition.actions.len()).sum();
        if transitions.is_empty() {
            return Ok(NavResult {
                success: true,
                total_transitions: 0,
                transitions_executed: 0,
                actions_executed: 0,
                total_actions: 0,
                execution_time_s: elapsed_seconds(start),
                error: None,
            });
        }

        let mut actions_executed = 0_usize;
        for (index, transition) in transitions.iter().enumerate() {
            info!(step = transition.step_number, from = %transition.from_label, to = %transition.to_label, "executing navigation transition");

            let request = ActionBatchRequest {
                actions: &transition.actions,
                retry_actions: &transition.retry_actions,
                failure_actions: &[],
                tree_id: Some(tree_id),
                edge_id: Some(&transition.edge_id),
                action_set_id: Some(transition.action_set_id.as_str()),
            };
            let action_batch = self.actions.execute_actions(ctx, &request)?;
            actions_executed += action_batch.results.len();
            if !action_batch.overall_success {
                return Ok(failure(
                    &transitions,
                    index,
                    actions_executed,
                    total_actions,
                    start,
                    format!("action batch failed on transition {} -> {}", transition.from_label, transition.to_label),
                ));
            }

            if transition.final_wait_ms > 0 {
                thread::sleep(Duration::from_millis(transition.final_wait_ms));
            }

            if !transition.verifications.is_empty() {
                let verification_batch = self.verifications.execute_verifications(
                    ctx,
                    &transition.verifications,
                    None,
                    Some(&transition.to_tree_id),
                    Some(&transition.to_node_id),
                )?;
                if !verification_batch.overall_success {
                    return Ok(failure(
                        &transitions,
                        index,
                        actions_executed,
                        total_actions,
                        start,
                        format!("verification failed at {}", transition.to_label),
                    ));
                }
            }

            if graph.node(&transition.to_node_id).is_none_or(|attr| !matches!(attr.kind, NodeKind::Action)) {
                ctx.navigation.update_position(transition.to_tree_id.clone(), transition.to_node_id.clone());
            }
        }

        Ok(NavResult {
            success: true,
            total_transitions: transitions.len(),
            transitions_executed: transitions.len(),
            actions_executed,
            total_actions,
            execution_time_s: elapsed_seconds(start),
            error: None,
        })
    }
}

/// Updates the device's believed position directly, bypassing navigation
/// (§4.6 "Position update helper").
pub fn update_current_position(
    navigation: &mut vpt_core::NavigationContext,
    tree_id: TreeId,
    node_id: vpt_core::NodeId,
) {
    navigation.update_position(tree_id, node_id);
}

/// Builds the failed [`NavResult`] for a transition that stopped the walk
/// partway through.
fn failure(
    transitions: &[Transition],
    failed_index: usize,
    actions_executed: usize,
    total_actions: usize,
    start: SystemTime,
    error: String,
) -> NavResult {
    NavResult {
        success: false,
        total_transitions: transitions.len(),
        transitions_executed: failed_index,
        actions_executed,
        total_actions,
        execution_time_s: elapsed_seconds(start),
        error: Some(error),
    }
}

/// Returns seconds elapsed since `start`.
fn elapsed_seconds(start: SystemTime) -> f64 {
    #[allow(clippy::cast_precision_loss, reason = "script-level durations are far below f64's exact-integer range")]
    let seconds = SystemTime::now().duration_since(start).unwrap_or_default().as_secs_f64();
    seconds
}

#[cfg(test)]
#[allow(clippy::missing_docs_in_private_items, reason = "test helpers are self-explanatory from their names")]
mod tests {
    use std::collections::BTreeMap;

    use vpt_controllers::ClosureActionController;
    use vpt_core::Action;
    use vpt_core::ActionSet;
    use vpt_core::ActionSetId;
    use vpt_core::ControllerResult;
    use vpt_core::Edge;
    use vpt_core::EdgeId;
    use vpt_core::EdgeType;
    use vpt_core::Node;
    use vpt_core::NodeId;
    use vpt_core::Tree;

    use super::*;

    struct StubTreeSource {
        trees: Vec<Tree>,
    }

    impl TreeSource for StubTreeSource {
        fn fetch_userinterface_trees(&self, _name: &UserInterfaceName, _team_id: &TeamId) -> Result<Vec<Tree>, VptError> {
            Ok(self.trees.clone())
        }
    }

    fn action(command: &str) -> Action {
        Action { command: command.to_string(), action_type: None, params: BTreeMap::new(), iterator: 1, wait_time_ms: 0, continue_on_fail: false }
    }

    fn node(id: &str, is_entry: bool) -> Node {
        Node {
            node_id: NodeId::new(id),
            label: id.to_string(),
            kind: vpt_core::NodeKind::Screen,
            screenshot: None,
            verifications: Vec::new(),
            depth: 0,
            is_entry,
            is_exit: false,
            child_tree_id: None,
        }
    }

    fn linear_tree() -> Tree {
        let set = ActionSet {
            id: ActionSetId::new("forward"),
            label: "Forward".to_string(),
            actions: vec![action("press")],
            retry_actions: Vec::new(),
            failure_actions: Vec::new(),
        };
        let edge = Edge {
            edge_id: EdgeId::new("e1"),
            source_node_id: NodeId::new("home"),
            target_node_id: NodeId::new("settings"),
            edge_type: EdgeType::Normal,
            action_sets: vec![set],
            default_action_set_id: ActionSetId::new("forward"),
            final_wait_ms: 0,
            is_virtual: false,
            is_conditional: false,
        };
        Tree {
            tree_id: TreeId::new("t1"),
            name: "Root".to_string(),
            parent_tree_id: None,
            parent_node_id: None,
            tree_depth: 0,
            is_root_tree: true,
            nodes: vec![node("home", true), node("settings", false)],
            edges: vec![edge],
        }
    }

    fn executor(success: bool) -> NavigationExecutor {
        let tree_source: Arc<dyn TreeSource + Send + Sync> = Arc::new(StubTreeSource { trees: vec![linear_tree()] });
        let graphs = Arc::new(GraphCache::new());
        let controllers = Arc::new(ControllerRegistry::new().with_remote(ClosureActionController::new(
            ["press".to_string()],
            move |_, _| ControllerResult { success, ..ControllerResult::default() },
        )));
        NavigationExecutor::new(tree_source, graphs, controllers)
    }

    #[test]
    fn load_then_navigate_reaches_target() -> Result<(), VptError> {
        let executor = executor(true);
        let team_id = TeamId::new("team");
        let ui_name = UserInterfaceName::new("ui");
        let loaded = executor.load_navigation_tree(&ui_name, &team_id)?;
        assert_eq!(loaded.node_count, 2);

        let host_name = vpt_core::HostName::new("host");
        let device_model = vpt_core::DeviceModel::new("model");
        let device_id = vpt_core::DeviceId::new("device");
        let mut navigation = vpt_core::NavigationContext::default();
        let mut ctx = ExecutionContext {
            team_id: &team_id,
            host_name: &host_name,
            device_model: &device_model,
            device_id: &device_id,
            userinterface_name: &ui_name,
            capture_root: "/captures",
            recorder: None,
            navigation: &mut navigation,
        };

        let result = executor.execute_navigation(&loaded.tree_id, "settings", &team_id, &mut ctx)?;
        assert!(result.success);
        assert_eq!(result.transitions_executed, 1);
        assert_eq!(ctx.navigation.current_node_id, Some(NodeId::new("settings")));
        Ok(())
    }

    #[test]
    fn failing_action_stops_navigation() -> Result<(), VptError> {
        let executor = executor(false);
        let team_id = TeamId::new("team");
        let ui_name = UserInterfaceName::new("ui");
        let loaded = executor.load_navigation_tree(&ui_name, &team_id)?;

        let host_name = vpt_core::HostName::new("host");
        let device_model = vpt_core::DeviceModel::new("model");
        let device_id = vpt_core::DeviceId::new("device");
        let mut navigation = vpt_core::NavigationContext::default();
        let mut ctx = ExecutionContext {
            team_id: &team_id,
            host_name: &host_name,
            device_model: &device_model,
            device_id: &device_id,
            userinterface_name: &ui_name,
            capture_root: "/captures",
            recorder: None,
            navigation: &mut navigation,
        };

        let result = executor.execute_navigation(&loaded.tree_id, "settings", &team_id, &mut ctx)?;
        assert!(!result.success);
        assert!(result.error.is_some());
        assert_eq!(ctx.navigation.current_node_id, None);
        Ok(())
    }
}
