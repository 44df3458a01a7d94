// crates/vpt-cli/src/commands/goto.rs
// ============================================================================
// Module: Goto Command
// Description: Loads the navigation tree and walks the resolved path to a
//              target node (§6 `goto --node <label>`).
// Purpose: Thin wrapper turning `DeviceHandle::load_navigation_tree`/`goto`
//          into a `CommandOutcome`.
// Dependencies: vpt-exec
// ============================================================================

use vpt_core::VptError;
use vpt_exec::DeviceHandle;

use crate::commands::CommandOutcome;
use crate::report::ScriptSummary;

/// Runs the `goto` script: loads the user interface's navigation tree, then
/// walks the resolved path to `target` (§6).
///
/// # Errors
///
/// Returns [`VptError`] when the tree cannot be loaded at all; a failed
/// navigation (no route, a failing action) is reported via
/// [`CommandOutcome::success`] rather than as an `Err`, matching §7's
/// "a failed script still produces a report" rule.
pub fn run(device: &mut DeviceHandle, target: &str) -> Result<CommandOutcome, VptError> {
    let tree = device.load_navigation_tree()?;
    let result = device.goto(&tree.tree_id, target)?;

    let mut steps = vec![format!(
        "loaded tree {} ({} nodes, {} edges)",
        tree.tree_id, tree.node_count, tree.edge_count
    )];
    steps.push(format!(
        "executed {}/{} transitions, {}/{} actions in {:.3}s",
        result.transitions_executed, result.total_transitions, result.actions_executed, result.total_actions, result.execution_time_s
    ));

    let message = result.error.clone().unwrap_or_else(|| format!("reached {target}"));
    Ok(CommandOutcome {
        success: result.success,
        error_msg: result.error,
        summary: ScriptSummary { script_name: "goto".to_string(), success: result.success, message, steps },
    })
}

#[cfg(test)]
#[allow(clippy::missing_docs_in_private_items, reason = "test helpers are self-explanatory from their names")]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use vpt_controllers::ClosureActionController;
    use vpt_controllers::ControllerRegistry;
    use vpt_core::Action;
    use vpt_core::ActionSet;
    use vpt_core::ControllerResult;
    use vpt_core::DeviceId;
    use vpt_core::DeviceModel;
    use vpt_core::Edge;
    use vpt_core::EdgeType;
    use vpt_core::HostName;
    use vpt_core::Node;
    use vpt_core::NodeKind;
    use vpt_core::TeamId;
    use vpt_core::Tree;
    use vpt_core::TreeSource;
    use vpt_core::UserInterfaceName;
    use vpt_graph::GraphCache;

    use super::*;

    struct FixedTreeSource {
        tree: Tree,
    }

    impl TreeSource for FixedTreeSource {
        fn fetch_userinterface_trees(
            &self,
            _name: &UserInterfaceName,
            _team_id: &TeamId,
        ) -> Result<Vec<Tree>, VptError> {
            Ok(vec![self.tree.clone()])
        }
    }

    fn node(id: &str, label: &str, kind: NodeKind) -> Node {
        Node {
            node_id: id.into(),
            label: label.to_string(),
            kind,
            screenshot: None,
            verifications: Vec::new(),
            depth: 0,
            is_entry: matches!(kind, NodeKind::Entry),
            is_exit: false,
            child_tree_id: None,
        }
    }

    fn press_ok_action() -> Action {
        Action {
            command: "press_ok".to_string(),
            action_type: None,
            params: BTreeMap::new(),
            iterator: 1,
            wait_time_ms: 0,
            continue_on_fail: false,
        }
    }

    fn edge(id: &str, source: &str, target: &str, action_set_id: &str) -> Edge {
        Edge {
            edge_id: id.into(),
            source_node_id: source.into(),
            target_node_id: target.into(),
            edge_type: EdgeType::Normal,
            action_sets: vec![ActionSet {
                id: action_set_id.into(),
                label: action_set_id.to_string(),
                actions: vec![press_ok_action()],
                retry_actions: Vec::new(),
                failure_actions: Vec::new(),
            }],
            default_action_set_id: action_set_id.into(),
            final_wait_ms: 0,
            is_virtual: false,
            is_conditional: false,
        }
    }

    fn straight_line_tree() -> Tree {
        Tree {
            tree_id: "tree1".into(),
            name: "ui".to_string(),
            parent_tree_id: None,
            parent_node_id: None,
            tree_depth: 0,
            is_root_tree: true,
            nodes: vec![
                node("entry", "Entry", NodeKind::Entry),
                node("home", "Home", NodeKind::Screen),
                node("settings", "Settings", NodeKind::Screen),
            ],
            edges: vec![edge("entry_home", "entry", "home", "as1"), edge("home_settings", "home", "settings", "as2")],
        }
    }

    #[test]
    fn goto_walks_straight_line_and_succeeds() -> Result<(), VptError> {
        let remote = ClosureActionController::new(["press_ok".to_string()], |_command, _params| ControllerResult {
            success: true,
            message: None,
            error: None,
            output_data: BTreeMap::new(),
        });
        let registry = ControllerRegistry::new().with_remote(remote);
        let mut device = DeviceHandle::new(
            TeamId::new("team"),
            HostName::new("host"),
            DeviceModel::new("model"),
            DeviceId::new("device"),
            UserInterfaceName::new("ui"),
            "/tmp/vpt-cli-goto-test",
            Arc::new(registry),
            Arc::new(FixedTreeSource { tree: straight_line_tree() }),
            Arc::new(GraphCache::new()),
            None,
        );

        let outcome = run(&mut device, "Settings")?;
        assert!(outcome.success);
        Ok(())
    }
}
