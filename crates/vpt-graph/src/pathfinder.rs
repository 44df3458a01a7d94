// crates/vpt-graph/src/pathfinder.rs
// ============================================================================
// Module: Pathfinder
// Description: Shortest-path and edge-coverage validation-sequence traversal
//              over a UnifiedGraph (§4.2).
// Purpose: Resolve label/id targets to transition sequences the navigation
//          executor can walk, and produce a full coverage sweep for the
//          validation scenario.
// Dependencies: petgraph, vpt-core, crate::graph
// ============================================================================

//! ## Overview
//! Every public function here is a pure query over an already-built
//! [`UnifiedGraph`] — no IO, no mutation. `shortest_path` resolves a single
//! target; `validation_sequence` produces a full depth-first edge-coverage
//! sweep, inserting forced transitions (computed by `shortest_path` itself)
//! whenever the traversal position drifts from the next step's expected
//! origin.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use petgraph::algo::astar;
use vpt_core::Action;
use vpt_core::ActionSetId;
use vpt_core::EdgeId;
use vpt_core::EdgeType;
use vpt_core::NodeId;
use vpt_core::NodeKind;
use vpt_core::TreeId;
use vpt_core::Verification;
use vpt_core::VptError;

use crate::graph::UnifiedGraph;

// ============================================================================
// SECTION: Transition
// ============================================================================

/// A single navigation step between two nodes of the unified graph (§4.2
/// "Output transitions").
#[derive(Debug, Clone)]
pub struct Transition {
    /// Sequential step number, assigned by the caller that walks the sequence.
    pub step_number: u64,
    /// Origin node id.
    pub from_node_id: NodeId,
    /// Origin node label.
    pub from_label: String,
    /// Destination node id.
    pub to_node_id: NodeId,
    /// Destination node label.
    pub to_label: String,
    /// Origin tree id.
    pub from_tree_id: TreeId,
    /// Destination tree id.
    pub to_tree_id: TreeId,
    /// The traversed edge's structural type.
    pub transition_type: EdgeType,
    /// True when `from_tree_id != to_tree_id`.
    pub tree_context_change: bool,
    /// Main actions for this transition.
    pub actions: Vec<Action>,
    /// Retry fallback actions.
    pub retry_actions: Vec<Action>,
    /// The action set identifier used.
    pub action_set_id: ActionSetId,
    /// Verifications attached to the destination node.
    pub verifications: Vec<Verification>,
    /// Milliseconds to wait after the action set, before verification.
    pub final_wait_ms: u64,
    /// The traversed edge id.
    pub edge_id: EdgeId,
    /// True for a synthesized cross-tree edge.
    pub is_virtual: bool,
    /// True when this transition was inserted by the traversal to recover
    /// position rather than appearing directly in declared edges (SPEC_FULL
    /// §9 Open Question c).
    pub forced_transition: bool,
}

/// Builds a [`Transition`] from the arc connecting `from` to `to`, if one exists.
fn transition_from_arc(
    step_number: u64,
    graph: &UnifiedGraph,
    from: &NodeId,
    to: &NodeId,
    forced_transition: bool,
) -> Option<Transition> {
    let (_, arc) = graph.outgoing(from).into_iter().find(|(target, _)| target == to)?;
    let from_attr = graph.node(from)?;
    let to_attr = graph.node(to)?;
    Some(Transition {
        step_number,
        from_node_id: from.clone(),
        from_label: from_attr.label.clone(),
        to_node_id: to.clone(),
        to_label: to_attr.label.clone(),
        from_tree_id: from_attr.tree_id.clone(),
        to_tree_id: to_attr.tree_id.clone(),
        transition_type: arc.edge_type,
        tree_context_change: from_attr.tree_id != to_attr.tree_id,
        actions: arc.actions.clone(),
        retry_actions: arc.retry_actions.clone(),
        action_set_id: arc.action_set_id.clone(),
        verifications: to_attr.verifications.clone(),
        final_wait_ms: arc.final_wait_ms,
        edge_id: arc.edge_id.clone(),
        is_virtual: arc.is_virtual,
        forced_transition,
    })
}

// ============================================================================
// SECTION: Shortest path
// ============================================================================

/// Resolves `start`/`target` (node id, exact label, or case-insensitive
/// label) and returns the shortest-path transition sequence between them
/// (§4.2 "Shortest path").
///
/// # Errors
///
/// Returns [`VptError::PathNotFound`] when `target` does not resolve or no
/// route exists, and [`VptError::CannotTargetActionNode`] when `target`
/// resolves to an action-kind node.
pub fn shortest_path(
    graph: &UnifiedGraph,
    target: &str,
    start: Option<&str>,
) -> Result<Vec<Transition>, VptError> {
    let target_id = graph.resolve(target).ok_or_else(|| VptError::PathNotFound {
        from_label: start.unwrap_or("<entry>").to_string(),
        from_id: NodeId::new(""),
        to_label: target.to_string(),
        to_id: NodeId::new(""),
    })?;

    let target_attr = graph
        .node(&target_id)
        .ok_or_else(|| VptError::PathNotFound {
            from_label: start.unwrap_or("<entry>").to_string(),
            from_id: NodeId::new(""),
            to_label: target.to_string(),
            to_id: target_id.clone(),
        })?;
    if matches!(target_attr.kind, NodeKind::Action) {
        return Err(VptError::CannotTargetActionNode(target_id));
    }

    let start_id = match start {
        Some(label) => graph.resolve(label).ok_or_else(|| VptError::PathNotFound {
            from_label: label.to_string(),
            from_id: NodeId::new(""),
            to_label: target.to_string(),
            to_id: target_id.clone(),
        })?,
        None => graph.default_entry().ok_or_else(|| VptError::PathNotFound {
            from_label: "<entry>".to_string(),
            from_id: NodeId::new(""),
            to_label: target.to_string(),
            to_id: target_id.clone(),
        })?,
    };

    if start_id == target_id {
        return Ok(Vec::new());
    }

    route(graph, &start_id, &target_id)
}

/// Computes the shortest route between two already-resolved node ids.
///
/// # Errors
///
/// Returns [`VptError::PathNotFound`] when no route exists.
pub fn route(
    graph: &UnifiedGraph,
    start_id: &NodeId,
    target_id: &NodeId,
) -> Result<Vec<Transition>, VptError> {
    let petgraph = graph.as_petgraph();
    let (Some(start_index), Some(target_index)) =
        (graph.petgraph_index(start_id), graph.petgraph_index(target_id))
    else {
        return Err(not_found(graph, start_id, target_id));
    };

    let found = astar(
        petgraph,
        start_index,
        |node| node == target_index,
        |_edge| 1_u32,
        |_node| 0_u32,
    );

    let Some((_, path)) = found else {
        return Err(not_found(graph, start_id, target_id));
    };

    let mut transitions = Vec::with_capacity(path.len().saturating_sub(1));
    for (step_number, pair) in path.windows(2).enumerate() {
        let from = graph.node_id_at(pair[0]);
        let to = graph.node_id_at(pair[1]);
        if let Some(transition) =
            transition_from_arc(step_number as u64 + 1, graph, &from, &to, false)
        {
            transitions.push(transition);
        }
    }
    Ok(transitions)
}

/// Builds a [`VptError::PathNotFound`] carrying both endpoints' labels.
fn not_found(graph: &UnifiedGraph, from: &NodeId, to: &NodeId) -> VptError {
    let from_label = graph.node(from).map_or_else(|| from.to_string(), |attr| attr.label.clone());
    let to_label = graph.node(to).map_or_else(|| to.to_string(), |attr| attr.label.clone());
    VptError::PathNotFound {
        from_label,
        from_id: from.clone(),
        to_label,
        to_id: to.clone(),
    }
}

// ============================================================================
// SECTION: Validation sequence (edge-coverage traversal)
// ============================================================================

/// Produces a depth-first traversal that covers every non-virtual edge of
/// the graph at least once, inserting forced transitions when the
/// traversal position drifts from the expected origin (§4.2 "Validation
/// sequence").
#[must_use]
pub fn validation_sequence(graph: &UnifiedGraph) -> Vec<Transition> {
    let Some(entry) = graph.default_entry() else {
        return Vec::new();
    };

    let mut covered_edges: BTreeSet<EdgeId> = BTreeSet::new();
    let mut transitions = Vec::new();
    let mut step_number = 1_u64;
    let mut position = entry.clone();

    walk(graph, &entry, &mut position, &mut covered_edges, &mut transitions, &mut step_number);

    transitions
}

/// Depth-first edge-coverage walk from `node`, recursing into every
/// not-yet-covered child before returning (§4.2 "Validation sequence").
fn walk(
    graph: &UnifiedGraph,
    node: &NodeId,
    position: &mut NodeId,
    covered: &mut BTreeSet<EdgeId>,
    out: &mut Vec<Transition>,
    step_number: &mut u64,
) {
    let children = graph.outgoing(node);
    for (child, arc) in children {
        if covered.contains(&arc.edge_id) {
            continue;
        }

        if *position != *node
            && let Some(forced) = recover_position(graph, position, node, step_number)
        {
            out.push(forced);
            *position = node.clone();
        }

        if let Some(transition) = transition_from_arc(*step_number, graph, node, &child, false) {
            covered.insert(arc.edge_id.clone());
            *step_number += 1;
            out.push(transition);
            *position = child.clone();
        }

        walk(graph, &child, position, covered, out, step_number);

        if *position != *node {
            match return_path(graph, position, node, &arc.edge_id, covered, step_number) {
                Some(mut steps) => {
                    out.append(&mut steps);
                    *position = node.clone();
                }
                None => {
                    // §4.2 "If none exists, accept the unidirectional edge."
                }
            }
        }
    }
}

/// Computes a forced transition to bring the traversal position from `from`
/// back to `to` before the next declared step runs.
fn recover_position(
    graph: &UnifiedGraph,
    from: &NodeId,
    to: &NodeId,
    step_number: &mut u64,
) -> Option<Transition> {
    let path = route(graph, from, to).ok()?;
    let first = path.into_iter().next()?;
    let transition = Transition { step_number: *step_number, forced_transition: true, ..first };
    *step_number += 1;
    Some(transition)
}

/// Chooses a return path from `from` back to `to` in §4.2's priority order:
/// an unvisited direct edge, then the reverse action set of `forward_edge_id`,
/// then a transitional shortest path.
fn return_path(
    graph: &UnifiedGraph,
    from: &NodeId,
    to: &NodeId,
    forward_edge_id: &EdgeId,
    covered: &mut BTreeSet<EdgeId>,
    step_number: &mut u64,
) -> Option<Vec<Transition>> {
    // Priority 1: a direct, not-yet-visited return edge.
    for (candidate, arc) in graph.outgoing(from) {
        if &candidate == to && !covered.contains(&arc.edge_id) {
            let transition = transition_from_arc(*step_number, graph, from, to, false)?;
            covered.insert(arc.edge_id.clone());
            *step_number += 1;
            return Some(vec![transition]);
        }
    }
    // Priority 2: the reverse action set of the same forward edge — modeled
    // as the arc whose edge_id is `<forward>_reverse`.
    let reverse_id: EdgeId = format!("{forward_edge_id}_reverse").into();
    for (candidate, arc) in graph.outgoing(from) {
        if &candidate == to && arc.edge_id == reverse_id {
            let transition = transition_from_arc(*step_number, graph, from, to, false)?;
            covered.insert(arc.edge_id.clone());
            *step_number += 1;
            return Some(vec![transition]);
        }
    }
    // Priority 3: a transitional shortest path.
    route(graph, from, to).ok().map(|steps| {
        let mut numbered = Vec::with_capacity(steps.len());
        for step in steps {
            numbered.push(Transition { step_number: *step_number, ..step });
            *step_number += 1;
        }
        numbered
    })
}

#[cfg(test)]
#[allow(clippy::missing_docs_in_private_items, reason = "test helpers are self-explanatory from their names")]
mod tests {
    use vpt_core::ActionSet;
    use vpt_core::Edge;
    use vpt_core::Node;
    use vpt_core::NodeKind;
    use vpt_core::Tree;

    use super::*;
    use crate::graph::NavigationGraph;

    fn action() -> Action {
        Action {
            command: "press".to_string(),
            action_type: None,
            params: std::collections::BTreeMap::new(),
            iterator: 1,
            wait_time_ms: 0,
            continue_on_fail: false,
        }
    }

    fn node(id: &str, kind: NodeKind, is_entry: bool) -> Node {
        Node {
            node_id: NodeId::new(id),
            label: id.to_string(),
            kind,
            screenshot: None,
            verifications: Vec::new(),
            depth: 0,
            is_entry,
            is_exit: false,
            child_tree_id: None,
        }
    }

    fn edge(id: &str, from: &str, to: &str) -> Edge {
        let set = ActionSet {
            id: ActionSetId::new("forward"),
            label: "Forward".to_string(),
            actions: vec![action()],
            retry_actions: Vec::new(),
            failure_actions: Vec::new(),
        };
        Edge {
            edge_id: EdgeId::new(id),
            source_node_id: NodeId::new(from),
            target_node_id: NodeId::new(to),
            edge_type: EdgeType::Normal,
            action_sets: vec![set],
            default_action_set_id: ActionSetId::new("forward"),
            final_wait_ms: 2000,
            is_virtual: false,
            is_conditional: false,
        }
    }

    fn linear_tree() -> Tree {
        Tree {
            tree_id: TreeId::new("t1"),
            name: "Root".to_string(),
            parent_tree_id: None,
            parent_node_id: None,
            tree_depth: 0,
            is_root_tree: true,
            nodes: vec![
                node("home", NodeKind::Entry, true),
                node("settings", NodeKind::Screen, false),
                node("about", NodeKind::Screen, false),
            ],
            edges: vec![edge("e1", "home", "settings"), edge("e2", "settings", "about")],
        }
    }

    #[test]
    fn start_equals_target_returns_empty() -> Result<(), VptError> {
        let graph = NavigationGraph::build(&linear_tree())?;
        let transitions = shortest_path(&graph, "home", Some("home"))?;
        assert!(transitions.is_empty());
        Ok(())
    }

    #[test]
    fn shortest_path_resolves_case_insensitive_label() -> Result<(), VptError> {
        let graph = NavigationGraph::build(&linear_tree())?;
        let transitions = shortest_path(&graph, "ABOUT", Some("home"))?;
        assert_eq!(transitions.len(), 2);
        assert_eq!(transitions[0].to_node_id, NodeId::new("settings"));
        assert_eq!(transitions[1].to_node_id, NodeId::new("about"));
        Ok(())
    }

    #[test]
    fn missing_target_is_path_not_found() -> Result<(), VptError> {
        let graph = NavigationGraph::build(&linear_tree())?;
        let result = shortest_path(&graph, "nowhere", Some("home"));
        assert!(matches!(result, Err(VptError::PathNotFound { .. })));
        Ok(())
    }

    #[test]
    fn action_node_target_is_rejected() -> Result<(), VptError> {
        let mut tree = linear_tree();
        tree.nodes.push(node("press_btn", NodeKind::Action, false));
        tree.edges.push(edge("e3", "about", "press_btn"));
        let graph = NavigationGraph::build(&tree)?;
        let result = shortest_path(&graph, "press_btn", Some("home"));
        assert!(matches!(result, Err(VptError::CannotTargetActionNode(_))));
        Ok(())
    }

    #[test]
    fn validation_sequence_covers_every_real_edge() -> Result<(), VptError> {
        let graph = NavigationGraph::build(&linear_tree())?;
        let sequence = validation_sequence(&graph);
        let covered: BTreeSet<EdgeId> = sequence.iter().map(|t| t.edge_id.clone()).collect();
        for edge_id in graph.real_edge_ids() {
            assert!(covered.contains(&edge_id), "missing coverage for {edge_id}");
        }
        Ok(())
    }
}
