// crates/vpt-graph/src/graph.rs
// ============================================================================
// Module: Unified Navigation Graph
// Description: Builds a directed multigraph from trees of nodes/edges,
//              including synthesized cross-tree virtual edges (§4.1).
// Purpose: Give the pathfinder and executors one immutable, queryable graph
//          per (root tree, team) regardless of how many nested trees exist.
// Dependencies: petgraph, vpt-core
// ============================================================================

//! ## Overview
//! A [`UnifiedGraph`] is built once per tree-load and never mutated again
//! (§5 "Graph objects are immutable once built; concurrent readers require
//! no locking"). [`NavigationGraph`] is a stateless builder: it owns no
//! fields, just the construction and unification logic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use petgraph::Direction;
use petgraph::graph::DiGraph;
use petgraph::graph::NodeIndex;
use vpt_core::Action;
use vpt_core::ActionSetId;
use vpt_core::Edge;
use vpt_core::EdgeId;
use vpt_core::EdgeType;
use vpt_core::Node;
use vpt_core::NodeId;
use vpt_core::NodeKind;
use vpt_core::Tree;
use vpt_core::TreeId;
use vpt_core::VptError;
use vpt_core::Verification;

// ============================================================================
// SECTION: Node / Edge attributes
// ============================================================================

/// Node attributes carried on the unified graph (§4.1 "Record every node's
/// `verifications` on the node attributes").
#[derive(Debug, Clone)]
pub struct NodeAttr {
    /// Stable identifier, unique across every tree in the unification.
    pub node_id: NodeId,
    /// Display label.
    pub label: String,
    /// The node's kind.
    pub kind: NodeKind,
    /// Owning tree identifier.
    pub tree_id: TreeId,
    /// Owning tree display name.
    pub tree_name: String,
    /// Owning tree's depth from the root tree.
    pub tree_depth: u32,
    /// True when this is the tree's dedicated entry point.
    pub is_entry: bool,
    /// True when this is a declared exit point.
    pub is_exit: bool,
    /// Verifications attached to this node.
    pub verifications: Vec<Verification>,
    /// Optional reference screenshot.
    pub screenshot: Option<String>,
}

/// Edge attributes carried on a single arc of the unified graph.
#[derive(Debug, Clone)]
pub struct EdgeArc {
    /// Identifier of the originating edge (suffixed `_reverse` for reverse arcs).
    pub edge_id: EdgeId,
    /// The originating edge's structural type.
    pub edge_type: EdgeType,
    /// Main action list for this arc's direction.
    pub actions: Vec<Action>,
    /// Retry fallback actions.
    pub retry_actions: Vec<Action>,
    /// Failure fallback actions.
    pub failure_actions: Vec<Action>,
    /// The action set identifier this arc's actions came from.
    pub action_set_id: ActionSetId,
    /// Milliseconds to wait after the action set, before verification.
    pub final_wait_ms: u64,
    /// True for edges synthesized at cross-tree unification.
    pub is_virtual: bool,
    /// True for the forward direction of a declared edge.
    pub is_forward: bool,
    /// True for the synthesized reverse direction of a declared edge.
    pub is_reverse: bool,
}

// ============================================================================
// SECTION: UnifiedGraph
// ============================================================================

/// An immutable, built navigation graph spanning one or more unified trees.
#[derive(Debug, Clone, Default)]
pub struct UnifiedGraph {
    /// The underlying directed multigraph.
    graph: DiGraph<NodeAttr, EdgeArc>,
    /// Lookup from a node's stable identifier to its petgraph index.
    index_of: BTreeMap<NodeId, NodeIndex>,
}

impl UnifiedGraph {
    /// Looks up the petgraph index backing a node id.
    fn node_index(&self, id: &NodeId) -> Option<NodeIndex> {
        self.index_of.get(id).copied()
    }

    /// Returns the attributes of a node, if present.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&NodeAttr> {
        self.node_index(id).map(|index| &self.graph[index])
    }

    /// Returns true when the graph contains no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Resolves a target string to a node id: exact id match, then exact
    /// label match, then case-insensitive label match (§4.2 "Pre-flight
    /// rules").
    #[must_use]
    pub fn resolve(&self, target: &str) -> Option<NodeId> {
        if let Some(id) = self.index_of.keys().find(|id| id.as_str() == target) {
            return Some(id.clone());
        }
        if let Some(attr) = self.graph.node_weights().find(|attr| attr.label == target) {
            return Some(attr.node_id.clone());
        }
        self.graph
            .node_weights()
            .find(|attr| attr.label.eq_ignore_ascii_case(target))
            .map(|attr| attr.node_id.clone())
    }

    /// Returns the graph's chosen entry node: the dedicated `is_entry` node
    /// if any, otherwise the first node flagged `is_entry` in insertion
    /// order (same rule, kept separate for readability), otherwise the first
    /// node inserted at all (§4.2 "If start absent...").
    #[must_use]
    pub fn default_entry(&self) -> Option<NodeId> {
        self.graph
            .node_weights()
            .find(|attr| attr.is_entry)
            .or_else(|| self.graph.node_weights().next())
            .map(|attr| attr.node_id.clone())
    }

    /// Returns every node id in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.graph.node_weights().map(|attr| &attr.node_id)
    }

    /// Returns the outgoing arcs of a node as `(target_node_id, edge_arc)`
    /// pairs, in insertion order, ties broken lexicographically by target id
    /// (§4.2 "Tie-breaking ... lexicographic on child node id").
    #[must_use]
    pub fn outgoing(&self, id: &NodeId) -> Vec<(NodeId, &EdgeArc)> {
        let Some(index) = self.node_index(id) else {
            return Vec::new();
        };
        let mut arcs: Vec<(NodeId, &EdgeArc)> = self
            .graph
            .edges_directed(index, Direction::Outgoing)
            .map(|edge| (self.graph[edge.target()].node_id.clone(), edge.weight()))
            .collect();
        arcs.sort_by(|a, b| a.0.cmp(&b.0));
        arcs
    }

    /// Returns every non-virtual edge id present in the graph, deduplicated
    /// (reverse arcs share their forward edge's base id), used by the
    /// validation-sequence edge-coverage traversal.
    #[must_use]
    pub fn real_edge_ids(&self) -> Vec<EdgeId> {
        let mut seen = Vec::new();
        for edge in self.graph.edge_weights() {
            if edge.is_virtual {
                continue;
            }
            if !seen.contains(&edge.edge_id) {
                seen.push(edge.edge_id.clone());
            }
        }
        seen
    }

    /// Returns the underlying petgraph structure, for algorithms in
    /// `pathfinder.rs` that need direct `NodeIndex` access.
    pub(crate) fn as_petgraph(&self) -> &DiGraph<NodeAttr, EdgeArc> {
        &self.graph
    }

    /// Returns the petgraph index backing a node id, for `pathfinder.rs`.
    pub(crate) fn petgraph_index(&self, id: &NodeId) -> Option<NodeIndex> {
        self.node_index(id)
    }

    /// Returns the node id backing a petgraph index, for `pathfinder.rs`.
    pub(crate) fn node_id_at(&self, index: NodeIndex) -> NodeId {
        self.graph[index].node_id.clone()
    }
}

// ============================================================================
// SECTION: NavigationGraph builder
// ============================================================================

/// Stateless builder for [`UnifiedGraph`]s (§4.1).
#[derive(Debug, Default)]
pub struct NavigationGraph;

impl NavigationGraph {
    /// Builds a unified graph from a single tree, with no cross-tree virtual
    /// edges.
    ///
    /// # Errors
    ///
    /// Returns [`VptError::InvalidActionSet`] when a non-empty edge has no
    /// resolvable default action set.
    pub fn build(tree: &Tree) -> Result<UnifiedGraph, VptError> {
        Self::unify(std::slice::from_ref(tree))
    }

    /// Builds one unified graph spanning every tree in `trees`, synthesizing
    /// `enter_subtree`/`exit_subtree` virtual edges for every
    /// parent-node-to-child-tree link (§4.1 "Unification (cross-tree)").
    ///
    /// # Errors
    ///
    /// Returns [`VptError::InvalidActionSet`] when a non-empty edge has no
    /// resolvable default action set.
    pub fn unify(trees: &[Tree]) -> Result<UnifiedGraph, VptError> {
        let mut graph = DiGraph::new();
        let mut index_of = BTreeMap::new();

        for tree in trees {
            for node in &tree.nodes {
                insert_node(&mut graph, &mut index_of, tree, node);
            }
        }
        for tree in trees {
            for edge in &tree.edges {
                add_edge_arcs(&mut graph, &index_of, edge)?;
            }
        }
        add_virtual_edges(&mut graph, &index_of, trees)?;

        Ok(UnifiedGraph { graph, index_of })
    }
}

/// Adds one node to the graph under construction, skipping ids already
/// inserted by an earlier tree in the same unification pass.
fn insert_node(
    graph: &mut DiGraph<NodeAttr, EdgeArc>,
    index_of: &mut BTreeMap<NodeId, NodeIndex>,
    tree: &Tree,
    node: &Node,
) {
    if index_of.contains_key(&node.node_id) {
        return;
    }
    let attr = NodeAttr {
        node_id: node.node_id.clone(),
        label: node.label.clone(),
        kind: node.kind,
        tree_id: tree.tree_id.clone(),
        tree_name: tree.name.clone(),
        tree_depth: tree.tree_depth,
        is_entry: node.is_entry,
        is_exit: node.is_exit,
        verifications: node.verifications.clone(),
        screenshot: node.screenshot.clone(),
    };
    let index = graph.add_node(attr);
    index_of.insert(node.node_id.clone(), index);
}

/// Adds the forward arc (and reverse arc, if declared) for one tree edge.
fn add_edge_arcs(
    graph: &mut DiGraph<NodeAttr, EdgeArc>,
    index_of: &BTreeMap<NodeId, NodeIndex>,
    edge: &Edge,
) -> Result<(), VptError> {
    let (Some(&source), Some(&target)) =
        (index_of.get(&edge.source_node_id), index_of.get(&edge.target_node_id))
    else {
        // §4.1 "Reject edges whose endpoints are missing from the node set."
        return Ok(());
    };

    if edge.is_empty_and_unconditional() {
        return Ok(());
    }

    if !edge.action_sets.is_empty() && !edge.has_valid_default() {
        return Err(VptError::InvalidActionSet(edge.edge_id.clone()));
    }

    if let Some(default_set) = edge.default_action_set() {
        graph.add_edge(
            source,
            target,
            EdgeArc {
                edge_id: edge.edge_id.clone(),
                edge_type: edge.edge_type,
                actions: default_set.actions.clone(),
                retry_actions: default_set.retry_actions.clone(),
                failure_actions: default_set.failure_actions.clone(),
                action_set_id: default_set.id.clone(),
                final_wait_ms: edge.final_wait_ms,
                is_virtual: edge.is_virtual,
                is_forward: true,
                is_reverse: false,
            },
        );
    }

    if let Some(reverse_set) = edge.reverse_action_set() {
        graph.add_edge(
            target,
            source,
            EdgeArc {
                edge_id: format!("{}_reverse", edge.edge_id).into(),
                edge_type: edge.edge_type,
                actions: reverse_set.actions.clone(),
                retry_actions: reverse_set.retry_actions.clone(),
                failure_actions: reverse_set.failure_actions.clone(),
                action_set_id: reverse_set.id.clone(),
                final_wait_ms: edge.final_wait_ms,
                is_virtual: edge.is_virtual,
                is_forward: false,
                is_reverse: true,
            },
        );
    }

    Ok(())
}

/// Synthesizes `enter_subtree`/`exit_subtree` virtual edges for every node
/// that declares a `child_tree_id`.
fn add_virtual_edges(
    graph: &mut DiGraph<NodeAttr, EdgeArc>,
    index_of: &BTreeMap<NodeId, NodeIndex>,
    trees: &[Tree],
) -> Result<(), VptError> {
    let tree_by_id: BTreeMap<&TreeId, &Tree> =
        trees.iter().map(|tree| (&tree.tree_id, tree)).collect();

    for tree in trees {
        for node in &tree.nodes {
            let Some(child_tree_id) = &node.child_tree_id else {
                continue;
            };
            let Some(&parent_index) = index_of.get(&node.node_id) else {
                continue;
            };
            let Some(child_tree) = tree_by_id.get(child_tree_id).copied() else {
                continue;
            };
            let Some(child_entry) = child_tree.nodes.iter().find(|candidate| candidate.is_entry)
            else {
                continue;
            };
            let Some(&child_index) = index_of.get(&child_entry.node_id) else {
                continue;
            };

            let enter_id: EdgeId = format!("virtual_{}_{}_enter", node.node_id, child_tree_id).into();
            let exit_id: EdgeId = format!("virtual_{}_{}_exit", node.node_id, child_tree_id).into();

            graph.add_edge(
                parent_index,
                child_index,
                EdgeArc {
                    edge_id: enter_id,
                    edge_type: EdgeType::EnterSubtree,
                    actions: vec![synthetic_action("enter_subtree")],
                    retry_actions: Vec::new(),
                    failure_actions: Vec::new(),
                    action_set_id: ActionSetId::new("virtual_enter"),
                    final_wait_ms: 0,
                    is_virtual: true,
                    is_forward: true,
                    is_reverse: false,
                },
            );
            graph.add_edge(
                child_index,
                parent_index,
                EdgeArc {
                    edge_id: exit_id,
                    edge_type: EdgeType::ExitSubtree,
                    actions: vec![synthetic_action("exit_subtree")],
                    retry_actions: Vec::new(),
                    failure_actions: Vec::new(),
                    action_set_id: ActionSetId::new("virtual_exit"),
                    final_wait_ms: 0,
                    is_virtual: true,
                    is_forward: true,
                    is_reverse: false,
                },
            );
        }
    }
    Ok(())
}

/// Builds a single-command action for a synthesized virtual edge.
fn synthetic_action(command: &str) -> Action {
    Action {
        command: command.to_string(),
        action_type: None,
        params: BTreeMap::new(),
        iterator: 1,
        wait_time_ms: 0,
        continue_on_fail: false,
    }
}

#[cfg(test)]
#[allow(clippy::missing_docs_in_private_items, reason = "test helpers are self-explanatory from their names")]
mod tests {
    use vpt_core::ActionSet;

    use super::*;

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
            actions: vec![synthetic_action("press")],
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

    fn sample_tree() -> Tree {
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
            ],
            edges: vec![edge("e1", "home", "settings")],
        }
    }

    #[test]
    fn build_rejects_edges_with_missing_endpoints() -> Result<(), VptError> {
        let mut tree = sample_tree();
        tree.edges.push(edge("dangling", "home", "ghost"));
        let graph = NavigationGraph::build(&tree)?;
        assert!(graph.node(&NodeId::new("home")).is_some());
        assert_eq!(graph.outgoing(&NodeId::new("home")).len(), 1);
        Ok(())
    }

    #[test]
    fn resolve_falls_back_to_case_insensitive_label() -> Result<(), VptError> {
        let graph = NavigationGraph::build(&sample_tree())?;
        assert_eq!(graph.resolve("SETTINGS"), Some(NodeId::new("settings")));
        Ok(())
    }

    #[test]
    fn default_entry_prefers_dedicated_entry_node() -> Result<(), VptError> {
        let graph = NavigationGraph::build(&sample_tree())?;
        assert_eq!(graph.default_entry(), Some(NodeId::new("home")));
        Ok(())
    }

    #[test]
    fn invalid_default_action_set_is_rejected() {
        let mut tree = sample_tree();
        tree.edges[0].default_action_set_id = ActionSetId::new("missing");
        let result = NavigationGraph::build(&tree);
        assert!(matches!(result, Err(VptError::InvalidActionSet(_))));
    }

    #[test]
    fn unify_adds_subtree_virtual_edges() -> Result<(), VptError> {
        let mut root = sample_tree();
        root.nodes[1].child_tree_id = Some(TreeId::new("t2"));
        let child = Tree {
            tree_id: TreeId::new("t2"),
            name: "Child".to_string(),
            parent_tree_id: Some(TreeId::new("t1")),
            parent_node_id: Some(NodeId::new("settings")),
            tree_depth: 1,
            is_root_tree: false,
            nodes: vec![node("child_home", NodeKind::Entry, true)],
            edges: Vec::new(),
        };
        let graph = NavigationGraph::unify(&[root, child])?;
        let arcs = graph.outgoing(&NodeId::new("settings"));
        assert!(arcs.iter().any(|(target, arc)| target.as_str() == "child_home" && arc.is_virtual));
        Ok(())
    }
}
