// crates/vpt-core/src/model.rs
// ============================================================================
// Module: Navigation Tree Data Model
// Description: Node/Edge/ActionSet/Action/Verification/Tree wire types.
// Purpose: Shared vocabulary between tree storage, graph construction, and
//          the action/verification executors.
// Dependencies: serde, serde_json, crate::identifiers
// ============================================================================

//! ## Overview
//! These types describe a navigation tree exactly as delivered by durable
//! storage (§6 "Navigation tree source"). They are intentionally dumb data:
//! graph construction, pathfinding, and execution all consume the same
//! records without copying fields into parallel shapes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::identifiers::ActionSetId;
use crate::identifiers::EdgeId;
use crate::identifiers::NodeId;
use crate::identifiers::TreeId;

// ============================================================================
// SECTION: Node
// ============================================================================

/// The kind of a node, constraining where pathfinding may terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A regular UI screen.
    Screen,
    /// The single dedicated entry point of a tree.
    Entry,
    /// An action-only node; never a valid navigation target.
    Action,
    /// A menu screen.
    Menu,
}

/// A single node of a navigation tree.
///
/// # Invariants
/// - At most one node per tree has `kind == NodeKind::Action` excluded from
///   pathfinding targets (see [`NodeKind::Action`]).
/// - `child_tree_id` is only meaningful when `has_children` is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable unique identifier within its tree.
    pub node_id: NodeId,
    /// Display label, used for label-based pathfinding targets.
    pub label: String,
    /// The node's kind.
    pub kind: NodeKind,
    /// Optional reference screenshot URL.
    pub screenshot: Option<String>,
    /// Ordered verifications attached to this node.
    pub verifications: Vec<Verification>,
    /// Depth of this node within its owning tree (entry = 0).
    pub depth: u32,
    /// True when this node is the tree's dedicated entry point.
    pub is_entry: bool,
    /// True when this node is a declared exit point.
    pub is_exit: bool,
    /// When present, this node is the parent of a nested child tree.
    pub child_tree_id: Option<TreeId>,
}

impl Node {
    /// Returns true when this node may never be a pathfinding target.
    #[must_use]
    pub const fn is_unreachable_target(&self) -> bool {
        matches!(self.kind, NodeKind::Action)
    }
}

// ============================================================================
// SECTION: Edge / ActionSet / Action
// ============================================================================

/// The structural type of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// A regular intra-tree edge.
    Normal,
    /// A synthesized edge entering a child tree.
    EnterSubtree,
    /// A synthesized edge leaving a child tree back to its parent.
    ExitSubtree,
}

/// The dispatch category of an [`Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// A remote-control command.
    Remote,
    /// A web/browser-automation command.
    Web,
    /// A desktop-automation command (bash or pyautogui sub-controller).
    Desktop,
    /// A power-control command.
    Power,
    /// A verification executed as part of an action batch.
    Verification,
    /// A pre-registered in-process block.
    StandardBlock,
}

/// A parameter value, either a raw scalar or a typed-schema object.
///
/// # Invariants
/// - [`ParamValue::flatten`] always normalizes to a scalar [`serde_json::Value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// A typed schema wrapper: `{default, type, required}`.
    Typed {
        /// The effective value to use once flattened.
        default: Value,
        /// Declared type name, informational only.
        #[serde(rename = "type")]
        type_name: String,
        /// Whether the parameter is required by the controller.
        #[serde(default)]
        required: bool,
    },
    /// A raw scalar or structured value.
    Scalar(Value),
}

impl ParamValue {
    /// Flattens a typed-schema object down to its `default` value.
    #[must_use]
    pub fn flatten(&self) -> Value {
        match self {
            Self::Typed { default, .. } => default.clone(),
            Self::Scalar(value) => value.clone(),
        }
    }
}

/// Flattens a full parameter map, replacing typed-schema objects with their
/// `default` values (§4.4 "Params flattening", §9 "Param flattening").
#[must_use]
pub fn flatten_params(params: &BTreeMap<String, ParamValue>) -> BTreeMap<String, Value> {
    params.iter().map(|(key, value)| (key.clone(), value.flatten())).collect()
}

/// A single action within an [`ActionSet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// The controller command name.
    pub command: String,
    /// Dispatch category; `None` triggers priority-list auto-detection.
    pub action_type: Option<ActionType>,
    /// Parameters, possibly carrying typed-schema wrappers.
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
    /// Number of sequential repetitions requested, clamped to `1..=100`.
    #[serde(default = "default_iterator")]
    pub iterator: u32,
    /// Milliseconds to sleep after this action completes.
    #[serde(default)]
    pub wait_time_ms: u64,
    /// When true, a failure of this action does not stop the batch.
    #[serde(default)]
    pub continue_on_fail: bool,
}

const fn default_iterator() -> u32 {
    1
}

impl Action {
    /// Returns the effective iteration count, clamped to `1..=100` and forced
    /// to `1` for verification actions (§4.4 "Iteration").
    #[must_use]
    pub fn effective_iterator(&self) -> u32 {
        if self.action_type == Some(ActionType::Verification) {
            return 1;
        }
        self.iterator.clamp(1, 100)
    }

    /// Returns the flattened parameter map for dispatch.
    #[must_use]
    pub fn flattened_params(&self) -> BTreeMap<String, Value> {
        flatten_params(&self.params)
    }
}

/// An ordered group of actions plus retry and failure fallbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSet {
    /// Identifier unique within the owning edge.
    pub id: ActionSetId,
    /// Display label.
    pub label: String,
    /// Main action list, executed first.
    pub actions: Vec<Action>,
    /// Actions executed if the main list fails.
    #[serde(default)]
    pub retry_actions: Vec<Action>,
    /// Actions executed if the retry list also fails.
    #[serde(default)]
    pub failure_actions: Vec<Action>,
}

/// A directed edge of a navigation tree.
///
/// # Invariants
/// - `default_action_set_id` identifies one element of `action_sets` unless
///   the edge is conditional (see [`Edge::has_valid_default`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Stable unique identifier within its tree.
    pub edge_id: EdgeId,
    /// Source node of the forward direction.
    pub source_node_id: NodeId,
    /// Target node of the forward direction.
    pub target_node_id: NodeId,
    /// Structural edge type.
    pub edge_type: EdgeType,
    /// Action sets; index 0 is forward, optional index 1 is reverse.
    pub action_sets: Vec<ActionSet>,
    /// Identifies which action set is used in the forward direction.
    pub default_action_set_id: ActionSetId,
    /// Milliseconds to wait after the action set completes, before verification.
    #[serde(default = "default_final_wait_ms")]
    pub final_wait_ms: u64,
    /// True for edges synthesized at cross-tree unification.
    #[serde(default)]
    pub is_virtual: bool,
    /// True when this edge shares an action_set_id with siblings and is kept
    /// in the graph even when its action list is empty (§9 Open Question a).
    #[serde(default)]
    pub is_conditional: bool,
}

const fn default_final_wait_ms() -> u64 {
    2000
}

impl Edge {
    /// Returns the forward action set, if `default_action_set_id` resolves.
    #[must_use]
    pub fn default_action_set(&self) -> Option<&ActionSet> {
        self.action_sets.iter().find(|set| set.id == self.default_action_set_id)
    }

    /// Returns true when `default_action_set_id` names a real element of
    /// `action_sets` (graph invariant from SPEC_FULL §8).
    #[must_use]
    pub fn has_valid_default(&self) -> bool {
        self.default_action_set().is_some()
    }

    /// Returns the reverse action set (`action_sets[1]`), if present and
    /// non-empty.
    #[must_use]
    pub fn reverse_action_set(&self) -> Option<&ActionSet> {
        self.action_sets.get(1).filter(|set| !set.actions.is_empty())
    }

    /// Returns true when the edge should be skipped entirely at graph build
    /// time: no action sets, not conditional, and no reverse actions.
    #[must_use]
    pub fn is_empty_and_unconditional(&self) -> bool {
        self.action_sets.is_empty() && !self.is_conditional
    }
}

// ============================================================================
// SECTION: Verification
// ============================================================================

/// The dispatch category of a [`Verification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationType {
    /// Image template-matching verification.
    Image,
    /// OCR-based text verification.
    Text,
    /// Audio presence/speech verification.
    Audio,
    /// Video motion/freeze/blackscreen verification.
    Video,
    /// Android-debug-bridge UI verification.
    Adb,
    /// Appium-driven mobile UI verification.
    Appium,
}

/// A rectangular crop region in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Area {
    /// Left offset in pixels.
    pub x: u32,
    /// Top offset in pixels.
    pub y: u32,
    /// Width in pixels.
    pub w: u32,
    /// Height in pixels.
    pub h: u32,
}

/// Image pre-processing filter applied before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImageFilter {
    /// No filtering.
    #[default]
    None,
    /// Convert to greyscale.
    Greyscale,
    /// Convert to a binary (thresholded) image.
    Binary,
}

/// A single verification attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    /// The verification category.
    pub verification_type: VerificationType,
    /// Controller command name.
    pub command: String,
    /// Free-form parameters, interpreted per `verification_type`.
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

impl Verification {
    /// Returns the `image_path` param for image verifications.
    #[must_use]
    pub fn image_path(&self) -> Option<&str> {
        self.params.get("image_path").and_then(Value::as_str)
    }

    /// Returns the `text` param for text verifications.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.params.get("text").and_then(Value::as_str)
    }

    /// Returns the `search_term` param for adb verifications.
    #[must_use]
    pub fn search_term(&self) -> Option<&str> {
        self.params.get("search_term").and_then(Value::as_str)
    }

    /// Returns the `threshold` param for image verifications, default 0.8.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.params.get("threshold").and_then(Value::as_f64).unwrap_or(0.8)
    }

    /// Returns the `area` param, if present and well-formed.
    #[must_use]
    pub fn area(&self) -> Option<Area> {
        let area = self.params.get("area")?;
        Some(Area {
            x: area.get("x")?.as_u64()?.try_into().ok()?,
            y: area.get("y")?.as_u64()?.try_into().ok()?,
            w: area.get("w")?.as_u64()?.try_into().ok()?,
            h: area.get("h")?.as_u64()?.try_into().ok()?,
        })
    }

    /// Returns the `image_filter` param, default [`ImageFilter::None`].
    #[must_use]
    pub fn image_filter(&self) -> ImageFilter {
        self.params
            .get("image_filter")
            .and_then(Value::as_str)
            .map(|raw| match raw {
                "greyscale" => ImageFilter::Greyscale,
                "binary" => ImageFilter::Binary,
                _ => ImageFilter::None,
            })
            .unwrap_or_default()
    }

    /// Returns true when this verification passes the §4.5 "Filtering" rules
    /// for its type (non-empty command plus type-specific required params).
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        if self.command.trim().is_empty() {
            return false;
        }
        match self.verification_type {
            VerificationType::Image => self.image_path().is_some(),
            VerificationType::Text => self.text().is_some(),
            VerificationType::Adb => self.search_term().is_some(),
            VerificationType::Audio | VerificationType::Video | VerificationType::Appium => true,
        }
    }
}

// ============================================================================
// SECTION: Tree
// ============================================================================

/// Extra per-node data carried alongside the node record (§6 node shape).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    /// Optional human description.
    pub description: Option<String>,
    /// Optional reference screenshot path.
    pub screenshot: Option<String>,
    /// Declared exit-point flag.
    #[serde(default)]
    pub is_exit_point: bool,
    /// True when this node has a nested child tree.
    #[serde(default)]
    pub has_children: bool,
    /// Identifier of the nested child tree, when `has_children` is true.
    pub child_tree_id: Option<TreeId>,
}

/// A single navigation tree as delivered by durable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    /// Unique identifier of this tree.
    pub tree_id: TreeId,
    /// Display name.
    pub name: String,
    /// Parent tree, when this is a nested child tree.
    pub parent_tree_id: Option<TreeId>,
    /// Parent node in the parent tree, when nested.
    pub parent_node_id: Option<NodeId>,
    /// Depth from the root tree (root = 0).
    pub tree_depth: u32,
    /// True for the single root tree of a user interface.
    pub is_root_tree: bool,
    /// Nodes belonging to this tree.
    pub nodes: Vec<Node>,
    /// Edges belonging to this tree.
    pub edges: Vec<Edge>,
}

#[cfg(test)]
#[allow(clippy::missing_docs_in_private_items, reason = "test helpers are self-explanatory from their names")]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample_action(params: BTreeMap<String, ParamValue>) -> Action {
        Action {
            command: "press".to_string(),
            action_type: Some(ActionType::Remote),
            params,
            iterator: 1,
            wait_time_ms: 0,
            continue_on_fail: false,
        }
    }

    #[test]
    fn flatten_params_replaces_typed_schema_objects() {
        let mut params = BTreeMap::new();
        params.insert(
            "key".to_string(),
            ParamValue::Typed {
                default: json!("OK"),
                type_name: "string".to_string(),
                required: true,
            },
        );
        params.insert("raw".to_string(), ParamValue::Scalar(json!(42)));
        let action = sample_action(params);
        let flattened = action.flattened_params();
        assert_eq!(flattened.get("key"), Some(&json!("OK")));
        assert_eq!(flattened.get("raw"), Some(&json!(42)));
    }

    #[test]
    fn iterator_is_clamped_and_forced_for_verification() {
        let mut action = sample_action(BTreeMap::new());
        action.iterator = 250;
        assert_eq!(action.effective_iterator(), 100);

        action.action_type = Some(ActionType::Verification);
        assert_eq!(action.effective_iterator(), 1);
    }

    #[test]
    fn action_node_is_unreachable_target() {
        let node = Node {
            node_id: NodeId::new("n1"),
            label: "Action".to_string(),
            kind: NodeKind::Action,
            screenshot: None,
            verifications: Vec::new(),
            depth: 0,
            is_entry: false,
            is_exit: false,
            child_tree_id: None,
        };
        assert!(node.is_unreachable_target());
    }

    #[test]
    fn verification_eligibility_requires_type_specific_params() {
        let mut params = BTreeMap::new();
        let mut verification = Verification {
            verification_type: VerificationType::Image,
            command: "match".to_string(),
            params: params.clone(),
        };
        assert!(!verification.is_eligible());
        params.insert("image_path".to_string(), json!("home.jpg"));
        verification.params = params;
        assert!(verification.is_eligible());
    }

    #[test]
    fn edge_default_action_set_resolution() {
        let set = ActionSet {
            id: ActionSetId::new("forward"),
            label: "Forward".to_string(),
            actions: vec![sample_action(BTreeMap::new())],
            retry_actions: Vec::new(),
            failure_actions: Vec::new(),
        };
        let edge = Edge {
            edge_id: EdgeId::new("e1"),
            source_node_id: NodeId::new("a"),
            target_node_id: NodeId::new("b"),
            edge_type: EdgeType::Normal,
            action_sets: vec![set],
            default_action_set_id: ActionSetId::new("forward"),
            final_wait_ms: 2000,
            is_virtual: false,
            is_conditional: false,
        };
        assert!(edge.has_valid_default());
        assert!(edge.reverse_action_set().is_none());
    }
}
