// crates/vpt-core/src/errors.rs
// ============================================================================
// Module: Engine Error Kinds
// Description: The single flattened error type returned at crate boundaries.
// Purpose: Give every caller one enum to match on (§7 Error Handling Design).
// Dependencies: thiserror, crate::identifiers
// ============================================================================

//! ## Overview
//! Each storage/controller layer defines its own error enum and bridges
//! into `VptError` at the boundary via `From`, rather than
//! every leaf function returning this enum directly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::identifiers::EdgeId;
use crate::identifiers::NodeId;
use crate::identifiers::TeamId;
use crate::identifiers::TreeId;

// ============================================================================
// SECTION: VptError
// ============================================================================

/// The flattened error type surfaced at engine boundaries (§7).
#[derive(Debug, Error)]
pub enum VptError {
    /// Pathfinding was requested with no cached unified graph for `(tree,
    /// team)`. Fatal to the call; the caller must load the tree first.
    #[error("no unified graph cached for tree {tree_id} / team {team_id}")]
    UnifiedCacheMiss {
        /// The tree that was requested.
        tree_id: TreeId,
        /// The team the request was scoped to.
        team_id: TeamId,
    },

    /// No route exists in the unified graph between the given endpoints.
    #[error("no path from {from_label} ({from_id}) to {to_label} ({to_id})")]
    PathNotFound {
        /// Origin node label.
        from_label: String,
        /// Origin node id.
        from_id: NodeId,
        /// Target node label.
        to_label: String,
        /// Target node id.
        to_id: NodeId,
    },

    /// The resolved pathfinding target is an action-kind node.
    #[error("node {0} is an action node and cannot be a navigation target")]
    CannotTargetActionNode(NodeId),

    /// An edge is missing `action_sets` or a resolvable `default_action_set_id`.
    #[error("edge {0} has no valid default action set")]
    InvalidActionSet(EdgeId),

    /// A controller reported `success = false`.
    #[error("action '{command}' failed: {message}")]
    ActionFailed {
        /// The command that failed.
        command: String,
        /// The controller's failure message.
        message: String,
    },

    /// A verification's score or text comparison did not meet its threshold.
    #[error("verification '{command}' failed: {message}")]
    VerificationFailed {
        /// The command that failed.
        command: String,
        /// A human-readable explanation.
        message: String,
    },

    /// A `last_zapping.json` record was stale relative to its own timeout.
    #[error("zapping marker is stale (started_at_unix={started_at_unix}, timeout_seconds={timeout_seconds})")]
    ZapMarkerStale {
        /// The marker's `started_at_unix` field.
        started_at_unix: i64,
        /// The marker's `timeout_seconds` field.
        timeout_seconds: i64,
    },

    /// The zapping record's `action_timestamp` did not match the triggering
    /// action within the 10-second tolerance window.
    #[error("zap timestamp mismatch: action={action_ts}, record={record_ts}")]
    ZapTimestampMismatch {
        /// The triggering action's timestamp, in unix seconds.
        action_ts: i64,
        /// The capture-monitor record's timestamp, in unix seconds.
        record_ts: i64,
    },

    /// Polling for `last_zapping.json` exceeded the 15-second budget.
    #[error("timed out polling for zapping evidence after {0} ms")]
    ZapPollTimeout(u64),

    /// A screenshot capture was requested but no file was produced.
    #[error("screenshot missing: {0}")]
    ScreenshotMissing(String),

    /// A database record was intentionally skipped.
    #[error("database recording skipped: {0}")]
    DbRecordingSkipped(String),

    /// An underlying filesystem operation failed.
    #[error("io error: {0}")]
    Io(String),

    /// Serialization or deserialization of a wire payload failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An external controller (remote/web/desktop/power/av) reported an
    /// error outside the normal success/failure result shape.
    #[error("controller error: {0}")]
    Controller(String),
}
