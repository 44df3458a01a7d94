// crates/vpt-graph/src/lib.rs
// ============================================================================
// Crate: vpt-graph
// Description: Unified navigation graph construction, pathfinding, and the
//              process-wide graph cache (§4.1-§4.3).
// Purpose: Turn the tree data model from vpt-core into a queryable graph the
//          execution engine can navigate and validate.
// ============================================================================

//! ## Overview
//! Three collaborating pieces, one per module:
//! - [`graph`] builds an immutable [`graph::UnifiedGraph`] from one or more
//!   [`vpt_core::Tree`]s, synthesizing cross-tree virtual edges.
//! - [`pathfinder`] answers shortest-path and full edge-coverage queries
//!   over an already-built graph.
//! - [`cache`] holds built graphs process-wide, keyed by `(tree, team)`,
//!   with fail-fast misses rather than silent rebuilding.

pub mod cache;
pub mod graph;
pub mod pathfinder;

pub use cache::GraphCache;
pub use graph::EdgeArc;
pub use graph::NavigationGraph;
pub use graph::NodeAttr;
pub use graph::UnifiedGraph;
pub use pathfinder::Transition;
pub use pathfinder::route;
pub use pathfinder::shortest_path;
pub use pathfinder::validation_sequence;
