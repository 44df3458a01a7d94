// crates/vpt-graph/src/cache.rs
// ============================================================================
// Module: Unified Graph Cache
// Description: Process-wide (tree, team) -> UnifiedGraph map (§4.3).
// Purpose: Avoid rebuilding the unified graph on every pathfinding call while
//          keeping pathfinding itself fail-fast on a miss.
// Dependencies: std::sync, vpt-core, crate::graph
// ============================================================================

//! ## Overview
//! `GraphCache` is read-mostly: writes happen once per tree load, reads
//! happen on every navigation/validation call. Entries are wrapped in `Arc`
//! so readers never block each other or the writer past the lock acquire
//! (§5 "Graph objects are immutable once built; concurrent readers require
//! no locking"). A miss is never silently rebuilt — pathfinding requires a
//! unified graph to already be cached (§4.3 "Miss behavior").

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::RwLock;

use tracing::debug;
use vpt_core::TeamId;
use vpt_core::TreeId;
use vpt_core::VptError;

use crate::graph::UnifiedGraph;

// ============================================================================
// SECTION: GraphCache
// ============================================================================

/// A process-wide cache of unified graphs, keyed by `(root_tree_id, team_id)`.
#[derive(Debug, Default)]
pub struct GraphCache {
    /// Built graphs keyed by `(root_tree_id, team_id)`.
    entries: RwLock<BTreeMap<(TreeId, TeamId), Arc<UnifiedGraph>>>,
}

impl GraphCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self { entries: RwLock::new(BTreeMap::new()) }
    }

    /// Returns the cached graph for `(tree_id, team_id)`.
    ///
    /// # Errors
    ///
    /// Returns [`VptError::UnifiedCacheMiss`] when no entry is cached; the
    /// caller must load the tree first (§4.3 "Miss behavior").
    pub fn get(&self, tree_id: &TreeId, team_id: &TeamId) -> Result<Arc<UnifiedGraph>, VptError> {
        let key = (tree_id.clone(), team_id.clone());
        let guard = self.entries.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.get(&key).cloned().ok_or_else(|| VptError::UnifiedCacheMiss {
            tree_id: tree_id.clone(),
            team_id: team_id.clone(),
        })
    }

    /// Inserts or replaces the cached graph for `(tree_id, team_id)`.
    pub fn put(&self, tree_id: TreeId, team_id: TeamId, graph: UnifiedGraph) {
        debug!(%tree_id, %team_id, "caching unified graph");
        let mut guard = self.entries.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.insert((tree_id, team_id), Arc::new(graph));
    }

    /// Explicitly invalidates one entry (§4.3 "Invalidation: explicit on
    /// tree reload or administrative flush").
    pub fn invalidate(&self, tree_id: &TreeId, team_id: &TeamId) {
        let mut guard = self.entries.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.remove(&(tree_id.clone(), team_id.clone()));
    }

    /// Flushes every cached entry.
    pub fn flush(&self) {
        let mut guard = self.entries.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.clear();
    }
}

#[cfg(test)]
#[allow(clippy::missing_docs_in_private_items, reason = "test helpers are self-explanatory from their names")]
mod tests {
    use vpt_core::Tree;

    use super::*;
    use crate::graph::NavigationGraph;

    fn empty_tree(id: &str) -> Tree {
        Tree {
            tree_id: TreeId::new(id),
            name: "Root".to_string(),
            parent_tree_id: None,
            parent_node_id: None,
            tree_depth: 0,
            is_root_tree: true,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    #[test]
    fn miss_returns_unified_cache_miss() {
        let cache = GraphCache::new();
        let result = cache.get(&TreeId::new("t1"), &TeamId::new("team"));
        assert!(matches!(result, Err(VptError::UnifiedCacheMiss { .. })));
    }

    #[test]
    fn put_then_get_round_trips() -> Result<(), VptError> {
        let cache = GraphCache::new();
        let graph = NavigationGraph::build(&empty_tree("t1"))?;
        cache.put(TreeId::new("t1"), TeamId::new("team"), graph);
        let fetched = cache.get(&TreeId::new("t1"), &TeamId::new("team"))?;
        assert!(fetched.is_empty());
        Ok(())
    }

    #[test]
    fn invalidate_removes_entry() -> Result<(), VptError> {
        let cache = GraphCache::new();
        let graph = NavigationGraph::build(&empty_tree("t1"))?;
        cache.put(TreeId::new("t1"), TeamId::new("team"), graph);
        cache.invalidate(&TreeId::new("t1"), &TeamId::new("team"));
        let result = cache.get(&TreeId::new("t1"), &TeamId::new("team"));
        assert!(matches!(result, Err(VptError::UnifiedCacheMiss { .. })));
        Ok(())
    }
}
