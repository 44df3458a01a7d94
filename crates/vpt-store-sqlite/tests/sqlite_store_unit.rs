// crates/vpt-store-sqlite/tests/sqlite_store_unit.rs
// ============================================================================
// Module: SQLite Store Integration Tests
// Description: End-to-end tests for the SQLite tree source and execution
//              recorder, exercised through the crate's public API only.
// Purpose: Validate persistence across process-like connection boundaries
//          (fresh `SqliteStore::open` on the same file) and concurrent
//          access from multiple threads.
// ============================================================================

#![allow(clippy::unwrap_used, reason = "test-only assertions and fixtures are permitted to unwrap")]
#![allow(clippy::missing_docs_in_private_items, reason = "test helpers are self-explanatory from their names")]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use vpt_core::Action;
use vpt_core::ActionSet;
use vpt_core::ActionSetId;
use vpt_core::ActionType;
use vpt_core::DeviceId;
use vpt_core::Edge;
use vpt_core::EdgeExecutionRecord;
use vpt_core::EdgeId;
use vpt_core::EdgeType;
use vpt_core::ExecutionRecorder;
use vpt_core::HostName;
use vpt_core::Node;
use vpt_core::NodeId;
use vpt_core::NodeKind;
use vpt_core::TeamId;
use vpt_core::Tree;
use vpt_core::TreeId;
use vpt_core::TreeSource;
use vpt_core::UserInterfaceName;
use vpt_store_sqlite::SqliteStore;
use vpt_store_sqlite::SqliteStoreConfig;

fn sample_tree() -> Tree {
    let entry = Node {
        node_id: NodeId::new("entry"),
        label: "Entry".to_string(),
        kind: NodeKind::Entry,
        screenshot: None,
        verifications: Vec::new(),
        depth: 0,
        is_entry: true,
        is_exit: false,
        child_tree_id: None,
    };
    let home = Node {
        node_id: NodeId::new("home"),
        label: "Home".to_string(),
        kind: NodeKind::Screen,
        screenshot: None,
        verifications: Vec::new(),
        depth: 1,
        is_entry: false,
        is_exit: false,
        child_tree_id: None,
    };
    let action_set = ActionSet {
        id: ActionSetId::new("default"),
        label: "default".to_string(),
        actions: vec![Action {
            command: "press_home".to_string(),
            action_type: Some(ActionType::Remote),
            params: BTreeMap::new(),
            iterator: 1,
            wait_time_ms: 0,
            continue_on_fail: false,
        }],
        retry_actions: Vec::new(),
        failure_actions: Vec::new(),
    };
    let edge = Edge {
        edge_id: EdgeId::new("e1"),
        source_node_id: NodeId::new("entry"),
        target_node_id: NodeId::new("home"),
        edge_type: EdgeType::Normal,
        action_sets: vec![action_set],
        default_action_set_id: ActionSetId::new("default"),
        final_wait_ms: 2000,
        is_virtual: false,
        is_conditional: false,
    };
    Tree {
        tree_id: TreeId::new("root"),
        name: "root".to_string(),
        parent_tree_id: None,
        parent_node_id: None,
        tree_depth: 0,
        is_root_tree: true,
        nodes: vec![entry, home],
        edges: vec![edge],
    }
}

#[test]
fn tree_survives_reopening_the_same_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.db");
    let team_id = TeamId::new("team");
    let ui_name = UserInterfaceName::new("ui");

    {
        let store = SqliteStore::open(&SqliteStoreConfig::new(&path)).unwrap();
        store.put_tree(&ui_name, &team_id, &sample_tree()).unwrap();
    }

    let reopened = SqliteStore::open(&SqliteStoreConfig::new(&path)).unwrap();
    let trees = reopened.fetch_userinterface_trees(&ui_name, &team_id).unwrap();
    assert_eq!(trees.len(), 1);
    assert_eq!(trees[0].edges.len(), 1);
}

#[test]
fn trees_are_scoped_by_team_and_userinterface() {
    let store = SqliteStore::open_in_memory().unwrap();
    let ui_name = UserInterfaceName::new("ui");
    store.put_tree(&ui_name, &TeamId::new("team-a"), &sample_tree()).unwrap();

    let team_b_trees = store.fetch_userinterface_trees(&ui_name, &TeamId::new("team-b")).unwrap();
    assert!(team_b_trees.is_empty());

    let other_ui_trees = store.fetch_userinterface_trees(&UserInterfaceName::new("other-ui"), &TeamId::new("team-a")).unwrap();
    assert!(other_ui_trees.is_empty());
}

#[test]
fn edge_execution_records_do_not_require_a_script_result() {
    let store = SqliteStore::open_in_memory().unwrap();
    let team_id = TeamId::new("team");
    let tree_id = TreeId::new("root");
    let edge_id = EdgeId::new("e1");
    let host_name = HostName::new("host");
    let device_model = vpt_core::DeviceModel::new("model");
    let device_name = DeviceId::new("device");

    let record = EdgeExecutionRecord {
        team_id: &team_id,
        tree_id: &tree_id,
        edge_id: &edge_id,
        host_name: &host_name,
        device_model: &device_model,
        device_name: &device_name,
        success: true,
        execution_time_ms: 42,
        message: "ok",
        error_details: None,
        script_result_id: None,
        script_context: None,
        action_set_id: Some("default"),
    };
    store.record_edge_execution(&record).unwrap();
}

#[test]
fn concurrent_script_lifecycle_across_threads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.db");
    let store = Arc::new(SqliteStore::open(&SqliteStoreConfig::new(&path)).unwrap());

    let handles: Vec<_> = (0 .. 8)
        .map(|index| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let team_id = TeamId::new("team");
                let script_result_id = store
                    .record_script_execution_start(
                        &team_id,
                        &format!("script-{index}"),
                        "navigation",
                        None,
                        &HostName::new("host"),
                        &DeviceId::new("device"),
                        None,
                    )
                    .unwrap();
                store
                    .update_script_execution_result(&script_result_id, index % 2 == 0, Some(10), None, None, None, None)
                    .unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
