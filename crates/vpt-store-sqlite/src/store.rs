// crates/vpt-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Tree Source and Execution Recorder
// Description: Durable SQLite-backed TreeSource/ExecutionRecorder (§6).
// Purpose: Persist navigation trees as content and execution history as
//          rows, behind the narrow trait boundaries vpt-core defines.
// Dependencies: vpt-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! [`SqliteStore`] implements both halves of durable storage named in §6:
//! [`TreeSource`] (read path) fetches a user interface's trees back out as
//! canonical JSON blobs; [`ExecutionRecorder`] (write path) appends rows for
//! script/edge/node/zap execution history. A single writer connection
//! guarded by a mutex serializes mutations under WAL, matching the
//! busy-timeout/pragma setup this workspace's `SQLite` store lineage uses,
//! but without that lineage's batching writer-queue and perf-histogram
//! machinery: this engine's write volume (one row per script step) does not
//! need it, and carrying it over unused would be dead weight (see
//! `DESIGN.md`).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use rusqlite::Connection;
use rusqlite::params;
use serde_json::Value;
use vpt_core::DeviceId;
use vpt_core::DeviceModel;
use vpt_core::EdgeExecutionRecord;
use vpt_core::ExecutionRecorder;
use vpt_core::HostName;
use vpt_core::NodeExecutionRecord;
use vpt_core::ScriptResultId;
use vpt_core::TeamId;
use vpt_core::Tree;
use vpt_core::TreeId;
use vpt_core::TreeSource;
use vpt_core::UserInterfaceName;
use vpt_core::VptError;
use vpt_core::ZapIterationRecord;
use vpt_core::ZapResultId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema version for this store's tables.
const SCHEMA_VERSION: i64 = 1;
/// Default `SQLite` busy timeout, in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended for concurrent readers).
    #[default]
    Wal,
    /// Delete journal mode (legacy, simpler for single-writer tests).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value for this mode.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// Configuration for [`SqliteStore::open`].
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    pub journal_mode: SqliteStoreMode,
}

impl SqliteStoreConfig {
    /// Builds a config with default timeout and WAL journaling.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS, journal_mode: SqliteStoreMode::default() }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Monotonic counter used to build unique identifiers for rows this store
/// assigns on write (`ScriptResultId`, `ZapResultId`).
struct IdSequence(AtomicU64);

impl IdSequence {
    /// Returns the next value, starting from 1.
    fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// `SQLite`-backed [`TreeSource`]/[`ExecutionRecorder`] implementation.
pub struct SqliteStore {
    /// The single writer/reader connection, serialized through a mutex.
    ///
    /// `rusqlite::Connection` is not `Sync`; wrapping it lets `SqliteStore`
    /// itself be `Send + Sync` for sharing across devices via `Arc`.
    connection: Arc<Mutex<Connection>>,
    /// Sequence for generating `script_result_id`/`zap_result_id` values.
    ids: Arc<IdSequence>,
}

impl SqliteStore {
    /// Opens (creating if necessary) a `SQLite`-backed store at `config.path`.
    ///
    /// # Errors
    ///
    /// Returns [`VptError::Io`] when the file cannot be opened or the schema
    /// cannot be initialized.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, VptError> {
        if let Some(parent) = config.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|err| VptError::Io(err.to_string()))?;
        }
        let connection = Connection::open(&config.path).map_err(|err| VptError::Io(err.to_string()))?;
        configure_connection(&connection, config)?;
        initialize_schema(&connection)?;
        Ok(Self { connection: Arc::new(Mutex::new(connection)), ids: Arc::new(IdSequence(AtomicU64::new(1))) })
    }

    /// Opens an in-memory store, for tests and short-lived processes.
    ///
    /// # Errors
    ///
    /// Returns [`VptError::Io`] when the schema cannot be initialized.
    pub fn open_in_memory() -> Result<Self, VptError> {
        let connection = Connection::open_in_memory().map_err(|err| VptError::Io(err.to_string()))?;
        initialize_schema(&connection)?;
        Ok(Self { connection: Arc::new(Mutex::new(connection)), ids: Arc::new(IdSequence(AtomicU64::new(1))) })
    }

    /// Persists a tree as a canonical JSON blob, keyed by `(team_id,
    /// userinterface_name, tree_id)`. Not part of [`TreeSource`]: this is the
    /// write side a tree-editing host application uses to seed/update trees
    /// that `fetch_userinterface_trees` later reads back.
    ///
    /// # Errors
    ///
    /// Returns [`VptError::Serialization`] when the tree cannot be encoded,
    /// or [`VptError::Io`] when the write fails.
    pub fn put_tree(&self, userinterface_name: &UserInterfaceName, team_id: &TeamId, tree: &Tree) -> Result<(), VptError> {
        let tree_json = serde_json::to_vec(tree).map_err(|err| VptError::Serialization(err.to_string()))?;
        let connection = lock(&self.connection);
        connection
            .execute(
                "INSERT INTO trees (team_id, userinterface_name, tree_id, tree_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(team_id, userinterface_name, tree_id)
                 DO UPDATE SET tree_json = excluded.tree_json, updated_at = excluded.updated_at",
                params![team_id.as_str(), userinterface_name.as_str(), tree.tree_id.as_str(), tree_json, unix_millis()],
            )
            .map_err(|err| VptError::Io(err.to_string()))?;
        Ok(())
    }

    /// Deletes every tree stored for a user interface, for test teardown and
    /// re-seeding.
    ///
    /// # Errors
    ///
    /// Returns [`VptError::Io`] when the delete fails.
    pub fn clear_userinterface_trees(&self, userinterface_name: &UserInterfaceName, team_id: &TeamId) -> Result<(), VptError> {
        let connection = lock(&self.connection);
        connection
            .execute(
                "DELETE FROM trees WHERE team_id = ?1 AND userinterface_name = ?2",
                params![team_id.as_str(), userinterface_name.as_str()],
            )
            .map_err(|err| VptError::Io(err.to_string()))?;
        Ok(())
    }
}

impl TreeSource for SqliteStore {
    fn fetch_userinterface_trees(&self, name: &UserInterfaceName, team_id: &TeamId) -> Result<Vec<Tree>, VptError> {
        let connection = lock(&self.connection);
        let mut statement = connection
            .prepare("SELECT tree_json FROM trees WHERE team_id = ?1 AND userinterface_name = ?2 ORDER BY tree_id")
            .map_err(|err| VptError::Io(err.to_string()))?;
        let rows = statement
            .query_map(params![team_id.as_str(), name.as_str()], |row| row.get::<_, Vec<u8>>(0))
            .map_err(|err| VptError::Io(err.to_string()))?;
        let mut trees = Vec::new();
        for row in rows {
            let bytes = row.map_err(|err| VptError::Io(err.to_string()))?;
            let tree: Tree = serde_json::from_slice(&bytes).map_err(|err| VptError::Serialization(err.to_string()))?;
            trees.push(tree);
        }
        Ok(trees)
    }
}

impl ExecutionRecorder for SqliteStore {
    fn record_script_execution_start(
        &self,
        team_id: &TeamId,
        script_name: &str,
        script_type: &str,
        userinterface_name: Option<&UserInterfaceName>,
        host_name: &HostName,
        device_name: &DeviceId,
        metadata: Option<&BTreeMap<String, Value>>,
    ) -> Result<ScriptResultId, VptError> {
        let script_result_id = ScriptResultId::new(format!("script-{}-{}", unix_millis(), self.ids.next()));
        let metadata_json = metadata.map(serde_json::to_vec).transpose().map_err(|err| VptError::Serialization(err.to_string()))?;
        let connection = lock(&self.connection);
        connection
            .execute(
                "INSERT INTO script_results
                 (script_result_id, team_id, script_name, script_type, userinterface_name,
                  host_name, device_name, started_at, success, execution_time_ms,
                  html_report_url, logs_url, error_msg, metadata_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, NULL, NULL, NULL, NULL, ?9)",
                params![
                    script_result_id.as_str(),
                    team_id.as_str(),
                    script_name,
                    script_type,
                    userinterface_name.map(UserInterfaceName::as_str),
                    host_name.as_str(),
                    device_name.as_str(),
                    unix_millis(),
                    metadata_json,
                ],
            )
            .map_err(|err| VptError::Io(err.to_string()))?;
        Ok(script_result_id)
    }

    fn update_script_execution_result(
        &self,
        script_result_id: &ScriptResultId,
        success: bool,
        execution_time_ms: Option<u64>,
        html_report_url: Option<&str>,
        logs_url: Option<&str>,
        error_msg: Option<&str>,
        metadata: Option<&BTreeMap<String, Value>>,
    ) -> Result<(), VptError> {
        let metadata_json = metadata.map(serde_json::to_vec).transpose().map_err(|err| VptError::Serialization(err.to_string()))?;
        let connection = lock(&self.connection);
        let updated = connection
            .execute(
                "UPDATE script_results
                 SET success = ?2, execution_time_ms = ?3, html_report_url = ?4, logs_url = ?5,
                     error_msg = ?6, metadata_json = COALESCE(?7, metadata_json)
                 WHERE script_result_id = ?1",
                params![
                    script_result_id.as_str(),
                    success,
                    execution_time_ms,
                    html_report_url,
                    logs_url,
                    error_msg,
                    metadata_json,
                ],
            )
            .map_err(|err| VptError::Io(err.to_string()))?;
        if updated == 0 {
            return Err(VptError::Io(format!("no script_results row for {script_result_id}")));
        }
        Ok(())
    }

    fn record_edge_execution(&self, record: &EdgeExecutionRecord<'_>) -> Result<(), VptError> {
        let error_details_json =
            record.error_details.map(serde_json::to_vec).transpose().map_err(|err| VptError::Serialization(err.to_string()))?;
        let script_context_json =
            record.script_context.map(serde_json::to_vec).transpose().map_err(|err| VptError::Serialization(err.to_string()))?;
        let connection = lock(&self.connection);
        connection
            .execute(
                "INSERT INTO edge_executions
                 (team_id, tree_id, edge_id, host_name, device_model, device_name, success,
                  execution_time_ms, message, error_details_json, script_result_id,
                  script_context_json, action_set_id, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    record.team_id.as_str(),
                    record.tree_id.as_str(),
                    record.edge_id.as_str(),
                    record.host_name.as_str(),
                    record.device_model.as_str(),
                    record.device_name.as_str(),
                    record.success,
                    record.execution_time_ms,
                    record.message,
                    error_details_json,
                    record.script_result_id.map(ScriptResultId::as_str),
                    script_context_json,
                    record.action_set_id,
                    unix_millis(),
                ],
            )
            .map_err(|err| VptError::Io(err.to_string()))?;
        Ok(())
    }

    fn record_node_execution(&self, record: &NodeExecutionRecord<'_>) -> Result<(), VptError> {
        let error_details_json =
            record.error_details.map(serde_json::to_vec).transpose().map_err(|err| VptError::Serialization(err.to_string()))?;
        let script_context_json =
            record.script_context.map(serde_json::to_vec).transpose().map_err(|err| VptError::Serialization(err.to_string()))?;
        let connection = lock(&self.connection);
        connection
            .execute(
                "INSERT INTO node_executions
                 (team_id, tree_id, node_id, host_name, device_model, device_name, success,
                  execution_time_ms, message, error_details_json, script_result_id,
                  script_context_json, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    record.team_id.as_str(),
                    record.tree_id.as_str(),
                    record.node_id.as_str(),
                    record.host_name.as_str(),
                    record.device_model.as_str(),
                    record.device_name.as_str(),
                    record.success,
                    record.execution_time_ms,
                    record.message,
                    error_details_json,
                    record.script_result_id.map(ScriptResultId::as_str),
                    script_context_json,
                    unix_millis(),
                ],
            )
            .map_err(|err| VptError::Io(err.to_string()))?;
        Ok(())
    }

    fn record_zap_iteration(&self, record: &ZapIterationRecord<'_>) -> Result<ZapResultId, VptError> {
        let zap_result_id = ZapResultId::new(format!("zap-{}-{}", unix_millis(), self.ids.next()));
        let languages_json = serde_json::to_vec(record.languages).map_err(|err| VptError::Serialization(err.to_string()))?;
        let texts_json = serde_json::to_vec(record.texts).map_err(|err| VptError::Serialization(err.to_string()))?;
        let connection = lock(&self.connection);
        connection
            .execute(
                "INSERT INTO zap_iterations
                 (zap_result_id, script_result_id, team_id, host_name, device_name, device_model,
                  userinterface_name, iteration_index, action_command, started_at, completed_at,
                  duration_seconds, motion_detected, subtitles_detected, audio_detected,
                  zapping_detected, languages_json, texts_json, bf_duration_ms, detection_method,
                  channel_name, channel_number, program_name, program_start_time, program_end_time)
                 VALUES
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18,
                  ?19, ?20, ?21, ?22, ?23, ?24, ?25)",
                params![
                    zap_result_id.as_str(),
                    record.script_result_id.map(ScriptResultId::as_str),
                    record.team_id.as_str(),
                    record.host_name.as_str(),
                    record.device_name.as_str(),
                    record.device_model.as_str(),
                    record.userinterface_name.as_str(),
                    record.iteration_index,
                    record.action_command,
                    record.started_at,
                    record.completed_at,
                    record.duration_seconds,
                    record.motion_detected,
                    record.subtitles_detected,
                    record.audio_detected,
                    record.zapping_detected,
                    languages_json,
                    texts_json,
                    record.bf_duration_ms,
                    record.detection_method,
                    record.channel_name,
                    record.channel_number,
                    record.program_name,
                    record.program_start_time,
                    record.program_end_time,
                ],
            )
            .map_err(|err| VptError::Io(err.to_string()))?;
        Ok(zap_result_id)
    }
}

// ============================================================================
// SECTION: Schema / helpers
// ============================================================================

/// Applies connection-level pragmas (`busy_timeout`, `journal_mode`,
/// `foreign_keys`).
fn configure_connection(connection: &Connection, config: &SqliteStoreConfig) -> Result<(), VptError> {
    connection.pragma_update(None, "busy_timeout", config.busy_timeout_ms).map_err(|err| VptError::Io(err.to_string()))?;
    connection
        .pragma_update(None, "journal_mode", config.journal_mode.pragma_value())
        .map_err(|err| VptError::Io(err.to_string()))?;
    connection.pragma_update(None, "foreign_keys", true).map_err(|err| VptError::Io(err.to_string()))?;
    Ok(())
}

/// Creates the store's tables if they do not already exist.
fn initialize_schema(connection: &Connection) -> Result<(), VptError> {
    connection
        .execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS schema_meta (version INTEGER NOT NULL);
            INSERT INTO schema_meta (version)
                SELECT {SCHEMA_VERSION} WHERE NOT EXISTS (SELECT 1 FROM schema_meta);

            CREATE TABLE IF NOT EXISTS trees (
                team_id TEXT NOT NULL,
                userinterface_name TEXT NOT NULL,
                tree_id TEXT NOT NULL,
                tree_json BLOB NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (team_id, userinterface_name, tree_id)
            );

            CREATE TABLE IF NOT EXISTS script_results (
                script_result_id TEXT PRIMARY KEY,
                team_id TEXT NOT NULL,
                script_name TEXT NOT NULL,
                script_type TEXT NOT NULL,
                userinterface_name TEXT,
                host_name TEXT NOT NULL,
                device_name TEXT NOT NULL,
                started_at INTEGER NOT NULL,
                success INTEGER,
                execution_time_ms INTEGER,
                html_report_url TEXT,
                logs_url TEXT,
                error_msg TEXT,
                metadata_json BLOB
            );

            CREATE TABLE IF NOT EXISTS edge_executions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                team_id TEXT NOT NULL,
                tree_id TEXT NOT NULL,
                edge_id TEXT NOT NULL,
                host_name TEXT NOT NULL,
                device_model TEXT NOT NULL,
                device_name TEXT NOT NULL,
                success INTEGER NOT NULL,
                execution_time_ms INTEGER NOT NULL,
                message TEXT NOT NULL,
                error_details_json BLOB,
                script_result_id TEXT,
                script_context_json BLOB,
                action_set_id TEXT,
                recorded_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS node_executions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                team_id TEXT NOT NULL,
                tree_id TEXT NOT NULL,
                node_id TEXT NOT NULL,
                host_name TEXT NOT NULL,
                device_model TEXT NOT NULL,
                device_name TEXT NOT NULL,
                success INTEGER NOT NULL,
                execution_time_ms INTEGER NOT NULL,
                message TEXT NOT NULL,
                error_details_json BLOB,
                script_result_id TEXT,
                script_context_json BLOB,
                recorded_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS zap_iterations (
                zap_result_id TEXT PRIMARY KEY,
                script_result_id TEXT,
                team_id TEXT NOT NULL,
                host_name TEXT NOT NULL,
                device_name TEXT NOT NULL,
                device_model TEXT NOT NULL,
                userinterface_name TEXT NOT NULL,
                iteration_index INTEGER NOT NULL,
                action_command TEXT NOT NULL,
                started_at INTEGER NOT NULL,
                completed_at INTEGER NOT NULL,
                duration_seconds REAL NOT NULL,
                motion_detected INTEGER NOT NULL,
                subtitles_detected INTEGER NOT NULL,
                audio_detected INTEGER NOT NULL,
                zapping_detected INTEGER NOT NULL,
                languages_json BLOB NOT NULL,
                texts_json BLOB NOT NULL,
                bf_duration_ms INTEGER,
                detection_method TEXT,
                channel_name TEXT,
                channel_number TEXT,
                program_name TEXT,
                program_start_time TEXT,
                program_end_time TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_edge_executions_tree
                ON edge_executions (team_id, tree_id, edge_id);
            CREATE INDEX IF NOT EXISTS idx_node_executions_tree
                ON node_executions (team_id, tree_id, node_id);
            CREATE INDEX IF NOT EXISTS idx_zap_iterations_script
                ON zap_iterations (script_result_id);
            "
        ))
        .map_err(|err| VptError::Io(err.to_string()))?;
    Ok(())
}

/// Locks the shared connection, recovering from mutex poisoning the same
/// way the rest of this workspace does: a poisoned lock still holds a
/// usable connection, since a prior panicking reader/writer does not
/// corrupt `SQLite`'s own on-disk state.
fn lock(connection: &Arc<Mutex<Connection>>) -> MutexGuard<'_, Connection> {
    connection.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Returns the current unix time in milliseconds.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, reason = "millisecond unix time does not overflow i64 until year 292 million")]
fn unix_millis() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|duration| duration.as_millis() as i64).unwrap_or_default()
}
