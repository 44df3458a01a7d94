// crates/vpt-exec/src/io.rs
// ============================================================================
// Module: Capture Filesystem IO
// Description: Atomic JSON writes, hot/cold screenshot mirroring, and JSON
//              reads against the device capture root (§4.8, §4.9, §6
//              "Capture-monitor contract").
// Purpose: Give every executor the same small set of filesystem primitives
//          instead of each one hand-rolling write-then-rename.
// Dependencies: serde_json, vpt-core
// ============================================================================

//! ## Overview
//! Every write here follows the write-to-sibling-then-rename pattern used for
//! durable artifact writes elsewhere in this workspace, so a crash mid-write
//! never leaves a half-written `last_action.json` or running-log file for a
//! concurrent reader to observe.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde_json::Value;
use vpt_core::VptError;

// ============================================================================
// SECTION: Atomic JSON write
// ============================================================================

/// Serializes `value` to `path` using a temporary sibling file and an atomic
/// rename, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`VptError::Io`] when the write, rename, or directory creation
/// fails, and [`VptError::Serialization`] when `value` cannot be encoded.
pub fn write_json_atomic(path: &Path, value: &Value) -> Result<(), VptError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| VptError::Io(err.to_string()))?;
    }
    let bytes = serde_json::to_vec_pretty(value).map_err(|err| VptError::Serialization(err.to_string()))?;
    let temp_path = temp_sibling(path);
    fs::write(&temp_path, &bytes).map_err(|err| VptError::Io(err.to_string()))?;
    fs::rename(&temp_path, path).map_err(|err| {
        let _ = fs::remove_file(&temp_path);
        VptError::Io(err.to_string())
    })
}

/// Builds a `.tmp-<pid>` sibling path for an atomic write target.
fn temp_sibling(path: &Path) -> PathBuf {
    let file_name = path.file_name().map_or_else(|| "tmp".into(), |name| name.to_string_lossy().into_owned());
    let temp_name = format!(".tmp-{file_name}.{}", std::process::id());
    path.with_file_name(temp_name)
}

// ============================================================================
// SECTION: JSON reads
// ============================================================================

/// Reads and parses a JSON file, returning `None` when it does not exist.
///
/// # Errors
///
/// Returns [`VptError::Io`] for any read failure other than "not found", and
/// [`VptError::Serialization`] when the contents are not valid JSON.
pub fn read_json(path: &Path) -> Result<Option<Value>, VptError> {
    match fs::read(path) {
        Ok(bytes) => {
            serde_json::from_slice(&bytes).map(Some).map_err(|err| VptError::Serialization(err.to_string()))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(VptError::Io(err.to_string())),
    }
}

/// Lists files directly under `dir` matching `suffix`, most-recently-modified
/// first, capped at `limit` (§4.7 "last 3 analysis JSONs").
///
/// # Errors
///
/// Returns [`VptError::Io`] when the directory cannot be listed.
pub fn newest_matching(dir: &Path, suffix: &str, limit: usize) -> Result<Vec<PathBuf>, VptError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(VptError::Io(err.to_string())),
    };

    let mut candidates: Vec<(std::time::SystemTime, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| VptError::Io(err.to_string()))?;
        let path = entry.path();
        if path.file_name().and_then(|name| name.to_str()).is_some_and(|name| name.ends_with(suffix)) {
            let modified = entry.metadata().and_then(|meta| meta.modified()).unwrap_or(std::time::UNIX_EPOCH);
            candidates.push((modified, path));
        }
    }
    candidates.sort_by(|left, right| right.0.cmp(&left.0));
    candidates.truncate(limit);
    Ok(candidates.into_iter().map(|(_, path)| path).collect())
}

// ============================================================================
// SECTION: Hot/cold screenshot mirroring
// ============================================================================

/// Mirrors a `/hot/`-rooted path to its cold counterpart by copying the file
/// to the same path with `/hot/` removed, returning the cold path (§4.8
/// "Screenshot list management").
///
/// Returns `None` without error when `hot_path` does not contain a `/hot/`
/// segment (nothing to mirror) or when the copy fails; mirroring is
/// best-effort, matching the non-fatal capture policy of §4.9.
#[must_use]
pub fn mirror_hot_to_cold(hot_path: &str) -> Option<String> {
    let cold_path = hot_path.replacen("/hot/", "/", 1);
    if cold_path == hot_path {
        return None;
    }
    if let Some(parent) = Path::new(&cold_path).parent() {
        fs::create_dir_all(parent).ok()?;
    }
    fs::copy(hot_path, &cold_path).ok()?;
    Some(cold_path)
}

#[cfg(test)]
#[allow(clippy::missing_docs_in_private_items, reason = "test helpers are self-explanatory from their names")]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn atomic_write_then_read_round_trips() -> Result<(), VptError> {
        let dir = tempdir().map_err(|err| VptError::Io(err.to_string()))?;
        let path = dir.path().join("nested").join("last_action.json");
        write_json_atomic(&path, &json!({"command": "press"}))?;
        let read_back = read_json(&path)?;
        assert_eq!(read_back, Some(json!({"command": "press"})));
        Ok(())
    }

    #[test]
    fn missing_file_reads_as_none() -> Result<(), VptError> {
        let dir = tempdir().map_err(|err| VptError::Io(err.to_string()))?;
        let path = dir.path().join("absent.json");
        assert_eq!(read_json(&path)?, None);
        Ok(())
    }

    #[test]
    fn mirror_without_hot_segment_is_none() {
        assert_eq!(mirror_hot_to_cold("/captures/cold/frame.jpg"), None);
    }

    #[test]
    fn mirror_copies_to_cold_sibling() -> Result<(), VptError> {
        let dir = tempdir().map_err(|err| VptError::Io(err.to_string()))?;
        let hot_dir = dir.path().join("hot");
        fs::create_dir_all(&hot_dir).map_err(|err| VptError::Io(err.to_string()))?;
        let hot_path = hot_dir.join("frame.jpg");
        fs::write(&hot_path, b"jpeg-bytes").map_err(|err| VptError::Io(err.to_string()))?;
        let hot_path_str = hot_path.to_string_lossy().into_owned();
        assert!(hot_path_str.contains("/hot/"));
        let cold = mirror_hot_to_cold(&hot_path_str);
        assert!(cold.is_some_and(|path| !path.contains("/hot/")));
        Ok(())
    }
}
