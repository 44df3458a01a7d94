// crates/vpt-broker/src/local.rs
// ============================================================================
// Module: Local Filesystem Object Store
// Description: ObjectStore backed by a local directory tree.
// Purpose: Development and test substitute for R2ObjectStore, and the
//          backend used when no R2 credentials are configured.
// Dependencies: vpt-core, std
// ============================================================================

//! ## Overview
//! [`LocalObjectStore`] mirrors remote keys onto a local directory, the way
//! `vpt-exec`'s capture-root mirroring copies hot screenshots to cold
//! storage: plain `std::fs`, no sandboxing layer, since the root directory
//! is a trusted local path supplied by configuration, not user input.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use vpt_core::ObjectStore;
use vpt_core::UploadOutcome;
use vpt_core::UploadRequest;
use vpt_core::VptError;

/// Filesystem-backed [`ObjectStore`] rooted at a local directory.
///
/// # Invariants
/// - `root` is created on first use if it does not already exist.
pub struct LocalObjectStore {
    /// Root directory remote keys are mirrored under.
    root: PathBuf,
    /// Base URL used to build [`ObjectStore::get_public_url`] values.
    public_url_base: String,
}

impl LocalObjectStore {
    /// Creates a store rooted at `root`, serving public URLs under
    /// `public_url_base`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, public_url_base: impl Into<String>) -> Self {
        Self { root: root.into(), public_url_base: public_url_base.into() }
    }

    /// Resolves a remote key to its local filesystem path.
    fn resolve(&self, remote_path: &str) -> PathBuf {
        self.root.join(remote_path)
    }
}

impl ObjectStore for LocalObjectStore {
    fn upload_files(&self, requests: &[UploadRequest]) -> Result<UploadOutcome, VptError> {
        let mut outcome = UploadOutcome::default();
        for request in requests {
            match copy_one(&self.root, request) {
                Ok(()) => outcome.uploaded_files.push((request.local_path.clone(), self.get_public_url(&request.remote_path))),
                Err(_) => outcome.failed_uploads.push(request.local_path.clone()),
            }
        }
        Ok(outcome)
    }

    fn download_file(&self, remote_path: &str, local_path: &str) -> Result<(), VptError> {
        let source = self.resolve(remote_path);
        if let Some(parent) = Path::new(local_path).parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|err| VptError::Io(err.to_string()))?;
        }
        fs::copy(&source, local_path).map_err(|err| VptError::Io(err.to_string()))?;
        Ok(())
    }

    fn get_public_url(&self, remote_path: &str) -> String {
        format!("{}/{remote_path}", self.public_url_base)
    }
}

/// Copies one request's source file into the store root, creating parent
/// directories as needed.
fn copy_one(root: &Path, request: &UploadRequest) -> Result<(), std::io::Error> {
    let destination = root.join(&request.remote_path);
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(&request.local_path, &destination)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions are permitted to unwrap")]
#[allow(clippy::missing_docs_in_private_items, reason = "test helpers are self-explanatory from their names")]
mod tests {
    use super::*;

    #[test]
    fn upload_then_download_round_trips_bytes() {
        let source_dir = tempfile::tempdir().unwrap();
        let store_dir = tempfile::tempdir().unwrap();
        let source_path = source_dir.path().join("home.jpg");
        fs::write(&source_path, b"jpeg-bytes").unwrap();

        let store = LocalObjectStore::new(store_dir.path(), "https://public.example.com");
        let request = UploadRequest {
            local_path: source_path.to_string_lossy().to_string(),
            remote_path: "reference-images/x1/home.jpg".to_string(),
            content_type: Some("image/jpeg".to_string()),
        };
        let outcome = store.upload_files(std::slice::from_ref(&request)).unwrap();
        assert_eq!(outcome.uploaded_files.len(), 1);
        assert!(outcome.failed_uploads.is_empty());

        let download_path = source_dir.path().join("downloaded.jpg");
        store.download_file("reference-images/x1/home.jpg", download_path.to_str().unwrap()).unwrap();
        assert_eq!(fs::read(download_path).unwrap(), b"jpeg-bytes");
    }

    #[test]
    fn upload_of_missing_file_is_reported_as_failure_not_error() {
        let store_dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(store_dir.path(), "https://public.example.com");
        let request = UploadRequest { local_path: "/nonexistent/path.jpg".to_string(), remote_path: "x.jpg".to_string(), content_type: None };
        let outcome = store.upload_files(std::slice::from_ref(&request)).unwrap();
        assert!(outcome.uploaded_files.is_empty());
        assert_eq!(outcome.failed_uploads, vec!["/nonexistent/path.jpg".to_string()]);
    }

    #[test]
    fn public_url_joins_base_and_remote_path() {
        let store = LocalObjectStore::new("/tmp/store", "https://public.example.com");
        assert_eq!(store.get_public_url("navigation/x1/home.jpg"), "https://public.example.com/navigation/x1/home.jpg");
    }
}
