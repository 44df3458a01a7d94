// crates/vpt-broker/tests/object_store.rs
// ============================================================================
// Module: Object Store Integration Tests
// Description: End-to-end exercises of LocalObjectStore against the
//              well-known key layout, through the crate's public API only.
// ============================================================================

#![allow(clippy::unwrap_used, reason = "test-only assertions and fixtures are permitted to unwrap")]
#![allow(clippy::missing_docs_in_private_items, reason = "test helpers are self-explanatory from their names")]

use std::fs;

use vpt_broker::LocalObjectStore;
use vpt_broker::well_known::ReferenceImageVariant;
use vpt_broker::well_known::navigation_image_key;
use vpt_broker::well_known::reference_image_key;
use vpt_broker::well_known::script_screenshot_key;
use vpt_core::ObjectStore;
use vpt_core::UploadRequest;

#[test]
fn reference_image_variants_upload_under_distinct_keys() {
    let source_dir = tempfile::tempdir().unwrap();
    let store_dir = tempfile::tempdir().unwrap();
    let store = LocalObjectStore::new(store_dir.path(), "https://public.example.com");

    let original_path = source_dir.path().join("home.jpg");
    let greyscale_path = source_dir.path().join("home_grey.jpg");
    fs::write(&original_path, b"original-bytes").unwrap();
    fs::write(&greyscale_path, b"greyscale-bytes").unwrap();

    let requests = vec![
        UploadRequest {
            local_path: original_path.to_string_lossy().to_string(),
            remote_path: reference_image_key("x1", "home", ReferenceImageVariant::Original),
            content_type: Some("image/jpeg".to_string()),
        },
        UploadRequest {
            local_path: greyscale_path.to_string_lossy().to_string(),
            remote_path: reference_image_key("x1", "home", ReferenceImageVariant::Greyscale),
            content_type: Some("image/jpeg".to_string()),
        },
    ];
    let outcome = store.upload_files(&requests).unwrap();
    assert_eq!(outcome.uploaded_files.len(), 2);
    assert!(outcome.uploaded_files.iter().any(|(_, url)| url.ends_with("reference-images/x1/home.jpg")));
    assert!(outcome.uploaded_files.iter().any(|(_, url)| url.ends_with("reference-images/x1/home_greyscale.jpg")));
}

#[test]
fn navigation_and_screenshot_keys_round_trip_through_a_real_store() {
    let source_dir = tempfile::tempdir().unwrap();
    let store_dir = tempfile::tempdir().unwrap();
    let store = LocalObjectStore::new(store_dir.path(), "https://public.example.com");

    let screenshot_path = source_dir.path().join("shot.png");
    fs::write(&screenshot_path, b"png-bytes").unwrap();

    let remote_path = script_screenshot_key("device-1", "shot.png");
    store
        .upload_files(&[UploadRequest { local_path: screenshot_path.to_string_lossy().to_string(), remote_path: remote_path.clone(), content_type: None }])
        .unwrap();

    let download_path = source_dir.path().join("redownloaded.png");
    store.download_file(&remote_path, download_path.to_str().unwrap()).unwrap();
    assert_eq!(fs::read(download_path).unwrap(), b"png-bytes");

    assert_eq!(navigation_image_key("x1", "home"), "navigation/x1/home.jpg");
}
