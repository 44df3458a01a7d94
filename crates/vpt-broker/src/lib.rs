// crates/vpt-broker/src/lib.rs
// ============================================================================
// Crate: vpt-broker
// Description: ObjectStore implementations for R2-compatible object storage
//              and a local/test substitute, plus the well-known key layout.
// Purpose: Durable off-box storage for reference images, navigation
//          snapshots, script reports, screenshots, and audio analysis (§6).
// Dependencies: vpt-core, reqwest, sha2, hmac, time
// ============================================================================

//! ## Overview
//! [`R2ObjectStore`] is the production [`vpt_core::ObjectStore`]: a
//! SigV4-signed client for Cloudflare R2's S3-compatible API.
//! [`LocalObjectStore`] is a filesystem-backed substitute for development
//! and tests. [`well_known`] builds the fixed remote-key layout both
//! implementations (and any other `ObjectStore`) are expected to honor.

pub mod local;
pub mod r2;
pub mod well_known;

pub use local::LocalObjectStore;
pub use r2::R2Config;
pub use r2::R2ObjectStore;
