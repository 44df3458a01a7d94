// crates/vpt-exec/src/screenshot.rs
// ============================================================================
// Module: Screenshot Pipeline
// Description: Best-effort screenshot capture plus hot-to-cold mirroring
//              (§4.9 "Screenshot pipeline").
// Purpose: Give every executor the same one-liner for "grab a screenshot if
//          we can, never let its failure abort the caller".
// Dependencies: vpt-core, crate::io
// ============================================================================

//! ## Overview
//! Screenshot capture is advisory everywhere it is called from: a missing
//! `av` controller or a capture failure silently yields `None` rather than
//! propagating an error, matching §4.9's "best-effort, failures never abort
//! parent operation" rule.

// ============================================================================
// SECTION: Imports
// ============================================================================

use tracing::debug;
use vpt_core::AvController;

use crate::io::mirror_hot_to_cold;

// ============================================================================
// SECTION: Capture
// ============================================================================

/// Captures a screenshot via `av`, mirrors it hot-to-cold, and returns the
/// hot path. Returns `None` when no controller is attached or capture fails.
#[must_use]
pub fn capture_screenshot(av: Option<&(dyn AvController + Send + Sync)>) -> Option<String> {
    let controller = av?;
    match controller.take_screenshot() {
        Ok(hot_path) => {
            let _ = mirror_hot_to_cold(&hot_path);
            Some(hot_path)
        }
        Err(err) => {
            debug!(error = %err, "screenshot capture failed, continuing without one");
            None
        }
    }
}
