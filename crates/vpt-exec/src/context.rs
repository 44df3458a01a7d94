// crates/vpt-exec/src/context.rs
// ============================================================================
// Module: Execution Context
// Description: The shared per-device environment threaded through the
//              Action/Verification/Navigation executors (§4.4-§4.6).
// Purpose: Carry tenant scope, durable-storage/object-store handles, the
//          device's capture paths, and its mutable navigation context
//          without every executor method taking a dozen positional args.
// Dependencies: vpt-core
// ============================================================================

//! ## Overview
//! `ExecutionContext` is built once per script run by the host application
//! (typically inside `DeviceHandle`) and borrowed mutably by every executor
//! call. It owns no controllers itself — those live in
//! `vpt_controllers::ControllerRegistry`, held separately by `DeviceHandle`
//! and passed to the executors that need it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use vpt_core::DeviceId;
use vpt_core::DeviceModel;
use vpt_core::ExecutionRecorder;
use vpt_core::HostName;
use vpt_core::NavigationContext;
use vpt_core::TeamId;
use vpt_core::UserInterfaceName;

// ============================================================================
// SECTION: ExecutionContext
// ============================================================================

/// The per-device environment shared by every executor call.
pub struct ExecutionContext<'a> {
    /// Tenant scope.
    pub team_id: &'a TeamId,
    /// Host running the script subprocess.
    pub host_name: &'a HostName,
    /// Device model under test.
    pub device_model: &'a DeviceModel,
    /// Device identifier under test.
    pub device_id: &'a DeviceId,
    /// The user interface under test.
    pub userinterface_name: &'a UserInterfaceName,
    /// Root of the device's capture directory tree (hot storage).
    pub capture_root: &'a str,
    /// Durable-storage write path, when execution records should be kept.
    pub recorder: Option<&'a dyn ExecutionRecorder>,
    /// The device's mutable navigation position and bookkeeping.
    pub navigation: &'a mut NavigationContext,
}

impl ExecutionContext<'_> {
    /// Returns the `<capture_root>/metadata` directory as an owned path string.
    #[must_use]
    pub fn metadata_dir(&self) -> String {
        format!("{}/metadata", self.capture_root.trim_end_matches('/'))
    }

    /// Returns the `last_action.json` path (§6 "Capture-monitor contract").
    #[must_use]
    pub fn last_action_path(&self) -> String {
        format!("{}/last_action.json", self.metadata_dir())
    }

    /// Returns the `last_zapping.json` path (§6 "Capture-monitor contract").
    #[must_use]
    pub fn last_zapping_path(&self) -> String {
        format!("{}/last_zapping.json", self.metadata_dir())
    }
}
