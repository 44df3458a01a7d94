// crates/vpt-cli/src/commands/mod.rs
// ============================================================================
// Module: Script Commands
// Description: The `goto`/`fullzap` command handlers (§6 "CLI surface
//              (scripts)").
// Purpose: Drive a `DeviceHandle` end to end and produce a `ScriptSummary`,
//          kept as plain functions so they are callable directly from tests
//          without spawning the binary.
// Dependencies: vpt-exec, crate::report
// ============================================================================

pub mod fullzap;
pub mod goto;

use crate::report::ScriptSummary;

/// The outcome of running one script command (§7 "User-visible failure").
pub struct CommandOutcome {
    /// Whether the whole run succeeded.
    pub success: bool,
    /// Error message, when `success` is false.
    pub error_msg: Option<String>,
    /// The plain-text/HTML summary ready for `report::publish`.
    pub summary: ScriptSummary,
}
