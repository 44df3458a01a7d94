// crates/vpt-controllers/src/block.rs
// ============================================================================
// Module: Standard Block Registry
// Description: In-process registry for `standard_block` actions (§4.4
//              Dispatch, last bullet).
// Purpose: Let a host process register deterministic, built-in command
//          handlers that need no external controller round trip.
// Dependencies: vpt-core
// ============================================================================

//! ## Overview
//! `BlockRegistry` holds named closures keyed by command, resolved
//! deterministically with no network or filesystem access, applied here
//! to in-process command handlers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::Value;
use vpt_core::ActionController;
use vpt_core::ControllerResult;
use vpt_core::VptError;

// ============================================================================
// SECTION: BlockRegistry
// ============================================================================

/// A single registered block handler.
type BlockFn = Box<dyn Fn(&BTreeMap<String, Value>) -> ControllerResult + Send + Sync>;

/// In-process registry of `standard_block` command handlers.
pub struct BlockRegistry {
    /// Registered handlers keyed by command name.
    handlers: BTreeMap<String, BlockFn>,
}

impl BlockRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { handlers: BTreeMap::new() }
    }

    /// Registers a handler under `command`, replacing any prior handler of
    /// the same name.
    pub fn register(
        &mut self,
        command: impl Into<String>,
        handler: impl Fn(&BTreeMap<String, Value>) -> ControllerResult + Send + Sync + 'static,
    ) {
        self.handlers.insert(command.into(), Box::new(handler));
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionController for BlockRegistry {
    fn execute_command(
        &self,
        command: &str,
        params: &BTreeMap<String, Value>,
    ) -> Result<ControllerResult, VptError> {
        let Some(handler) = self.handlers.get(command) else {
            return Err(VptError::Controller(format!("no block registered for '{command}'")));
        };
        Ok(handler(params))
    }

    fn available_actions(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

#[cfg(test)]
#[allow(clippy::missing_docs_in_private_items, reason = "test helpers are self-explanatory from their names")]
mod tests {
    use super::*;

    #[test]
    fn unregistered_command_is_a_controller_error() {
        let registry = BlockRegistry::new();
        let result = registry.execute_command("noop", &BTreeMap::new());
        assert!(matches!(result, Err(VptError::Controller(_))));
    }

    #[test]
    fn registered_handler_runs_and_is_listed() -> Result<(), VptError> {
        let mut registry = BlockRegistry::new();
        registry.register("noop", |_params| ControllerResult {
            success: true,
            ..ControllerResult::default()
        });
        let result = registry.execute_command("noop", &BTreeMap::new())?;
        assert!(result.success);
        assert_eq!(registry.available_actions(), vec!["noop".to_string()]);
        Ok(())
    }
}
