// crates/vpt-controllers/src/registry.rs
// ============================================================================
// Module: Controller Registry
// Description: Typed controller slots plus priority-list command routing
//              with a per-process command->controller cache (§4.4 Dispatch,
//              §9 "Dynamic per-controller routing").
// Purpose: Let ActionExecutor route a bare command to the right controller
//          without knowing ahead of time which one owns it.
// Dependencies: vpt-core
// ============================================================================

//! ## Overview
//! `ControllerRegistry` holds one optional slot per action-controller role
//! (remote, web, desktop, power) plus an `av` slot, a map of verification
//! controllers keyed by verification type, and a [`BlockRegistry`] for
//! `standard_block` commands. `resolve_route` walks the fixed priority list
//! from §4.4 once per unseen command — `verification_*` before `remote`,
//! then `web`, `desktop`, `av`, `power` — and remembers the answer in a
//! process-wide cache so repeat dispatch for the same command is a single
//! map lookup.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::RwLock;

use vpt_core::ActionController;
use vpt_core::AvController;
use vpt_core::PowerController;
use vpt_core::VerificationController;
use vpt_core::VptError;

use crate::block::BlockRegistry;

/// Commands the `av` controller owns directly, outside the verification and
/// remote/web/desktop/power routing tables.
const AV_COMMANDS: [&str; 2] = ["take_screenshot", "take_video_for_report"];

/// Commands the `power` controller owns directly.
const POWER_COMMANDS: [&str; 3] = ["power_on", "power_off", "reboot"];

// ============================================================================
// SECTION: ActionRoute
// ============================================================================

/// The controller role that owns a dispatched command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRoute {
    /// A verification controller, identified by its verification type
    /// (`image`, `text`, `adb`, `appium`, `video`, `audio`).
    Verification(String),
    /// The remote (set-top-box/TV) controller.
    Remote,
    /// The web controller.
    Web,
    /// The desktop controller (bash or pyautogui sub-controller).
    Desktop,
    /// The audio/video capture controller.
    Av,
    /// The power controller.
    Power,
    /// The in-process standard-block registry.
    StandardBlock,
}

impl ActionRoute {
    /// Parses an explicit `action_type` tag, when the caller already knows
    /// it (§3 `Action.action_type`). Returns `None` for `"verification"` and
    /// any unrecognized tag, since those still require priority-list
    /// detection to pick the concrete controller.
    #[must_use]
    pub fn from_explicit_tag(action_type: &str) -> Option<Self> {
        match action_type {
            "remote" => Some(Self::Remote),
            "web" => Some(Self::Web),
            "desktop" => Some(Self::Desktop),
            "power" => Some(Self::Power),
            "standard_block" => Some(Self::StandardBlock),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: ControllerRegistry
// ============================================================================

/// Device-attached controller set plus dispatch-by-priority routing.
pub struct ControllerRegistry {
    /// The remote (set-top-box/TV) action controller, if attached.
    remote: Option<Box<dyn ActionController + Send + Sync>>,
    /// The web action controller, if attached.
    web: Option<Box<dyn ActionController + Send + Sync>>,
    /// The desktop action controller (bash or pyautogui), if attached.
    desktop: Option<Box<dyn ActionController + Send + Sync>>,
    /// The audio/video capture controller, if attached.
    av: Option<Box<dyn AvController + Send + Sync>>,
    /// The power controller, if attached.
    power: Option<Box<dyn PowerController + Send + Sync>>,
    /// Verification controllers keyed by verification type.
    verification: BTreeMap<String, Box<dyn VerificationController + Send + Sync>>,
    /// In-process handlers for `standard_block` commands.
    block: BlockRegistry,
    /// Per-process cache of previously resolved command routes.
    route_cache: RwLock<BTreeMap<String, ActionRoute>>,
}

impl ControllerRegistry {
    /// Creates an empty registry with no controllers attached.
    #[must_use]
    pub fn new() -> Self {
        Self {
            remote: None,
            web: None,
            desktop: None,
            av: None,
            power: None,
            verification: BTreeMap::new(),
            block: BlockRegistry::new(),
            route_cache: RwLock::new(BTreeMap::new()),
        }
    }

    /// Attaches the remote controller.
    pub fn with_remote(mut self, controller: impl ActionController + Send + Sync + 'static) -> Self {
        self.remote = Some(Box::new(controller));
        self
    }

    /// Attaches the web controller.
    pub fn with_web(mut self, controller: impl ActionController + Send + Sync + 'static) -> Self {
        self.web = Some(Box::new(controller));
        self
    }

    /// Attaches the desktop controller.
    pub fn with_desktop(mut self, controller: impl ActionController + Send + Sync + 'static) -> Self {
        self.desktop = Some(Box::new(controller));
        self
    }

    /// Attaches the audio/video capture controller.
    pub fn with_av(mut self, controller: impl AvController + Send + Sync + 'static) -> Self {
        self.av = Some(Box::new(controller));
        self
    }

    /// Attaches the power controller.
    pub fn with_power(mut self, controller: impl PowerController + Send + Sync + 'static) -> Self {
        self.power = Some(Box::new(controller));
        self
    }

    /// Attaches a verification controller under `verification_type`.
    pub fn with_verification(
        mut self,
        verification_type: impl Into<String>,
        controller: impl VerificationController + Send + Sync + 'static,
    ) -> Self {
        self.verification.insert(verification_type.into(), Box::new(controller));
        self
    }

    /// Registers a `standard_block` command handler.
    pub fn register_block(
        &mut self,
        command: impl Into<String>,
        handler: impl Fn(&std::collections::BTreeMap<String, serde_json::Value>) -> vpt_core::ControllerResult
            + Send
            + Sync
            + 'static,
    ) {
        self.block.register(command, handler);
    }

    /// Returns the verification controller registered for `verification_type`.
    #[must_use]
    pub fn verification(&self, verification_type: &str) -> Option<&(dyn VerificationController + Send + Sync)> {
        self.verification.get(verification_type).map(AsRef::as_ref)
    }

    /// Returns the attached remote controller, if any.
    #[must_use]
    pub fn remote(&self) -> Option<&(dyn ActionController + Send + Sync)> {
        self.remote.as_deref()
    }

    /// Returns the attached web controller, if any.
    #[must_use]
    pub fn web(&self) -> Option<&(dyn ActionController + Send + Sync)> {
        self.web.as_deref()
    }

    /// Returns the attached desktop controller, if any.
    #[must_use]
    pub fn desktop(&self) -> Option<&(dyn ActionController + Send + Sync)> {
        self.desktop.as_deref()
    }

    /// Returns the attached audio/video controller, if any.
    #[must_use]
    pub fn av(&self) -> Option<&(dyn AvController + Send + Sync)> {
        self.av.as_deref()
    }

    /// Returns the attached power controller, if any.
    #[must_use]
    pub fn power(&self) -> Option<&(dyn PowerController + Send + Sync)> {
        self.power.as_deref()
    }

    /// Returns the in-process standard-block registry.
    #[must_use]
    pub const fn block(&self) -> &BlockRegistry {
        &self.block
    }

    /// Resolves the controller route for `command`, honoring an explicit
    /// `action_type` tag when given and otherwise walking the fixed
    /// priority list, caching the result per command (§4.4 "Dispatch").
    ///
    /// # Errors
    ///
    /// Returns [`VptError::Controller`] when no attached controller owns
    /// `command`.
    pub fn resolve_route(
        &self,
        command: &str,
        action_type: Option<&str>,
    ) -> Result<ActionRoute, VptError> {
        if let Some(tag) = action_type
            && let Some(route) = ActionRoute::from_explicit_tag(tag)
        {
            return Ok(route);
        }

        if let Some(route) = self.route_cache.read().unwrap_or_else(std::sync::PoisonError::into_inner).get(command)
        {
            return Ok(route.clone());
        }

        let route = self.detect_route(command)?;
        self.route_cache
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(command.to_string(), route.clone());
        Ok(route)
    }

    /// Walks the §4.4 priority list (`verification_*` before `remote`, then
    /// `web`, `desktop`, `av`, `power`) asking each attached controller
    /// whether it owns `command`.
    fn detect_route(&self, command: &str) -> Result<ActionRoute, VptError> {
        for (verification_type, controller) in &self.verification {
            if controller.available_verifications().iter().any(|owned| owned == command) {
                return Ok(ActionRoute::Verification(verification_type.clone()));
            }
        }
        if let Some(remote) = &self.remote
            && remote.available_actions().iter().any(|owned| owned == command)
        {
            return Ok(ActionRoute::Remote);
        }
        if let Some(web) = &self.web
            && web.available_actions().iter().any(|owned| owned == command)
        {
            return Ok(ActionRoute::Web);
        }
        if let Some(desktop) = &self.desktop
            && desktop.available_actions().iter().any(|owned| owned == command)
        {
            return Ok(ActionRoute::Desktop);
        }
        if self.av.is_some() && AV_COMMANDS.contains(&command) {
            return Ok(ActionRoute::Av);
        }
        if self.power.is_some() && POWER_COMMANDS.contains(&command) {
            return Ok(ActionRoute::Power);
        }
        if self.block.available_actions().iter().any(|owned| owned == command) {
            return Ok(ActionRoute::StandardBlock);
        }
        Err(VptError::Controller(format!("no controller owns command '{command}'")))
    }
}

impl Default for ControllerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A closure-backed [`ActionController`], used for illustrative/default
/// controllers and in unit tests (§9 "registry, not reflection" — named
/// commands, no dynamic capability discovery).
pub struct ClosureActionController {
    /// Commands this controller declares it owns.
    commands: BTreeSet<String>,
    /// The handler invoked for every owned command.
    handler: Box<
        dyn Fn(&str, &std::collections::BTreeMap<String, serde_json::Value>) -> vpt_core::ControllerResult
            + Send
            + Sync,
    >,
}

impl ClosureActionController {
    /// Builds a controller that owns exactly `commands`, dispatching every
    /// call to `handler`.
    #[must_use]
    pub fn new(
        commands: impl IntoIterator<Item = String>,
        handler: impl Fn(&str, &std::collections::BTreeMap<String, serde_json::Value>) -> vpt_core::ControllerResult
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self { commands: commands.into_iter().collect(), handler: Box::new(handler) }
    }
}

impl ActionController for ClosureActionController {
    fn execute_command(
        &self,
        command: &str,
        params: &std::collections::BTreeMap<String, serde_json::Value>,
    ) -> Result<vpt_core::ControllerResult, VptError> {
        if !self.commands.contains(command) {
            return Err(VptError::Controller(format!("command '{command}' not owned")));
        }
        Ok((self.handler)(command, params))
    }

    fn available_actions(&self) -> Vec<String> {
        self.commands.iter().cloned().collect()
    }
}

#[cfg(test)]
#[allow(clippy::missing_docs_in_private_items, reason = "test helpers are self-explanatory from their names")]
mod tests {
    use vpt_core::ControllerResult;
    use vpt_core::VerificationConfig;
    use vpt_core::VerificationOutcome;

    use super::*;

    fn ok_result() -> ControllerResult {
        ControllerResult { success: true, ..ControllerResult::default() }
    }

    struct StubVerificationController {
        owned: BTreeSet<String>,
    }

    impl VerificationController for StubVerificationController {
        fn execute_verification(
            &self,
            _config: &VerificationConfig<'_>,
        ) -> Result<VerificationOutcome, VptError> {
            Ok(VerificationOutcome { success: true, ..VerificationOutcome::default() })
        }

        fn available_verifications(&self) -> Vec<String> {
            self.owned.iter().cloned().collect()
        }
    }

    #[test]
    fn explicit_tag_short_circuits_detection() -> Result<(), VptError> {
        let registry = ControllerRegistry::new();
        let route = registry.resolve_route("anything", Some("power"))?;
        assert_eq!(route, ActionRoute::Power);
        Ok(())
    }

    #[test]
    fn priority_list_prefers_verification_over_remote() -> Result<(), VptError> {
        let registry = ControllerRegistry::new()
            .with_remote(ClosureActionController::new(["press".to_string()], |_, _| ok_result()))
            .with_verification(
                "image",
                StubVerificationController { owned: ["press".to_string()].into_iter().collect() },
            );
        let route = registry.resolve_route("press", None)?;
        assert_eq!(route, ActionRoute::Verification("image".to_string()));
        Ok(())
    }

    #[test]
    fn unresolved_command_is_a_controller_error() {
        let registry = ControllerRegistry::new();
        let result = registry.resolve_route("ghost", None);
        assert!(matches!(result, Err(VptError::Controller(_))));
    }

    #[test]
    fn detected_route_is_cached() -> Result<(), VptError> {
        let registry =
            ControllerRegistry::new().with_web(ClosureActionController::new(["tap".to_string()], |_, _| ok_result()));
        assert_eq!(registry.resolve_route("tap", None)?, ActionRoute::Web);
        assert_eq!(registry.resolve_route("tap", None)?, ActionRoute::Web);
        assert_eq!(
            registry.route_cache.read().unwrap_or_else(std::sync::PoisonError::into_inner).len(),
            1
        );
        Ok(())
    }
}
