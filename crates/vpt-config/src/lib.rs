// crates/vpt-config/src/lib.rs
// ============================================================================
// Crate: vpt-config
// Description: TOML-plus-environment `EngineConfig` loader (§1A ambient stack).
// Purpose: Fail-closed configuration for the script-subprocess CLI boundary.
// Dependencies: vpt-core, serde, toml, thiserror
// ============================================================================

//! ## Overview
//! [`EngineConfig`] is loaded once per script subprocess invocation: a TOML
//! file supplies defaults, then the environment variables listed in §6
//! (`PROJECT_ROOT`, `TEAM_ID`, `AI_SCRIPT_NAME`, and the four
//! `CLOUDFLARE_R2_*` variables) override them. Loading fails closed on any
//! path, size, encoding, or consistency violation rather than falling back
//! to defaults that could silently misroute execution records or credentials.

mod config;

pub use config::AI_SCRIPT_NAME_ENV_VAR;
pub use config::ConfigError;
pub use config::EngineConfig;
pub use config::ObjectStoreConfig;
pub use config::PROJECT_ROOT_ENV_VAR;
pub use config::R2Credentials;
pub use config::R2_ACCESS_KEY_ID_ENV_VAR;
pub use config::R2_ENDPOINT_ENV_VAR;
pub use config::R2_PUBLIC_URL_ENV_VAR;
pub use config::R2_SECRET_ACCESS_KEY_ENV_VAR;
pub use config::StorageConfig;
pub use config::TEAM_ID_ENV_VAR;
