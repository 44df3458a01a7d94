// crates/vpt-config/src/config.rs
// ============================================================================
// Module: Engine Configuration
// Description: TOML-plus-environment configuration loading and validation.
// Purpose: Fail-closed config parsing with hard size/path limits (§1A).
// Dependencies: vpt-core, serde, toml, thiserror
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing or invalid configuration fails closed: a script subprocess should
//! refuse to start rather than run with silently-defaulted credentials.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::Deserialize;
use thiserror::Error;
use vpt_core::TeamId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "vpt.toml";
/// Environment variable used to override the config file path.
pub(crate) const CONFIG_PATH_ENV_VAR: &str = "VPT_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default relative path for the SQLite execution-record store.
const DEFAULT_SQLITE_PATH: &str = "vpt.db";

/// Environment variable holding the capture-root / project root directory.
pub const PROJECT_ROOT_ENV_VAR: &str = "PROJECT_ROOT";
/// Environment variable holding the owning team id.
pub const TEAM_ID_ENV_VAR: &str = "TEAM_ID";
/// Environment variable redirecting script execution to an AI-generated test case.
pub const AI_SCRIPT_NAME_ENV_VAR: &str = "AI_SCRIPT_NAME";
/// Environment variable holding the R2 (or S3-compatible) endpoint.
pub const R2_ENDPOINT_ENV_VAR: &str = "CLOUDFLARE_R2_ENDPOINT";
/// Environment variable holding the R2 access key id.
pub const R2_ACCESS_KEY_ID_ENV_VAR: &str = "CLOUDFLARE_R2_ACCESS_KEY_ID";
/// Environment variable holding the R2 secret access key.
pub const R2_SECRET_ACCESS_KEY_ENV_VAR: &str = "CLOUDFLARE_R2_SECRET_ACCESS_KEY";
/// Environment variable holding the public URL base for uploaded objects.
pub const R2_PUBLIC_URL_ENV_VAR: &str = "CLOUDFLARE_R2_PUBLIC_URL";

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Execution-record storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the `SQLite` database file, relative to `project_root` unless absolute.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { sqlite_path: default_sqlite_path() }
    }
}

/// Default relative path for the `SQLite` store.
fn default_sqlite_path() -> PathBuf {
    PathBuf::from(DEFAULT_SQLITE_PATH)
}

/// Object-store configuration. R2 credentials arrive only from the
/// environment (§6); this section carries what TOML is allowed to set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectStoreConfig {
    /// R2 bucket name, required when R2 credentials are present in the environment.
    #[serde(default)]
    pub bucket: Option<String>,
    /// Local filesystem root used as a development/test substitute for R2.
    #[serde(default)]
    pub local_root: Option<PathBuf>,
    /// Public URL base advertised for objects written to `local_root`.
    #[serde(default)]
    pub local_public_url_base: Option<String>,
}

/// R2 credentials resolved from the environment. Never read from TOML.
#[derive(Debug, Clone)]
pub struct R2Credentials {
    /// R2-compatible S3 endpoint.
    pub endpoint: String,
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Public URL base for uploaded objects.
    pub public_url_base: String,
}

/// Engine configuration loaded from TOML and the process environment.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Capture-root / working directory for this engine instance.
    #[serde(default)]
    project_root: Option<PathBuf>,
    /// Owning team id, scoping every tree and execution record.
    #[serde(default)]
    team_id: Option<String>,
    /// When set, redirects script execution to an AI-generated test case.
    #[serde(default)]
    pub ai_script_name: Option<String>,
    /// Execution-record storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Object-store configuration.
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
    /// R2 credentials, populated from the environment after load (never from TOML).
    #[serde(skip)]
    pub r2: Option<R2Credentials>,
    /// Modification time of the loaded config file, if any.
    #[serde(skip)]
    pub source_modified_at: Option<SystemTime>,
}

impl EngineConfig {
    /// Loads configuration from disk, applies environment overrides, and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading, parsing, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.source_modified_at = fs::metadata(&resolved).and_then(|meta| meta.modified()).ok();
        config.apply_env_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from an in-memory TOML string, applying the same
    /// environment overrides and validation as [`Self::load`]. Used by tests
    /// and by callers that have already resolved the file themselves.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Self::from_toml_str_with_lookup(content, |key| env::var(key).ok())
    }

    /// Parses and validates configuration, sourcing environment overrides
    /// from `lookup` rather than the real process environment. Exists so
    /// tests can exercise [`Self::apply_env_overrides`] without touching
    /// global process state.
    fn from_toml_str_with_lookup(
        content: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.apply_env_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Applies the environment-variable overrides listed in §6.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup(PROJECT_ROOT_ENV_VAR) {
            self.project_root = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup(TEAM_ID_ENV_VAR) {
            self.team_id = Some(value);
        }
        if let Some(value) = lookup(AI_SCRIPT_NAME_ENV_VAR) {
            self.ai_script_name = Some(value);
        }
        let endpoint = lookup(R2_ENDPOINT_ENV_VAR);
        let access_key_id = lookup(R2_ACCESS_KEY_ID_ENV_VAR);
        let secret_access_key = lookup(R2_SECRET_ACCESS_KEY_ENV_VAR);
        let public_url_base = lookup(R2_PUBLIC_URL_ENV_VAR);
        if let (Some(endpoint), Some(access_key_id), Some(secret_access_key), Some(public_url_base)) =
            (endpoint, access_key_id, secret_access_key, public_url_base)
        {
            self.r2 = Some(R2Credentials { endpoint, access_key_id, secret_access_key, public_url_base });
        }
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    fn validate(&self) -> Result<(), ConfigError> {
        let project_root = self
            .project_root
            .as_ref()
            .ok_or_else(|| ConfigError::Invalid("project_root is required (set PROJECT_ROOT)".to_string()))?;
        validate_path_string("project_root", &project_root.to_string_lossy())?;

        let team_id = self
            .team_id
            .as_ref()
            .ok_or_else(|| ConfigError::Invalid("team_id is required (set TEAM_ID)".to_string()))?;
        if team_id.trim().is_empty() {
            return Err(ConfigError::Invalid("team_id must be non-empty".to_string()));
        }

        validate_path_string("storage.sqlite_path", &self.storage.sqlite_path.to_string_lossy())?;

        if self.r2.is_some() {
            let bucket = self.object_store.bucket.as_deref().unwrap_or_default();
            if bucket.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "object_store.bucket is required when R2 credentials are configured".to_string(),
                ));
            }
        } else if let Some(local_root) = &self.object_store.local_root {
            validate_path_string("object_store.local_root", &local_root.to_string_lossy())?;
        }
        Ok(())
    }

    /// Returns the resolved project root directory.
    ///
    /// # Panics
    ///
    /// Never panics on a validated config; `project_root` is guaranteed
    /// present by [`Self::validate`].
    #[must_use]
    pub fn project_root(&self) -> &Path {
        self.project_root.as_deref().unwrap_or_else(|| Path::new("."))
    }

    /// Returns the resolved team id.
    #[must_use]
    pub fn team_id(&self) -> TeamId {
        TeamId::new(self.team_id.clone().unwrap_or_default())
    }

    /// Returns the resolved `SQLite` store path, relative to `project_root`
    /// unless `storage.sqlite_path` is itself absolute.
    #[must_use]
    pub fn resolved_sqlite_path(&self) -> PathBuf {
        if self.storage.sqlite_path.is_absolute() {
            self.storage.sqlite_path.clone()
        } else {
            self.project_root().join(&self.storage.sqlite_path)
        }
    }

    /// Returns true when R2 credentials were supplied via the environment.
    #[must_use]
    pub const fn uses_r2(&self) -> bool {
        self.r2.is_some()
    }
}

// ============================================================================
// SECTION: ConfigError
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_PATH_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    let path = Path::new(trimmed);
    for component in path.components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test helpers fail fast on setup errors")]
#[allow(clippy::missing_docs_in_private_items, reason = "test helpers are self-explanatory from their names")]
mod tests {
    use std::collections::HashMap;

    use super::*;

    /// Builds a lookup closure over a fixed set of synthetic environment
    /// values, so these tests never touch the real process environment.
    fn lookup_from(vars: &[(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<&'static str, &'static str> = vars.iter().copied().collect();
        move |key| map.get(key).map(|value| (*value).to_string())
    }

    #[test]
    fn missing_project_root_fails_closed() {
        let error = EngineConfig::from_toml_str_with_lookup("", lookup_from(&[])).unwrap_err();
        assert!(error.to_string().contains("project_root"));
    }

    #[test]
    fn project_root_and_team_id_come_from_environment() {
        let lookup = lookup_from(&[(PROJECT_ROOT_ENV_VAR, "/srv/vpt"), (TEAM_ID_ENV_VAR, "team-1")]);
        let config = EngineConfig::from_toml_str_with_lookup("", lookup).unwrap();
        assert_eq!(config.project_root(), Path::new("/srv/vpt"));
        assert_eq!(config.team_id().as_str(), "team-1");
    }

    #[test]
    fn sqlite_path_resolves_relative_to_project_root() {
        let lookup = lookup_from(&[(PROJECT_ROOT_ENV_VAR, "/srv/vpt"), (TEAM_ID_ENV_VAR, "team-1")]);
        let config =
            EngineConfig::from_toml_str_with_lookup("[storage]\nsqlite_path = \"data/vpt.db\"\n", lookup).unwrap();
        assert_eq!(config.resolved_sqlite_path(), Path::new("/srv/vpt/data/vpt.db"));
    }

    #[test]
    fn absolute_sqlite_path_is_not_rejoined_to_project_root() {
        let lookup = lookup_from(&[(PROJECT_ROOT_ENV_VAR, "/srv/vpt"), (TEAM_ID_ENV_VAR, "team-1")]);
        let config =
            EngineConfig::from_toml_str_with_lookup("[storage]\nsqlite_path = \"/var/lib/vpt.db\"\n", lookup)
                .unwrap();
        assert_eq!(config.resolved_sqlite_path(), Path::new("/var/lib/vpt.db"));
    }

    #[test]
    fn r2_credentials_require_all_four_variables() {
        let lookup = lookup_from(&[
            (PROJECT_ROOT_ENV_VAR, "/srv/vpt"),
            (TEAM_ID_ENV_VAR, "team-1"),
            (R2_ENDPOINT_ENV_VAR, "https://abc.r2.cloudflarestorage.com"),
        ]);
        let config = EngineConfig::from_toml_str_with_lookup("", lookup).unwrap();
        assert!(!config.uses_r2());
    }

    #[test]
    fn r2_enabled_requires_bucket() {
        let r2_vars = [
            (PROJECT_ROOT_ENV_VAR, "/srv/vpt"),
            (TEAM_ID_ENV_VAR, "team-1"),
            (R2_ENDPOINT_ENV_VAR, "https://abc.r2.cloudflarestorage.com"),
            (R2_ACCESS_KEY_ID_ENV_VAR, "AKIA"),
            (R2_SECRET_ACCESS_KEY_ENV_VAR, "secret"),
            (R2_PUBLIC_URL_ENV_VAR, "https://media.example.com"),
        ];
        let error = EngineConfig::from_toml_str_with_lookup("", lookup_from(&r2_vars)).unwrap_err();
        assert!(error.to_string().contains("object_store.bucket"));

        let config = EngineConfig::from_toml_str_with_lookup(
            "[object_store]\nbucket = \"vpt-media\"\n",
            lookup_from(&r2_vars),
        )
        .unwrap();
        assert!(config.uses_r2());
    }

    #[test]
    fn ai_script_name_override_is_picked_up() {
        let lookup = lookup_from(&[
            (PROJECT_ROOT_ENV_VAR, "/srv/vpt"),
            (TEAM_ID_ENV_VAR, "team-1"),
            (AI_SCRIPT_NAME_ENV_VAR, "ai_generated_case"),
        ]);
        let config = EngineConfig::from_toml_str_with_lookup("", lookup).unwrap();
        assert_eq!(config.ai_script_name.as_deref(), Some("ai_generated_case"));
    }
}
