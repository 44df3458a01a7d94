// crates/vpt-cli/src/runtime.rs
// ============================================================================
// Module: Script Runtime
// Description: Builds the config/storage/object-store/controller/device
//              stack one script invocation needs (§6 External Interfaces).
// Purpose: The one place that turns `EngineConfig` plus CLI arguments into
//          a ready-to-drive `DeviceHandle`.
// Dependencies: vpt-config, vpt-store-sqlite, vpt-broker, vpt-controllers,
//               vpt-graph, vpt-exec
// ============================================================================

//! ## Overview
//! Load config, build the durable-storage and object-store backends it
//! points at, wire up the controller registry, then hand everything to
//! one [`DeviceHandle`].
//! The remote HTTP controller is optional — a bare `--host` value that
//! isn't a reachable `https://` URL simply means no remote controller is
//! attached, and remote-tagged actions fail closed at dispatch time rather
//! than at startup.

use std::sync::Arc;

use tracing::warn;
use vpt_broker::LocalObjectStore;
use vpt_broker::R2Config;
use vpt_broker::R2ObjectStore;
use vpt_config::EngineConfig;
use vpt_controllers::ControllerRegistry;
use vpt_controllers::HttpActionController;
use vpt_controllers::HttpControllerConfig;
use vpt_controllers::HttpVerificationController;
use vpt_controllers::ImageMatchController;
use vpt_controllers::TextVerificationController;
use vpt_core::DeviceId;
use vpt_core::DeviceModel;
use vpt_core::ExecutionRecorder;
use vpt_core::HostName;
use vpt_core::ObjectStore;
use vpt_core::TeamId;
use vpt_core::TreeSource;
use vpt_core::UserInterfaceName;
use vpt_exec::DeviceHandle;
use vpt_graph::GraphCache;
use vpt_store_sqlite::SqliteStore;
use vpt_store_sqlite::SqliteStoreConfig;

use crate::args::Cli;
use crate::error::CliResult;

/// Subdirectory of `project_root` used as the device's capture-root (hot
/// storage), since provisioning a per-device capture path is out of scope.
const CAPTURE_DIR_NAME: &str = "captures";

/// Everything one script invocation needs, assembled once at startup.
pub struct ScriptRuntime {
    /// Loaded and validated engine configuration.
    pub config: EngineConfig,
    /// Durable execution-record store, also the tree source.
    pub store: Arc<SqliteStore>,
    /// Off-box artifact store (R2 or a local substitute).
    pub object_store: Arc<dyn ObjectStore + Send + Sync>,
    /// The composed per-device handle.
    pub device: DeviceHandle,
    /// Device's capture-root, needed when assembling upload requests.
    pub capture_root: String,
}

impl ScriptRuntime {
    /// Loads configuration and assembles a [`DeviceHandle`] for one script
    /// invocation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::CliError`] when configuration fails to load
    /// or the durable store cannot be opened.
    pub fn bootstrap(cli: &Cli) -> CliResult<Self> {
        let config = EngineConfig::load(cli.config.as_deref())?;
        let store = Arc::new(SqliteStore::open(&SqliteStoreConfig::new(config.resolved_sqlite_path()))?);
        let object_store = build_object_store(&config);
        let capture_root = format!("{}/{CAPTURE_DIR_NAME}", config.project_root().display());

        let team_id = config.team_id();
        let host_name = HostName::new(cli.host.clone());
        let device_model = DeviceModel::new(cli.device_model());
        let device_id = DeviceId::new(cli.device.clone());
        let userinterface_name = UserInterfaceName::new(cli.userinterface_name()?.unwrap_or_default());

        let registry = build_controllers(&cli.host, &capture_root);
        let tree_source: Arc<dyn TreeSource + Send + Sync> = Arc::clone(&store);
        let recorder: Arc<dyn ExecutionRecorder + Send + Sync> = Arc::clone(&store);

        let device = DeviceHandle::new(
            team_id,
            host_name,
            device_model,
            device_id,
            userinterface_name,
            capture_root.clone(),
            Arc::new(registry),
            tree_source,
            Arc::new(GraphCache::new()),
            Some(recorder),
        );

        Ok(Self { config, store, object_store, device, capture_root })
    }
}

/// Builds the object store the config points at: R2 when credentials are
/// present, a local filesystem substitute otherwise (§6 "Object storage").
fn build_object_store(config: &EngineConfig) -> Arc<dyn ObjectStore + Send + Sync> {
    if config.uses_r2() {
        if let Some(r2) = &config.r2 {
            let r2_config = R2Config {
                endpoint: r2.endpoint.clone(),
                bucket: config.object_store.bucket.clone().unwrap_or_default(),
                access_key_id: r2.access_key_id.clone(),
                secret_access_key: r2.secret_access_key.clone(),
                public_url_base: r2.public_url_base.clone(),
            };
            match R2ObjectStore::new(r2_config) {
                Ok(store) => return Arc::new(store),
                Err(err) => warn!(error = %err, "failed to build R2 object store, falling back to local"),
            }
        }
    }
    let root = config.object_store.local_root.clone().unwrap_or_else(|| config.project_root().join("artifacts"));
    let public_url_base = config.object_store.local_public_url_base.clone().unwrap_or_else(|| "file://artifacts".to_string());
    Arc::new(LocalObjectStore::new(root, public_url_base))
}

/// Builds the controller registry for this script run. `host` doubles as
/// the device-agent base URL when it parses as an `https://` address;
/// otherwise no remote/verification-over-HTTP controller is attached.
fn build_controllers(host: &str, capture_root: &str) -> ControllerRegistry {
    let mut registry = ControllerRegistry::new()
        .with_verification("image", ImageMatchController::new(capture_root.to_string()))
        .with_verification("text", TextVerificationController::with_heuristic(capture_root.to_string()));

    let http_config = HttpControllerConfig::new(host.to_string(), Vec::<String>::new());
    match HttpActionController::new(http_config.clone()) {
        Ok(remote) => registry = registry.with_remote(remote),
        Err(err) => warn!(error = %err, host, "no HTTP remote controller attached for this host"),
    }
    match HttpVerificationController::new(http_config) {
        Ok(verification) => {
            registry = registry.with_verification("audio", verification);
        }
        Err(err) => warn!(error = %err, host, "no HTTP verification controller attached for this host"),
    }

    registry
}
