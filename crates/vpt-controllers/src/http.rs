// crates/vpt-controllers/src/http.rs
// ============================================================================
// Module: HTTP Device Controllers
// Description: Action and verification controllers that dispatch commands
//              to a device-attached HTTP agent (§6 "Controller interface
//              (in-process)").
// Purpose: Give hosts a ready-to-use controller backend without requiring a
//          bespoke RPC transport per device family.
// Dependencies: vpt-core, reqwest, serde_json
// ============================================================================

//! ## Overview
//! `HttpActionController`/`HttpVerificationController` POST a JSON command
//! envelope to a configured base URL and decode the response into a
//! [`ControllerResult`]/[`VerificationOutcome`]. The host-pinning, scheme,
//! and size-limit policy guards an outbound request to an address supplied
//! by configuration rather than by the immediate caller.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::io::Read;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::net::ToSocketAddrs;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use vpt_core::ActionController;
use vpt_core::ControllerResult;
use vpt_core::VerificationConfig;
use vpt_core::VerificationController;
use vpt_core::VerificationOutcome;
use vpt_core::VptError;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration shared by the HTTP action and verification controllers.
///
/// # Invariants
/// - `allow_http = false` blocks cleartext `http://` base URLs.
/// - `max_response_bytes` is a hard upper bound on response bodies.
/// - `allow_private_networks = false` blocks private/link-local/loopback
///   targets, since the base URL is operator-supplied configuration, not a
///   caller-controlled value, but still worth pinning against DNS rebinding.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpControllerConfig {
    /// Base URL of the device agent, e.g. `https://device-1.lan:8443`.
    pub base_url: String,
    /// Allow cleartext HTTP (disabled by default).
    pub allow_http: bool,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum response size allowed, in bytes.
    pub max_response_bytes: usize,
    /// Allow requests to private/link-local/loopback addresses.
    pub allow_private_networks: bool,
    /// User agent string for outbound requests.
    pub user_agent: String,
    /// Commands this controller declares it owns, avoiding a capability
    /// round trip at startup (§9 "enumerate all registered controllers at
    /// startup").
    pub commands: BTreeSet<String>,
}

impl HttpControllerConfig {
    /// Creates a config for `base_url` owning `commands`, with conservative
    /// defaults otherwise.
    #[must_use]
    pub fn new(base_url: impl Into<String>, commands: impl IntoIterator<Item = String>) -> Self {
        Self {
            base_url: base_url.into(),
            allow_http: false,
            timeout_ms: 10_000,
            max_response_bytes: 1024 * 1024,
            allow_private_networks: false,
            user_agent: "vpt-controllers/0.1".to_string(),
            commands: commands.into_iter().collect(),
        }
    }
}

// ============================================================================
// SECTION: Wire envelope
// ============================================================================

/// Request body posted to the device agent.
#[derive(Debug, Serialize)]
struct CommandRequest<'a> {
    /// The command name.
    command: &'a str,
    /// Flattened parameters.
    params: &'a BTreeMap<String, Value>,
}

/// Response body decoded from the device agent.
#[derive(Debug, Deserialize, Default)]
struct CommandResponse {
    /// Whether the command succeeded.
    success: bool,
    /// Optional human-readable message.
    message: Option<String>,
    /// Optional error detail.
    error: Option<String>,
    /// Output data, merged into the batch's aggregated map.
    #[serde(default)]
    output_data: BTreeMap<String, Value>,
    /// Verification-only: structured detail fields.
    #[serde(default)]
    details: BTreeMap<String, Value>,
    /// Verification-only: captured source artifact URL.
    source_url: Option<String>,
    /// Verification-only: reference artifact URL.
    reference_url: Option<String>,
    /// Verification-only: overlay diff artifact URL.
    overlay_url: Option<String>,
    /// Verification-only: extracted OCR text.
    extracted_text: Option<String>,
    /// Verification-only: the text that was searched for.
    searched_text: Option<String>,
    /// Verification-only: detected language hint.
    detected_language: Option<String>,
}

// ============================================================================
// SECTION: Shared transport
// ============================================================================

/// Shared request/validation plumbing for the two HTTP controllers.
struct HttpTransport {
    /// Controller configuration.
    config: HttpControllerConfig,
    /// Pre-built HTTP client.
    client: Client,
    /// Parsed, validated base URL.
    base_url: Url,
}

impl HttpTransport {
    /// Builds a transport, validating `config.base_url` and `config`'s
    /// scheme/network policy up front.
    ///
    /// # Errors
    ///
    /// Returns [`VptError::Controller`] when the base URL is invalid, its
    /// scheme is disallowed, or the HTTP client cannot be built.
    fn new(config: HttpControllerConfig) -> Result<Self, VptError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|_| VptError::Controller("invalid controller base_url".to_string()))?;
        validate_scheme(&base_url, config.allow_http)?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .redirect(Policy::none())
            .build()
            .map_err(|_| VptError::Controller("http client build failed".to_string()))?;
        Ok(Self { config, client, base_url })
    }

    /// Posts `path` with a JSON body, enforcing host and response-size
    /// policy, and decodes the response as [`CommandResponse`].
    fn post(&self, path: &str, body: &CommandRequest<'_>) -> Result<CommandResponse, VptError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|_| VptError::Controller("invalid controller request path".to_string()))?;
        enforce_host_policy(&url, self.config.allow_private_networks)?;

        let mut response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .map_err(|_| VptError::Controller(format!("controller request to {url} failed")))?;
        if response.url() != &url {
            return Err(VptError::Controller("controller redirect not allowed".to_string()));
        }

        let bytes = read_response_limited(&mut response, self.config.max_response_bytes)?;
        serde_json::from_slice(&bytes)
            .map_err(|_| VptError::Controller("controller response decode failed".to_string()))
    }
}

// ============================================================================
// SECTION: HttpActionController
// ============================================================================

/// An [`ActionController`] that dispatches commands over HTTP to a
/// device-attached agent.
pub struct HttpActionController {
    /// Shared request/validation plumbing.
    transport: HttpTransport,
}

impl HttpActionController {
    /// Creates a new HTTP action controller.
    ///
    /// # Errors
    ///
    /// Returns [`VptError::Controller`] when `config.base_url` is invalid.
    pub fn new(config: HttpControllerConfig) -> Result<Self, VptError> {
        Ok(Self { transport: HttpTransport::new(config)? })
    }
}

impl ActionController for HttpActionController {
    fn execute_command(
        &self,
        command: &str,
        params: &BTreeMap<String, Value>,
    ) -> Result<ControllerResult, VptError> {
        let response = self.transport.post("/actions/execute", &CommandRequest { command, params })?;
        Ok(ControllerResult {
            success: response.success,
            message: response.message,
            error: response.error,
            output_data: response.output_data,
        })
    }

    fn available_actions(&self) -> Vec<String> {
        self.transport.config.commands.iter().cloned().collect()
    }
}

// ============================================================================
// SECTION: HttpVerificationController
// ============================================================================

/// A [`VerificationController`] that dispatches verifications over HTTP to
/// a device-attached agent.
pub struct HttpVerificationController {
    /// Shared request/validation plumbing.
    transport: HttpTransport,
}

impl HttpVerificationController {
    /// Creates a new HTTP verification controller.
    ///
    /// # Errors
    ///
    /// Returns [`VptError::Controller`] when `config.base_url` is invalid.
    pub fn new(config: HttpControllerConfig) -> Result<Self, VptError> {
        Ok(Self { transport: HttpTransport::new(config)? })
    }
}

impl VerificationController for HttpVerificationController {
    fn execute_verification(
        &self,
        config: &VerificationConfig<'_>,
    ) -> Result<VerificationOutcome, VptError> {
        let response =
            self.transport.post("/verifications/execute", &CommandRequest {
                command: config.command,
                params: config.params,
            })?;
        Ok(VerificationOutcome {
            success: response.success,
            message: response.message,
            error: response.error,
            details: response.details,
            source_url: response.source_url,
            reference_url: response.reference_url,
            overlay_url: response.overlay_url,
            extracted_text: response.extracted_text,
            searched_text: response.searched_text,
            detected_language: response.detected_language,
        })
    }

    fn available_verifications(&self) -> Vec<String> {
        self.transport.config.commands.iter().cloned().collect()
    }
}

// ============================================================================
// SECTION: Policy helpers
// ============================================================================

/// Validates the base URL's scheme against `allow_http`.
fn validate_scheme(url: &Url, allow_http: bool) -> Result<(), VptError> {
    match url.scheme() {
        "https" => Ok(()),
        "http" if allow_http => Ok(()),
        _ => Err(VptError::Controller("unsupported controller url scheme".to_string())),
    }
}

/// Resolves and validates the request host, rejecting private/link-local
/// addresses unless explicitly allowed.
fn enforce_host_policy(url: &Url, allow_private_networks: bool) -> Result<(), VptError> {
    if allow_private_networks {
        return Ok(());
    }
    let host =
        url.host_str().ok_or_else(|| VptError::Controller("controller url host required".to_string()))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| VptError::Controller("controller url port required".to_string()))?;
    let ips = resolve_host_ips(host, port)?;
    for ip in ips {
        if is_private_or_link_local(&ip) {
            return Err(VptError::Controller(format!(
                "controller url resolves to private or link-local address: {host}"
            )));
        }
    }
    Ok(())
}

/// Resolves a hostname to candidate peer IPs.
fn resolve_host_ips(host: &str, port: u16) -> Result<Vec<IpAddr>, VptError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![ip]);
    }
    (host, port)
        .to_socket_addrs()
        .map(|iter| iter.map(|addr: SocketAddr| addr.ip()).collect())
        .map_err(|_| VptError::Controller("controller url host resolution failed".to_string()))
}

/// Returns true when an IP is private, loopback, link-local, or otherwise
/// local, guarding against a configured base URL resolving into the
/// operator's own internal network.
fn is_private_or_link_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => {
            addr.is_private()
                || addr.is_loopback()
                || addr.is_link_local()
                || addr.is_unspecified()
                || addr.is_multicast()
                || addr.is_broadcast()
        }
        IpAddr::V6(addr) => {
            addr.is_loopback()
                || addr.is_unique_local()
                || addr.is_unicast_link_local()
                || addr.is_unspecified()
                || addr.is_multicast()
        }
    }
}

/// Reads the response body while enforcing a byte limit.
fn read_response_limited(
    response: &mut reqwest::blocking::Response,
    max_bytes: usize,
) -> Result<Vec<u8>, VptError> {
    let limit = u64::try_from(max_bytes)
        .map_err(|_| VptError::Controller("response size limit exceeds u64".to_string()))?
        .saturating_add(1);
    let mut buf = Vec::new();
    response
        .take(limit)
        .read_to_end(&mut buf)
        .map_err(|_| VptError::Controller("failed to read controller response".to_string()))?;
    if buf.len() > max_bytes {
        return Err(VptError::Controller("controller response exceeds size limit".to_string()));
    }
    Ok(buf)
}

#[cfg(test)]
#[allow(clippy::missing_docs_in_private_items, reason = "test helpers are self-explanatory from their names")]
mod tests {
    use super::*;

    #[test]
    fn http_scheme_without_allow_http_is_rejected() {
        let config = HttpControllerConfig::new("http://device.example", ["press".to_string()]);
        let result = HttpActionController::new(config);
        assert!(matches!(result, Err(VptError::Controller(_))));
    }

    #[test]
    fn private_host_is_rejected_by_default() -> Result<(), VptError> {
        let config = HttpControllerConfig::new("https://127.0.0.1:9443", ["press".to_string()]);
        let controller = HttpActionController::new(config)?;
        let result = controller.execute_command("press", &BTreeMap::new());
        assert!(matches!(result, Err(VptError::Controller(_))));
        Ok(())
    }

    #[test]
    fn available_actions_reflect_configured_commands() -> Result<(), VptError> {
        let config = HttpControllerConfig::new(
            "https://device.example",
            ["press".to_string(), "swipe".to_string()],
        );
        let controller = HttpActionController::new(config)?;
        let mut actions = controller.available_actions();
        actions.sort();
        assert_eq!(actions, vec!["press".to_string(), "swipe".to_string()]);
        Ok(())
    }
}
