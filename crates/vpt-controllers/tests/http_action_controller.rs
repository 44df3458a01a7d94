// crates/vpt-controllers/tests/http_action_controller.rs
// ============================================================================
// Module: HTTP Action Controller Integration Tests
// Description: Exercises HttpActionController against a local tiny_http
//              server standing in for a device agent.
// Purpose: Confirm the request/response envelope and private-network
//          policy behave as configured, without relying on a real device.
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;
use std::thread;

use tiny_http::Response;
use tiny_http::Server;
use vpt_controllers::HttpActionController;
use vpt_controllers::HttpControllerConfig;
use vpt_core::ActionController;
use vpt_core::VptError;

#[test]
fn dispatches_command_and_decodes_success() -> Result<(), VptError> {
    let server = Server::http("127.0.0.1:0").expect("bind ephemeral port");
    let addr = server.server_addr().to_ip().expect("ip addr");
    let handle = thread::spawn(move || {
        let request = server.recv().expect("request arrives");
        let body = r#"{"success":true,"message":"pressed","output_data":{"key":"ok"}}"#;
        let response = Response::from_string(body)
            .with_header(tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).expect("header"));
        request.respond(response).expect("respond");
    });

    let mut config =
        HttpControllerConfig::new(format!("http://{addr}"), ["press".to_string()]);
    config.allow_http = true;
    config.allow_private_networks = true;
    let controller = HttpActionController::new(config)?;

    let result = controller.execute_command("press", &BTreeMap::new())?;
    assert!(result.success);
    assert_eq!(result.message.as_deref(), Some("pressed"));
    assert_eq!(result.output_data.get("key").and_then(|v| v.as_str()), Some("ok"));

    handle.join().expect("server thread completes");
    Ok(())
}

#[test]
fn private_network_request_is_blocked_by_default() -> Result<(), VptError> {
    let mut config = HttpControllerConfig::new("http://127.0.0.1:9", ["press".to_string()]);
    config.allow_http = true;
    let controller = HttpActionController::new(config)?;
    let result = controller.execute_command("press", &BTreeMap::new());
    assert!(matches!(result, Err(VptError::Controller(_))));
    Ok(())
}
