// crates/vpt-controllers/src/lib.rs
// ============================================================================
// Crate: vpt-controllers
// Description: Controller capability registry, dispatch-by-priority logic,
//              and illustrative HTTP-backed controller implementations
//              (§4.4 Dispatch, §9 "Dynamic per-controller routing").
// Purpose: Give the execution engine a backend-agnostic way to route a bare
//          command or verification to whichever attached controller owns
//          it, without reflection.
// ============================================================================

//! ## Overview
//! [`ControllerRegistry`] holds the typed controller slots a per-device
//! handle assembles at startup, plus a process-wide command→route cache.
//! [`http`] ships ready-to-use HTTP-backed action and verification
//! controllers for devices that expose an HTTP agent; [`block`] ships the
//! in-process `standard_block` handler registry; [`local`] ships on-box
//! image-template-match and text-presence verification controllers.
//! Concrete remote/web/desktop controllers beyond the HTTP transport are
//! expected to be supplied by the host application via
//! [`vpt_core::ActionController`]. The device handle that owns one registry
//! per device lives in `vpt-exec`.

pub mod block;
pub mod http;
pub mod local;
pub mod registry;

pub use block::BlockRegistry;
pub use http::HttpActionController;
pub use http::HttpControllerConfig;
pub use http::HttpVerificationController;
pub use local::HeuristicTextRecognizer;
pub use local::ImageMatchController;
pub use local::TextRecognizer;
pub use local::TextVerificationController;
pub use registry::ActionRoute;
pub use registry::ClosureActionController;
pub use registry::ControllerRegistry;
