// crates/vpt-exec/src/lib.rs
// ============================================================================
// Crate: vpt-exec
// Description: The execution engine: action/verification/navigation
//              dispatch, zap analysis, the screenshot pipeline, and the
//              per-device composition root (§4.4-§4.10).
// Purpose: Turn a resolved path or an explicit action/verification list
//          into controller calls, filesystem side effects, and durable
//          execution records.
// ============================================================================

//! ## Overview
//! Six collaborating pieces, one per module:
//! - [`action`] dispatches ordered action batches (main/retry/failure
//!   chains, iteration, post-action side effects).
//! - [`verification`] dispatches ordered verification batches.
//! - [`navigation`] walks a resolved path transition by transition, driving
//!   `action` and `verification` for each one.
//! - [`zap`] correlates a channel-change action with the capture-monitor's
//!   asynchronous zap detection.
//! - [`screenshot`] is the shared best-effort capture-and-mirror primitive
//!   every executor above calls after each step.
//! - [`device`] is the per-device composition root tying the above
//!   together with one mutable navigation context.
//!
//! [`context`] and [`io`] are the shared plumbing underneath all six:
//! `ExecutionContext` carries the per-device environment every executor
//! call borrows, and `io` holds the atomic-write and hot/cold-mirroring
//! filesystem primitives.
//!
//! Every executor here is synchronous. Asynchronous concurrency (if a host
//! needs to run many devices' scripts at once) lives one layer up, in
//! `vpt-cli`, which wraps these blocking calls in
//! `tokio::task::spawn_blocking`.

pub mod action;
pub mod context;
pub mod device;
pub mod exec_table;
pub mod io;
pub mod navigation;
pub mod screenshot;
pub mod verification;
pub mod zap;

pub use action::ActionBatchRequest;
pub use action::ActionExecutor;
pub use action::ActionResult;
pub use action::BatchResult;
pub use context::ExecutionContext;
pub use device::DeviceHandle;
pub use device::ZapActionRequest;
pub use exec_table::ExecutionHandle;
pub use exec_table::ExecutionStatus;
pub use exec_table::ExecutionTable;
pub use navigation::NavResult;
pub use navigation::NavigationExecutor;
pub use navigation::TreeLoadResult;
pub use navigation::update_current_position;
pub use screenshot::capture_screenshot;
pub use verification::VerificationExecutor;
pub use zap::ZapAnalyzer;
pub use zap::ZapIterationRequest;
pub use zap::ZapOutcome;
