// crates/vpt-core/src/lib.rs
// ============================================================================
// Crate: vpt-core
// Description: Shared data model, identifiers, and error/interface vocabulary
//              for the navigation-and-verification execution engine.
// Purpose: The single dependency every other vpt-* crate builds on; owns no
//          IO of its own (see crate::script for the pure/IO split rationale).
// ============================================================================

//! ## Overview
//! `vpt-core` is the load-bearing vocabulary crate: typed identifiers
//! ([`identifiers`]), the navigation tree data model ([`model`]), per-script
//! execution state ([`script`]), zapping records and statistics ([`zap`]),
//! timestamps ([`time`]), the flattened error type ([`errors`]), and the
//! trait boundaries toward external collaborators ([`interfaces`]).
//!
//! Nothing here touches a filesystem, a socket, or a database connection.
//! Concrete backends live in `vpt-store-sqlite`, `vpt-broker`, and
//! `vpt-controllers`; concrete algorithms live in `vpt-graph` and `vpt-exec`.

pub mod errors;
pub mod identifiers;
pub mod interfaces;
pub mod model;
pub mod script;
pub mod time;
pub mod zap;

pub use errors::VptError;
pub use identifiers::ActionSetId;
pub use identifiers::DeviceId;
pub use identifiers::DeviceModel;
pub use identifiers::EdgeId;
pub use identifiers::HostName;
pub use identifiers::NodeId;
pub use identifiers::ScriptResultId;
pub use identifiers::TeamId;
pub use identifiers::TreeId;
pub use identifiers::UserInterfaceName;
pub use identifiers::ZapResultId;
pub use interfaces::ActionController;
pub use interfaces::AvController;
pub use interfaces::ControllerResult;
pub use interfaces::EdgeExecutionRecord;
pub use interfaces::ExecutionRecorder;
pub use interfaces::NodeExecutionRecord;
pub use interfaces::ObjectStore;
pub use interfaces::PowerController;
pub use interfaces::TreeSource;
pub use interfaces::UploadOutcome;
pub use interfaces::UploadRequest;
pub use interfaces::VerificationConfig;
pub use interfaces::VerificationController;
pub use interfaces::VerificationOutcome;
pub use interfaces::ZapIterationRecord;
pub use model::Action;
pub use model::ActionSet;
pub use model::ActionType;
pub use model::Area;
pub use model::Edge;
pub use model::EdgeType;
pub use model::ImageFilter;
pub use model::Node;
pub use model::NodeData;
pub use model::NodeKind;
pub use model::ParamValue;
pub use model::Tree;
pub use model::Verification;
pub use model::VerificationType;
pub use model::flatten_params;
pub use script::NavigationContext;
pub use script::ScriptContext;
pub use script::StepCategory;
pub use script::StepResult;
pub use script::StepScreenshots;
pub use time::Timestamp;
pub use zap::DetectionType;
pub use zap::ZapIterationSample;
pub use zap::ZapStatistics;
pub use zap::ZappingRecord;
pub use zap::ZappingStatus;
