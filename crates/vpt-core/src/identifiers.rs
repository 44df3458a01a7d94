// crates/vpt-core/src/identifiers.rs
// ============================================================================
// Module: Engine Identifiers
// Description: Canonical typed identifiers used across the execution engine.
// Purpose: Prevent accidental mixing of string-shaped ids (node vs edge vs team).
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every identifier that crosses a component boundary (team, tree, node, edge,
//! action set, device, script, zap result) is wrapped in a small newtype so the
//! compiler rejects passing a `NodeId` where an `EdgeId` is expected. All
//! wrappers serialize transparently as their inner string.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Macro
// ============================================================================

macro_rules! string_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from any string-like value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true when the identifier matches another, ignoring ASCII case.
            #[must_use]
            pub fn eq_ignore_case(&self, other: &str) -> bool {
                self.0.eq_ignore_ascii_case(other)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(TeamId, "Tenant-scoping identifier for a team.");
string_id!(TreeId, "Identifier of a single navigation tree.");
string_id!(UserInterfaceName, "Name of a user interface (root tree group).");
string_id!(NodeId, "Identifier of a node within the unified graph.");
string_id!(EdgeId, "Identifier of an edge within the unified graph.");
string_id!(ActionSetId, "Identifier of an action set attached to an edge.");
string_id!(HostName, "Name of the host machine running the script subprocess.");
string_id!(DeviceId, "Identifier of a physical or virtual device.");
string_id!(DeviceModel, "Model identifier used to scope reference images.");
string_id!(ScriptResultId, "Identifier of a recorded script execution row.");
string_id!(ZapResultId, "Identifier of a recorded zap iteration row.");
