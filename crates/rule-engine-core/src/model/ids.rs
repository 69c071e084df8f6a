// rule-engine-core/src/model/ids.rs
// ============================================================================
// Module: Rule Engine Identifiers
// Description: Opaque string identifiers for the data model (spec §3).
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Identifiers in this workspace are opaque strings (UUIDs minted by
//! collaborator services). Validation of the 36-char shape happens at the
//! event-ingestion boundary (spec §3's `Event` invariant), not in these
//! wrappers; the wrappers exist only to stop callers from mixing up, say, a
//! `RuleChainId` and an `OrganizationId` at the type level.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Creates a new ", stringify!($name), ".")]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

opaque_id!(
    /// Identifier of an organization owning a rule chain.
    OrganizationId
);
opaque_id!(
    /// Identifier of a persisted rule chain.
    RuleChainId
);
opaque_id!(
    /// Identifier of a single node within a rule chain DAG.
    RuleChainNodeId
);
opaque_id!(
    /// Identifier of an originator (sensor or device), a 36-char UUID by convention.
    OriginatorId
);
opaque_id!(
    /// Name of a variable/attribute on an originator, e.g. `temperature`.
    VariableName
);
opaque_id!(
    /// Identifier of a durable queue job.
    JobId
);
opaque_id!(
    /// Identifier of a device-state instance row.
    DeviceStateInstanceId
);
opaque_id!(
    /// Identifier of a telemetry/data-stream row.
    TelemetryDataId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_json() {
        let id = RuleChainId::new("chain-1");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"chain-1\"");
        let back: RuleChainId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }
}
