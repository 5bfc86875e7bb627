//! Identifier value objects.
//!
//! Every persisted row is addressed by a string-backed newtype so ids of
//! different tables cannot be mixed up at call sites.

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh random id with the table prefix.
            pub fn generate() -> Self {
                Self(format!("{}-{}", $prefix, uuid::Uuid::new_v4().simple()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

define_id!(
    /// Identifies one orchestration decision.
    DecisionId,
    "dec"
);
define_id!(
    /// Identifies one tool execution row within a decision.
    ExecutionId,
    "exe"
);
define_id!(FeedbackId, "fb");
define_id!(OverrideId, "ovr");
define_id!(PatternId, "pat");
define_id!(ConsensusRunId, "cns");
define_id!(
    /// Identifies a registered agent (person, software, organization).
    AgentId,
    "agt"
);
define_id!(ExperimentId, "exp");
define_id!(
    /// Identifies a source document. Assigned by the document service, not generated here.
    DocumentId,
    "doc"
);
define_id!(ActivityId, "act");
define_id!(EntityId, "ent");
