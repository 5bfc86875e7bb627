//! Agent entities: who or what originated a decision, feedback, override or
//! pattern.

use crate::core::ids::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of actor, with the fields that only make sense for that kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentKind {
    /// A program, e.g. the orchestrator itself or an LLM provider.
    SoftwareAgent { name: String, version: String },
    /// A researcher.
    Person {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        orcid: Option<String>,
    },
    Organization { name: String },
}

impl AgentKind {
    pub fn software(name: impl Into<String>, version: impl Into<String>) -> Self {
        AgentKind::SoftwareAgent {
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn person(name: impl Into<String>) -> Self {
        AgentKind::Person {
            name: name.into(),
            orcid: None,
        }
    }

    pub fn organization(name: impl Into<String>) -> Self {
        AgentKind::Organization { name: name.into() }
    }

    pub fn name(&self) -> &str {
        match self {
            AgentKind::SoftwareAgent { name, .. }
            | AgentKind::Person { name, .. }
            | AgentKind::Organization { name } => name,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::SoftwareAgent { .. } => "software_agent",
            AgentKind::Person { .. } => "person",
            AgentKind::Organization { .. } => "organization",
        }
    }

    pub fn is_person(&self) -> bool {
        matches!(self, AgentKind::Person { .. })
    }
}

/// A registered actor.
///
/// `reference_count` tracks how many persisted rows name this agent as their
/// originator. It only changes through [`Agent::increment`] and
/// [`Agent::decrement`], called by whichever component creates or removes
/// the referencing row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub kind: AgentKind,
    pub reference_count: u64,
    pub registered_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(kind: AgentKind) -> Self {
        Self {
            id: AgentId::generate(),
            kind,
            reference_count: 0,
            registered_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<AgentId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn increment(&mut self) -> u64 {
        self.reference_count += 1;
        self.reference_count
    }

    /// Saturates at zero.
    pub fn decrement(&mut self) -> u64 {
        self.reference_count = self.reference_count.saturating_sub(1);
        self.reference_count
    }

    pub fn display_name(&self) -> String {
        format!("{} ({})", self.kind.name(), self.kind.as_str())
    }
}
