//! Feedback domain: a researcher's reaction to one terminal decision.
//!
//! # Status Transitions
//!
//! ```text
//! Pending ──> Reviewed ──> Integrated ──> Obsolete
//!    │           ├──────> Rejected
//!    │           └──────> Obsolete
//!    ├──> Integrated
//!    ├──> Rejected
//!    └──> Obsolete
//! ```
//!
//! Rejected and Obsolete are final.

use crate::core::error::DomainError;
use crate::core::ids::{AgentId, DecisionId, FeedbackId};
use crate::core::model::EmbeddingModel;
use crate::core::score::UnitScore;
use crate::decision::Decision;
use crate::provenance::ProvenanceLink;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    Correction,
    Enhancement,
    Validation,
    Clarification,
}

impl FeedbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackType::Correction => "correction",
            FeedbackType::Enhancement => "enhancement",
            FeedbackType::Validation => "validation",
            FeedbackType::Clarification => "clarification",
        }
    }
}

impl std::str::FromStr for FeedbackType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "correction" => Ok(FeedbackType::Correction),
            "enhancement" => Ok(FeedbackType::Enhancement),
            "validation" => Ok(FeedbackType::Validation),
            "clarification" => Ok(FeedbackType::Clarification),
            other => Err(DomainError::InvalidValue(format!(
                "unknown feedback type '{other}'"
            ))),
        }
    }
}

/// Five-point agreement scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementLevel {
    StronglyDisagree,
    Disagree,
    Neutral,
    Agree,
    StronglyAgree,
}

impl AgreementLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgreementLevel::StronglyDisagree => "strongly_disagree",
            AgreementLevel::Disagree => "disagree",
            AgreementLevel::Neutral => "neutral",
            AgreementLevel::Agree => "agree",
            AgreementLevel::StronglyAgree => "strongly_agree",
        }
    }

    /// Signed scale value, -2..=2.
    pub fn scale(&self) -> i8 {
        match self {
            AgreementLevel::StronglyDisagree => -2,
            AgreementLevel::Disagree => -1,
            AgreementLevel::Neutral => 0,
            AgreementLevel::Agree => 1,
            AgreementLevel::StronglyAgree => 2,
        }
    }

    pub fn is_positive(&self) -> bool {
        self.scale() > 0
    }
}

impl std::str::FromStr for AgreementLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "strongly_disagree" => Ok(AgreementLevel::StronglyDisagree),
            "disagree" => Ok(AgreementLevel::Disagree),
            "neutral" => Ok(AgreementLevel::Neutral),
            "agree" => Ok(AgreementLevel::Agree),
            "strongly_agree" => Ok(AgreementLevel::StronglyAgree),
            other => Err(DomainError::InvalidValue(format!(
                "unknown agreement level '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    Pending,
    Reviewed,
    Integrated,
    Rejected,
    Obsolete,
}

impl FeedbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackStatus::Pending => "pending",
            FeedbackStatus::Reviewed => "reviewed",
            FeedbackStatus::Integrated => "integrated",
            FeedbackStatus::Rejected => "rejected",
            FeedbackStatus::Obsolete => "obsolete",
        }
    }

    pub fn can_transition_to(&self, to: FeedbackStatus) -> bool {
        use FeedbackStatus::*;
        matches!(
            (self, to),
            (Pending, Reviewed | Rejected | Obsolete | Integrated)
                | (Reviewed, Integrated | Rejected | Obsolete)
                | (Integrated, Obsolete)
        )
    }

    pub fn is_final(&self) -> bool {
        matches!(self, FeedbackStatus::Rejected | FeedbackStatus::Obsolete)
    }
}

impl std::fmt::Display for FeedbackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FeedbackStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(FeedbackStatus::Pending),
            "reviewed" => Ok(FeedbackStatus::Reviewed),
            "integrated" => Ok(FeedbackStatus::Integrated),
            "rejected" => Ok(FeedbackStatus::Rejected),
            "obsolete" => Ok(FeedbackStatus::Obsolete),
            other => Err(DomainError::InvalidValue(format!(
                "unknown feedback status '{other}'"
            ))),
        }
    }
}

/// Alternatives the researcher proposes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Suggestions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<EmbeddingModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
}

impl Suggestions {
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty() && self.embedding_model.is_none() && self.strategy.is_none()
    }
}

/// Everything a researcher submits; recorded to the ledger before the row exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackInput {
    pub decision_id: DecisionId,
    pub researcher: AgentId,
    pub feedback_type: FeedbackType,
    pub agreement: AgreementLevel,
    pub confidence_assessment: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub suggestions: Suggestions,
}

impl FeedbackInput {
    /// Feedback may only reference a terminal decision.
    pub fn check_decision(&self, decision: &Decision) -> Result<(), DomainError> {
        if !decision.is_terminal() {
            return Err(DomainError::InvalidTransition {
                entity: "feedback",
                from: format!("decision {}", decision.status),
                to: "pending".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: FeedbackId,
    pub decision_id: DecisionId,
    pub researcher: AgentId,
    pub feedback_type: FeedbackType,
    pub agreement: AgreementLevel,
    pub confidence_assessment: UnitScore,
    pub reasoning: String,
    pub suggestions: Suggestions,
    pub status: FeedbackStatus,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub provenance: ProvenanceLink,
}

impl Feedback {
    /// Build a pending feedback row. Fails on an out-of-range confidence.
    pub fn from_input(input: FeedbackInput, provenance: ProvenanceLink) -> Result<Self, DomainError> {
        let confidence = UnitScore::new("confidence_assessment", input.confidence_assessment)?;
        let now = Utc::now();
        Ok(Self {
            id: FeedbackId::generate(),
            decision_id: input.decision_id,
            researcher: input.researcher,
            feedback_type: input.feedback_type,
            agreement: input.agreement,
            confidence_assessment: confidence,
            reasoning: input.reasoning,
            suggestions: input.suggestions,
            status: FeedbackStatus::Pending,
            submitted_at: now,
            updated_at: now,
            provenance,
        })
    }

    pub fn transition(&mut self, to: FeedbackStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(to) {
            return Err(DomainError::InvalidTransition {
                entity: "feedback",
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::{ActivityId, EntityId};

    fn input(confidence: f64) -> FeedbackInput {
        FeedbackInput {
            decision_id: DecisionId::new("dec-1"),
            researcher: AgentId::new("agt-ada"),
            feedback_type: FeedbackType::Validation,
            agreement: AgreementLevel::Agree,
            confidence_assessment: confidence,
            reasoning: "looks right".into(),
            suggestions: Suggestions::default(),
        }
    }

    fn link() -> ProvenanceLink {
        ProvenanceLink::new(ActivityId::new("act"), EntityId::new("ent"))
    }

    #[test]
    fn test_from_input_validates_confidence() {
        assert!(Feedback::from_input(input(0.9), link()).is_ok());
        let err = Feedback::from_input(input(1.2), link()).unwrap_err();
        assert!(matches!(err, DomainError::ScoreOutOfRange { .. }));
    }

    #[test]
    fn test_transition_table() {
        use FeedbackStatus::*;
        assert!(Pending.can_transition_to(Integrated));
        assert!(Pending.can_transition_to(Reviewed));
        assert!(Reviewed.can_transition_to(Integrated));
        assert!(Integrated.can_transition_to(Obsolete));
        assert!(!Integrated.can_transition_to(Pending));
        assert!(!Reviewed.can_transition_to(Pending));
        assert!(!Rejected.can_transition_to(Integrated));
        assert!(!Obsolete.can_transition_to(Reviewed));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn test_transition_forward_only() {
        let mut fb = Feedback::from_input(input(0.5), link()).unwrap();
        fb.transition(FeedbackStatus::Reviewed).unwrap();
        fb.transition(FeedbackStatus::Integrated).unwrap();
        let err = fb.transition(FeedbackStatus::Reviewed).unwrap_err();
        assert!(err.is_transition_error());
        assert_eq!(fb.status, FeedbackStatus::Integrated);
    }

    #[test]
    fn test_agreement_parsing_and_polarity() {
        assert_eq!("strongly agree".parse::<AgreementLevel>().unwrap(), AgreementLevel::StronglyAgree);
        assert_eq!("strongly-disagree".parse::<AgreementLevel>().unwrap(), AgreementLevel::StronglyDisagree);
        assert!(AgreementLevel::Agree.is_positive());
        assert!(!AgreementLevel::Neutral.is_positive());
        assert!("meh".parse::<AgreementLevel>().is_err());
    }

    #[test]
    fn test_feedback_type_parsing() {
        assert_eq!("Correction".parse::<FeedbackType>().unwrap(), FeedbackType::Correction);
        assert!("praise".parse::<FeedbackType>().is_err());
    }
}
