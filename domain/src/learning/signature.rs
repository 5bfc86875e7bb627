//! Context signatures: the lookup key of a learned pattern.

use crate::core::score::UnitScore;
use crate::core::string::normalize_label;
use crate::decision::{ComplexityLevel, DocumentCharacteristics, Era};
use serde::{Deserialize, Serialize};

/// Domain placeholder of the domain-agnostic form.
pub const ANY_DOMAIN: &str = "*";

/// Normalized domain | complexity level | era.
///
/// Derivable from document characteristics alone, so a proposal can be
/// matched against patterns before any confidence exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextSignature {
    pub domain: String,
    pub complexity: ComplexityLevel,
    pub era: Era,
}

impl ContextSignature {
    pub fn new(domain: &str, complexity: ComplexityLevel, era: Era) -> Self {
        let domain = normalize_label(domain);
        Self {
            domain: if domain.is_empty() {
                ANY_DOMAIN.to_string()
            } else {
                domain
            },
            complexity,
            era,
        }
    }

    pub fn from_characteristics(characteristics: &DocumentCharacteristics) -> Self {
        Self::new(
            &characteristics.domain,
            characteristics.complexity_level(),
            characteristics.era(),
        )
    }

    /// The same signature with the domain dropped.
    pub fn general(&self) -> Self {
        Self {
            domain: ANY_DOMAIN.to_string(),
            complexity: self.complexity,
            era: self.era,
        }
    }

    pub fn is_general(&self) -> bool {
        self.domain == ANY_DOMAIN
    }

    /// Exact match, or `self` is the general form of `other`.
    pub fn covers(&self, other: &ContextSignature) -> bool {
        self == other || *self == other.general()
    }

    pub fn key(&self) -> String {
        format!("{}|{}|{}", self.domain, self.complexity.as_str(), self.era.as_str())
    }
}

impl std::fmt::Display for ContextSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl std::str::FromStr for ContextSignature {
    type Err = crate::core::error::DomainError;

    /// Parse `domain|complexity|era`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || crate::core::error::DomainError::InvalidValue(format!(
            "signature must look like 'domain|complexity|era', got '{s}'"
        ));
        let mut parts = s.split('|').map(str::trim);
        let (Some(domain), Some(complexity), Some(era), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        let complexity = match complexity.to_lowercase().as_str() {
            "low" => ComplexityLevel::Low,
            "medium" => ComplexityLevel::Medium,
            "high" => ComplexityLevel::High,
            _ => return Err(invalid()),
        };
        let era = match normalize_label(era).as_str() {
            "medieval" => Era::Medieval,
            "early modern" => Era::EarlyModern,
            "late modern" => Era::LateModern,
            "contemporary" => Era::Contemporary,
            _ => return Err(invalid()),
        };
        Ok(Self::new(domain, complexity, era))
    }
}

/// Coarse band of the seed confidence, stored in a pattern's conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    Low,
    Medium,
    High,
}

impl ConfidenceBand {
    pub fn from_score(score: UnitScore) -> Self {
        let v = score.value();
        if v < 0.4 {
            ConfidenceBand::Low
        } else if v < 0.75 {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceBand::Low => "low",
            ConfidenceBand::Medium => "medium",
            ConfidenceBand::High => "high",
        }
    }
}
