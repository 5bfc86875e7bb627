//! Learned decision patterns and the update rules applied to them.
//!
//! # Status Transitions
//!
//! ```text
//! Experimental ──(times_applied > threshold, rate ≥ floor)──> Active
//! Experimental | Active ──(sharp drop or rate < review floor)──> UnderReview
//! UnderReview ──(rate ≥ activation floor)──> Active
//! UnderReview ──(still < review floor after the window)──> Deprecated
//! ```

use super::policy::{LearningPolicy, SuccessRatePolicy};
use super::signature::{ConfidenceBand, ContextSignature};
use crate::core::ids::{DecisionId, FeedbackId, OverrideId, PatternId};
use crate::core::model::EmbeddingModel;
use crate::core::score::UnitScore;
use crate::decision::{Decision, DecisionStatus, StrategyProposal};
use crate::feedback::Feedback;
use crate::overrides::DecisionOverride;
use crate::provenance::ProvenanceLink;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const PATTERN_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternStatus {
    Active,
    Deprecated,
    UnderReview,
    Experimental,
}

impl PatternStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternStatus::Active => "active",
            PatternStatus::Deprecated => "deprecated",
            PatternStatus::UnderReview => "under_review",
            PatternStatus::Experimental => "experimental",
        }
    }

    /// Live patterns are matched and updated; deprecated ones are kept for history.
    pub fn is_live(&self) -> bool {
        !matches!(self, PatternStatus::Deprecated)
    }
}

impl std::fmt::Display for PatternStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternConditions {
    pub schema_version: u32,
    pub signature: ContextSignature,
    /// Band of the seed confidence that created the pattern.
    pub confidence_band: ConfidenceBand,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PatternRecommendation {
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<EmbeddingModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
}

impl PatternRecommendation {
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty() && self.embedding_model.is_none() && self.strategy.is_none()
    }
}

/// Where a seed came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SeedSource {
    Feedback(FeedbackId),
    Override(OverrideId),
}

/// One observation fed to the learner: a feedback or an applied override,
/// reduced to what the update rules need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSeed {
    pub source: SeedSource,
    pub decision_id: DecisionId,
    pub signature: ContextSignature,
    pub success: bool,
    pub confidence: UnitScore,
    pub recommendation: PatternRecommendation,
    /// Pattern the seed's decision merged, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_pattern: Option<PatternId>,
}

impl PatternSeed {
    /// Successful when the decision was validated or the researcher agreed.
    ///
    /// The recommendation is the decision's selection with the researcher's
    /// suggestions taking precedence.
    pub fn from_feedback(feedback: &Feedback, decision: &Decision) -> Self {
        let suggestions = &feedback.suggestions;
        let tools = if suggestions.tools.is_empty() {
            decision.tools.clone()
        } else {
            suggestions.tools.clone()
        };
        Self {
            source: SeedSource::Feedback(feedback.id.clone()),
            decision_id: decision.id.clone(),
            signature: ContextSignature::from_characteristics(&decision.characteristics),
            success: decision.validated || feedback.agreement.is_positive(),
            confidence: feedback.confidence_assessment,
            recommendation: PatternRecommendation {
                tools,
                embedding_model: suggestions
                    .embedding_model
                    .clone()
                    .or_else(|| Some(decision.embedding_model.clone())),
                strategy: suggestions
                    .strategy
                    .clone()
                    .or_else(|| Some(decision.strategy.clone()))
                    .filter(|s| !s.is_empty()),
            },
            applied_pattern: decision.applied_pattern().cloned(),
        }
    }

    /// Successful when the re-execution completed without losing quality.
    pub fn from_override(
        applied: &DecisionOverride,
        original: &Decision,
        policy: &LearningPolicy,
    ) -> Self {
        let success = applied
            .execution_results
            .as_ref()
            .is_some_and(|r| r.status == DecisionStatus::Completed)
            && applied
                .performance
                .as_ref()
                .is_none_or(|p| p.quality_delta.is_none_or(|d| d >= 0.0));
        let target = applied
            .override_type
            .resolve(&applied.original, &applied.overridden)
            .unwrap_or_else(|_| applied.original.clone());
        Self {
            source: SeedSource::Override(applied.id.clone()),
            decision_id: original.id.clone(),
            signature: ContextSignature::from_characteristics(&original.characteristics),
            success,
            confidence: UnitScore::saturating(policy.override_seed_confidence),
            recommendation: recommendation_from(&target),
            applied_pattern: original.applied_pattern().cloned(),
        }
    }
}

fn recommendation_from(selection: &StrategyProposal) -> PatternRecommendation {
    PatternRecommendation {
        tools: selection.tools.clone(),
        embedding_model: selection.embedding_model.clone(),
        strategy: Some(selection.strategy.clone()).filter(|s| !s.is_empty()),
    }
}

/// A named reusable decision heuristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPattern {
    pub id: PatternId,
    pub name: String,
    pub signature: ContextSignature,
    pub conditions: PatternConditions,
    pub recommendation: PatternRecommendation,
    pub confidence: UnitScore,
    pub times_applied: u64,
    pub successes: u64,
    pub success_rate: UnitScore,
    pub status: PatternStatus,
    pub last_applied: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_from_feedback: Option<FeedbackId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_from_override: Option<OverrideId>,
    /// `times_applied` when the pattern last entered review.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_since: Option<u64>,
    /// Optimistic concurrency version; bumped by the repository on every write.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub provenance: ProvenanceLink,
}

/// Status movement caused by one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub from: PatternStatus,
    pub to: PatternStatus,
}

impl LearningPattern {
    /// New experimental pattern from a seed with no matching pattern.
    pub fn from_seed(seed: &PatternSeed, provenance: ProvenanceLink) -> Self {
        let now = Utc::now();
        let successes = u64::from(seed.success);
        let (derived_from_feedback, derived_from_override) = match &seed.source {
            SeedSource::Feedback(id) => (Some(id.clone()), None),
            SeedSource::Override(id) => (None, Some(id.clone())),
        };
        Self {
            id: PatternId::generate(),
            name: format!(
                "{} / {} / {}",
                seed.signature.domain,
                seed.signature.complexity.as_str(),
                seed.signature.era.as_str()
            ),
            signature: seed.signature.clone(),
            conditions: PatternConditions {
                schema_version: PATTERN_SCHEMA_VERSION,
                signature: seed.signature.clone(),
                confidence_band: ConfidenceBand::from_score(seed.confidence),
            },
            recommendation: seed.recommendation.clone(),
            confidence: seed.confidence,
            times_applied: 1,
            successes,
            success_rate: UnitScore::saturating(successes as f64),
            status: PatternStatus::Experimental,
            last_applied: now,
            derived_from_feedback,
            derived_from_override,
            review_since: None,
            version: 0,
            created_at: now,
            provenance,
        }
    }

    /// `confidence × success_rate`, the ranking score of a pattern.
    pub fn score(&self) -> UnitScore {
        self.confidence.product(self.success_rate)
    }

    /// Fold one more application into the counters and re-evaluate status.
    pub fn apply_seed(&mut self, seed: &PatternSeed, policy: &LearningPolicy) -> Option<StatusChange> {
        let previous_rate = self.success_rate.value();
        self.times_applied += 1;
        if seed.success {
            self.successes += 1;
        }
        let n = self.times_applied as f64;
        self.success_rate = match policy.success_rate_policy {
            SuccessRatePolicy::SimpleRatio => UnitScore::saturating(self.successes as f64 / n),
            SuccessRatePolicy::Decayed => {
                let outcome = if seed.success { 1.0 } else { 0.0 };
                UnitScore::saturating(policy.decay * previous_rate + (1.0 - policy.decay) * outcome)
            }
        };
        self.confidence = UnitScore::saturating(
            (self.confidence.value() * (n - 1.0) + seed.confidence.value()) / n,
        );
        if seed.success && self.recommendation.is_empty() {
            self.recommendation = seed.recommendation.clone();
        }
        self.last_applied = Utc::now();
        self.evaluate_status(previous_rate, policy)
    }

    fn evaluate_status(&mut self, previous_rate: f64, policy: &LearningPolicy) -> Option<StatusChange> {
        let rate = self.success_rate.value();
        let reviewable = self.times_applied >= policy.review_min_applications;
        let degraded =
            reviewable && (previous_rate - rate >= policy.sharp_drop || rate < policy.review_floor);

        let next = match self.status {
            PatternStatus::Experimental
                if self.times_applied > policy.activation_threshold
                    && rate >= policy.activation_floor =>
            {
                PatternStatus::Active
            }
            PatternStatus::Experimental | PatternStatus::Active if degraded => {
                PatternStatus::UnderReview
            }
            PatternStatus::UnderReview if rate >= policy.activation_floor => PatternStatus::Active,
            PatternStatus::UnderReview
                if rate < policy.review_floor
                    && self.times_applied
                        >= self.review_since.unwrap_or(self.times_applied) + policy.review_window =>
            {
                PatternStatus::Deprecated
            }
            current => current,
        };

        if next == self.status {
            return None;
        }
        let change = StatusChange {
            from: self.status,
            to: next,
        };
        self.status = next;
        self.review_since = match next {
            PatternStatus::UnderReview => Some(self.times_applied),
            PatternStatus::Deprecated => self.review_since,
            _ => None,
        };
        Some(change)
    }
}

/// Pick the best live pattern covering a signature.
///
/// Exact and domain-agnostic matches compete on `confidence × success_rate`,
/// then on the most recent `last_applied`.
pub fn select_best<'a>(
    patterns: impl IntoIterator<Item = &'a LearningPattern>,
    signature: &ContextSignature,
) -> Option<&'a LearningPattern> {
    patterns
        .into_iter()
        .filter(|p| p.status.is_live() && p.signature.covers(signature))
        .max_by(|a, b| {
            a.score()
                .value()
                .total_cmp(&b.score().value())
                .then(a.last_applied.cmp(&b.last_applied))
        })
}
