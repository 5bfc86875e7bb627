//! Structured confidence factors recorded on every decision.

use super::value_objects::{DocumentCharacteristics, StrategyProposal, ToolRegistry};
use crate::core::ids::{ConsensusRunId, PatternId};
use crate::core::score::UnitScore;
use serde::{Deserialize, Serialize};

pub const FACTORS_SCHEMA_VERSION: u32 = 1;

const TEXT_COMPLEXITY_WEIGHT: f64 = 0.3;
const DOMAIN_MATCH_WEIGHT: f64 = 0.4;
const TEMPORAL_SPAN_WEIGHT: f64 = 0.3;

/// Documents shorter than this give the tools little to work with.
const SHORT_DOCUMENT_WORDS: u64 = 500;
/// Spans this wide or wider get the full temporal penalty.
const WIDE_SPAN_YEARS: f64 = 500.0;

/// One weighted factor contributing to a computed confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorScore {
    pub score: UnitScore,
    pub weight: f64,
    #[serde(default)]
    pub note: String,
}

impl FactorScore {
    pub fn new(score: f64, weight: f64, note: impl Into<String>) -> Self {
        Self {
            score: UnitScore::saturating(score),
            weight,
            note: note.into(),
        }
    }
}

/// Where the decision's confidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceSource {
    ModelReported,
    Computed,
    Consensus,
}

/// Record of a learned pattern folded into the proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMerge {
    pub pattern_id: PatternId,
    pub pattern_version: u64,
    /// `confidence × success_rate` of the pattern at merge time.
    pub pattern_score: UnitScore,
    /// Confidence before averaging with the pattern score.
    pub confidence_before: UnitScore,
    #[serde(default)]
    pub tools_added: Vec<String>,
    #[serde(default)]
    pub filled_embedding_model: bool,
    #[serde(default)]
    pub filled_strategy: bool,
}

/// Summary of the consensus pass that produced the proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusSummary {
    pub run_id: ConsensusRunId,
    pub reached: bool,
    pub confidence: UnitScore,
    pub models: Vec<String>,
}

/// Full factor breakdown of a decision's confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionFactors {
    pub schema_version: u32,
    pub text_complexity: FactorScore,
    pub domain_match: FactorScore,
    pub temporal_span: FactorScore,
    pub confidence_source: ConfidenceSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_reported_confidence: Option<f64>,
    /// Tools the LLM proposed that are not in the registry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped_tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_merge: Option<PatternMerge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus: Option<ConsensusSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_latency_ms: Option<u64>,
    #[serde(default)]
    pub llm_attempts: u32,
}

impl Default for DecisionFactors {
    fn default() -> Self {
        Self {
            schema_version: FACTORS_SCHEMA_VERSION,
            text_complexity: FactorScore::new(0.0, TEXT_COMPLEXITY_WEIGHT, ""),
            domain_match: FactorScore::new(0.0, DOMAIN_MATCH_WEIGHT, ""),
            temporal_span: FactorScore::new(0.0, TEMPORAL_SPAN_WEIGHT, ""),
            confidence_source: ConfidenceSource::Computed,
            model_reported_confidence: None,
            dropped_tools: Vec::new(),
            pattern_merge: None,
            consensus: None,
            llm_latency_ms: None,
            llm_attempts: 0,
        }
    }
}

impl DecisionFactors {
    /// Score the three factors for a proposal on a document.
    pub fn assess(
        characteristics: &DocumentCharacteristics,
        proposal: &StrategyProposal,
        registry: &ToolRegistry,
    ) -> Self {
        let complexity = characteristics.complexity.value();
        let mut text = 1.0 - 0.5 * complexity;
        let mut text_note = format!("complexity {}", characteristics.complexity_level().as_str());
        if characteristics.word_count < SHORT_DOCUMENT_WORDS {
            text -= 0.2;
            text_note.push_str(", short document");
        }

        let fits: Vec<f64> = proposal
            .tools
            .iter()
            .filter_map(|t| registry.get(t))
            .map(|t| t.domain_fit(&characteristics.domain))
            .collect();
        let domain = if fits.is_empty() {
            0.0
        } else {
            fits.iter().sum::<f64>() / fits.len() as f64
        };
        let domain_note = format!("{} tool(s) scored for '{}'", fits.len(), characteristics.domain);

        let span = characteristics.temporal_span;
        let width = (span.years() as f64 / WIDE_SPAN_YEARS).min(1.0);
        let mut temporal = 1.0 - 0.6 * width;
        let mut temporal_note = format!("{} years, {}", span.years(), span.era().as_str());
        if span.era().is_historical()
            && proposal
                .embedding_model
                .as_ref()
                .is_some_and(|m| m.is_historical())
        {
            temporal += 0.2;
            temporal_note.push_str(", historical embedding");
        }

        Self {
            text_complexity: FactorScore::new(text, TEXT_COMPLEXITY_WEIGHT, text_note),
            domain_match: FactorScore::new(domain, DOMAIN_MATCH_WEIGHT, domain_note),
            temporal_span: FactorScore::new(temporal, TEMPORAL_SPAN_WEIGHT, temporal_note),
            ..Self::default()
        }
    }

    /// Weighted mean of the three factor scores.
    pub fn computed_confidence(&self) -> UnitScore {
        let factors = [&self.text_complexity, &self.domain_match, &self.temporal_span];
        let total_weight: f64 = factors.iter().map(|f| f.weight).sum();
        if total_weight <= 0.0 {
            return UnitScore::ZERO;
        }
        let weighted: f64 = factors.iter().map(|f| f.score.value() * f.weight).sum();
        UnitScore::saturating(weighted / total_weight)
    }

    /// Choose the model-reported confidence when valid, else the computed one.
    ///
    /// Records which source was used.
    pub fn resolve_confidence(&mut self, proposal: &StrategyProposal) -> UnitScore {
        self.model_reported_confidence = proposal.confidence;
        match proposal.reported_confidence() {
            Some(reported) => {
                self.confidence_source = ConfidenceSource::ModelReported;
                reported
            }
            None => {
                self.confidence_source = ConfidenceSource::Computed;
                self.computed_confidence()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::DocumentId;
    use crate::core::model::EmbeddingModel;
    use crate::decision::value_objects::{TemporalSpan, ToolDescriptor};

    fn doc(word_count: u64, span: TemporalSpan, complexity: f64) -> DocumentCharacteristics {
        DocumentCharacteristics {
            document_id: DocumentId::new("doc-1"),
            domain: "literature".into(),
            word_count,
            temporal_span: span,
            complexity: UnitScore::saturating(complexity),
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new()
            .register(ToolDescriptor::new("A").with_domains(&["literature"]))
            .register(ToolDescriptor::new("B"))
    }

    #[test]
    fn test_assess_scores_stay_in_range() {
        let d = doc(10, TemporalSpan::new(1000, 2000), 1.0);
        let p = StrategyProposal::new(vec!["A".into(), "B".into()], "s");
        let f = DecisionFactors::assess(&d, &p, &registry());
        assert!((f.text_complexity.score.value() - 0.3).abs() < 1e-9);
        assert!((f.domain_match.score.value() - 0.75).abs() < 1e-9);
        assert!((f.temporal_span.score.value() - 0.4).abs() < 1e-9);
        let c = f.computed_confidence().value();
        assert!((0.0..=1.0).contains(&c));
    }

    #[test]
    fn test_historical_embedding_bonus() {
        let d = doc(5000, TemporalSpan::new(1600, 1650), 0.2);
        let plain = StrategyProposal::new(vec!["A".into()], "s");
        let hist = plain.clone().with_embedding_model(EmbeddingModel::MacBerth);
        let a = DecisionFactors::assess(&d, &plain, &registry());
        let b = DecisionFactors::assess(&d, &hist, &registry());
        assert!(b.temporal_span.score.value() > a.temporal_span.score.value());
    }

    #[test]
    fn test_no_known_tools_scores_zero_domain_match() {
        let d = doc(5000, TemporalSpan::new(1900, 1910), 0.5);
        let p = StrategyProposal::new(vec![], "s");
        let f = DecisionFactors::assess(&d, &p, &registry());
        assert_eq!(f.domain_match.score, UnitScore::ZERO);
    }

    #[test]
    fn test_resolve_prefers_valid_reported_confidence() {
        let d = doc(5000, TemporalSpan::new(1900, 1910), 0.5);
        let p = StrategyProposal::new(vec!["A".into()], "s").with_confidence(0.85);
        let mut f = DecisionFactors::assess(&d, &p, &registry());
        assert_eq!(f.resolve_confidence(&p).value(), 0.85);
        assert_eq!(f.confidence_source, ConfidenceSource::ModelReported);

        let p = p.with_confidence(1.4);
        let c = f.resolve_confidence(&p);
        assert_eq!(f.confidence_source, ConfidenceSource::Computed);
        assert_eq!(c, f.computed_confidence());
        assert_eq!(f.model_reported_confidence, Some(1.4));
    }
}
