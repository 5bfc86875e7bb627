//! Reconciliation of several model proposals into one verdict.

use super::agreement::{AgreementMatrix, ConsensusPolicy, agreement, consensus_reached};
use crate::core::error::DomainError;
use crate::core::ids::{ConsensusRunId, DecisionId};
use crate::core::model::{EmbeddingModel, Model};
use crate::core::score::UnitScore;
use crate::decision::StrategyProposal;
use crate::provenance::ProvenanceLink;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One model's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub model: Model,
    pub proposal: StrategyProposal,
    pub confidence: f64,
}

impl ModelResponse {
    pub fn new(model: Model, proposal: StrategyProposal, confidence: f64) -> Self {
        Self {
            model,
            proposal,
            confidence,
        }
    }
}

/// A pair of models that agreed less than the threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisagreementArea {
    pub models: (String, String),
    pub agreement: f64,
    #[serde(default)]
    pub tools_only_first: Vec<String>,
    #[serde(default)]
    pub tools_only_second: Vec<String>,
    pub strategies_differ: bool,
    pub description: String,
}

impl DisagreementArea {
    fn between(a: &ModelResponse, b: &ModelResponse, agreement: f64) -> Self {
        let only = |x: &StrategyProposal, y: &StrategyProposal| -> Vec<String> {
            x.tools.iter().filter(|t| !y.tools.contains(t)).cloned().collect()
        };
        let tools_only_first = only(&a.proposal, &b.proposal);
        let tools_only_second = only(&b.proposal, &a.proposal);
        let strategies_differ = super::agreement::strategy_similarity(
            &a.proposal.strategy,
            &b.proposal.strategy,
        ) < 1.0;

        let mut parts = Vec::new();
        if !tools_only_first.is_empty() || !tools_only_second.is_empty() {
            parts.push(format!(
                "tools differ ({} only: [{}]; {} only: [{}])",
                a.model,
                tools_only_first.join(", "),
                b.model,
                tools_only_second.join(", ")
            ));
        }
        if strategies_differ {
            parts.push(format!(
                "strategy '{}' vs '{}'",
                a.proposal.strategy, b.proposal.strategy
            ));
        }
        let description = format!(
            "{} and {} agree {:.3}: {}",
            a.model,
            b.model,
            agreement,
            if parts.is_empty() {
                "no structural difference".to_string()
            } else {
                parts.join("; ")
            }
        );

        Self {
            models: (a.model.to_string(), b.model.to_string()),
            agreement,
            tools_only_first,
            tools_only_second,
            strategies_differ,
            description,
        }
    }
}

/// Pure result of reconciling a set of responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusVerdict {
    /// Responses ordered by model name; matrix rows follow this order.
    pub responses: Vec<ModelResponse>,
    pub matrix: AgreementMatrix,
    pub consensus_reached: bool,
    pub consensus_confidence: UnitScore,
    pub final_proposal: StrategyProposal,
    /// Model whose proposal led the verdict.
    pub leader: Model,
    pub review_required: bool,
    #[serde(default)]
    pub disagreements: Vec<DisagreementArea>,
}

impl ConsensusVerdict {
    pub fn models(&self) -> Vec<String> {
        self.responses.iter().map(|r| r.model.to_string()).collect()
    }
}

/// Reconcile model responses.
///
/// Fails on an empty set, a duplicated model, or a confidence outside
/// `[0, 1]`.
pub fn reconcile(
    mut responses: Vec<ModelResponse>,
    policy: &ConsensusPolicy,
) -> Result<ConsensusVerdict, DomainError> {
    if responses.is_empty() {
        return Err(DomainError::InvalidValue(
            "consensus needs at least one model response".into(),
        ));
    }
    for r in &responses {
        UnitScore::new("model confidence", r.confidence)?;
    }
    responses.sort_by(|a, b| a.model.as_str().cmp(b.model.as_str()));
    if let Some(dup) = responses
        .windows(2)
        .find(|w| w[0].model == w[1].model)
        .map(|w| w[0].model.to_string())
    {
        return Err(DomainError::InvalidValue(format!(
            "model {dup} answered more than once"
        )));
    }

    let models = responses.iter().map(|r| r.model.to_string()).collect();
    let proposals: Vec<&StrategyProposal> = responses.iter().map(|r| &r.proposal).collect();
    let matrix = AgreementMatrix::compute(models, &proposals, policy);
    let reached = consensus_reached(&matrix, policy.threshold);

    // Sorted by name, so the first maximum wins confidence ties.
    let leader_idx = responses
        .iter()
        .enumerate()
        .fold(0, |best, (i, r)| {
            if r.confidence > responses[best].confidence {
                i
            } else {
                best
            }
        });
    let leader = &responses[leader_idx];

    let final_proposal = if reached {
        leader.proposal.clone()
    } else {
        merge_proposals(&responses, leader)
    };

    let (weighted, weights) = responses.iter().fold((0.0, 0.0), |(num, den), r| {
        let a = agreement(&r.proposal, &final_proposal, policy);
        (num + r.confidence * a, den + a)
    });
    let confidence = if weights > 0.0 {
        UnitScore::saturating(weighted / weights)
    } else {
        UnitScore::ZERO
    };

    let disagreements = matrix
        .pairs()
        .filter(|(_, _, v)| *v < policy.threshold)
        .map(|(i, j, v)| DisagreementArea::between(&responses[i], &responses[j], v))
        .collect();

    Ok(ConsensusVerdict {
        leader: leader.model.clone(),
        matrix,
        consensus_reached: reached,
        consensus_confidence: confidence,
        final_proposal,
        review_required: !reached,
        disagreements,
        responses,
    })
}

/// Majority tools, the leader's strategy, the most common embedding model.
fn merge_proposals(responses: &[ModelResponse], leader: &ModelResponse) -> StrategyProposal {
    let n = responses.len();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for r in responses {
        for tool in &r.proposal.tools {
            *counts.entry(tool.as_str()).or_default() += 1;
        }
    }

    // Leader's order first, then first appearance in the others.
    let mut merged = StrategyProposal::new(Vec::new(), leader.proposal.strategy.clone());
    let candidates = std::iter::once(leader)
        .chain(responses.iter())
        .flat_map(|r| r.proposal.tools.iter());
    for tool in candidates {
        if counts.get(tool.as_str()).is_some_and(|c| c * 2 > n) {
            merged.push_tool(tool.clone());
        }
    }
    if merged.tools.is_empty() {
        merged.tools = leader.proposal.tools.clone();
    }

    let mut model_counts: HashMap<&EmbeddingModel, usize> = HashMap::new();
    for model in responses.iter().filter_map(|r| r.proposal.embedding_model.as_ref()) {
        *model_counts.entry(model).or_default() += 1;
    }
    if let Some(max) = model_counts.values().copied().max() {
        let leader_model = leader
            .proposal
            .embedding_model
            .as_ref()
            .filter(|m| model_counts.get(m) == Some(&max));
        merged.embedding_model = leader_model.cloned().or_else(|| {
            model_counts
                .iter()
                .filter(|(_, c)| **c == max)
                .map(|(m, _)| *m)
                .min_by(|a, b| a.as_str().cmp(b.as_str()))
                .cloned()
        });
    }

    merged.reasoning = format!(
        "merged from {} models without consensus; strategy from {}",
        n, leader.model
    );
    merged
}

/// A persisted multi-model validation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusRun {
    pub id: ConsensusRunId,
    pub decision_id: DecisionId,
    pub verdict: ConsensusVerdict,
    pub created_at: DateTime<Utc>,
    pub provenance: ProvenanceLink,
}

impl ConsensusRun {
    pub fn new(decision_id: DecisionId, verdict: ConsensusVerdict, provenance: ProvenanceLink) -> Self {
        Self {
            id: ConsensusRunId::generate(),
            decision_id,
            verdict,
            created_at: Utc::now(),
            provenance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(model: Model, tools: &[&str], strategy: &str, confidence: f64) -> ModelResponse {
        ModelResponse::new(
            model,
            StrategyProposal::new(tools.iter().map(|t| t.to_string()).collect(), strategy),
            confidence,
        )
    }

    #[test]
    fn test_rejects_empty_and_out_of_range() {
        let policy = ConsensusPolicy::default();
        assert!(reconcile(vec![], &policy).is_err());
        let err = reconcile(vec![response(Model::Qwen25, &["A"], "s", 1.5)], &policy).unwrap_err();
        assert!(matches!(err, DomainError::ScoreOutOfRange { .. }));
    }

    #[test]
    fn test_rejects_duplicate_model() {
        let policy = ConsensusPolicy::default();
        let responses = vec![
            response(Model::Qwen25, &["A"], "s", 0.5),
            response(Model::Qwen25, &["B"], "s", 0.6),
        ];
        assert!(reconcile(responses, &policy).is_err());
    }

    #[test]
    fn test_single_model_reaches_consensus() {
        let v = reconcile(
            vec![response(Model::Mistral, &["A"], "s", 0.8)],
            &ConsensusPolicy::default(),
        )
        .unwrap();
        assert!(v.consensus_reached);
        assert!(!v.review_required);
        assert_eq!(v.consensus_confidence.value(), 0.8);
        assert!(v.disagreements.is_empty());
    }

    #[test]
    fn test_consensus_picks_highest_confidence() {
        let v = reconcile(
            vec![
                response(Model::Mistral, &["A", "B"], "baseline", 0.7),
                response(Model::Qwen25, &["A", "B"], "baseline", 0.9),
                response(Model::Gemma3, &["A", "B"], "baseline", 0.8),
            ],
            &ConsensusPolicy::default(),
        )
        .unwrap();
        assert!(v.consensus_reached);
        assert_eq!(v.leader, Model::Qwen25);
        // full agreement -> plain mean of confidences
        assert!((v.consensus_confidence.value() - 0.8).abs() < 1e-9);
        assert!(v.matrix.is_symmetric());
    }

    #[test]
    fn test_confidence_tie_breaks_by_model_name() {
        let v = reconcile(
            vec![
                response(Model::Qwen25, &["A"], "s", 0.8),
                response(Model::Mistral, &["A"], "s", 0.8),
            ],
            &ConsensusPolicy::default(),
        )
        .unwrap();
        assert_eq!(v.leader, Model::Mistral);
    }

    #[test]
    fn test_no_consensus_merges_and_flags_review() {
        let v = reconcile(
            vec![
                response(Model::Mistral, &["A", "B"], "baseline", 0.6)
                    .with_model(EmbeddingModel::MacBerth),
                response(Model::Qwen25, &["A", "C"], "deep alignment", 0.9)
                    .with_model(EmbeddingModel::BertBaseUncased),
                response(Model::Gemma3, &["B", "A"], "light", 0.5)
                    .with_model(EmbeddingModel::MacBerth),
            ],
            &ConsensusPolicy::default(),
        )
        .unwrap();
        assert!(!v.consensus_reached);
        assert!(v.review_required);
        assert_eq!(v.leader, Model::Qwen25);
        assert_eq!(v.final_proposal.tools, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(v.final_proposal.strategy, "deep alignment");
        assert_eq!(v.final_proposal.embedding_model, Some(EmbeddingModel::MacBerth));
        assert!(!v.disagreements.is_empty());
        assert!(v.disagreements.iter().all(|d| d.agreement < 0.7));
        let c = v.consensus_confidence.value();
        assert!((0.0..=1.0).contains(&c));
    }

    impl ModelResponse {
        fn with_model(mut self, model: EmbeddingModel) -> Self {
            self.proposal.embedding_model = Some(model);
            self
        }
    }
}
