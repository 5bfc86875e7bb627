//! Pairwise agreement between model proposals.

use crate::core::string::normalize_label;
use crate::decision::StrategyProposal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Weights and threshold of the agreement measure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusPolicy {
    pub tool_weight: f64,
    pub strategy_weight: f64,
    /// Every pair must agree at least this much for consensus.
    pub threshold: f64,
}

impl Default for ConsensusPolicy {
    fn default() -> Self {
        Self {
            tool_weight: 0.7,
            strategy_weight: 0.3,
            threshold: 0.7,
        }
    }
}

/// Jaccard index of two sets; two empty sets agree fully.
pub fn jaccard<'a>(a: impl IntoIterator<Item = &'a str>, b: impl IntoIterator<Item = &'a str>) -> f64 {
    let a: HashSet<&str> = a.into_iter().collect();
    let b: HashSet<&str> = b.into_iter().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(&b).count() as f64;
    let union = a.union(&b).count() as f64;
    intersection / union
}

/// 1.0 for identical labels (after normalization), else word-token Jaccard.
pub fn strategy_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_label(a);
    let b = normalize_label(b);
    if a == b {
        return 1.0;
    }
    jaccard(a.split(' '), b.split(' '))
}

/// Weighted agreement of two proposals, normalized by the weight sum.
pub fn agreement(a: &StrategyProposal, b: &StrategyProposal, policy: &ConsensusPolicy) -> f64 {
    let total = policy.tool_weight + policy.strategy_weight;
    if total <= 0.0 {
        return 0.0;
    }
    let tools = jaccard(
        a.tools.iter().map(String::as_str),
        b.tools.iter().map(String::as_str),
    );
    let strategy = strategy_similarity(&a.strategy, &b.strategy);
    ((policy.tool_weight * tools + policy.strategy_weight * strategy) / total).clamp(0.0, 1.0)
}

/// Symmetric agreement matrix with 1.0 on the diagonal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgreementMatrix {
    pub models: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl AgreementMatrix {
    pub fn compute(models: Vec<String>, proposals: &[&StrategyProposal], policy: &ConsensusPolicy) -> Self {
        let n = proposals.len();
        let mut values = vec![vec![1.0; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let v = agreement(proposals[i], proposals[j], policy);
                values[i][j] = v;
                values[j][i] = v;
            }
        }
        Self { models, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        self.values.get(i).and_then(|row| row.get(j)).copied()
    }

    /// Every off-diagonal pair `(i, j)` with `i < j`.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let n = self.len();
        (0..n).flat_map(move |i| ((i + 1)..n).map(move |j| (i, j, self.values[i][j])))
    }

    /// Lowest pairwise agreement; 1.0 for fewer than two models.
    pub fn min_pairwise(&self) -> f64 {
        self.pairs().map(|(_, _, v)| v).fold(1.0, f64::min)
    }

    pub fn is_symmetric(&self) -> bool {
        let n = self.len();
        (0..n).all(|i| (0..n).all(|j| self.get(i, j) == self.get(j, i)))
    }
}

/// Consensus holds when every pairwise agreement meets the threshold.
pub fn consensus_reached(matrix: &AgreementMatrix, threshold: f64) -> bool {
    matrix.pairs().all(|(_, _, v)| v >= threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(tools: &[&str], strategy: &str) -> StrategyProposal {
        StrategyProposal::new(tools.iter().map(|t| t.to_string()).collect(), strategy)
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard(["a", "b"], ["a", "b"]), 1.0);
        assert_eq!(jaccard(["a", "b"], ["b", "c"]), 1.0 / 3.0);
        assert_eq!(jaccard(Vec::<&str>::new(), Vec::<&str>::new()), 1.0);
        assert_eq!(jaccard(["a"], Vec::<&str>::new()), 0.0);
    }

    #[test]
    fn test_strategy_similarity() {
        assert_eq!(strategy_similarity("Diachronic-Alignment", "diachronic alignment"), 1.0);
        assert_eq!(strategy_similarity("deep alignment", "shallow alignment"), 1.0 / 3.0);
        assert_eq!(strategy_similarity("x", "y"), 0.0);
    }

    #[test]
    fn test_agreement_weights() {
        let policy = ConsensusPolicy::default();
        let a = proposal(&["A", "B"], "baseline");
        let b = proposal(&["A", "B"], "something else");
        assert!((agreement(&a, &b, &policy) - 0.7).abs() < 1e-12);
        let c = proposal(&["C"], "baseline");
        assert!((agreement(&a, &c, &policy) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_matrix_symmetric_with_unit_diagonal() {
        let policy = ConsensusPolicy::default();
        let a = proposal(&["A", "B"], "s1");
        let b = proposal(&["B", "C"], "s2");
        let c = proposal(&["A"], "s1");
        let m = AgreementMatrix::compute(
            vec!["m1".into(), "m2".into(), "m3".into()],
            &[&a, &b, &c],
            &policy,
        );
        assert!(m.is_symmetric());
        for i in 0..3 {
            assert_eq!(m.get(i, i), Some(1.0));
        }
        assert_eq!(m.pairs().count(), 3);
    }

    #[test]
    fn test_threshold_boundary() {
        let at = AgreementMatrix {
            models: vec!["a".into(), "b".into()],
            values: vec![vec![1.0, 0.7], vec![0.7, 1.0]],
        };
        let below = AgreementMatrix {
            models: vec!["a".into(), "b".into()],
            values: vec![vec![1.0, 0.699], vec![0.699, 1.0]],
        };
        assert!(consensus_reached(&at, 0.7));
        assert!(!consensus_reached(&below, 0.7));
    }

    #[test]
    fn test_single_model_trivially_agrees() {
        let a = proposal(&["A"], "s");
        let m = AgreementMatrix::compute(vec!["m1".into()], &[&a], &ConsensusPolicy::default());
        assert!(consensus_reached(&m, 0.7));
        assert_eq!(m.min_pairwise(), 1.0);
    }
}
