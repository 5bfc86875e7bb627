//! Decision value objects: the inputs of a proposal and the proposal itself.

use crate::core::ids::DocumentId;
use crate::core::model::EmbeddingModel;
use crate::core::score::UnitScore;
use serde::{Deserialize, Serialize};

/// Coarse text complexity bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
}

impl ComplexityLevel {
    pub fn from_score(score: UnitScore) -> Self {
        let v = score.value();
        if v < 0.34 {
            ComplexityLevel::Low
        } else if v < 0.67 {
            ComplexityLevel::Medium
        } else {
            ComplexityLevel::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexityLevel::Low => "low",
            ComplexityLevel::Medium => "medium",
            ComplexityLevel::High => "high",
        }
    }
}

/// Historical era a text belongs to, bucketed by the midpoint of its span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Era {
    Medieval,
    EarlyModern,
    LateModern,
    Contemporary,
}

impl Era {
    pub fn from_year(year: i32) -> Self {
        match year {
            i32::MIN..=1499 => Era::Medieval,
            1500..=1699 => Era::EarlyModern,
            1700..=1899 => Era::LateModern,
            _ => Era::Contemporary,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Era::Medieval => "medieval",
            Era::EarlyModern => "early_modern",
            Era::LateModern => "late_modern",
            Era::Contemporary => "contemporary",
        }
    }

    pub fn is_historical(&self) -> bool {
        !matches!(self, Era::Contemporary)
    }
}

/// Years covered by a document (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemporalSpan {
    pub start_year: i32,
    pub end_year: i32,
}

impl TemporalSpan {
    /// Build a span; the bounds are swapped if given in reverse.
    pub fn new(start_year: i32, end_year: i32) -> Self {
        if start_year <= end_year {
            Self {
                start_year,
                end_year,
            }
        } else {
            Self {
                start_year: end_year,
                end_year: start_year,
            }
        }
    }

    pub fn years(&self) -> u32 {
        self.end_year.abs_diff(self.start_year)
    }

    pub fn midpoint(&self) -> i32 {
        self.start_year + (self.end_year - self.start_year) / 2
    }

    pub fn era(&self) -> Era {
        Era::from_year(self.midpoint())
    }
}

impl std::fmt::Display for TemporalSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start_year, self.end_year)
    }
}

/// Metadata the document service reports for a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentCharacteristics {
    pub document_id: DocumentId,
    pub domain: String,
    pub word_count: u64,
    pub temporal_span: TemporalSpan,
    /// Complexity signal in [0, 1].
    pub complexity: UnitScore,
}

impl DocumentCharacteristics {
    pub fn complexity_level(&self) -> ComplexityLevel {
        ComplexityLevel::from_score(self.complexity)
    }

    pub fn era(&self) -> Era {
        self.temporal_span.era()
    }
}

/// The term under study.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TermContext {
    pub term: String,
    /// Spelling variants and inflections that should be tracked with the term.
    #[serde(default)]
    pub variants: Vec<String>,
}

impl TermContext {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            variants: Vec::new(),
        }
    }

    pub fn with_variants(mut self, variants: Vec<String>) -> Self {
        self.variants = variants;
        self
    }
}

/// An invocable NLP tool known to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Domains the tool is suited for; empty means domain-agnostic.
    #[serde(default)]
    pub domains: Vec<String>,
    /// Independent tools do not consume earlier outputs and may run in parallel.
    #[serde(default)]
    pub independent: bool,
    #[serde(default)]
    pub expected_runtime_ms: u64,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            domains: Vec::new(),
            independent: false,
            expected_runtime_ms: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_domains(mut self, domains: &[&str]) -> Self {
        self.domains = domains.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn independent(mut self) -> Self {
        self.independent = true;
        self
    }

    pub fn with_expected_runtime_ms(mut self, ms: u64) -> Self {
        self.expected_runtime_ms = ms;
        self
    }

    /// How well the tool fits a document domain: 1.0 listed, 0.5 agnostic, 0.0 otherwise.
    pub fn domain_fit(&self, domain: &str) -> f64 {
        if self.domains.is_empty() {
            0.5
        } else if self.domains.iter().any(|d| d.eq_ignore_ascii_case(domain)) {
            1.0
        } else {
            0.0
        }
    }
}

/// The set of tools the orchestrator may choose from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; a later registration with the same name replaces the earlier one.
    pub fn register(mut self, tool: ToolDescriptor) -> Self {
        self.tools.retain(|t| t.name != tool.name);
        self.tools.push(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name.as_str())
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Sum of expected runtimes of the named tools (unknown tools count 0).
    pub fn expected_runtime_ms(&self, names: &[String]) -> u64 {
        names
            .iter()
            .filter_map(|n| self.get(n))
            .map(|t| t.expected_runtime_ms)
            .sum()
    }
}

/// A proposed tool/model/strategy selection, as returned by an LLM or
/// synthesized by consensus.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StrategyProposal {
    /// Ordered, duplicate-free tool names.
    pub tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<EmbeddingModel>,
    pub strategy: String,
    #[serde(default)]
    pub reasoning: String,
    /// Confidence the model reported for its own proposal, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl StrategyProposal {
    pub fn new(tools: Vec<String>, strategy: impl Into<String>) -> Self {
        let mut proposal = Self {
            tools: Vec::new(),
            embedding_model: None,
            strategy: strategy.into(),
            reasoning: String::new(),
            confidence: None,
        };
        for tool in tools {
            proposal.push_tool(tool);
        }
        proposal
    }

    pub fn with_embedding_model(mut self, model: EmbeddingModel) -> Self {
        self.embedding_model = Some(model);
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Append a tool unless it is already selected. Returns whether it was added.
    pub fn push_tool(&mut self, tool: impl Into<String>) -> bool {
        let tool = tool.into();
        let tool = tool.trim();
        if tool.is_empty() || self.tools.iter().any(|t| t == tool) {
            return false;
        }
        self.tools.push(tool.to_string());
        true
    }

    /// Split tools into (known, unknown) against a registry, keeping order.
    pub fn retain_known(&mut self, registry: &ToolRegistry) -> Vec<String> {
        let (known, unknown): (Vec<String>, Vec<String>) = std::mem::take(&mut self.tools)
            .into_iter()
            .partition(|t| registry.contains(t));
        self.tools = known;
        unknown
    }

    /// The model-reported confidence, if present and within [0, 1].
    pub fn reported_confidence(&self) -> Option<UnitScore> {
        self.confidence
            .and_then(|c| UnitScore::new("reported confidence", c).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ToolRegistry {
        ToolRegistry::new()
            .register(ToolDescriptor::new("tokenizer").with_expected_runtime_ms(100))
            .register(
                ToolDescriptor::new("oed_lookup")
                    .with_domains(&["literature", "law"])
                    .with_expected_runtime_ms(400),
            )
    }

    #[test]
    fn test_complexity_buckets() {
        assert_eq!(ComplexityLevel::from_score(UnitScore::saturating(0.1)), ComplexityLevel::Low);
        assert_eq!(ComplexityLevel::from_score(UnitScore::saturating(0.5)), ComplexityLevel::Medium);
        assert_eq!(ComplexityLevel::from_score(UnitScore::saturating(0.9)), ComplexityLevel::High);
    }

    #[test]
    fn test_temporal_span_normalizes_and_buckets() {
        let span = TemporalSpan::new(1750, 1600);
        assert_eq!(span.start_year, 1600);
        assert_eq!(span.years(), 150);
        assert_eq!(span.era(), Era::EarlyModern);
        assert_eq!(TemporalSpan::new(1950, 2000).era(), Era::Contemporary);
        assert!(Era::Medieval.is_historical());
    }

    #[test]
    fn test_domain_fit() {
        let reg = registry();
        assert_eq!(reg.get("oed_lookup").unwrap().domain_fit("LAW"), 1.0);
        assert_eq!(reg.get("oed_lookup").unwrap().domain_fit("science"), 0.0);
        assert_eq!(reg.get("tokenizer").unwrap().domain_fit("science"), 0.5);
    }

    #[test]
    fn test_registry_replaces_duplicates() {
        let reg = registry().register(ToolDescriptor::new("tokenizer").independent());
        assert_eq!(reg.len(), 2);
        assert!(reg.get("tokenizer").unwrap().independent);
    }

    #[test]
    fn test_expected_runtime() {
        let reg = registry();
        let names = vec!["tokenizer".to_string(), "oed_lookup".to_string(), "x".to_string()];
        assert_eq!(reg.expected_runtime_ms(&names), 500);
    }

    #[test]
    fn test_proposal_dedups_and_filters() {
        let mut proposal = StrategyProposal::new(
            vec!["tokenizer".into(), "tokenizer".into(), "ghost".into(), "oed_lookup".into()],
            "baseline",
        );
        assert_eq!(proposal.tools.len(), 3);
        let dropped = proposal.retain_known(&registry());
        assert_eq!(dropped, vec!["ghost".to_string()]);
        assert_eq!(proposal.tools, vec!["tokenizer".to_string(), "oed_lookup".to_string()]);
    }

    #[test]
    fn test_reported_confidence_rejects_out_of_range() {
        let p = StrategyProposal::new(vec![], "s").with_confidence(1.7);
        assert!(p.reported_confidence().is_none());
        let p = StrategyProposal::new(vec![], "s").with_confidence(0.8);
        assert_eq!(p.reported_confidence().unwrap().value(), 0.8);
    }
}
