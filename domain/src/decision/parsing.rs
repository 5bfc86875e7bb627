//! Strategy proposal parsing.
//!
//! Extracts a [`StrategyProposal`] from a free-form LLM response. Pure text
//! handling, no I/O.
//!
//! # Supported Formats
//!
//! 1. Fenced ` ```json ` (or bare ` ``` `) block containing an object
//! 2. The entire response is a JSON object
//! 3. An object embedded in prose (first `{` to last `}`)

use super::value_objects::StrategyProposal;
use crate::core::model::EmbeddingModel;
use serde_json::Value;

/// Parse a proposal from an LLM response.
///
/// Returns `None` when no object with at least a tool list or a strategy
/// label can be found.
pub fn parse_strategy_proposal(response: &str) -> Option<StrategyProposal> {
    let mut in_block = false;
    let mut current_block = String::new();

    for line in response.lines() {
        let trimmed = line.trim();
        if !in_block && (trimmed == "```json" || trimmed == "```") {
            in_block = true;
            current_block.clear();
        } else if in_block && trimmed == "```" {
            in_block = false;
            if let Ok(parsed) = serde_json::from_str::<Value>(&current_block)
                && let Some(proposal) = parse_proposal_json(&parsed)
            {
                return Some(proposal);
            }
        } else if in_block {
            current_block.push_str(line);
            current_block.push('\n');
        }
    }

    if let Ok(parsed) = serde_json::from_str::<Value>(response.trim()) {
        return parse_proposal_json(&parsed);
    }

    if let Some(start) = response.find('{')
        && let Some(end) = response.rfind('}')
        && end > start
        && let Ok(parsed) = serde_json::from_str::<Value>(&response[start..=end])
    {
        return parse_proposal_json(&parsed);
    }

    None
}

/// Parse a proposal from a JSON value.
///
/// Expected schema:
/// ```json
/// {
///   "tools": ["tokenizer", "oed_lookup"],
///   "embedding_model": "macberth",
///   "strategy": "diachronic alignment",
///   "reasoning": "string (optional)",
///   "confidence": 0.8
/// }
/// ```
///
/// `tools` entries may also be objects with a `name` field, and
/// `processing_strategy` is accepted as an alias of `strategy`.
pub fn parse_proposal_json(json: &Value) -> Option<StrategyProposal> {
    let object = json.as_object()?;

    let tools = object.get("tools").map(tool_names).unwrap_or_default();
    let strategy = object
        .get("strategy")
        .or_else(|| object.get("processing_strategy"))
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("");

    if tools.is_empty() && strategy.is_empty() {
        return None;
    }

    let mut proposal = StrategyProposal::new(tools, strategy);

    if let Some(model) = object
        .get("embedding_model")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        && let Ok(model) = model.parse::<EmbeddingModel>()
    {
        proposal = proposal.with_embedding_model(model);
    }

    if let Some(reasoning) = object.get("reasoning").and_then(Value::as_str) {
        proposal = proposal.with_reasoning(reasoning.trim());
    }

    let confidence = match object.get("confidence") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    if let Some(confidence) = confidence {
        proposal = proposal.with_confidence(confidence);
    }

    Some(proposal)
}

fn tool_names(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Object(o) => o
                    .get("name")
                    .or_else(|| o.get("tool"))
                    .and_then(Value::as_str)
                    .map(|s| s.trim().to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}
