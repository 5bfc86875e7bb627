//! Prompt templates for strategy proposals

use crate::decision::{DocumentCharacteristics, TermContext, ToolRegistry};

/// Templates for the proposal conversation
pub struct PromptTemplate;

impl PromptTemplate {
    /// System prompt for proposal sessions
    pub fn proposal_system() -> &'static str {
        r#"You are an orchestration assistant for a semantic-drift research platform.
Researchers track how the meaning of words changes across historical texts.
For each document you choose which NLP tools to run, which embedding model to use, and a short processing strategy label.
Only choose tools from the list you are given. Prefer fewer tools when they cover the goal.
Answer with a single JSON object and nothing else."#
    }

    /// User prompt asking for a strategy proposal
    pub fn proposal_prompt(
        characteristics: &DocumentCharacteristics,
        term: &TermContext,
        goal: &str,
        registry: &ToolRegistry,
    ) -> String {
        let mut prompt = format!(
            r#"Experiment goal: {}

Term under study: "{}""#,
            goal, term.term
        );
        if !term.variants.is_empty() {
            prompt.push_str(&format!(" (variants: {})", term.variants.join(", ")));
        }

        prompt.push_str(&format!(
            r#"

Document {}:
- domain: {}
- word count: {}
- temporal span: {} ({})
- complexity: {} ({})

Available tools:
"#,
            characteristics.document_id,
            characteristics.domain,
            characteristics.word_count,
            characteristics.temporal_span,
            characteristics.era().as_str(),
            characteristics.complexity,
            characteristics.complexity_level().as_str(),
        ));

        for tool in registry.tools() {
            prompt.push_str(&format!("- {}", tool.name));
            if !tool.description.is_empty() {
                prompt.push_str(&format!(": {}", tool.description));
            }
            if !tool.domains.is_empty() {
                prompt.push_str(&format!(" [domains: {}]", tool.domains.join(", ")));
            }
            prompt.push('\n');
        }

        prompt.push_str(Self::response_format());
        prompt
    }

    /// Reminder appended when a previous answer could not be parsed
    pub fn format_reminder() -> String {
        format!(
            "Your previous answer could not be read.{}",
            Self::response_format()
        )
    }

    fn response_format() -> &'static str {
        r#"
Respond with JSON in this shape:
{"tools": ["tool_name", ...], "embedding_model": "model name", "strategy": "short label", "reasoning": "why", "confidence": 0.0-1.0}"#
    }
}
