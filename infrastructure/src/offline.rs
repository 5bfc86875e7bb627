//! Gateway used when no LLM provider is configured (`[llm] provider = "none"`).
//!
//! Every session request fails, so proposals finalize as `error` and the
//! rest of the engine (feedback, overrides, patterns) keeps working.

use async_trait::async_trait;
use semantra_application::{GatewayError, LlmGateway, LlmSession};
use semantra_domain::Model;

#[derive(Debug, Clone)]
pub struct OfflineLlmGateway {
    reason: String,
}

impl OfflineLlmGateway {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Default for OfflineLlmGateway {
    fn default() -> Self {
        Self::new("no LLM provider configured")
    }
}

#[async_trait]
impl LlmGateway for OfflineLlmGateway {
    async fn create_session_with_system_prompt(
        &self,
        model: &Model,
        _system_prompt: &str,
    ) -> Result<Box<dyn LlmSession>, GatewayError> {
        Err(GatewayError::ConnectionError(format!(
            "{} (requested {})",
            self.reason, model
        )))
    }

    async fn available_models(&self) -> Result<Vec<Model>, GatewayError> {
        Ok(Vec::new())
    }
}
