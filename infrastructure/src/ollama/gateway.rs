//! Ollama gateway and session

use super::error::OllamaError;
use super::protocol::{ChatMessage, ChatRequest, ChatResponse, TagsResponse};
use async_trait::async_trait;
use semantra_application::{GatewayError, LlmGateway, LlmSession};
use semantra_domain::Model;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Gateway to an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaLlmGateway {
    client: reqwest::Client,
    endpoint: String,
}

impl OllamaLlmGateway {
    /// `endpoint` is the server base URL, e.g. `http://localhost:11434`.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, OllamaError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        info!("Ollama gateway at {}", endpoint);
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Fail with the status and body unless the response succeeded.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, OllamaError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(OllamaError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl LlmGateway for OllamaLlmGateway {
    async fn create_session_with_system_prompt(
        &self,
        model: &Model,
        system_prompt: &str,
    ) -> Result<Box<dyn LlmSession>, GatewayError> {
        let mut messages = Vec::new();
        if !system_prompt.is_empty() {
            messages.push(ChatMessage::system(system_prompt));
        }
        Ok(Box::new(OllamaSession {
            client: self.client.clone(),
            chat_url: format!("{}/api/chat", self.endpoint),
            model: model.clone(),
            messages: Mutex::new(messages),
        }))
    }

    async fn available_models(&self) -> Result<Vec<Model>, GatewayError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.endpoint))
            .send()
            .await
            .map_err(OllamaError::from)?;
        let tags: TagsResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(OllamaError::from)?;
        Ok(tags
            .models
            .into_iter()
            .map(|tag| {
                // Ollama reports `name:tag`; the default tag is implied
                let name = tag.name.strip_suffix(":latest").unwrap_or(&tag.name);
                let Ok(model) = name.parse::<Model>();
                model
            })
            .collect())
    }
}

/// One chat with a model; history is kept locally.
pub struct OllamaSession {
    client: reqwest::Client,
    chat_url: String,
    model: Model,
    messages: Mutex<Vec<ChatMessage>>,
}

impl OllamaSession {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatMessage, OllamaError> {
        debug!(
            model = %self.model,
            messages = messages.len(),
            "Calling Ollama chat API"
        );
        let response = self
            .client
            .post(&self.chat_url)
            .json(&ChatRequest {
                model: self.model.as_str(),
                messages,
                stream: false,
            })
            .send()
            .await?;
        let body: ChatResponse = check_status(response).await?.json().await?;
        if body.message.content.trim().is_empty() {
            return Err(OllamaError::UnexpectedResponse(
                "empty assistant message".to_string(),
            ));
        }
        Ok(body.message)
    }
}

#[async_trait]
impl LlmSession for OllamaSession {
    fn model(&self) -> &Model {
        &self.model
    }

    async fn send(&self, content: &str) -> Result<String, GatewayError> {
        let mut messages = self.messages.lock().await;
        messages.push(ChatMessage::user(content));
        match self.chat(&messages).await {
            Ok(reply) => {
                let text = reply.content.clone();
                messages.push(reply);
                Ok(text)
            }
            Err(e) => {
                // Leave history as it was so a retry resends the same turn
                messages.pop();
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_starts_with_system_prompt() {
        let gateway =
            OllamaLlmGateway::new("http://localhost:11434/", Duration::from_secs(1)).unwrap();
        assert_eq!(gateway.endpoint(), "http://localhost:11434");

        let session = gateway
            .create_session_with_system_prompt(&Model::Llama33, "be terse")
            .await
            .unwrap();
        assert_eq!(session.model(), &Model::Llama33);
    }

    #[tokio::test]
    async fn test_unreachable_server_keeps_history_clean() {
        // Port 9 (discard) is not an Ollama server
        let gateway = OllamaLlmGateway::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let session = OllamaSession {
            client: gateway.client.clone(),
            chat_url: format!("{}/api/chat", gateway.endpoint),
            model: Model::Llama33,
            messages: Mutex::new(vec![ChatMessage::system("s")]),
        };
        assert!(session.send("hello").await.is_err());
        assert_eq!(session.messages.lock().await.len(), 1);
    }
}
