//! Wire types of the Ollama HTTP API

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
}

#[derive(Debug, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
pub struct TagEntry {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_request_is_non_streaming() {
        let messages = vec![ChatMessage::system("be terse"), ChatMessage::user("hi")];
        let body = serde_json::to_value(ChatRequest {
            model: "llama3.3",
            messages: &messages,
            stream: false,
        })
        .unwrap();
        assert_eq!(
            body,
            json!({
                "model": "llama3.3",
                "stream": false,
                "messages": [
                    {"role": "system", "content": "be terse"},
                    {"role": "user", "content": "hi"}
                ]
            })
        );
    }

    #[test]
    fn test_chat_response_ignores_extra_fields() {
        let response: ChatResponse = serde_json::from_value(json!({
            "model": "llama3.3",
            "created_at": "2024-01-01T00:00:00Z",
            "message": {"role": "assistant", "content": "{\"tools\": []}"},
            "done": true,
            "total_duration": 123
        }))
        .unwrap();
        assert_eq!(response.message.role, "assistant");
    }
}
