//! Error types for the Ollama adapter

use semantra_application::GatewayError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OllamaError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Ollama returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl From<OllamaError> for GatewayError {
    fn from(e: OllamaError) -> Self {
        match e {
            OllamaError::Http(e) if e.is_timeout() => GatewayError::Timeout,
            OllamaError::Http(e) if e.is_connect() => GatewayError::ConnectionError(e.to_string()),
            OllamaError::Status { status: 404, body } => GatewayError::ModelNotAvailable(body),
            other => GatewayError::RequestFailed(other.to_string()),
        }
    }
}
