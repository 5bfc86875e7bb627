//! Ollama adapter (feature `ollama`)
//!
//! Talks to a local Ollama server through its non-streaming `/api/chat`
//! endpoint. The chat API is stateless, so each session keeps its own
//! message history and resends it on every call.

mod error;
mod gateway;
mod protocol;

pub use error::OllamaError;
pub use gateway::{OllamaLlmGateway, OllamaSession};
