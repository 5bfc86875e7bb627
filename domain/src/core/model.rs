//! Model value objects: the LLMs that propose strategies and the embedding
//! models a strategy may select.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// LLMs that can propose or vote on a processing strategy (Value Object)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Model {
    Llama33,
    Qwen25,
    Mistral,
    Gemma3,
    /// Any other model name the gateway serves
    Custom(String),
}

impl Model {
    /// Get the string identifier for this model
    pub fn as_str(&self) -> &str {
        match self {
            Model::Llama33 => "llama3.3",
            Model::Qwen25 => "qwen2.5",
            Model::Mistral => "mistral",
            Model::Gemma3 => "gemma3",
            Model::Custom(s) => s,
        }
    }
}

impl Default for Model {
    /// Returns the default proposal model (a local Llama)
    fn default() -> Self {
        Model::Llama33
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Model {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "llama3.3" => Model::Llama33,
            "qwen2.5" => Model::Qwen25,
            "mistral" => Model::Mistral,
            "gemma3" => Model::Gemma3,
            other => Model::Custom(other.to_string()),
        })
    }
}

impl Serialize for Model {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Model {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        // FromStr is infallible: unknown names become Model::Custom
        let Ok(model) = s.parse::<Model>();
        Ok(model)
    }
}

/// Embedding model a processing strategy may select.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EmbeddingModel {
    BertBaseUncased,
    /// BERT fine-tuned on historical English (MacBERTh).
    MacBerth,
    Word2VecTemporal,
    FastText,
    OpenAiTextEmbedding3Large,
    Custom(String),
}

impl EmbeddingModel {
    pub fn as_str(&self) -> &str {
        match self {
            EmbeddingModel::BertBaseUncased => "bert-base-uncased",
            EmbeddingModel::MacBerth => "macberth",
            EmbeddingModel::Word2VecTemporal => "word2vec-temporal",
            EmbeddingModel::FastText => "fasttext",
            EmbeddingModel::OpenAiTextEmbedding3Large => "text-embedding-3-large",
            EmbeddingModel::Custom(s) => s,
        }
    }

    /// Whether the model was trained for pre-modern text
    pub fn is_historical(&self) -> bool {
        matches!(
            self,
            EmbeddingModel::MacBerth | EmbeddingModel::Word2VecTemporal
        )
    }
}

impl Default for EmbeddingModel {
    fn default() -> Self {
        EmbeddingModel::BertBaseUncased
    }
}

impl std::fmt::Display for EmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EmbeddingModel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "bert-base-uncased" | "bert" => EmbeddingModel::BertBaseUncased,
            "macberth" => EmbeddingModel::MacBerth,
            "word2vec-temporal" | "word2vec" => EmbeddingModel::Word2VecTemporal,
            "fasttext" => EmbeddingModel::FastText,
            "text-embedding-3-large" => EmbeddingModel::OpenAiTextEmbedding3Large,
            _ => EmbeddingModel::Custom(s.trim().to_string()),
        })
    }
}

impl Serialize for EmbeddingModel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EmbeddingModel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let Ok(model) = s.parse::<EmbeddingModel>();
        Ok(model)
    }
}
