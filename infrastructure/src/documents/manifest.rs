//! Document service backed by a TOML manifest.
//!
//! ```toml
//! [[documents]]
//! id = "hamlet-q2"
//! domain = "literature"
//! word_count = 29551
//! start_year = 1600
//! end_year = 1604
//! complexity = 0.7
//! ```

use async_trait::async_trait;
use semantra_application::{DocumentError, DocumentService};
use semantra_domain::{DocumentCharacteristics, DocumentId, TemporalSpan, UnitScore};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read document manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Document manifest is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Document {id}: {message}")]
    InvalidEntry { id: String, message: String },
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    documents: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    id: String,
    domain: String,
    #[serde(default)]
    word_count: u64,
    start_year: i32,
    end_year: i32,
    complexity: f64,
}

impl ManifestEntry {
    fn into_characteristics(self) -> Result<DocumentCharacteristics, ManifestError> {
        let complexity =
            UnitScore::new("complexity", self.complexity).map_err(|e| ManifestError::InvalidEntry {
                id: self.id.clone(),
                message: e.to_string(),
            })?;
        if self.domain.trim().is_empty() {
            return Err(ManifestError::InvalidEntry {
                id: self.id,
                message: "domain cannot be empty".to_string(),
            });
        }
        Ok(DocumentCharacteristics {
            document_id: DocumentId::new(self.id),
            domain: self.domain,
            word_count: self.word_count,
            temporal_span: TemporalSpan::new(self.start_year, self.end_year),
            complexity,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ManifestDocumentService {
    documents: BTreeMap<DocumentId, DocumentCharacteristics>,
}

impl ManifestDocumentService {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a manifest; a repeated id keeps the last entry.
    pub fn from_toml_str(content: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest = toml::from_str(content)?;
        let documents = manifest
            .documents
            .into_iter()
            .map(|entry| {
                entry
                    .into_characteristics()
                    .map(|c| (c.document_id.clone(), c))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { documents })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl DocumentService for ManifestDocumentService {
    async fn characteristics(
        &self,
        id: &DocumentId,
    ) -> Result<DocumentCharacteristics, DocumentError> {
        self.documents
            .get(id)
            .cloned()
            .ok_or_else(|| DocumentError::NotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<DocumentId>, DocumentError> {
        Ok(self.documents.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
[[documents]]
id = "hamlet-q2"
domain = "literature"
word_count = 29551
start_year = 1604
end_year = 1600
complexity = 0.7

[[documents]]
id = "hansard-1850"
domain = "politics"
start_year = 1850
end_year = 1850
complexity = 0.4
"#;

    #[tokio::test]
    async fn test_reads_characteristics() {
        let service = ManifestDocumentService::from_toml_str(MANIFEST).unwrap();
        assert_eq!(service.len(), 2);

        let hamlet = service.characteristics(&"hamlet-q2".into()).await.unwrap();
        assert_eq!(hamlet.domain, "literature");
        // Reversed bounds are normalized
        assert_eq!(hamlet.temporal_span, TemporalSpan::new(1600, 1604));
        assert_eq!(hamlet.complexity.value(), 0.7);

        let ids = service.list().await.unwrap();
        assert_eq!(ids, vec![DocumentId::new("hamlet-q2"), DocumentId::new("hansard-1850")]);
    }

    #[tokio::test]
    async fn test_unknown_document() {
        let service = ManifestDocumentService::default();
        assert!(matches!(
            service.characteristics(&"missing".into()).await,
            Err(DocumentError::NotFound(_))
        ));
    }

    #[test]
    fn test_complexity_out_of_range() {
        let err = ManifestDocumentService::from_toml_str(
            "[[documents]]\nid = \"x\"\ndomain = \"law\"\nstart_year = 1\nend_year = 2\ncomplexity = 1.5\n",
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::InvalidEntry { id, .. } if id == "x"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("documents.toml");
        std::fs::write(&path, MANIFEST).unwrap();
        assert_eq!(ManifestDocumentService::load(&path).unwrap().len(), 2);
        assert!(matches!(
            ManifestDocumentService::load(dir.path().join("none.toml")),
            Err(ManifestError::Io { .. })
        ));
    }
}
