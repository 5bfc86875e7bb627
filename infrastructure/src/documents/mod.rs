//! Document service adapters.

mod manifest;

pub use manifest::{ManifestDocumentService, ManifestError};
