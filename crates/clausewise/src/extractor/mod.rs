pub mod docx;
pub mod pdf;

use std::path::Path;

use serde_json::{Map, Value};

use crate::document::ContentType;
use crate::error::ExtractError;

pub const PARSER_VERSION: &str = "1.0";

/// Structural metadata about a stored document. Keys vary per format.
pub type ExtractionMetadata = Map<String, Value>;

pub struct Extraction {
    pub text: String,
    pub metadata: ExtractionMetadata,
}

pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, path: &Path) -> Result<String, ExtractError>;
    fn extract_metadata(&self, path: &Path) -> Result<ExtractionMetadata, ExtractError>;
    fn supports(&self, content_type: ContentType) -> bool;
}

pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn TextExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self {
            extractors: vec![
                Box::new(pdf::PdfExtractor::new()),
                Box::new(docx::DocxExtractor::new()),
            ],
        }
    }

    fn route(&self, content_type: &str) -> Result<(&dyn TextExtractor, ContentType), ExtractError> {
        let parsed = ContentType::from_mime(content_type)
            .ok_or_else(|| ExtractError::UnsupportedFormat(content_type.to_string()))?;

        self.extractors
            .iter()
            .find(|e| e.supports(parsed))
            .map(|e| (e.as_ref(), parsed))
            .ok_or_else(|| ExtractError::UnsupportedFormat(content_type.to_string()))
    }

    /// Extracts text for a declared MIME type. Unknown types fail before any I/O.
    pub fn extract(&self, path: &Path, content_type: &str) -> Result<String, ExtractError> {
        let (extractor, _) = self.route(content_type)?;
        extractor.extract_text(path)
    }

    /// Collects document metadata. Never fails: any error degrades to an empty map.
    pub fn metadata(&self, path: &Path, content_type: &str) -> ExtractionMetadata {
        let result = self
            .route(content_type)
            .and_then(|(extractor, parsed)| {
                let mut metadata = base_metadata(path, parsed)?;
                metadata.extend(extractor.extract_metadata(path)?);
                Ok(metadata)
            });

        match result {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!("Metadata extraction failed for {}: {}", path.display(), e);
                Map::new()
            }
        }
    }

    /// Text and metadata together, with metadata collected on a second thread.
    pub fn extract_with_metadata(
        &self,
        path: &Path,
        content_type: &str,
    ) -> Result<Extraction, ExtractError> {
        // Reject unknown types up front so no thread is spawned for them.
        self.route(content_type)?;

        std::thread::scope(|scope| {
            let metadata_handle = scope.spawn(|| self.metadata(path, content_type));
            let text = self.extract(path, content_type);
            let metadata = metadata_handle.join().unwrap_or_else(|_| {
                tracing::warn!("Metadata extraction panicked for {}", path.display());
                Map::new()
            });

            text.map(|text| Extraction { text, metadata })
        })
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn base_metadata(path: &Path, content_type: ContentType) -> Result<ExtractionMetadata, ExtractError> {
    let file_size = std::fs::metadata(path)
        .map_err(|e| ExtractError::ReadDocument {
            path: path.to_path_buf(),
            source: e,
        })?
        .len();

    let mut metadata = Map::new();
    metadata.insert("file_size".to_string(), Value::from(file_size));
    metadata.insert("mime_type".to_string(), Value::from(content_type.mime()));
    metadata.insert("parser_version".to_string(), Value::from(PARSER_VERSION));
    Ok(metadata)
}

/// Inserts `value` under `key` unless it is blank.
pub(crate) fn insert_text(metadata: &mut ExtractionMetadata, key: &str, value: Option<String>) {
    if let Some(value) = value {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            metadata.insert(key.to_string(), Value::from(trimmed.to_string()));
        }
    }
}
