use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreError;

/// Job-level failure taxonomy. Every variant ends a job as `Failed` with
/// its `Display` text as the human-readable message.
#[derive(Error, Debug)]
pub enum ClausewiseError {
    #[error("{0}")]
    Validation(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("failed to extract text: unsupported content type '{0}'")]
    UnsupportedFormat(String),

    #[error("failed to extract text: {0}")]
    Extraction(String),

    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ClausewiseError {
    pub fn document_not_found(id: impl ToString) -> Self {
        ClausewiseError::NotFound {
            kind: "Document",
            id: id.to_string(),
        }
    }

    pub fn playbook_not_found(id: impl ToString) -> Self {
        ClausewiseError::NotFound {
            kind: "Playbook",
            id: id.to_string(),
        }
    }
}

impl From<ExtractError> for ClausewiseError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::UnsupportedFormat(content_type) => {
                ClausewiseError::UnsupportedFormat(content_type)
            }
            other => ClausewiseError::Extraction(other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Unsupported content type: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to read document '{path}': {source}")]
    ReadDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to process PDF: {0}")]
    PdfProcessing(String),

    #[error("Failed to process DOCX: {0}")]
    DocxProcessing(String),
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("No text to analyze")]
    EmptyText,

    #[error("Strategy '{strategy}' failed: {reason}")]
    StrategyFailed { strategy: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ClausewiseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_errors_carry_failed_to_extract_prefix() {
        let err: ClausewiseError = ExtractError::PdfProcessing("bad xref".to_string()).into();
        assert!(err.to_string().starts_with("failed to extract text"));

        let err: ClausewiseError = ExtractError::UnsupportedFormat("text/plain".to_string()).into();
        assert!(matches!(err, ClausewiseError::UnsupportedFormat(_)));
        assert!(err.to_string().starts_with("failed to extract text"));
    }

    #[test]
    fn test_not_found_message() {
        let err = ClausewiseError::document_not_found("abc");
        assert_eq!(err.to_string(), "Document abc not found");

        let err = ClausewiseError::playbook_not_found("p1");
        assert_eq!(err.to_string(), "Playbook p1 not found");
    }
}
