//! Document, playbook and upload admission types.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::error::ClausewiseError;
use crate::store::StoreError;

pub const PDF_MIME: &str = "application/pdf";
pub const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const DOC_MIME: &str = "application/msword";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn parse(raw: &str) -> Result<Self, ClausewiseError> {
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| ClausewiseError::Validation(format!("Invalid document ID format: {}", raw)))
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaybookId(Uuid);

impl PlaybookId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn parse(raw: &str) -> Result<Self, ClausewiseError> {
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| ClausewiseError::Validation(format!("Invalid playbook ID format: {}", raw)))
    }
}

impl Default for PlaybookId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlaybookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content types the extractor accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Pdf,
    Docx,
    /// Legacy Word. Routed to the DOCX extractor.
    Doc,
}

impl ContentType {
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            PDF_MIME => Some(ContentType::Pdf),
            DOCX_MIME => Some(ContentType::Docx),
            DOC_MIME => Some(ContentType::Doc),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Pdf => PDF_MIME,
            ContentType::Docx => DOCX_MIME,
            ContentType::Doc => DOC_MIME,
        }
    }

    /// Best guess from a file name, used when the uploader declared nothing.
    pub fn guess_from_path(path: &Path) -> Option<Self> {
        mime_guess::from_path(path)
            .iter()
            .find_map(|mime| Self::from_mime(mime.essence_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Complete,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Complete => "complete",
            DocumentStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DocumentStatus::Pending),
            "processing" => Some(DocumentStatus::Processing),
            "complete" => Some(DocumentStatus::Complete),
            "error" => Some(DocumentStatus::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Complete | DocumentStatus::Error)
    }

    /// Pending -> Processing -> {Complete | Error}. Never backward.
    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        matches!(
            (self, next),
            (DocumentStatus::Pending, DocumentStatus::Processing)
                | (DocumentStatus::Processing, DocumentStatus::Complete)
                | (DocumentStatus::Processing, DocumentStatus::Error)
        )
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// Stored file name.
    pub filename: String,
    /// Name the uploader gave the file.
    pub original_filename: String,
    pub file_path: PathBuf,
    pub content_type: String,
    pub file_size: u64,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_completed_at: Option<DateTime<Utc>>,
    pub extracted_text_length: Option<u64>,
    pub total_clauses_found: u64,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// A freshly uploaded document in `Pending` state.
    pub fn new(
        original_filename: &str,
        file_path: impl Into<PathBuf>,
        content_type: &str,
        file_size: u64,
    ) -> Self {
        let file_path = file_path.into();
        let filename = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| original_filename.to_string());
        let now = Utc::now();

        Self {
            id: DocumentId::new(),
            filename,
            original_filename: original_filename.to_string(),
            file_path,
            content_type: content_type.to_string(),
            file_size,
            status: DocumentStatus::Pending,
            error_message: None,
            processing_started_at: None,
            processing_completed_at: None,
            extracted_text_length: None,
            total_clauses_found: 0,
            metadata: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a field-set update, enforcing the status lifecycle.
    pub fn apply(&mut self, update: &DocumentUpdate) -> Result<(), StoreError> {
        if self.status.is_terminal() {
            return Err(StoreError::InvalidTransition {
                id: self.id.to_string(),
                from: self.status,
                to: update.status.unwrap_or(self.status),
            });
        }

        if let Some(next) = update.status {
            if next != self.status && !self.status.can_transition_to(next) {
                return Err(StoreError::InvalidTransition {
                    id: self.id.to_string(),
                    from: self.status,
                    to: next,
                });
            }
            self.status = next;
        }
        if let Some(ref message) = update.error_message {
            self.error_message = Some(message.clone());
        }
        if let Some(started) = update.processing_started_at {
            self.processing_started_at = Some(started);
        }
        if let Some(completed) = update.processing_completed_at {
            self.processing_completed_at = Some(completed);
        }
        if let Some(length) = update.extracted_text_length {
            self.extracted_text_length = Some(length);
        }
        if let Some(count) = update.total_clauses_found {
            self.total_clauses_found = count;
        }
        if let Some(ref metadata) = update.metadata {
            self.metadata = metadata.clone();
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// A set of document fields to change together. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct DocumentUpdate {
    pub status: Option<DocumentStatus>,
    pub error_message: Option<String>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_completed_at: Option<DateTime<Utc>>,
    pub extracted_text_length: Option<u64>,
    pub total_clauses_found: Option<u64>,
    pub metadata: Option<Map<String, Value>>,
}

impl DocumentUpdate {
    pub fn processing(started_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(DocumentStatus::Processing),
            processing_started_at: Some(started_at),
            ..Default::default()
        }
    }

    pub fn text_length(length: u64) -> Self {
        Self {
            extracted_text_length: Some(length),
            ..Default::default()
        }
    }

    pub fn complete(
        completed_at: DateTime<Utc>,
        total_clauses: u64,
        metadata: Map<String, Value>,
    ) -> Self {
        Self {
            status: Some(DocumentStatus::Complete),
            processing_completed_at: Some(completed_at),
            total_clauses_found: Some(total_clauses),
            metadata: Some(metadata),
            ..Default::default()
        }
    }

    pub fn error(message: &str, completed_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(DocumentStatus::Error),
            error_message: Some(message.to_string()),
            processing_completed_at: Some(completed_at),
            ..Default::default()
        }
    }
}

/// A user-defined rule set. Comparison against it is not implemented yet;
/// only its identity and name flow into analysis results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    pub id: PlaybookId,
    pub name: String,
    pub description: Option<String>,
    pub rules: Value,
    pub version: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Playbook {
    pub fn new(name: &str, rules: Value) -> Self {
        Self {
            id: PlaybookId::new(),
            name: name.to_string(),
            description: None,
            rules,
            version: "1.0".to_string(),
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

/// Admission check for an upload, run before any document or job exists.
pub fn validate_upload(
    original_filename: &str,
    declared_content_type: Option<&str>,
    size: u64,
    config: &UploadConfig,
) -> Result<ContentType, ClausewiseError> {
    if size == 0 {
        return Err(ClausewiseError::Validation("Empty file".to_string()));
    }
    if size > config.max_file_size {
        return Err(ClausewiseError::Validation(format!(
            "File too large: {} bytes (limit {} bytes)",
            size, config.max_file_size
        )));
    }

    let extension = Path::new(original_filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();
    if !config
        .allowed_extensions
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&extension))
    {
        return Err(ClausewiseError::Validation(format!(
            "File type not allowed: '{}'",
            original_filename
        )));
    }

    match declared_content_type {
        Some(mime) => ContentType::from_mime(mime)
            .ok_or_else(|| ClausewiseError::UnsupportedFormat(mime.to_string())),
        None => ContentType::guess_from_path(Path::new(original_filename))
            .ok_or_else(|| ClausewiseError::UnsupportedFormat(extension)),
    }
}
