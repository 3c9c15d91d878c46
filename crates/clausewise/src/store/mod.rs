//! Persistence for documents, clauses and playbooks.
//!
//! The orchestrator only sees the [`DocumentStore`] trait. Two adapters
//! implement it: [`SqliteStore`] for real deployments and [`MemoryStore`]
//! for tests and one-shot CLI runs.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::analysis::ClauseFinding;
use crate::document::{Document, DocumentId, DocumentStatus, DocumentUpdate, Playbook, PlaybookId};

pub mod memory;
pub mod migrations;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{default_database_path, SqliteStore};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Document {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: DocumentStatus,
        to: DocumentStatus,
    },

    #[error("Failed to encode stored JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid stored value in column '{column}': {value}")]
    Corrupt { column: &'static str, value: String },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
}

/// A persisted clause. Created in bulk by one job run and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClauseRecord {
    pub id: Uuid,
    pub document_id: DocumentId,
    #[serde(flatten)]
    pub finding: ClauseFinding,
    pub created_at: DateTime<Utc>,
}

impl ClauseRecord {
    pub fn new(document_id: DocumentId, finding: ClauseFinding) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            finding,
            created_at: Utc::now(),
        }
    }
}

/// The narrow storage contract the job pipeline depends on.
pub trait DocumentStore: Send + Sync {
    fn insert_document(&self, document: &Document) -> Result<(), StoreError>;

    fn load_document(&self, id: &DocumentId) -> Result<Option<Document>, StoreError>;

    /// Applies `update` as one unit and returns the updated record.
    fn update_document(
        &self,
        id: &DocumentId,
        update: &DocumentUpdate,
    ) -> Result<Document, StoreError>;

    /// Deletes a document and its clauses. Returns whether it existed.
    fn delete_document(&self, id: &DocumentId) -> Result<bool, StoreError>;

    /// Inserts all clauses or none. Returns the number inserted.
    fn insert_clauses(&self, clauses: &[ClauseRecord]) -> Result<usize, StoreError>;

    fn delete_clauses(&self, document_id: &DocumentId) -> Result<usize, StoreError>;

    /// Clauses of a document ordered by start position.
    fn list_clauses(&self, document_id: &DocumentId) -> Result<Vec<ClauseRecord>, StoreError>;

    fn insert_playbook(&self, playbook: &Playbook) -> Result<(), StoreError>;

    fn load_playbook(&self, id: &PlaybookId) -> Result<Option<Playbook>, StoreError>;
}

pub(crate) fn document_missing(id: &DocumentId) -> StoreError {
    StoreError::NotFound {
        kind: "Document",
        id: id.to_string(),
    }
}
