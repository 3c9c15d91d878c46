//! SQLite adapter.
//!
//! One connection behind a `Mutex`; SQLite serializes writes anyway and WAL
//! mode keeps readers from blocking.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{document_missing, migrations, ClauseRecord, DocumentStore, StoreError};
use crate::analysis::{Category, ClauseFinding, RiskLevel};
use crate::document::{
    Document, DocumentId, DocumentStatus, DocumentUpdate, Playbook, PlaybookId,
};

/// Thread-safe handle; clones share the same connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path` and runs pending migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        migrations::run_all(&mut conn)?;

        log::info!("Database opened at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::run_all(&mut conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError>,
    {
        let mut conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&mut conn)
    }
}

/// `~/.clausewise/data/clausewise.db`
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".clausewise").join("data").join("clausewise.db"))
}

fn parse_timestamp(column: &'static str, s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::Corrupt {
            column,
            value: s.to_string(),
        })
}

fn parse_optional_timestamp(
    column: &'static str,
    s: Option<String>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    s.map(|s| parse_timestamp(column, &s)).transpose()
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_uuid(column: &'static str, s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|_| StoreError::Corrupt {
        column,
        value: s.to_string(),
    })
}

fn parse_map(column: &'static str, s: &str) -> Result<Map<String, Value>, StoreError> {
    match serde_json::from_str(s)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::Corrupt {
            column,
            value: s.to_string(),
        }),
    }
}

/// A raw `documents` row.
struct DocumentRow {
    id: String,
    filename: String,
    original_filename: String,
    file_path: String,
    content_type: String,
    file_size: i64,
    status: String,
    error_message: Option<String>,
    processing_started_at: Option<String>,
    processing_completed_at: Option<String>,
    extracted_text_length: Option<i64>,
    total_clauses_found: i64,
    metadata: String,
    created_at: String,
    updated_at: String,
}

impl DocumentRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            filename: row.get("filename")?,
            original_filename: row.get("original_filename")?,
            file_path: row.get("file_path")?,
            content_type: row.get("content_type")?,
            file_size: row.get("file_size")?,
            status: row.get("status")?,
            error_message: row.get("error_message")?,
            processing_started_at: row.get("processing_started_at")?,
            processing_completed_at: row.get("processing_completed_at")?,
            extracted_text_length: row.get("extracted_text_length")?,
            total_clauses_found: row.get("total_clauses_found")?,
            metadata: row.get("metadata")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_document(self) -> Result<Document, StoreError> {
        let status = DocumentStatus::parse(&self.status).ok_or(StoreError::Corrupt {
            column: "status",
            value: self.status.clone(),
        })?;

        Ok(Document {
            id: DocumentId::from_uuid(parse_uuid("id", &self.id)?),
            filename: self.filename,
            original_filename: self.original_filename,
            file_path: PathBuf::from(self.file_path),
            content_type: self.content_type,
            file_size: self.file_size.max(0) as u64,
            status,
            error_message: self.error_message,
            processing_started_at: parse_optional_timestamp(
                "processing_started_at",
                self.processing_started_at,
            )?,
            processing_completed_at: parse_optional_timestamp(
                "processing_completed_at",
                self.processing_completed_at,
            )?,
            extracted_text_length: self.extracted_text_length.map(|n| n.max(0) as u64),
            total_clauses_found: self.total_clauses_found.max(0) as u64,
            metadata: parse_map("metadata", &self.metadata)?,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
        })
    }
}

/// A raw `clauses` row.
struct ClauseRow {
    id: String,
    document_id: String,
    text: String,
    category: String,
    subcategory: Option<String>,
    risk_score: f64,
    risk_level: String,
    confidence_score: f64,
    start_position: i64,
    end_position: i64,
    page_number: Option<i64>,
    metadata: String,
    recommendations: String,
    created_at: String,
}

impl ClauseRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            document_id: row.get("document_id")?,
            text: row.get("text")?,
            category: row.get("category")?,
            subcategory: row.get("subcategory")?,
            risk_score: row.get("risk_score")?,
            risk_level: row.get("risk_level")?,
            confidence_score: row.get("confidence_score")?,
            start_position: row.get("start_position")?,
            end_position: row.get("end_position")?,
            page_number: row.get("page_number")?,
            metadata: row.get("metadata")?,
            recommendations: row.get("recommendations")?,
            created_at: row.get("created_at")?,
        })
    }

    fn into_record(self) -> Result<ClauseRecord, StoreError> {
        let category = Category::parse(&self.category).ok_or(StoreError::Corrupt {
            column: "category",
            value: self.category.clone(),
        })?;
        let risk_level = RiskLevel::parse(&self.risk_level).ok_or(StoreError::Corrupt {
            column: "risk_level",
            value: self.risk_level.clone(),
        })?;

        Ok(ClauseRecord {
            id: parse_uuid("id", &self.id)?,
            document_id: DocumentId::from_uuid(parse_uuid("document_id", &self.document_id)?),
            finding: ClauseFinding {
                text: self.text,
                category,
                subcategory: self.subcategory,
                risk_score: self.risk_score,
                risk_level,
                confidence_score: self.confidence_score,
                start_position: self.start_position.max(0) as usize,
                end_position: self.end_position.max(0) as usize,
                page_number: self.page_number.map(|n| n.max(0) as u32),
                metadata: parse_map("metadata", &self.metadata)?,
                recommendations: self.recommendations,
            },
            created_at: parse_timestamp("created_at", &self.created_at)?,
        })
    }
}

/// A raw `playbooks` row.
struct PlaybookRow {
    id: String,
    name: String,
    description: Option<String>,
    rules: String,
    version: String,
    is_active: bool,
    created_at: String,
}

impl PlaybookRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            rules: row.get("rules")?,
            version: row.get("version")?,
            is_active: row.get("is_active")?,
            created_at: row.get("created_at")?,
        })
    }

    fn into_playbook(self) -> Result<Playbook, StoreError> {
        Ok(Playbook {
            id: PlaybookId::from_uuid(parse_uuid("id", &self.id)?),
            name: self.name,
            description: self.description,
            rules: serde_json::from_str(&self.rules)?,
            version: self.version,
            is_active: self.is_active,
            created_at: parse_timestamp("created_at", &self.created_at)?,
        })
    }
}

fn select_document(conn: &Connection, id: &DocumentId) -> Result<Option<Document>, StoreError> {
    conn.query_row(
        "SELECT * FROM documents WHERE id = ?1",
        params![id.to_string()],
        DocumentRow::from_row,
    )
    .optional()?
    .map(DocumentRow::into_document)
    .transpose()
}

fn write_document(conn: &Connection, document: &Document, insert: bool) -> Result<(), StoreError> {
    let sql = if insert {
        "INSERT INTO documents (id, filename, original_filename, file_path, content_type,
         file_size, status, error_message, processing_started_at, processing_completed_at,
         extracted_text_length, total_clauses_found, metadata, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
    } else {
        "UPDATE documents SET filename=?2, original_filename=?3, file_path=?4,
         content_type=?5, file_size=?6, status=?7, error_message=?8,
         processing_started_at=?9, processing_completed_at=?10, extracted_text_length=?11,
         total_clauses_found=?12, metadata=?13, created_at=?14, updated_at=?15
         WHERE id=?1"
    };

    conn.execute(
        sql,
        params![
            document.id.to_string(),
            document.filename,
            document.original_filename,
            document.file_path.to_string_lossy().to_string(),
            document.content_type,
            document.file_size as i64,
            document.status.as_str(),
            document.error_message,
            document.processing_started_at.map(format_timestamp),
            document.processing_completed_at.map(format_timestamp),
            document.extracted_text_length.map(|n| n as i64),
            document.total_clauses_found as i64,
            serde_json::to_string(&document.metadata)?,
            format_timestamp(document.created_at),
            format_timestamp(document.updated_at),
        ],
    )?;
    Ok(())
}

impl DocumentStore for SqliteStore {
    fn insert_document(&self, document: &Document) -> Result<(), StoreError> {
        self.with_conn(|conn| write_document(conn, document, true))
    }

    fn load_document(&self, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        self.with_conn(|conn| select_document(conn, id))
    }

    fn update_document(
        &self,
        id: &DocumentId,
        update: &DocumentUpdate,
    ) -> Result<Document, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut document = select_document(&tx, id)?.ok_or_else(|| document_missing(id))?;
            document.apply(update)?;
            write_document(&tx, &document, false)?;
            tx.commit()?;
            Ok(document)
        })
    }

    fn delete_document(&self, id: &DocumentId) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let deleted =
                conn.execute("DELETE FROM documents WHERE id = ?1", params![id.to_string()])?;
            Ok(deleted > 0)
        })
    }

    fn insert_clauses(&self, clauses: &[ClauseRecord]) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO clauses (id, document_id, text, category, subcategory,
                     risk_score, risk_level, confidence_score, start_position, end_position,
                     page_number, metadata, recommendations, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                )?;
                for clause in clauses {
                    let finding = &clause.finding;
                    inserted += stmt.execute(params![
                        clause.id.to_string(),
                        clause.document_id.to_string(),
                        finding.text,
                        finding.category.as_str(),
                        finding.subcategory,
                        finding.risk_score,
                        finding.risk_level.as_str(),
                        finding.confidence_score,
                        finding.start_position as i64,
                        finding.end_position as i64,
                        finding.page_number.map(i64::from),
                        serde_json::to_string(&finding.metadata)?,
                        finding.recommendations,
                        format_timestamp(clause.created_at),
                    ])?;
                }
            }
            tx.commit()?;
            log::debug!("Inserted {} clauses", inserted);
            Ok(inserted)
        })
    }

    fn delete_clauses(&self, document_id: &DocumentId) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM clauses WHERE document_id = ?1",
                params![document_id.to_string()],
            )?)
        })
    }

    fn list_clauses(&self, document_id: &DocumentId) -> Result<Vec<ClauseRecord>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM clauses WHERE document_id = ?1 ORDER BY start_position, id",
            )?;
            let rows = stmt
                .query_map(params![document_id.to_string()], ClauseRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(ClauseRow::into_record).collect()
        })
    }

    fn insert_playbook(&self, playbook: &Playbook) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO playbooks (id, name, description, rules, version, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    playbook.id.to_string(),
                    playbook.name,
                    playbook.description,
                    serde_json::to_string(&playbook.rules)?,
                    playbook.version,
                    playbook.is_active,
                    format_timestamp(playbook.created_at),
                ],
            )?;
            Ok(())
        })
    }

    fn load_playbook(&self, id: &PlaybookId) -> Result<Option<Playbook>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT * FROM playbooks WHERE id = ?1",
                params![id.to_string()],
                PlaybookRow::from_row,
            )
            .optional()?
            .map(PlaybookRow::into_playbook)
            .transpose()
        })
    }
}
