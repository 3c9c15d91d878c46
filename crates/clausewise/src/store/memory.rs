use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::document::{Document, DocumentId, DocumentUpdate, Playbook, PlaybookId};
use crate::store::{document_missing, ClauseRecord, DocumentStore, StoreError};

#[derive(Default)]
struct Tables {
    documents: HashMap<DocumentId, Document>,
    clauses: HashMap<DocumentId, Vec<ClauseRecord>>,
    playbooks: HashMap<PlaybookId, Playbook>,
}

/// In-process store. All tables sit behind one lock so multi-table
/// operations (cascading deletes, bulk inserts) are atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        match self.tables.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Memory store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        match self.tables.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Memory store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl DocumentStore for MemoryStore {
    fn insert_document(&self, document: &Document) -> Result<(), StoreError> {
        self.write()
            .documents
            .insert(document.id, document.clone());
        Ok(())
    }

    fn load_document(&self, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        Ok(self.read().documents.get(id).cloned())
    }

    fn update_document(
        &self,
        id: &DocumentId,
        update: &DocumentUpdate,
    ) -> Result<Document, StoreError> {
        let mut tables = self.write();
        let document = tables
            .documents
            .get_mut(id)
            .ok_or_else(|| document_missing(id))?;

        // Apply to a copy so a rejected transition leaves the record untouched.
        let mut updated = document.clone();
        updated.apply(update)?;
        *document = updated.clone();
        Ok(updated)
    }

    fn delete_document(&self, id: &DocumentId) -> Result<bool, StoreError> {
        let mut tables = self.write();
        tables.clauses.remove(id);
        Ok(tables.documents.remove(id).is_some())
    }

    fn insert_clauses(&self, clauses: &[ClauseRecord]) -> Result<usize, StoreError> {
        let mut tables = self.write();
        if let Some(orphan) = clauses
            .iter()
            .find(|c| !tables.documents.contains_key(&c.document_id))
        {
            return Err(document_missing(&orphan.document_id));
        }

        for clause in clauses {
            tables
                .clauses
                .entry(clause.document_id)
                .or_default()
                .push(clause.clone());
        }
        Ok(clauses.len())
    }

    fn delete_clauses(&self, document_id: &DocumentId) -> Result<usize, StoreError> {
        Ok(self
            .write()
            .clauses
            .remove(document_id)
            .map(|removed| removed.len())
            .unwrap_or(0))
    }

    fn list_clauses(&self, document_id: &DocumentId) -> Result<Vec<ClauseRecord>, StoreError> {
        let mut clauses = self
            .read()
            .clauses
            .get(document_id)
            .cloned()
            .unwrap_or_default();
        clauses.sort_by_key(|c| c.finding.start_position);
        Ok(clauses)
    }

    fn insert_playbook(&self, playbook: &Playbook) -> Result<(), StoreError> {
        self.write()
            .playbooks
            .insert(playbook.id, playbook.clone());
        Ok(())
    }

    fn load_playbook(&self, id: &PlaybookId) -> Result<Option<Playbook>, StoreError> {
        Ok(self.read().playbooks.get(id).cloned())
    }
}
