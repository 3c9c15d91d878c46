//! Isolated pipeline environment backed by a real SQLite database.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use clausewise::document::{DOCX_MIME, PDF_MIME};
use clausewise::{
    Config, Document, DocumentStore, Job, JobQueue, JobSnapshot, JobTracker, Orchestrator,
    SqliteStore,
};

use super::builders::{docx_bytes, pdf_bytes};

/// Upper bound for any single job in these tests.
pub const JOB_TIMEOUT: Duration = Duration::from_secs(30);

pub struct TestHarness {
    temp_dir: TempDir,
    /// Where uploaded fixtures are written.
    pub input_dir: PathBuf,
    pub db_path: PathBuf,
    pub config: Config,
    store: Arc<SqliteStore>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(mut config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let input_dir = temp_dir.path().join("input");
        std::fs::create_dir_all(&input_dir).expect("Failed to create input dir");

        let db_path = temp_dir.path().join("data").join("clausewise.db");
        config.database_path = Some(db_path.clone());
        let store = Arc::new(SqliteStore::open(&db_path).expect("Failed to open database"));

        Self {
            temp_dir,
            input_dir,
            db_path,
            config,
            store,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn store(&self) -> Arc<SqliteStore> {
        Arc::clone(&self.store)
    }

    /// A second handle on the same database file, as a restarted process would open it.
    pub fn reopen_store(&self) -> SqliteStore {
        SqliteStore::open(&self.db_path).expect("Failed to reopen database")
    }

    pub fn write_input(&self, filename: &str, content: &[u8]) -> PathBuf {
        let path = self.input_dir.join(filename);
        std::fs::write(&path, content).expect("Failed to write input file");
        path
    }

    /// Writes `content` and registers it as a pending document.
    pub fn ingest(&self, filename: &str, content: &[u8], content_type: &str) -> Document {
        let path = self.write_input(filename, content);
        let document = Document::new(filename, path, content_type, content.len() as u64);
        self.store
            .insert_document(&document)
            .expect("Failed to insert document");
        document
    }

    pub fn ingest_pdf(&self, filename: &str, pages: &[Option<&str>]) -> Document {
        self.ingest(filename, &pdf_bytes(pages), PDF_MIME)
    }

    pub fn ingest_docx(&self, filename: &str, paragraphs: &[&str]) -> Document {
        self.ingest(filename, &docx_bytes(paragraphs), DOCX_MIME)
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        Arc::new(
            Orchestrator::from_config(self.store(), &self.config)
                .expect("Failed to build orchestrator"),
        )
    }

    pub fn queue(&self, worker_count: usize) -> JobQueue {
        JobQueue::new(self.orchestrator(), worker_count, Arc::new(JobTracker::new()))
            .expect("Failed to start job queue")
    }

    /// Runs one job on a single-worker queue and returns its final snapshot.
    pub fn run_job(&self, job: Job) -> JobSnapshot {
        let queue = self.queue(1);
        let handle = queue.submit_job(job).expect("Failed to submit job");
        let snapshot = queue
            .wait_for(&handle, JOB_TIMEOUT)
            .expect("Job was not tracked");
        queue.shutdown();
        queue.wait();
        assert!(snapshot.is_finished(), "job did not finish: {:?}", snapshot);
        snapshot
    }

    pub fn load(&self, document: &Document) -> Document {
        self.store
            .load_document(&document.id)
            .expect("Failed to load document")
            .expect("Document disappeared")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
