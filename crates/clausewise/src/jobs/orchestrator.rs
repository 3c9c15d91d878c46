use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, info_span, warn};

use super::context::JobContext;
use super::progress::ProgressReporter;
use super::state::{Job, JobKind};
use crate::analysis::{AnalysisResult, AnalysisSummary, StrategyRegistry, RULE_BASED};
use crate::config::Config;
use crate::document::{Document, DocumentId, DocumentStatus, DocumentUpdate, Playbook, PlaybookId};
use crate::error::{ClausewiseError, Result};
use crate::extractor::{Extraction, ExtractorRegistry};
use crate::store::{ClauseRecord, DocumentStore, StoreError};

/// Outcome of a successful processing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingReport {
    pub document_id: DocumentId,
    pub status: DocumentStatus,
    pub total_clauses: usize,
    pub processing_time_secs: f64,
    pub summary: AnalysisSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    Processing(ProcessingReport),
    Playbook(AnalysisResult),
}

/// Runs one job through extraction, analysis and persistence, owning the
/// document's status transitions while it does.
pub struct Orchestrator {
    store: Arc<dyn DocumentStore>,
    extractors: ExtractorRegistry,
    strategies: StrategyRegistry,
    default_strategy: String,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        extractors: ExtractorRegistry,
        strategies: StrategyRegistry,
    ) -> Self {
        Self {
            store,
            extractors,
            strategies,
            default_strategy: RULE_BASED.to_string(),
        }
    }

    pub fn from_config(store: Arc<dyn DocumentStore>, config: &Config) -> Result<Self> {
        let mut orchestrator = Self::new(store, ExtractorRegistry::new(), StrategyRegistry::new()?);
        orchestrator.default_strategy = config.analysis.default_strategy.clone();
        Ok(orchestrator)
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn extractors(&self) -> &ExtractorRegistry {
        &self.extractors
    }

    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    /// Runs `job` to a terminal state. The job ends `Succeeded` with the
    /// returned payload or `Failed` with the error's message.
    pub fn execute(&self, job: &mut Job, progress: &dyn ProgressReporter) -> Result<JobPayload> {
        let _job_span = info_span!("job",
            job_id = %job.id,
            document_id = %job.document_id,
        )
        .entered();

        let mut ctx = JobContext::new(job, progress);
        ctx.start()
            .map_err(|e| ClausewiseError::Validation(e.to_string()))?;

        let outcome = match ctx.job().kind.clone() {
            JobKind::Process { strategy } => self.process(&mut ctx, strategy.as_deref()),
            JobKind::Playbook { playbook_id } => self.compare(&mut ctx, &playbook_id),
        };

        match outcome {
            Ok(payload) => {
                ctx.succeed(payload.clone());
                Ok(payload)
            }
            Err(e) => {
                error!("Job {} failed: {}", ctx.job().id, e);
                ctx.fail(&e.to_string());
                Err(e)
            }
        }
    }

    fn process(&self, ctx: &mut JobContext<'_>, strategy: Option<&str>) -> Result<JobPayload> {
        let started = Instant::now();

        let document = {
            let _step = info_span!("load_document").entered();
            self.load_pending(&ctx.job().document_id)?
        };

        self.store
            .update_document(&document.id, &DocumentUpdate::processing(Utc::now()))?;
        info!("Processing document {} ({})", document.id, document.original_filename);

        match self.run_steps(ctx, &document, strategy, started) {
            Ok(report) => Ok(JobPayload::Processing(report)),
            Err(e) => {
                self.mark_failed(&document.id, &e.to_string());
                Err(e)
            }
        }
    }

    fn run_steps(
        &self,
        ctx: &mut JobContext<'_>,
        document: &Document,
        strategy: Option<&str>,
        started: Instant,
    ) -> Result<ProcessingReport> {
        let extraction = {
            let _step = info_span!("extract_text").entered();
            ctx.progress(0.1, "Parsing document");
            self.extract(document)?
        };

        {
            let _step = info_span!("record_text_length").entered();
            ctx.progress(0.3, "Text extracted");
            let length = extraction.text.chars().count() as u64;
            self.store
                .update_document(&document.id, &DocumentUpdate::text_length(length))?;
        }

        let result = {
            let _step = info_span!("analyze").entered();
            ctx.progress(0.4, "Analyzing clauses");
            let strategy = strategy.unwrap_or(self.default_strategy.as_str());
            self.strategies
                .analyze(&extraction.text, &document.id, Some(strategy))?
        };

        let saved = {
            let _step = info_span!("save_clauses").entered();
            ctx.progress(0.7, "Saving results");
            let records: Vec<ClauseRecord> = result
                .clauses
                .iter()
                .cloned()
                .map(|finding| ClauseRecord::new(document.id, finding))
                .collect();
            self.store.insert_clauses(&records)?
        };

        {
            let _step = info_span!("complete_document").entered();
            let mut metadata = result.metadata.clone();
            metadata.insert(
                "summary".to_string(),
                serde_json::to_value(&result.summary).map_err(StoreError::from)?,
            );
            metadata.insert("source".to_string(), Value::Object(extraction.metadata));

            self.store.update_document(
                &document.id,
                &DocumentUpdate::complete(Utc::now(), saved as u64, metadata),
            )?;
        }

        info!(
            "Document {} complete: {} clauses, {} high risk",
            document.id, saved, result.summary.high_risk_clauses
        );

        Ok(ProcessingReport {
            document_id: document.id,
            status: DocumentStatus::Complete,
            total_clauses: saved,
            processing_time_secs: started.elapsed().as_secs_f64(),
            summary: result.summary,
        })
    }

    /// Playbook re-analysis. Extracts afresh and never mutates the document.
    fn compare(&self, ctx: &mut JobContext<'_>, playbook_id: &str) -> Result<JobPayload> {
        let (document, playbook) = {
            let _step = info_span!("load_document").entered();
            let document = self.load(&ctx.job().document_id)?;
            (document, self.load_playbook(playbook_id)?)
        };

        let extraction = {
            let _step = info_span!("extract_text").entered();
            ctx.progress(0.1, "Parsing document");
            self.extract(&document)?
        };

        let _step = info_span!("analyze").entered();
        ctx.progress(0.4, "Comparing against playbook");
        let result =
            self.strategies
                .analyze_with_playbook(&extraction.text, &document.id, &playbook)?;

        info!(
            "Document {} compared against playbook {}: {} clauses",
            document.id,
            playbook.id,
            result.clauses.len()
        );
        Ok(JobPayload::Playbook(result))
    }

    fn load(&self, raw_id: &str) -> Result<Document> {
        let id = DocumentId::parse(raw_id)?;
        self.store
            .load_document(&id)?
            .ok_or_else(|| ClausewiseError::document_not_found(id))
    }

    fn load_pending(&self, raw_id: &str) -> Result<Document> {
        let document = self.load(raw_id)?;
        if document.status != DocumentStatus::Pending {
            return Err(ClausewiseError::Validation(format!(
                "Document {} is not pending (status: {})",
                document.id, document.status
            )));
        }
        Ok(document)
    }

    fn load_playbook(&self, raw_id: &str) -> Result<Playbook> {
        let id = PlaybookId::parse(raw_id)?;
        self.store
            .load_playbook(&id)?
            .ok_or_else(|| ClausewiseError::playbook_not_found(id))
    }

    /// Extraction that treats an empty result as fatal, even where the
    /// extractor itself tolerated it.
    fn extract(&self, document: &Document) -> Result<Extraction> {
        let extraction = self
            .extractors
            .extract_with_metadata(&document.file_path, &document.content_type)?;

        if extraction.text.trim().is_empty() {
            return Err(ClausewiseError::Extraction(
                "document contains no extractable text".to_string(),
            ));
        }
        Ok(extraction)
    }

    /// Settles a job whose run was cut short by a panic. The job is failed,
    /// and a processing job's document still marked `Processing` is moved to
    /// `Error`.
    pub(crate) fn abandon(&self, job: &mut Job, reason: &str) {
        let message = format!("Job aborted: {}", reason);
        if let Err(e) = job.fail(&message) {
            warn!("Could not fail aborted job {}: {}", job.id, e);
        }

        if !matches!(job.kind, JobKind::Process { .. }) {
            return;
        }
        let Ok(id) = DocumentId::parse(&job.document_id) else {
            return;
        };
        match self.store.load_document(&id) {
            Ok(Some(document)) if document.status == DocumentStatus::Processing => {
                self.mark_failed(&id, &message)
            }
            Ok(_) => {}
            Err(e) => warn!("Could not load document {} after aborted job: {}", id, e),
        }
    }

    /// Best-effort mirror of a failure onto the document.
    fn mark_failed(&self, id: &DocumentId, message: &str) {
        let update = DocumentUpdate::error(message, Utc::now());
        if let Err(update_err) = self.store.update_document(id, &update) {
            warn!(
                "Could not record failure on document {}: {} (original error: {})",
                id, update_err, message
            );
        }
    }
}
