pub mod analysis;
pub mod config;
pub mod document;
pub mod error;
pub mod extractor;
pub mod jobs;
pub mod store;
pub mod telemetry;

pub use analysis::{AnalysisResult, AnalysisSummary, Category, ClauseFinding, RiskLevel, StrategyRegistry};
pub use config::{load_config, load_config_from_str, Config};
pub use document::{validate_upload, ContentType, Document, DocumentId, DocumentStatus, Playbook, PlaybookId};
pub use error::{AnalysisError, ClausewiseError, ConfigError, ExtractError, Result};
pub use extractor::ExtractorRegistry;
pub use jobs::{
    Job, JobHandle, JobPayload, JobProgressBroadcaster, JobQueue, JobSnapshot, JobState, JobTracker,
    Orchestrator, QueueError,
};
pub use store::{ClauseRecord, DocumentStore, MemoryStore, SqliteStore, StoreError};
pub use telemetry::TelemetryError;
