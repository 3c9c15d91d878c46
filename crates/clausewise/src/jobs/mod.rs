//! Asynchronous job lifecycle: state machine, orchestration, worker queue
//! and progress observation.

pub mod context;
pub mod orchestrator;
pub mod progress;
pub mod queue;
pub mod state;
pub mod tracker;

pub use context::JobContext;
pub use orchestrator::{JobPayload, Orchestrator, ProcessingReport};
pub use progress::{JobProgressBroadcaster, JobProgressEvent, NoopProgress, ProgressReporter};
pub use queue::{JobHandle, JobQueue, QueueError};
pub use state::{transition, Job, JobEvent, JobId, JobKind, JobState};
pub use tracker::{JobSnapshot, JobTracker};
