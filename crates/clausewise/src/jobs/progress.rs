//! Progress events for job observers.
//!
//! Reporting is observational only. Sends never block and never fail the job.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::state::{Job, JobId, JobState};

/// Default channel capacity for [`JobProgressBroadcaster`].
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: JobId,
    /// Document id as submitted.
    pub document_id: String,
    pub state: JobState,
    /// Fraction of work done, in [0, 1].
    pub progress: f64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobProgressEvent {
    /// Snapshot of a job's current state as an event.
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            document_id: job.document_id.clone(),
            state: job.state,
            progress: job.progress,
            message: job.message.clone(),
            timestamp: Utc::now(),
            error: job.error.clone(),
        }
    }
}

/// Receives progress events from the orchestrator.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &JobProgressEvent);
}

/// Discards all events.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: &JobProgressEvent) {}
}

/// Fans progress events out to any number of subscribers.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: JobProgressEvent) {
        // No receivers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl ProgressReporter for JobProgressBroadcaster {
    fn report(&self, event: &JobProgressEvent) {
        self.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_camel_case() {
        let job = Job::process("doc-1", None);
        let json = serde_json::to_value(JobProgressEvent::from_job(&job)).unwrap();

        assert_eq!(json["documentId"], "doc-1");
        assert_eq!(json["state"], "queued");
        assert_eq!(json["progress"], 0.0);
        assert!(json.get("error").is_none());
        assert!(json.get("jobId").is_some());
    }

    #[test]
    fn test_broadcaster_send_and_receive() {
        let broadcaster = JobProgressBroadcaster::default();
        let mut rx = broadcaster.subscribe();

        let mut job = Job::process("doc-2", None);
        job.start().unwrap();
        job.set_progress(0.3, "Text extracted");
        broadcaster.report(&JobProgressEvent::from_job(&job));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.state, JobState::Running);
        assert_eq!(event.progress, 0.3);
        assert_eq!(event.message, "Text extracted");
    }

    #[test]
    fn test_send_without_subscribers_is_ignored() {
        let broadcaster = JobProgressBroadcaster::new(4);
        broadcaster.send(JobProgressEvent::from_job(&Job::process("doc", None)));
    }

    #[test]
    fn test_multiple_subscribers_see_every_event() {
        let broadcaster = JobProgressBroadcaster::new(8);
        let mut first = broadcaster.subscribe();
        let mut second = broadcaster.subscribe();

        broadcaster.send(JobProgressEvent::from_job(&Job::process("a", None)));
        broadcaster.send(JobProgressEvent::from_job(&Job::process("b", None)));

        assert_eq!(first.try_recv().unwrap().document_id, "a");
        assert_eq!(first.try_recv().unwrap().document_id, "b");
        assert_eq!(second.try_recv().unwrap().document_id, "a");
    }
}
