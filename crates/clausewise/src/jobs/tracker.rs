//! Pollable job snapshots.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::orchestrator::JobPayload;
use super::progress::{JobProgressBroadcaster, JobProgressEvent, ProgressReporter};
use super::state::{Job, JobId, JobState};

/// What a caller sees when polling a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub document_id: String,
    pub state: JobState,
    pub progress: f64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl JobSnapshot {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            document_id: job.document_id.clone(),
            state: job.state,
            progress: job.progress,
            message: job.message.clone(),
            result: job.result.clone(),
            error: job.error.clone(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Finished snapshots kept by [`JobTracker::new`] before the oldest are
/// dropped.
pub const DEFAULT_MAX_FINISHED: usize = 1000;

/// Records snapshots from progress events and optionally re-broadcasts them.
///
/// Terminal states are only taken from [`JobTracker::finish`], which carries
/// the result or error, so a finished snapshot is always complete. At most
/// `max_finished` finished snapshots are retained; queued and running jobs
/// are never pruned.
pub struct JobTracker {
    snapshots: Mutex<HashMap<JobId, JobSnapshot>>,
    finished: Condvar,
    broadcaster: Option<JobProgressBroadcaster>,
    max_finished: usize,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::with_max_finished(DEFAULT_MAX_FINISHED)
    }

    pub fn with_max_finished(max_finished: usize) -> Self {
        Self {
            snapshots: Mutex::new(HashMap::new()),
            finished: Condvar::new(),
            broadcaster: None,
            max_finished: max_finished.max(1),
        }
    }

    pub fn with_broadcaster(broadcaster: JobProgressBroadcaster) -> Self {
        Self {
            broadcaster: Some(broadcaster),
            ..Self::new()
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, JobSnapshot>> {
        match self.snapshots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job tracker lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Starts tracking a newly submitted job.
    pub fn register(&self, job: &Job) {
        self.lock().insert(job.id, JobSnapshot::from_job(job));
    }

    /// Stores the final state of a job and wakes any waiters.
    pub fn finish(&self, job: &Job) {
        {
            let mut snapshots = self.lock();
            snapshots.insert(job.id, JobSnapshot::from_job(job));
            self.prune_finished(&mut snapshots, &job.id);
        }
        self.finished.notify_all();
    }

    pub fn get(&self, job_id: &JobId) -> Option<JobSnapshot> {
        self.lock().get(job_id).cloned()
    }

    /// Stops tracking a job, returning its last snapshot.
    pub fn remove(&self, job_id: &JobId) -> Option<JobSnapshot> {
        self.lock().remove(job_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops the oldest finished snapshots over the limit, sparing `keep`.
    fn prune_finished(&self, snapshots: &mut HashMap<JobId, JobSnapshot>, keep: &JobId) {
        let mut finished: Vec<(DateTime<Utc>, JobId)> = snapshots
            .values()
            .filter(|s| s.is_finished() && s.job_id != *keep)
            .map(|s| (s.updated_at, s.job_id))
            .collect();

        // `keep` itself counts toward the limit.
        let excess = (finished.len() + 1).saturating_sub(self.max_finished);
        if excess == 0 {
            return;
        }

        finished.sort_by_key(|(updated_at, _)| *updated_at);
        for (_, job_id) in finished.into_iter().take(excess) {
            snapshots.remove(&job_id);
        }
        log::debug!("Pruned {} finished job snapshots", excess);
    }

    /// Blocks until the job is finished or `timeout` elapses, returning the
    /// latest snapshot either way. `None` for unknown jobs.
    pub fn wait_for(&self, job_id: &JobId, timeout: Duration) -> Option<JobSnapshot> {
        let deadline = Instant::now() + timeout;
        let mut snapshots = self.lock();

        loop {
            let snapshot = snapshots.get(job_id)?;
            if snapshot.is_finished() {
                return Some(snapshot.clone());
            }

            let now = Instant::now();
            if now >= deadline {
                return Some(snapshot.clone());
            }

            snapshots = match self.finished.wait_timeout(snapshots, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => {
                    log::warn!("Job tracker lock was poisoned, recovering");
                    poisoned.into_inner().0
                }
            };
        }
    }
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for JobTracker {
    fn report(&self, event: &JobProgressEvent) {
        if !event.state.is_terminal() {
            let mut snapshots = self.lock();
            if let Some(snapshot) = snapshots.get_mut(&event.job_id) {
                if !snapshot.is_finished() {
                    snapshot.state = event.state;
                    snapshot.progress = event.progress;
                    snapshot.message = event.message.clone();
                    snapshot.updated_at = event.timestamp;
                }
            }
        }

        if let Some(ref broadcaster) = self.broadcaster {
            broadcaster.report(event);
        }
    }
}
