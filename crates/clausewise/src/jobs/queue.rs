use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::orchestrator::Orchestrator;
use super::state::{Job, JobId};
use super::tracker::{JobSnapshot, JobTracker};

const RECV_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Job queue is shut down")]
    Closed,

    #[error("Document {0} already has a job in flight")]
    DocumentBusy(String),

    #[error("worker_count must be > 0")]
    NoWorkers,
}

/// Returned by [`JobQueue::submit`]; used to poll the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: JobId,
    pub document_id: String,
}

/// Document ids with a queued or running job.
#[derive(Clone, Default)]
struct InFlight(Arc<Mutex<HashSet<String>>>);

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("In-flight set lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn claim(&self, document_id: &str) -> bool {
        self.lock().insert(document_id.to_string())
    }

    fn release(&self, document_id: &str) {
        self.lock().remove(document_id);
    }
}

/// Fixed pool of worker threads running jobs through an [`Orchestrator`].
/// At most one job per document id is queued or running at a time.
pub struct JobQueue {
    job_sender: Sender<Job>,
    job_receiver: Receiver<Job>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    tracker: Arc<JobTracker>,
    in_flight: InFlight,
}

impl JobQueue {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        worker_count: usize,
        tracker: Arc<JobTracker>,
    ) -> Result<Self, QueueError> {
        if worker_count == 0 {
            return Err(QueueError::NoWorkers);
        }

        let (job_sender, job_receiver) = bounded::<Job>(worker_count * 2);
        let shutdown = Arc::new(AtomicBool::new(false));
        let in_flight = InFlight::default();

        let workers = (0..worker_count)
            .map(|worker_id| {
                let worker = Worker {
                    id: worker_id,
                    jobs: job_receiver.clone(),
                    shutdown: Arc::clone(&shutdown),
                    orchestrator: Arc::clone(&orchestrator),
                    tracker: Arc::clone(&tracker),
                    in_flight: in_flight.clone(),
                };
                thread::spawn(move || worker.run())
            })
            .collect();

        info!("Started {} workers", worker_count);

        Ok(Self {
            job_sender,
            job_receiver,
            workers,
            shutdown,
            tracker,
            in_flight,
        })
    }

    /// Queues a processing job, or a playbook run when `playbook_id` is set.
    pub fn submit(
        &self,
        document_id: &str,
        playbook_id: Option<&str>,
    ) -> Result<JobHandle, QueueError> {
        let job = match playbook_id {
            Some(playbook_id) => Job::playbook(document_id, playbook_id),
            None => Job::process(document_id, None),
        };
        self.submit_job(job)
    }

    pub fn submit_job(&self, job: Job) -> Result<JobHandle, QueueError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(QueueError::Closed);
        }
        if !self.in_flight.claim(&job.document_id) {
            return Err(QueueError::DocumentBusy(job.document_id));
        }

        let handle = JobHandle {
            job_id: job.id,
            document_id: job.document_id.clone(),
        };
        self.tracker.register(&job);

        if self.job_sender.send(job).is_err() {
            self.in_flight.release(&handle.document_id);
            return Err(QueueError::Closed);
        }

        debug!("Queued job {} for document {}", handle.job_id, handle.document_id);
        Ok(handle)
    }

    pub fn poll(&self, handle: &JobHandle) -> Option<JobSnapshot> {
        self.tracker.get(&handle.job_id)
    }

    /// Blocks until the job finishes or `timeout` elapses.
    pub fn wait_for(&self, handle: &JobHandle, timeout: Duration) -> Option<JobSnapshot> {
        self.tracker.wait_for(&handle.job_id, timeout)
    }

    pub fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }

    /// Stops workers from taking new jobs. Running jobs finish.
    pub fn shutdown(&self) {
        info!("Shutting down job queue...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Joins all workers. Jobs still queued after a shutdown are failed.
    pub fn wait(self) {
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        for mut job in self.job_receiver.try_iter() {
            self.in_flight.release(&job.document_id);
            if job.fail("Job queue shut down before the job started").is_ok() {
                self.tracker.finish(&job);
            }
        }

        info!("All workers have stopped");
    }
}

struct Worker {
    id: usize,
    jobs: Receiver<Job>,
    shutdown: Arc<AtomicBool>,
    orchestrator: Arc<Orchestrator>,
    tracker: Arc<JobTracker>,
    in_flight: InFlight,
}

impl Worker {
    fn run(self) {
        debug!("Worker {} started", self.id);

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                debug!("Worker {} received shutdown signal", self.id);
                break;
            }

            match self.jobs.recv_timeout(RECV_TIMEOUT) {
                Ok(mut job) => {
                    debug!("Worker {} running job {}", self.id, job.id);
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        self.orchestrator.execute(&mut job, self.tracker.as_ref())
                    }));
                    // Failures are already recorded on the job and logged.
                    if let Err(payload) = outcome {
                        let reason = panic_message(payload.as_ref());
                        error!("Worker {} job {} panicked: {}", self.id, job.id, reason);
                        self.orchestrator.abandon(&mut job, &reason);
                    }
                    // Released before waiters wake so they can resubmit at once.
                    self.in_flight.release(&job.document_id);
                    self.tracker.finish(&job);
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    debug!("Worker {} job channel disconnected", self.id);
                    break;
                }
            }
        }

        debug!("Worker {} stopped", self.id);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
