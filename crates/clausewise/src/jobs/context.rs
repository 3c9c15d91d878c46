use super::orchestrator::JobPayload;
use super::progress::{JobProgressEvent, ProgressReporter};
use super::state::{InvalidTransition, Job};

/// Couples a running job with its progress observer so every state change
/// is reported exactly once.
pub struct JobContext<'a> {
    job: &'a mut Job,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> JobContext<'a> {
    pub fn new(job: &'a mut Job, reporter: &'a dyn ProgressReporter) -> Self {
        Self { job, reporter }
    }

    pub fn job(&self) -> &Job {
        &*self.job
    }

    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        self.job.start()?;
        self.emit();
        Ok(())
    }

    pub fn progress(&mut self, fraction: f64, message: &str) {
        self.job.set_progress(fraction, message);
        self.emit();
    }

    pub fn succeed(&mut self, payload: JobPayload) {
        match self.job.succeed(payload) {
            Ok(()) => self.emit(),
            Err(e) => log::error!("Job {}: {}", self.job.id, e),
        }
    }

    pub fn fail(&mut self, error: &str) {
        match self.job.fail(error) {
            Ok(()) => self.emit(),
            Err(e) => log::error!("Job {}: {}", self.job.id, e),
        }
    }

    fn emit(&self) {
        self.reporter.report(&JobProgressEvent::from_job(&*self.job));
    }
}
