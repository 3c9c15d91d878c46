//! Job lifecycle as a plain enum and a pure transition function.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::orchestrator::JobPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEvent {
    Start,
    Succeed,
    Fail,
}

impl fmt::Display for JobEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobEvent::Start => write!(f, "start"),
            JobEvent::Succeed => write!(f, "succeed"),
            JobEvent::Fail => write!(f, "fail"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("job cannot {event} while {state}")]
pub struct InvalidTransition {
    pub state: JobState,
    pub event: JobEvent,
}

/// `Queued -> Running -> {Succeeded, Failed}`. A queued job may also fail
/// directly, e.g. when the queue shuts down before it starts.
pub fn transition(state: JobState, event: JobEvent) -> Result<JobState, InvalidTransition> {
    match (state, event) {
        (JobState::Queued, JobEvent::Start) => Ok(JobState::Running),
        (JobState::Queued, JobEvent::Fail) => Ok(JobState::Failed),
        (JobState::Running, JobEvent::Succeed) => Ok(JobState::Succeeded),
        (JobState::Running, JobEvent::Fail) => Ok(JobState::Failed),
        (state, event) => Err(InvalidTransition { state, event }),
    }
}

/// Work requested by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    /// Full pipeline: extract, analyze, persist and stamp the document.
    Process { strategy: Option<String> },
    /// Re-analysis against a playbook. Leaves the document untouched.
    Playbook { playbook_id: String },
}

/// One execution attempt for a single document. Ids are kept as submitted
/// so malformed ones fail inside the job rather than at submission.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub document_id: String,
    pub kind: JobKind,
    pub state: JobState,
    pub progress: f64,
    pub message: String,
    pub result: Option<JobPayload>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(document_id: &str, kind: JobKind) -> Self {
        Self {
            id: JobId::new(),
            document_id: document_id.to_string(),
            kind,
            state: JobState::Queued,
            progress: 0.0,
            message: "Queued".to_string(),
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn process(document_id: &str, strategy: Option<&str>) -> Self {
        Self::new(
            document_id,
            JobKind::Process {
                strategy: strategy.map(str::to_string),
            },
        )
    }

    pub fn playbook(document_id: &str, playbook_id: &str) -> Self {
        Self::new(
            document_id,
            JobKind::Playbook {
                playbook_id: playbook_id.to_string(),
            },
        )
    }

    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        self.state = transition(self.state, JobEvent::Start)?;
        self.started_at = Some(Utc::now());
        self.message = "Running".to_string();
        Ok(())
    }

    /// Records progress while running. Values are clamped to [0, 1] and
    /// never move backwards.
    pub fn set_progress(&mut self, fraction: f64, message: &str) {
        if self.state != JobState::Running {
            return;
        }
        self.progress = fraction.clamp(self.progress, 1.0);
        self.message = message.to_string();
    }

    pub fn succeed(&mut self, payload: JobPayload) -> Result<(), InvalidTransition> {
        self.state = transition(self.state, JobEvent::Succeed)?;
        self.progress = 1.0;
        self.message = "Complete".to_string();
        self.result = Some(payload);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, error: &str) -> Result<(), InvalidTransition> {
        self.state = transition(self.state, JobEvent::Fail)?;
        self.message = "Failed".to_string();
        self.error = Some(error.to_string());
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}
