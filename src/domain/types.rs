//! Jobs and their observable status.

use bytes::Bytes;
use serde::Serialize;
use time::OffsetDateTime;
use voicegen_api_types::GenerationInput;

use super::{error::DomainError, job_id::JobId};

/// A queued generation request.
///
/// The wire record is encoded once, when the job is created, so every delivery
/// attempt of the same job sends identical bytes.
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    input: GenerationInput,
    enqueued_at: OffsetDateTime,
    line: Bytes,
}

#[derive(Serialize)]
struct DeliveryRecord<'a> {
    input: &'a GenerationInput,
    job_id: &'a JobId,
}

impl Job {
    pub fn new(id: JobId, input: GenerationInput) -> Result<Self, DomainError> {
        let mut line = serde_json::to_vec(&DeliveryRecord {
            input: &input,
            job_id: &id,
        })?;
        line.push(b'\n');

        Ok(Self {
            id,
            input,
            enqueued_at: OffsetDateTime::now_utc(),
            line: Bytes::from(line),
        })
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn input(&self) -> &GenerationInput {
        &self.input
    }

    pub fn enqueued_at(&self) -> OffsetDateTime {
        self.enqueued_at
    }

    /// Newline-terminated JSON record sent to the rendering service.
    pub fn line(&self) -> &Bytes {
        &self.line
    }
}

/// Current status of a job as seen by the submitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Ready { result: String },
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Ready { .. } => "ready",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Queued)
    }
}

/// Terminal outcome reported by the rendering service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Ready { result: String },
    Failed,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Ready { .. } => "ready",
            JobOutcome::Failed => "error",
        }
    }
}

impl From<JobOutcome> for JobStatus {
    fn from(outcome: JobOutcome) -> Self {
        match outcome {
            JobOutcome::Ready { result } => JobStatus::Ready { result },
            JobOutcome::Failed => JobStatus::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatusRecord {
    pub status: JobStatus,
    pub submitted_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
}

impl JobStatusRecord {
    pub fn queued(submitted_at: OffsetDateTime) -> Self {
        Self {
            status: JobStatus::Queued,
            submitted_at,
            completed_at: None,
        }
    }
}
