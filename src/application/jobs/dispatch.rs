use std::{num::NonZeroUsize, sync::Arc};

use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};
use voicegen_api_types::{CompletionNotification, GenerationInput};

use crate::{
    application::repos::{JobStatusRepo, StatusRepoError},
    domain::{
        error::DomainError,
        job_id::{JobId, JobIdGenerator},
        types::{Job, JobOutcome, JobStatusRecord},
    },
};

use super::queue::WorkQueue;

const SOURCE: &str = "voicegen::jobs::dispatch";
const MAX_ID_ATTEMPTS: usize = 4;

/// Limits enforced on incoming generation requests.
#[derive(Debug, Clone, Copy)]
pub struct IntakeLimits {
    pub max_message_chars: NonZeroUsize,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("job `{0}` not found")]
    NotFound(String),
    #[error("completion references unknown job `{0}`")]
    UnknownJob(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(StatusRepoError),
}

impl DispatchError {
    fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    fn from_repo(err: StatusRepoError) -> Self {
        match err {
            StatusRepoError::NotFound(id) => Self::NotFound(id.to_string()),
            StatusRepoError::UnknownJob(id) => Self::UnknownJob(id.to_string()),
            other => Self::Repo(other),
        }
    }
}

/// A job accepted by the intake boundary.
#[derive(Debug, Clone)]
pub struct Submission {
    pub job_id: JobId,
    pub record: JobStatusRecord,
}

/// Entry point for everything that happens to a job outside the delivery
/// worker: submission, status polling, and completion callbacks.
#[derive(Clone)]
pub struct JobDispatcher {
    statuses: Arc<dyn JobStatusRepo>,
    queue: WorkQueue,
    ids: Arc<dyn JobIdGenerator>,
    limits: IntakeLimits,
}

impl JobDispatcher {
    pub fn new(
        statuses: Arc<dyn JobStatusRepo>,
        queue: WorkQueue,
        ids: Arc<dyn JobIdGenerator>,
        limits: IntakeLimits,
    ) -> Self {
        Self {
            statuses,
            queue,
            ids,
            limits,
        }
    }

    /// Validate `input`, start tracking it as `queued`, then hand it to the
    /// delivery worker. The status entry exists before the job can be observed
    /// anywhere else.
    pub async fn submit(&self, input: GenerationInput) -> Result<Submission, DispatchError> {
        self.validate(&input)?;

        let message_chars = input.message.chars().count();
        let mut attempt = 0;
        let (job, record) = loop {
            attempt += 1;
            let job = Job::new(self.ids.generate(&input.message), input.clone())?;
            match self.statuses.create(job.id()).await {
                Ok(record) => break (job, record),
                Err(StatusRepoError::Duplicate(id)) if attempt < MAX_ID_ATTEMPTS => {
                    warn!(target = SOURCE, job_id = %id, attempt, "job id collision; regenerating");
                }
                Err(err) => return Err(DispatchError::from_repo(err)),
            }
        };

        let job_id = job.id().clone();
        self.queue.enqueue(job);

        counter!("voicegen_jobs_submitted_total").increment(1);
        info!(
            target = SOURCE,
            job_id = %job_id,
            message_chars,
            queue_depth = self.queue.depth(),
            "job queued"
        );

        Ok(Submission { job_id, record })
    }

    /// Current status of a job.
    pub async fn status(&self, raw_id: &str) -> Result<JobStatusRecord, DispatchError> {
        let id = JobId::parse(raw_id).map_err(|_| DispatchError::NotFound(raw_id.to_string()))?;
        self.statuses
            .get(&id)
            .await
            .map_err(DispatchError::from_repo)
    }

    /// Apply a completion callback from the rendering service.
    pub async fn complete(
        &self,
        notification: CompletionNotification,
    ) -> Result<JobStatusRecord, DispatchError> {
        let CompletionNotification {
            job_id,
            filename,
            success,
        } = notification;

        let id = JobId::parse(&job_id).map_err(|_| DispatchError::UnknownJob(job_id.clone()))?;

        let outcome = if success {
            let result = filename
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    DispatchError::validation("a successful completion must name its result")
                })?;
            JobOutcome::Ready { result }
        } else {
            JobOutcome::Failed
        };

        let label = outcome.as_str();
        let record = self
            .statuses
            .complete(&id, outcome)
            .await
            .map_err(DispatchError::from_repo)?;

        counter!("voicegen_jobs_completed_total", "outcome" => label).increment(1);
        info!(target = SOURCE, job_id = %id, outcome = label, "job completed");

        Ok(record)
    }

    /// Number of jobs tracked by the status table.
    pub async fn tracked_jobs(&self) -> Result<usize, DispatchError> {
        self.statuses.len().await.map_err(DispatchError::from_repo)
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    fn validate(&self, input: &GenerationInput) -> Result<(), DispatchError> {
        if input.message.trim().is_empty() {
            return Err(DispatchError::validation("message must not be empty"));
        }

        let max = self.limits.max_message_chars.get();
        if input.message.chars().count() > max {
            return Err(DispatchError::validation(format!(
                "message must be at most {max} characters"
            )));
        }

        if input.voice_id.trim().is_empty() {
            return Err(DispatchError::validation("voice_id must not be empty"));
        }

        Ok(())
    }
}
