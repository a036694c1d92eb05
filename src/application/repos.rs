//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{
    job_id::JobId,
    types::{JobOutcome, JobStatusRecord},
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatusRepoError {
    #[error("job `{0}` not found")]
    NotFound(JobId),
    #[error("completion references unknown job `{0}`")]
    UnknownJob(JobId),
    #[error("job `{0}` is already tracked")]
    Duplicate(JobId),
}

/// Status table shared by the intake, completion, and polling paths.
///
/// Implementations synchronise internally; callers never hold a lock across
/// calls. Every identifier moves from `queued` to a terminal status, and a
/// terminal status never reverts to `queued`.
#[async_trait]
pub trait JobStatusRepo: Send + Sync {
    /// Start tracking `id` as `queued`.
    async fn create(&self, id: &JobId) -> Result<JobStatusRecord, StatusRepoError>;

    /// Record the terminal outcome for `id`. Repeated completions overwrite the
    /// previous terminal status.
    async fn complete(
        &self,
        id: &JobId,
        outcome: JobOutcome,
    ) -> Result<JobStatusRecord, StatusRepoError>;

    async fn get(&self, id: &JobId) -> Result<JobStatusRecord, StatusRepoError>;

    /// Number of identifiers currently tracked.
    async fn len(&self) -> Result<usize, StatusRepoError>;
}
