//! In-memory status table.

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use time::OffsetDateTime;
use tracing::warn;

use crate::{
    application::repos::{JobStatusRepo, StatusRepoError},
    domain::{
        job_id::JobId,
        types::{JobOutcome, JobStatusRecord},
    },
};

const SOURCE: &str = "voicegen::status_store";

/// Status table kept in process memory. Entries live until the process exits.
#[derive(Debug, Default)]
pub struct InMemoryJobStatusRepo {
    records: DashMap<JobId, JobStatusRecord>,
}

impl InMemoryJobStatusRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStatusRepo for InMemoryJobStatusRepo {
    async fn create(&self, id: &JobId) -> Result<JobStatusRecord, StatusRepoError> {
        match self.records.entry(id.clone()) {
            Entry::Occupied(_) => Err(StatusRepoError::Duplicate(id.clone())),
            Entry::Vacant(slot) => {
                let record = JobStatusRecord::queued(OffsetDateTime::now_utc());
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn complete(
        &self,
        id: &JobId,
        outcome: JobOutcome,
    ) -> Result<JobStatusRecord, StatusRepoError> {
        let mut record = self
            .records
            .get_mut(id)
            .ok_or_else(|| StatusRepoError::UnknownJob(id.clone()))?;

        if record.status.is_terminal() {
            warn!(
                target = SOURCE,
                job_id = %id,
                previous = record.status.as_str(),
                next = outcome.as_str(),
                "job completed more than once; keeping the latest outcome"
            );
        }

        record.status = outcome.into();
        record.completed_at = Some(OffsetDateTime::now_utc());
        Ok(record.clone())
    }

    async fn get(&self, id: &JobId) -> Result<JobStatusRecord, StatusRepoError> {
        self.records
            .get(id)
            .map(|record| record.clone())
            .ok_or_else(|| StatusRepoError::NotFound(id.clone()))
    }

    async fn len(&self) -> Result<usize, StatusRepoError> {
        Ok(self.records.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::types::JobStatus;

    fn id(raw: &str) -> JobId {
        JobId::parse(raw).expect("valid id")
    }

    #[tokio::test]
    async fn created_job_starts_queued() {
        let repo = InMemoryJobStatusRepo::new();
        let record = repo.create(&id("hello-1")).await.expect("create");

        assert_eq!(record.status, JobStatus::Queued);
        assert!(record.completed_at.is_none());
        assert_eq!(repo.get(&id("hello-1")).await.expect("get"), record);
        assert_eq!(repo.len().await.expect("len"), 1);
    }

    #[tokio::test]
    async fn creating_twice_is_rejected() {
        let repo = InMemoryJobStatusRepo::new();
        repo.create(&id("twice")).await.expect("create");

        assert_eq!(
            repo.create(&id("twice")).await,
            Err(StatusRepoError::Duplicate(id("twice")))
        );
        assert_eq!(repo.len().await.expect("len"), 1);
    }

    #[tokio::test]
    async fn completion_sets_terminal_status() {
        let repo = InMemoryJobStatusRepo::new();
        repo.create(&id("done")).await.expect("create");

        let record = repo
            .complete(
                &id("done"),
                JobOutcome::Ready {
                    result: "done.mp3".into(),
                },
            )
            .await
            .expect("complete");

        assert_eq!(
            record.status,
            JobStatus::Ready {
                result: "done.mp3".into()
            }
        );
        assert!(record.completed_at.is_some());
        assert!(record.completed_at >= Some(record.submitted_at));
    }

    #[tokio::test]
    async fn completing_unknown_job_leaves_table_untouched() {
        let repo = InMemoryJobStatusRepo::new();

        assert_eq!(
            repo.complete(&id("ghost"), JobOutcome::Failed).await,
            Err(StatusRepoError::UnknownJob(id("ghost")))
        );
        assert_eq!(repo.len().await.expect("len"), 0);
        assert_eq!(
            repo.get(&id("ghost")).await,
            Err(StatusRepoError::NotFound(id("ghost")))
        );
    }

    #[tokio::test]
    async fn later_completion_overwrites_earlier_one() {
        let repo = InMemoryJobStatusRepo::new();
        repo.create(&id("flip")).await.expect("create");

        repo.complete(&id("flip"), JobOutcome::Failed)
            .await
            .expect("first");
        let record = repo
            .complete(
                &id("flip"),
                JobOutcome::Ready {
                    result: "flip.mp3".into(),
                },
            )
            .await
            .expect("second");

        assert!(record.status.is_terminal());
        assert_eq!(record.status.as_str(), "ready");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_access_keeps_every_entry() {
        let repo = Arc::new(InMemoryJobStatusRepo::new());

        let tasks: Vec<_> = (0..64)
            .map(|n| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    let job = id(&format!("job-{n}"));
                    repo.create(&job).await.expect("create");
                    if n % 2 == 0 {
                        repo.complete(&job, JobOutcome::Failed)
                            .await
                            .expect("complete");
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.expect("join");
        }

        assert_eq!(repo.len().await.expect("len"), 64);
        assert_eq!(
            repo.get(&id("job-2")).await.expect("get").status,
            JobStatus::Error
        );
        assert_eq!(
            repo.get(&id("job-3")).await.expect("get").status,
            JobStatus::Queued
        );
    }
}
