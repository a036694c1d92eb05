use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("job identifier `{value}` is malformed")]
    MalformedJobId { value: String },
    #[error("failed to encode delivery record: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl DomainError {
    pub fn malformed_job_id(value: impl Into<String>) -> Self {
        Self::MalformedJobId {
            value: value.into(),
        }
    }
}
