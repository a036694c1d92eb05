//! Domain layer types and invariants.

pub mod error;
pub mod job_id;
pub mod types;
