//! Application services: the work queue, the delivery worker, and the
//! boundaries that feed and observe them.

pub mod delivery;
pub mod error;
pub mod jobs;
pub mod repos;
