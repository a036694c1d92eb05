//! Delivery of queued jobs to the rendering service.

mod retry;
mod transport;
mod worker;

pub use retry::{FixedDelay, LimitedAttempts, RetryPolicy};
pub use transport::{Connection, Connector, TransportError};
pub use worker::{DeliveryError, DeliveryWorker, WorkerState};
