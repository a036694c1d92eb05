//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod http;
pub mod status_store;
pub mod telemetry;
pub mod transport;
