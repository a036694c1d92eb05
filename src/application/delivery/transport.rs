use std::{io, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Failures of the connection to the rendering service. All of them are
/// handled inside the delivery worker by reconnecting.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to `{endpoint}`: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("connection i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("connection closed by peer")]
    Closed,
}

/// Opens connections to the rendering service.
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: Connection;

    async fn connect(&self) -> Result<Self::Connection, TransportError>;

    /// Human-readable address used in logs.
    fn endpoint(&self) -> &str;
}

/// One open stream to the rendering service.
#[async_trait]
pub trait Connection: Send {
    /// Write one complete record in a single operation.
    async fn send(&mut self, record: &[u8]) -> Result<(), TransportError>;

    /// Read one bounded chunk of response. An empty read means the peer closed
    /// the stream and is reported as [`TransportError::Closed`].
    async fn receive(&mut self) -> Result<Bytes, TransportError>;
}
