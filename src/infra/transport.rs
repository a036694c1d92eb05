//! TCP connection to the rendering service.

use std::{future::Future, num::NonZeroUsize, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::Instant,
};

use crate::{
    application::delivery::{Connection, Connector, TransportError},
    config::DeliverySettings,
};

#[derive(Debug, Clone)]
pub struct TcpConnector {
    endpoint: String,
    connect_timeout: Duration,
    response_timeout: Duration,
    max_response_bytes: NonZeroUsize,
}

impl TcpConnector {
    pub fn new(settings: &DeliverySettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            connect_timeout: settings.connect_timeout,
            response_timeout: settings.response_timeout,
            max_response_bytes: settings.max_response_bytes,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Connection = TcpConnection;

    async fn connect(&self) -> Result<TcpConnection, TransportError> {
        let stream = within(
            "connect",
            self.connect_timeout,
            TcpStream::connect(self.endpoint.as_str()),
        )
        .await?
        .map_err(|source| TransportError::Connect {
            endpoint: self.endpoint.clone(),
            source,
        })?;
        stream.set_nodelay(true)?;

        Ok(TcpConnection {
            stream,
            response_timeout: self.response_timeout,
            buffer: vec![0; self.max_response_bytes.get()],
        })
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
    response_timeout: Duration,
    buffer: Vec<u8>,
}

#[async_trait]
impl Connection for TcpConnection {
    async fn send(&mut self, record: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(record).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read one acknowledgement: up to the first `\n` or until the buffer is
    /// full. A reply split across several segments is read whole so its tail
    /// is not mistaken for the answer to the next job. Bytes that arrive before
    /// the deadline or a peer close still count as an answer.
    async fn receive(&mut self) -> Result<Bytes, TransportError> {
        let deadline = Instant::now() + self.response_timeout;
        let mut filled = 0;

        while filled < self.buffer.len() {
            let read = match tokio::time::timeout_at(
                deadline,
                self.stream.read(&mut self.buffer[filled..]),
            )
            .await
            {
                Ok(read) => read?,
                Err(_) if filled > 0 => break,
                Err(_) => {
                    return Err(TransportError::Timeout {
                        operation: "response",
                        after: self.response_timeout,
                    });
                }
            };

            if read == 0 {
                if filled == 0 {
                    return Err(TransportError::Closed);
                }
                break;
            }

            let line_done = self.buffer[filled..filled + read].contains(&b'\n');
            filled += read;
            if line_done {
                break;
            }
        }

        Ok(Bytes::copy_from_slice(&self.buffer[..filled]))
    }
}

async fn within<T>(
    operation: &'static str,
    after: Duration,
    fut: impl Future<Output = T>,
) -> Result<T, TransportError> {
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| TransportError::Timeout { operation, after })
}
