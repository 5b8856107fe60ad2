//! Buffer-lifecycle decorator.
//!
//! Wraps a message client so that read-side operations (raw reads, message
//! reads, buffer clears) run one at a time behind an async read gate, and so
//! that the wrapped client's read buffers are cleared after every message
//! read. The clear inside a message read calls the wrapped client directly;
//! the gate is not re-entrant. Writes, connects and disconnects bypass the
//! gate.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use super::{
    NetworkClient, NetworkIncomingMessage, NetworkMessageClient, OutgoingMessage, ReadOutcome,
};
use crate::error::{PeerError, Result};

/// Clears the wrapped client's read buffers after each message read.
pub struct ClearBuffersAfterReadDecorator<C> {
    inner: C,
    read_gate: Mutex<()>,
}

impl<C: NetworkMessageClient> ClearBuffersAfterReadDecorator<C> {
    /// Decorate `inner`. An absent client is an invalid-argument error.
    pub fn new(inner: impl Into<Option<C>>) -> Result<Self> {
        let inner = inner
            .into()
            .ok_or_else(|| PeerError::missing("decorated_client"))?;
        Ok(Self {
            inner,
            read_gate: Mutex::new(()),
        })
    }

    /// The decorated client.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    async fn gate_or_cancel(&self, token: &CancellationToken) -> Option<MutexGuard<'_, ()>> {
        tokio::select! {
            biased;
            () = token.cancelled() => None,
            guard = self.read_gate.lock() => Some(guard),
        }
    }
}

#[async_trait]
impl<C: NetworkMessageClient> NetworkClient for ClearBuffersAfterReadDecorator<C> {
    async fn connect_to(&self, address: IpAddr, port: u16) -> Result<bool> {
        self.inner.connect_to(address, port).await
    }

    async fn connect_async(&self, address: &str, port: u16) -> Result<bool> {
        self.inner.connect_async(address, port).await
    }

    async fn disconnect_async(&self, delay: Duration) -> Result<()> {
        self.inner.disconnect_async(delay).await
    }

    async fn write_async(&self, bytes: &[u8], offset: usize, count: usize) -> Result<()> {
        self.inner.write_async(bytes, offset, count).await
    }

    async fn read_into(&self, buffer: &mut [u8], start: usize, count: usize) -> Result<usize> {
        let _gate = self.read_gate.lock().await;
        self.inner.read_into(buffer, start, count).await
    }

    async fn read_with_cancel(
        &self,
        buffer: &mut [u8],
        start: usize,
        count: usize,
        token: &CancellationToken,
    ) -> Result<ReadOutcome> {
        let Some(_gate) = self.gate_or_cancel(token).await else {
            return Ok(ReadOutcome::Aborted);
        };
        self.inner.read_with_cancel(buffer, start, count, token).await
    }

    async fn clear_read_buffers(&self) -> Result<()> {
        let _gate = self.read_gate.lock().await;
        self.inner.clear_read_buffers().await
    }
}

#[async_trait]
impl<C: NetworkMessageClient> NetworkMessageClient for ClearBuffersAfterReadDecorator<C> {
    async fn read_message(
        &self,
        token: &CancellationToken,
    ) -> Result<ReadOutcome<Option<NetworkIncomingMessage>>> {
        let Some(_gate) = self.gate_or_cancel(token).await else {
            return Ok(ReadOutcome::Aborted);
        };

        match self.inner.read_message(token).await {
            Ok(ReadOutcome::Aborted) => Ok(ReadOutcome::Aborted),
            Ok(ReadOutcome::Completed(message)) => {
                // None here means the peer disconnected; clear regardless.
                self.inner.clear_read_buffers().await?;
                Ok(ReadOutcome::Completed(message))
            },
            Err(err) => {
                if let Err(clear_err) = self.inner.clear_read_buffers().await {
                    tracing::debug!(error = %clear_err, "clear after failed read");
                }
                Err(err)
            },
        }
    }

    async fn write_message(&self, message: OutgoingMessage) -> Result<()> {
        self.inner.write_message(message).await
    }
}
