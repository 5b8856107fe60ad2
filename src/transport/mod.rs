//! Transport abstraction.
//!
//! Concrete transports implement only the async primitives of
//! [`NetworkClient`]. Everything else is provided on top of them:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  blocking forms      connect · write · write_range · read │
//! │        │ waits on                                        │
//! │        ▼                                                 │
//! │  provided async      connect_async · write_all_async     │
//! │                      read_with_timeout · read_with_cancel│
//! │                      read_bytes_async                    │
//! │        │ delegates to                                    │
//! │        ▼                                                 │
//! │  primitives          connect_to · disconnect_async       │
//! │                      write_async · read_into             │
//! │                      clear_read_buffers                  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Message-oriented clients ([`NetworkMessageClient`]) add whole-envelope
//! reads and writes. [`ClearBuffersAfterReadDecorator`] wraps one to make
//! read-side operations exclusive and to clear buffers after each message.
//!
//! # Usage
//!
//! ```rust,ignore
//! use peerwire::transport::{ClearBuffersAfterReadDecorator, FramedMessageClient, TcpNetworkClient};
//!
//! let tcp = TcpNetworkClient::new();
//! tcp.connect_async("127.0.0.1", 7777).await?;
//! let client = ClearBuffersAfterReadDecorator::new(FramedMessageClient::new(tcp))?;
//! ```

mod blocking;
mod decorator;
mod framed;
mod tcp;

pub use decorator::ClearBuffersAfterReadDecorator;
pub use framed::{FramedMessageClient, DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_SIZE};
pub use tcp::TcpNetworkClient;

use std::net::{IpAddr, SocketAddr};
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{PeerError, Result};
use crate::protocol::{Envelope, MessageParameters};

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection
    #[default]
    Disconnected,
    /// Connect in progress
    Connecting,
    /// Ready for reads and writes
    Connected,
    /// Teardown in progress
    Disconnecting,
}

/// Addresses and identity of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDetails {
    /// Remote endpoint
    pub remote: SocketAddr,
    /// Local endpoint
    pub local: SocketAddr,
    /// Unique connection identifier
    pub connection_id: Uuid,
}

impl ConnectionDetails {
    /// Details with a fresh connection id.
    pub fn new(remote: SocketAddr, local: SocketAddr) -> Self {
        Self {
            remote,
            local,
            connection_id: Uuid::new_v4(),
        }
    }
}

/// Result of a read that may be cut short.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome<T = usize> {
    /// The read finished
    Completed(T),
    /// Timeout or cancellation fired first
    Aborted,
}

impl<T> ReadOutcome<T> {
    /// Whether the stop condition fired.
    pub fn is_aborted(&self) -> bool {
        matches!(self, ReadOutcome::Aborted)
    }

    /// The completed value, if any.
    pub fn completed(self) -> Option<T> {
        match self {
            ReadOutcome::Completed(value) => Some(value),
            ReadOutcome::Aborted => None,
        }
    }

    /// Map the completed value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ReadOutcome<U> {
        match self {
            ReadOutcome::Completed(value) => ReadOutcome::Completed(f(value)),
            ReadOutcome::Aborted => ReadOutcome::Aborted,
        }
    }
}

/// `offset..offset + count`, checked against a buffer of `len` bytes.
pub(crate) fn checked_range(len: usize, offset: usize, count: usize) -> Result<Range<usize>> {
    match offset.checked_add(count) {
        Some(end) if end <= len => Ok(offset..end),
        _ => Err(PeerError::invalid_argument(
            "count",
            format!(
                "range {}+{} exceeds buffer of {} bytes",
                offset, count, len
            ),
        )),
    }
}

/// Byte-oriented connection.
#[async_trait]
pub trait NetworkClient: Send + Sync + 'static {
    /// Connect to `address:port`. `Ok(false)` when the connection is refused.
    async fn connect_to(&self, address: IpAddr, port: u16) -> Result<bool>;

    /// Tear the connection down after `delay`. Repeated calls are no-ops.
    async fn disconnect_async(&self, delay: Duration) -> Result<()>;

    /// Write exactly `count` bytes of `bytes` starting at `offset`.
    async fn write_async(&self, bytes: &[u8], offset: usize, count: usize) -> Result<()>;

    /// Read up to `count` bytes into `buffer[start..]`.
    ///
    /// `Ok(0)` for a non-empty request means the peer closed the stream.
    async fn read_into(&self, buffer: &mut [u8], start: usize, count: usize) -> Result<usize>;

    /// Discard buffered, unread input.
    async fn clear_read_buffers(&self) -> Result<()>;

    /// Connect to a textual IP address.
    ///
    /// A malformed address is an invalid-argument error; a refused
    /// connection is `Ok(false)`.
    async fn connect_async(&self, address: &str, port: u16) -> Result<bool> {
        let ip: IpAddr = address.parse().map_err(|_| {
            PeerError::invalid_argument("address", format!("`{}` is not an IP address", address))
        })?;
        self.connect_to(ip, port).await
    }

    /// Write every byte of `bytes`.
    async fn write_all_async(&self, bytes: &[u8]) -> Result<()> {
        self.write_async(bytes, 0, bytes.len()).await
    }

    /// Read with an optional timeout. `None` waits indefinitely.
    async fn read_with_timeout(
        &self,
        buffer: &mut [u8],
        start: usize,
        count: usize,
        timeout: Option<Duration>,
    ) -> Result<ReadOutcome> {
        let read = self.read_into(buffer, start, count);
        match timeout {
            None => read.await.map(ReadOutcome::Completed),
            Some(limit) => match tokio::time::timeout(limit, read).await {
                Ok(result) => result.map(ReadOutcome::Completed),
                Err(_elapsed) => Ok(ReadOutcome::Aborted),
            },
        }
    }

    /// Read until done or until `token` fires.
    async fn read_with_cancel(
        &self,
        buffer: &mut [u8],
        start: usize,
        count: usize,
        token: &CancellationToken,
    ) -> Result<ReadOutcome> {
        tokio::select! {
            biased;
            () = token.cancelled() => Ok(ReadOutcome::Aborted),
            result = self.read_into(buffer, start, count) => result.map(ReadOutcome::Completed),
        }
    }

    /// Allocate `count` bytes and read into them.
    ///
    /// The returned buffer is truncated to the bytes actually read.
    async fn read_bytes_async(
        &self,
        count: usize,
        timeout: Option<Duration>,
    ) -> Result<ReadOutcome<Vec<u8>>> {
        let mut buffer = vec![0u8; count];
        let outcome = self.read_with_timeout(&mut buffer, 0, count, timeout).await?;
        Ok(outcome.map(|read| {
            buffer.truncate(read);
            buffer
        }))
    }

    /// Blocking [`connect_async`](Self::connect_async).
    fn connect(&self, address: &str, port: u16) -> Result<bool> {
        blocking::block_on(self.connect_async(address, port))?
    }

    /// Blocking [`write_all_async`](Self::write_all_async).
    fn write(&self, bytes: &[u8]) -> Result<()> {
        blocking::block_on(self.write_all_async(bytes))?
    }

    /// Blocking [`write_async`](Self::write_async).
    fn write_range(&self, bytes: &[u8], offset: usize, count: usize) -> Result<()> {
        blocking::block_on(self.write_async(bytes, offset, count))?
    }

    /// Blocking read of up to `count` bytes, without a timeout.
    fn read(&self, count: usize) -> Result<Vec<u8>> {
        let outcome = blocking::block_on(self.read_bytes_async(count, None))??;
        Ok(outcome.completed().unwrap_or_default())
    }

    /// Fire-and-forget disconnect with no delay.
    ///
    /// Failures are logged and otherwise dropped.
    fn disconnect(self: Arc<Self>) {
        let teardown = async move {
            if let Err(err) = self.disconnect_async(Duration::ZERO).await {
                tracing::debug!(error = %err, "background disconnect failed");
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(teardown);
            },
            Err(_) => match blocking::bridge_runtime() {
                Ok(runtime) => {
                    runtime.spawn(teardown);
                },
                Err(err) => tracing::debug!(error = %err, "no runtime for background disconnect"),
            },
        }
    }
}

/// An envelope waiting to be written.
#[derive(Debug)]
pub struct OutgoingMessage {
    /// The envelope
    pub envelope: Envelope,
    /// How to send it
    pub parameters: MessageParameters,
}

/// An envelope read from the wire.
#[derive(Debug)]
pub struct NetworkIncomingMessage {
    /// The envelope
    pub envelope: Envelope,
    /// How it was sent
    pub parameters: MessageParameters,
}

/// Client that reads and writes whole envelopes.
#[async_trait]
pub trait NetworkMessageClient: NetworkClient {
    /// Read one message.
    ///
    /// `Completed(None)` means the peer disconnected; `Aborted` means `token`
    /// fired first.
    async fn read_message(
        &self,
        token: &CancellationToken,
    ) -> Result<ReadOutcome<Option<NetworkIncomingMessage>>>;

    /// Write one message.
    async fn write_message(&self, message: OutgoingMessage) -> Result<()>;

    /// [`read_message`](Self::read_message) bounded by an optional timeout.
    ///
    /// When the timeout elapses the read is cancelled through a child of
    /// `token` and reports `Aborted`, leaving any partial frame buffered.
    /// `None` waits indefinitely.
    async fn read_message_within(
        &self,
        token: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<ReadOutcome<Option<NetworkIncomingMessage>>> {
        let Some(limit) = timeout else {
            return self.read_message(token).await;
        };

        let bounded = token.child_token();
        let mut read = self.read_message(&bounded);
        tokio::select! {
            biased;
            outcome = &mut read => outcome,
            () = tokio::time::sleep(limit) => {
                bounded.cancel();
                read.await
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Echoes writes back as reads; a read on an empty queue waits forever.
    #[derive(Default)]
    struct LoopbackClient {
        queued: Mutex<Vec<u8>>,
        connects: AtomicUsize,
        disconnects: AtomicUsize,
    }

    #[async_trait]
    impl NetworkClient for LoopbackClient {
        async fn connect_to(&self, _address: IpAddr, port: u16) -> Result<bool> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(port != 0)
        }

        async fn disconnect_async(&self, _delay: Duration) -> Result<()> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn write_async(&self, bytes: &[u8], offset: usize, count: usize) -> Result<()> {
            let range = checked_range(bytes.len(), offset, count)?;
            self.queued.lock().unwrap().extend_from_slice(&bytes[range]);
            Ok(())
        }

        async fn read_into(&self, buffer: &mut [u8], start: usize, count: usize) -> Result<usize> {
            let range = checked_range(buffer.len(), start, count)?;
            let taken: Vec<u8> = {
                let mut queued = self.queued.lock().unwrap();
                let n = queued.len().min(range.len());
                queued.drain(..n).collect()
            };
            if taken.is_empty() && !range.is_empty() {
                std::future::pending::<()>().await;
            }
            buffer[range.start..range.start + taken.len()].copy_from_slice(&taken);
            Ok(taken.len())
        }

        async fn clear_read_buffers(&self) -> Result<()> {
            self.queued.lock().unwrap().clear();
            Ok(())
        }
    }

    #[test]
    fn test_checked_range() {
        assert_eq!(checked_range(10, 2, 8).unwrap(), 2..10);
        assert!(checked_range(10, 3, 8).unwrap_err().is_invalid_argument());
        assert!(checked_range(10, usize::MAX, 2).is_err());
    }

    #[tokio::test]
    async fn test_malformed_address_is_invalid_argument() {
        let client = LoopbackClient::default();
        let err = client.connect_async("not-an-ip", 80).await.unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(client.connects.load(Ordering::SeqCst), 0);

        assert!(client.connect_async("127.0.0.1", 80).await.unwrap());
        assert!(!client.connect_async("::1", 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_read_bytes_truncates() {
        let client = LoopbackClient::default();
        client.write_all_async(b"abc").await.unwrap();

        let outcome = client.read_bytes_async(8, None).await.unwrap();
        assert_eq!(outcome, ReadOutcome::Completed(b"abc".to_vec()));
    }

    #[tokio::test]
    async fn test_read_timeout_aborts() {
        let client = LoopbackClient::default();
        let outcome = client
            .read_bytes_async(4, Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(outcome.is_aborted());

        // Still usable after the abort.
        client.write_all_async(b"ok").await.unwrap();
        let outcome = client.read_bytes_async(4, None).await.unwrap();
        assert_eq!(outcome.completed(), Some(b"ok".to_vec()));
    }

    #[tokio::test]
    async fn test_read_cancel_aborts() {
        let client = LoopbackClient::default();
        let token = CancellationToken::new();
        token.cancel();

        let mut buffer = [0u8; 4];
        let outcome = client
            .read_with_cancel(&mut buffer, 0, 4, &token)
            .await
            .unwrap();
        assert!(outcome.is_aborted());
    }

    #[test]
    fn test_blocking_forms_wait_on_async() {
        let client = LoopbackClient::default();
        assert!(client.connect("10.0.0.1", 9000).unwrap());
        client.write_range(b"xxhelloxx", 2, 5).unwrap();
        assert_eq!(client.read(16).unwrap(), b"hello".to_vec());
    }

    #[tokio::test]
    async fn test_blocking_forms_refused_in_async_context() {
        let client = LoopbackClient::default();
        assert!(matches!(
            client.write(b"data"),
            Err(PeerError::BlockingInAsyncContext)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_is_fire_and_forget() {
        let client = Arc::new(LoopbackClient::default());
        Arc::clone(&client).disconnect();

        for _ in 0..50 {
            if client.disconnects.load(Ordering::SeqCst) == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("background disconnect never ran");
    }
}
