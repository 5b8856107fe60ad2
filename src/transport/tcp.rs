//! TCP transport over `tokio::net`.
//!
//! Each connection gets its own cancellation token. Disconnect cancels it,
//! so reads in flight at that moment observe end of stream and writes fail
//! with not-connected; calls made after teardown fail with not-connected.

use std::net::{IpAddr, SocketAddr};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{checked_range, ConnectionDetails, ConnectionState, NetworkClient};
use crate::error::{PeerError, Result};

#[derive(Debug, Default)]
struct Link {
    state: ConnectionState,
    details: Option<ConnectionDetails>,
    shutdown: CancellationToken,
}

/// TCP implementation of [`NetworkClient`].
#[derive(Debug, Default)]
pub struct TcpNetworkClient {
    reader: Mutex<Option<OwnedReadHalf>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    link: RwLock<Link>,
}

impl TcpNetworkClient {
    /// Unconnected client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Client over an already connected stream, e.g. one from `accept`.
    pub async fn from_stream(stream: TcpStream) -> Result<Self> {
        let client = Self::new();
        let attempt = client.shutdown_token();
        client.install(stream, &attempt).await?;
        Ok(client)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.read_link(|link| link.state)
    }

    /// Whether reads and writes are possible.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Addresses and id of the current connection.
    pub fn connection_details(&self) -> Option<ConnectionDetails> {
        self.read_link(|link| link.details.clone())
    }

    fn read_link<T>(&self, f: impl FnOnce(&Link) -> T) -> T {
        f(&self.link.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write_link<T>(&self, f: impl FnOnce(&mut Link) -> T) -> T {
        f(&mut self.link.write().unwrap_or_else(PoisonError::into_inner))
    }

    fn shutdown_token(&self) -> CancellationToken {
        self.read_link(|link| link.shutdown.clone())
    }

    /// Move from `Disconnected` to `Connecting` under a fresh token.
    ///
    /// `None` if a connection exists or is being set up.
    fn begin_connect(&self) -> Option<CancellationToken> {
        self.write_link(|link| {
            if link.state != ConnectionState::Disconnected {
                return None;
            }
            link.state = ConnectionState::Connecting;
            link.shutdown = CancellationToken::new();
            Some(link.shutdown.clone())
        })
    }

    /// Adopt `stream` unless `attempt` was cancelled by a disconnect.
    ///
    /// Returns `false` when the stream was dropped instead.
    async fn install(&self, stream: TcpStream, attempt: &CancellationToken) -> Result<bool> {
        if let Err(err) = stream.set_nodelay(true) {
            tracing::debug!(error = %err, "TCP_NODELAY not set");
        }
        let details = ConnectionDetails::new(stream.peer_addr()?, stream.local_addr()?);
        let (read_half, write_half) = stream.into_split();

        // Hold both halves' locks across the state change so a disconnect
        // that follows it finds the halves in place.
        let mut reader = self.reader.lock().await;
        let mut writer = self.writer.lock().await;
        let committed = self.write_link(|link| {
            if attempt.is_cancelled() {
                return false;
            }
            link.state = ConnectionState::Connected;
            link.details = Some(details.clone());
            true
        });
        if !committed {
            tracing::info!(remote = %details.remote, "connect abandoned by disconnect");
            return Ok(false);
        }
        *reader = Some(read_half);
        *writer = Some(write_half);

        tracing::info!(
            remote = %details.remote,
            connection_id = %details.connection_id,
            "TCP connection established"
        );
        Ok(true)
    }
}

#[async_trait]
impl NetworkClient for TcpNetworkClient {
    async fn connect_to(&self, address: IpAddr, port: u16) -> Result<bool> {
        let Some(attempt) = self.begin_connect() else {
            return Err(PeerError::Protocol(
                "Client is already connected or connecting".to_string(),
            ));
        };
        // A disconnect during the attempt resets the state itself.
        let reset = || {
            if !attempt.is_cancelled() {
                self.write_link(|link| link.state = ConnectionState::Disconnected);
            }
        };

        let target = SocketAddr::new(address, port);
        let connected = tokio::select! {
            biased;
            () = attempt.cancelled() => return Ok(false),
            result = TcpStream::connect(target) => result,
        };
        match connected {
            Ok(stream) => match self.install(stream, &attempt).await {
                Ok(installed) => Ok(installed),
                Err(err) => {
                    reset();
                    Err(err)
                },
            },
            Err(err) => {
                tracing::info!(%target, error = %err, "TCP connection refused");
                reset();
                Ok(false)
            },
        }
    }

    async fn disconnect_async(&self, delay: Duration) -> Result<()> {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let token = self.write_link(|link| match link.state {
            ConnectionState::Connected | ConnectionState::Connecting => {
                link.state = ConnectionState::Disconnecting;
                Some(link.shutdown.clone())
            },
            ConnectionState::Disconnecting | ConnectionState::Disconnected => None,
        });
        let Some(token) = token else {
            return Ok(());
        };
        token.cancel();

        if let Some(mut write_half) = self.writer.lock().await.take() {
            if let Err(err) = write_half.shutdown().await {
                tracing::debug!(error = %err, "TCP shutdown failed");
            }
        }
        self.reader.lock().await.take();

        let details = self.write_link(|link| {
            link.state = ConnectionState::Disconnected;
            link.details.take()
        });
        if let Some(details) = details {
            tracing::info!(
                remote = %details.remote,
                connection_id = %details.connection_id,
                "TCP connection closed"
            );
        }
        Ok(())
    }

    async fn write_async(&self, bytes: &[u8], offset: usize, count: usize) -> Result<()> {
        let range = checked_range(bytes.len(), offset, count)?;
        let token = self.shutdown_token();

        let mut writer = self.writer.lock().await;
        let write_half = writer.as_mut().ok_or(PeerError::NotConnected)?;
        tokio::select! {
            biased;
            () = token.cancelled() => Err(PeerError::NotConnected),
            result = write_half.write_all(&bytes[range]) => result.map_err(PeerError::from),
        }
    }

    async fn read_into(&self, buffer: &mut [u8], start: usize, count: usize) -> Result<usize> {
        let range = checked_range(buffer.len(), start, count)?;
        let token = self.shutdown_token();

        let mut reader = self.reader.lock().await;
        let read_half = reader.as_mut().ok_or(PeerError::NotConnected)?;
        tokio::select! {
            biased;
            () = token.cancelled() => Ok(0),
            result = read_half.read(&mut buffer[range]) => result.map_err(PeerError::from),
        }
    }

    async fn clear_read_buffers(&self) -> Result<()> {
        // Reads go straight into caller buffers; nothing is held here.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn test_connect_write_read() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let accepted = TcpNetworkClient::from_stream(stream).await.unwrap();
            let mut buffer = [0u8; 5];
            let read = accepted.read_into(&mut buffer, 0, 5).await.unwrap();
            accepted.write_all_async(&buffer[..read]).await.unwrap();
            accepted
        });

        let client = TcpNetworkClient::new();
        assert!(client.connect_async("127.0.0.1", port).await.unwrap());
        assert!(client.is_connected());
        assert_eq!(client.connection_details().unwrap().remote.port(), port);

        client.write_async(b"--hello--", 2, 5).await.unwrap();
        let echoed = client
            .read_bytes_async(5, Some(Duration::from_secs(5)))
            .await
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(echoed, b"hello");

        drop(server.await.unwrap());
    }

    #[tokio::test]
    async fn test_refused_connection_is_false() {
        let (listener, port) = listener().await;
        drop(listener);

        let client = TcpNetworkClient::new();
        assert!(!client.connect_async("127.0.0.1", port).await.unwrap());
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_and_fails_later_calls() {
        let (listener, port) = listener().await;
        let _server = tokio::spawn(async move { listener.accept().await.map(|(s, _)| s) });

        let client = TcpNetworkClient::new();
        assert!(client.connect_async("127.0.0.1", port).await.unwrap());

        client.disconnect_async(Duration::ZERO).await.unwrap();
        client.disconnect_async(Duration::ZERO).await.unwrap();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.connection_details().is_none());

        assert!(matches!(
            client.write_all_async(b"x").await,
            Err(PeerError::NotConnected)
        ));
        let mut buffer = [0u8; 1];
        assert!(matches!(
            client.read_into(&mut buffer, 0, 1).await,
            Err(PeerError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_ends_in_flight_read() {
        let (listener, port) = listener().await;
        let _server = tokio::spawn(async move { listener.accept().await.map(|(s, _)| s) });

        let client = std::sync::Arc::new(TcpNetworkClient::new());
        assert!(client.connect_async("127.0.0.1", port).await.unwrap());

        let reader = std::sync::Arc::clone(&client);
        let pending = tokio::spawn(async move {
            let mut buffer = [0u8; 8];
            reader.read_into(&mut buffer, 0, 8).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        client.disconnect_async(Duration::ZERO).await.unwrap();
        let read = tokio::time::timeout(Duration::from_secs(5), pending)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(read, 0);
    }

    #[tokio::test]
    async fn test_connect_twice_rejected() {
        let (listener, port) = listener().await;
        let _server = tokio::spawn(async move { listener.accept().await.map(|(s, _)| s) });

        let client = TcpNetworkClient::new();
        assert!(client.connect_async("127.0.0.1", port).await.unwrap());
        assert!(matches!(
            client.connect_async("127.0.0.1", port).await,
            Err(PeerError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_disconnect_during_connect_drops_stream() {
        let (listener, port) = listener().await;
        let _server = tokio::spawn(async move { listener.accept().await.map(|(s, _)| s) });

        let client = TcpNetworkClient::new();
        let attempt = client.begin_connect().unwrap();
        assert_eq!(client.state(), ConnectionState::Connecting);

        client.disconnect_async(Duration::ZERO).await.unwrap();
        assert!(attempt.is_cancelled());
        assert_eq!(client.state(), ConnectionState::Disconnected);

        let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        assert!(!client.install(stream, &attempt).await.unwrap());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.connection_details().is_none());
        assert!(matches!(
            client.write_all_async(b"x").await,
            Err(PeerError::NotConnected)
        ));

        // A fresh attempt is not affected by the abandoned one.
        assert!(client.connect_async("127.0.0.1", port).await.unwrap());
        assert!(client.is_connected());
    }
}
