//! Length-prefixed envelope framing over a byte transport.
//!
//! # Wire Format
//!
//! ```text
//! ┌────────────┬───────┬──────────┬─────────┬────────────┬──────────────┐
//! │ body_len:4 │ flags │ delivery │ channel │ crc32:4    │ body         │
//! └────────────┴───────┴──────────┴─────────┴────────────┴──────────────┘
//!   big endian            method     id       of body      JSON envelope,
//!                                                          sealed when the
//!                                                          encrypted flag
//!                                                          is set
//! ```
//!
//! The flags, delivery and channel bytes are bound to the sealed body as
//! associated data. The checksum covers the body exactly as it travels.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Buf, BufMut, BytesMut};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{
    NetworkClient, NetworkIncomingMessage, NetworkMessageClient, OutgoingMessage, ReadOutcome,
};
use crate::config::ConnectionConfig;
use crate::crypto::PayloadCipher;
use crate::error::{PeerError, Result};
use crate::protocol::{DeliveryMethod, MessageParameters};
use crate::serialization::{decode_envelope, encode_envelope};

/// Header size in bytes
pub const FRAME_HEADER_SIZE: usize = 11;

/// Default body size limit (1 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1 << 20;

const FLAG_ENCRYPTED: u8 = 0b0000_0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameHeader {
    body_len: u32,
    flags: u8,
    delivery: u8,
    channel: u8,
    checksum: u32,
}

impl FrameHeader {
    fn encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    fn associated_data(&self) -> [u8; 3] {
        [self.flags, self.delivery, self.channel]
    }

    fn write_to(&self, out: &mut BytesMut) {
        out.put_u32(self.body_len);
        out.put_u8(self.flags);
        out.put_u8(self.delivery);
        out.put_u8(self.channel);
        out.put_u32(self.checksum);
    }

    fn parse(mut bytes: &[u8]) -> Self {
        Self {
            body_len: bytes.get_u32(),
            flags: bytes.get_u8(),
            delivery: bytes.get_u8(),
            channel: bytes.get_u8(),
            checksum: bytes.get_u32(),
        }
    }

    fn parameters(&self) -> Result<MessageParameters> {
        let delivery_method = DeliveryMethod::from_u8(self.delivery).ok_or_else(|| {
            PeerError::Protocol(format!("Unknown delivery method {}", self.delivery))
        })?;
        Ok(MessageParameters {
            delivery_method,
            encrypted: self.encrypted(),
            channel: self.channel,
        })
    }
}

/// Envelope client speaking the framed wire format over `C`.
pub struct FramedMessageClient<C> {
    inner: C,
    read_buffer: Mutex<BytesMut>,
    cipher: Option<Arc<dyn PayloadCipher>>,
    max_frame_size: usize,
}

impl<C: NetworkClient> FramedMessageClient<C> {
    /// Wrap a byte transport.
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            read_buffer: Mutex::new(BytesMut::with_capacity(FRAME_HEADER_SIZE)),
            cipher: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Seal and open encrypted frames with `cipher`.
    pub fn with_cipher(mut self, cipher: Arc<dyn PayloadCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Limit frame bodies to `max_frame_size` bytes.
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Apply the connection limits from `config`.
    pub fn with_config(self, config: &ConnectionConfig) -> Self {
        self.with_max_frame_size(config.max_frame_size)
    }

    /// The wrapped transport.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Bytes of a partially read frame held since the last clear.
    pub async fn buffered_len(&self) -> usize {
        self.read_buffer.lock().await.len()
    }

    fn ready_cipher(&self) -> Result<&dyn PayloadCipher> {
        match &self.cipher {
            Some(cipher) if cipher.is_ready() => Ok(cipher.as_ref()),
            _ => Err(PeerError::CryptoNotInitialized),
        }
    }

    fn check_size(&self, size: usize) -> Result<()> {
        if size > self.max_frame_size {
            return Err(PeerError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        Ok(())
    }

    /// Grow `buffer` to `target` bytes. `Completed(false)` on end of stream.
    async fn fill_to(
        &self,
        buffer: &mut BytesMut,
        target: usize,
        token: &CancellationToken,
    ) -> Result<ReadOutcome<bool>> {
        while buffer.len() < target {
            let missing = target - buffer.len();
            let mut chunk = vec![0u8; missing];
            match self
                .inner
                .read_with_cancel(&mut chunk, 0, missing, token)
                .await?
            {
                ReadOutcome::Aborted => return Ok(ReadOutcome::Aborted),
                ReadOutcome::Completed(0) => return Ok(ReadOutcome::Completed(false)),
                ReadOutcome::Completed(read) => buffer.extend_from_slice(&chunk[..read]),
            }
        }
        Ok(ReadOutcome::Completed(true))
    }
}

#[async_trait]
impl<C: NetworkClient> NetworkClient for FramedMessageClient<C> {
    async fn connect_to(&self, address: std::net::IpAddr, port: u16) -> Result<bool> {
        self.inner.connect_to(address, port).await
    }

    async fn disconnect_async(&self, delay: std::time::Duration) -> Result<()> {
        self.inner.disconnect_async(delay).await
    }

    async fn write_async(&self, bytes: &[u8], offset: usize, count: usize) -> Result<()> {
        self.inner.write_async(bytes, offset, count).await
    }

    async fn read_into(&self, buffer: &mut [u8], start: usize, count: usize) -> Result<usize> {
        self.inner.read_into(buffer, start, count).await
    }

    async fn clear_read_buffers(&self) -> Result<()> {
        self.read_buffer.lock().await.clear();
        self.inner.clear_read_buffers().await
    }
}

#[async_trait]
impl<C: NetworkClient> NetworkMessageClient for FramedMessageClient<C> {
    async fn read_message(
        &self,
        token: &CancellationToken,
    ) -> Result<ReadOutcome<Option<NetworkIncomingMessage>>> {
        let mut buffer = self.read_buffer.lock().await;

        match self.fill_to(&mut buffer, FRAME_HEADER_SIZE, token).await? {
            ReadOutcome::Aborted => return Ok(ReadOutcome::Aborted),
            ReadOutcome::Completed(false) => return Ok(ReadOutcome::Completed(None)),
            ReadOutcome::Completed(true) => {},
        }

        let header = FrameHeader::parse(&buffer[..FRAME_HEADER_SIZE]);
        let body_len = header.body_len as usize;
        self.check_size(body_len)?;

        match self
            .fill_to(&mut buffer, FRAME_HEADER_SIZE + body_len, token)
            .await?
        {
            ReadOutcome::Aborted => return Ok(ReadOutcome::Aborted),
            ReadOutcome::Completed(false) => return Ok(ReadOutcome::Completed(None)),
            ReadOutcome::Completed(true) => {},
        }

        let frame = buffer.split_to(FRAME_HEADER_SIZE + body_len);
        drop(buffer);
        let body = &frame[FRAME_HEADER_SIZE..];

        if crc32fast::hash(body) != header.checksum {
            return Err(PeerError::Protocol("Frame checksum mismatch".to_string()));
        }

        let parameters = header.parameters()?;
        let envelope = if header.encrypted() {
            let plaintext = self.ready_cipher()?.open(&header.associated_data(), body)?;
            decode_envelope(&plaintext)?
        } else {
            decode_envelope(body)?
        };

        tracing::debug!(
            kind = ?envelope.operation_kind(),
            bytes = body_len,
            encrypted = parameters.encrypted,
            "frame read"
        );
        Ok(ReadOutcome::Completed(Some(NetworkIncomingMessage {
            envelope,
            parameters,
        })))
    }

    async fn write_message(&self, message: OutgoingMessage) -> Result<()> {
        let OutgoingMessage {
            envelope,
            parameters,
        } = message;

        let mut header = FrameHeader {
            body_len: 0,
            flags: if parameters.encrypted { FLAG_ENCRYPTED } else { 0 },
            delivery: parameters.delivery_method.as_u8(),
            channel: parameters.channel,
            checksum: 0,
        };

        let mut body = encode_envelope(&envelope)?;
        if parameters.encrypted {
            body = self.ready_cipher()?.seal(&header.associated_data(), &body)?;
        }
        self.check_size(body.len())?;

        header.body_len = body.len() as u32;
        header.checksum = crc32fast::hash(&body);

        let mut frame = BytesMut::with_capacity(FRAME_HEADER_SIZE + body.len());
        header.write_to(&mut frame);
        frame.put_slice(&body);

        self.inner.write_all_async(&frame).await
    }
}
