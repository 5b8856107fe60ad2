//! Queue-backed send service and its writer task.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::NetworkMessageSendService;
use crate::crypto::PayloadCipher;
use crate::error::{PeerError, Result};
use crate::protocol::{
    DeliveryMethod, Envelope, EnvelopeParameters, MessageParameters, OperationKind,
    OperationKinds, Payload, SendResult,
};
use crate::transport::{NetworkMessageClient, OutgoingMessage};

/// Peer-facing send contract.
#[async_trait]
pub trait PeerPayloadSendService: Send + Sync {
    /// Send `payload` with `method`.
    async fn send_message(&self, payload: Payload, method: DeliveryMethod) -> SendResult;
}

/// Builds envelopes and queues them for [`run_writer`].
pub struct QueuedSendService {
    permitted: OperationKinds,
    queue: mpsc::UnboundedSender<OutgoingMessage>,
    cipher: Option<Arc<dyn PayloadCipher>>,
}

impl QueuedSendService {
    /// Service permitting `permitted`, plus the receiving end of its queue.
    pub fn new(permitted: OperationKinds) -> (Self, mpsc::UnboundedReceiver<OutgoingMessage>) {
        let (queue, outbound) = mpsc::unbounded_channel();
        (
            Self {
                permitted,
                queue,
                cipher: None,
            },
            outbound,
        )
    }

    /// Check encrypted sends against `cipher`.
    pub fn with_cipher(mut self, cipher: Arc<dyn PayloadCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Whether the writer end is still alive.
    pub fn is_open(&self) -> bool {
        !self.queue.is_closed()
    }

    fn cipher_ready(&self) -> bool {
        self.cipher.as_ref().is_some_and(|cipher| cipher.is_ready())
    }
}

impl NetworkMessageSendService for QueuedSendService {
    fn can_send(&self, kind: OperationKind) -> bool {
        self.permitted.contains(kind) && self.is_open()
    }

    fn try_send_message(
        &self,
        kind: OperationKind,
        payload: Payload,
        parameters: MessageParameters,
    ) -> Result<SendResult> {
        if !self.permitted.contains(kind) {
            tracing::debug!(?kind, "kind not permitted on this transport");
            return Ok(SendResult::PermissionDenied);
        }
        if parameters.encrypted && !self.cipher_ready() {
            return Err(PeerError::CryptoNotInitialized);
        }

        let envelope = Envelope::create(payload, EnvelopeParameters::for_kind(kind))?;
        match self.queue.send(OutgoingMessage {
            envelope,
            parameters,
        }) {
            Ok(()) => Ok(SendResult::Enqueued),
            Err(_) => {
                tracing::warn!(?kind, "outbound queue closed");
                Ok(SendResult::FailedNotConnected)
            },
        }
    }
}

#[async_trait]
impl PeerPayloadSendService for QueuedSendService {
    async fn send_message(&self, payload: Payload, method: DeliveryMethod) -> SendResult {
        match self.try_send_message(
            OperationKind::Request,
            payload,
            MessageParameters::new(method),
        ) {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(error = %err, "request could not be queued");
                SendResult::SerializationFailed
            },
        }
    }
}

impl fmt::Debug for QueuedSendService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedSendService")
            .field("permitted", &self.permitted)
            .field("open", &self.is_open())
            .field("cipher_ready", &self.cipher_ready())
            .finish()
    }
}

/// Drain `outbound` into `client` until `token` fires or the queue closes.
///
/// A write failure is logged and ends the writer with that error.
pub async fn run_writer<C>(
    client: Arc<C>,
    mut outbound: mpsc::UnboundedReceiver<OutgoingMessage>,
    token: CancellationToken,
) -> Result<()>
where
    C: NetworkMessageClient + ?Sized,
{
    loop {
        let message = tokio::select! {
            biased;
            () = token.cancelled() => break,
            next = outbound.recv() => match next {
                Some(message) => message,
                None => break,
            },
        };

        let kind = message.envelope.operation_kind();
        if let Err(err) = client.write_message(message).await {
            tracing::warn!(?kind, error = %err, "write failed, stopping writer");
            return Err(err);
        }
    }
    tracing::debug!("writer stopped");
    Ok(())
}
