//! The session type.

use std::sync::Arc;

use super::{NetworkMessageSendService, PeerRole, SessionSender, SubscriptionTable};
use crate::config::SendConfig;
use crate::error::Result;
use crate::protocol::{
    DeliveryMethod, Envelope, MessageParameters, OperationKind, OperationKinds, Payload,
    RequestMessage, SendResult, StaticPayloadParameters,
};
use crate::transport::ConnectionDetails;

/// Application hook for inbound requests.
pub trait RequestHandler: Send + Sync {
    /// Called once for each request routed to the session.
    fn on_receive_request(
        &self,
        sender: &SessionSender,
        request: &RequestMessage,
        parameters: &MessageParameters,
    );
}

impl<F> RequestHandler for F
where
    F: Fn(&SessionSender, &RequestMessage, &MessageParameters) + Send + Sync,
{
    fn on_receive_request(
        &self,
        sender: &SessionSender,
        request: &RequestMessage,
        parameters: &MessageParameters,
    ) {
        self(sender, request, parameters);
    }
}

/// One end of a logical connection.
///
/// Owns exactly one subscription table and sends through exactly one
/// transport send service.
#[derive(Debug)]
pub struct PeerSession {
    sender: SessionSender,
    subscriptions: SubscriptionTable,
}

impl PeerSession {
    /// Generic peer permitted to send `kinds`.
    pub fn peer(
        kinds: OperationKinds,
        service: Arc<dyn NetworkMessageSendService>,
        details: ConnectionDetails,
    ) -> Self {
        Self {
            sender: SessionSender::new(PeerRole::Peer(kinds), Arc::new(details), service),
            subscriptions: SubscriptionTable::new(),
        }
    }

    /// Server-side session for a connected client.
    pub fn client<H>(
        handler: Arc<H>,
        service: Arc<dyn NetworkMessageSendService>,
        details: ConnectionDetails,
    ) -> Self
    where
        H: RequestHandler + 'static,
    {
        Self::with_request_handler(PeerRole::ClientSession, handler, service, details)
    }

    /// Session with a remote server.
    pub fn server<H>(
        handler: Arc<H>,
        service: Arc<dyn NetworkMessageSendService>,
        details: ConnectionDetails,
    ) -> Self
    where
        H: RequestHandler + 'static,
    {
        Self::with_request_handler(PeerRole::ServerSession, handler, service, details)
    }

    fn with_request_handler<H>(
        role: PeerRole,
        handler: Arc<H>,
        service: Arc<dyn NetworkMessageSendService>,
        details: ConnectionDetails,
    ) -> Self
    where
        H: RequestHandler + 'static,
    {
        let sender = SessionSender::new(role, Arc::new(details), service);
        let subscriptions = SubscriptionTable::new();

        let trampoline_sender = sender.clone();
        subscriptions.subscribe(OperationKind::Request, move |envelope, parameters| {
            if let Envelope::Request(request) = envelope {
                handler.on_receive_request(&trampoline_sender, request, parameters);
            }
        });

        Self {
            sender,
            subscriptions,
        }
    }

    /// Use `parameters` for [`send_response_default`](Self::send_response_default)
    /// and [`send_event_default`](Self::send_event_default).
    pub fn with_default_parameters(self, parameters: MessageParameters) -> Self {
        self.sender.set_defaults(parameters);
        self
    }

    /// Take default send parameters from the `[send]` config section.
    pub fn with_send_config(self, config: &SendConfig) -> Self {
        self.with_default_parameters(config.message_parameters())
    }

    /// The session's role.
    pub fn role(&self) -> PeerRole {
        self.sender.role()
    }

    /// Connection the session runs on.
    pub fn details(&self) -> &ConnectionDetails {
        self.sender.details()
    }

    /// Send handle, cloneable into tasks.
    pub fn sender(&self) -> &SessionSender {
        &self.sender
    }

    /// Subscription table for additional handlers.
    pub fn subscriptions(&self) -> &SubscriptionTable {
        &self.subscriptions
    }

    /// See [`SessionSender::can_send`].
    pub fn can_send(&self, kind: OperationKind) -> bool {
        self.sender.can_send(kind)
    }

    /// See [`SessionSender::send_response`].
    pub fn send_response(
        &self,
        payload: impl Into<Option<Payload>>,
        delivery_method: DeliveryMethod,
    ) -> Result<SendResult> {
        self.sender.send_response(payload, delivery_method)
    }

    /// See [`SessionSender::send_response_with`].
    pub fn send_response_with(
        &self,
        payload: impl Into<Option<Payload>>,
        delivery_method: DeliveryMethod,
        encrypt: bool,
        channel: u8,
    ) -> Result<SendResult> {
        self.sender
            .send_response_with(payload, delivery_method, encrypt, channel)
    }

    /// See [`SessionSender::send_event`].
    pub fn send_event(
        &self,
        payload: impl Into<Option<Payload>>,
        delivery_method: DeliveryMethod,
    ) -> Result<SendResult> {
        self.sender.send_event(payload, delivery_method)
    }

    /// See [`SessionSender::send_event_with`].
    pub fn send_event_with(
        &self,
        payload: impl Into<Option<Payload>>,
        delivery_method: DeliveryMethod,
        encrypt: bool,
        channel: u8,
    ) -> Result<SendResult> {
        self.sender
            .send_event_with(payload, delivery_method, encrypt, channel)
    }

    /// See [`SessionSender::send_response_default`].
    pub fn send_response_default(&self, payload: impl Into<Option<Payload>>) -> Result<SendResult> {
        self.sender.send_response_default(payload)
    }

    /// See [`SessionSender::send_event_default`].
    pub fn send_event_default(&self, payload: impl Into<Option<Payload>>) -> Result<SendResult> {
        self.sender.send_event_default(payload)
    }

    /// See [`SessionSender::send_response_static`].
    pub fn send_response_static<T>(&self, payload: T) -> Result<SendResult>
    where
        T: StaticPayloadParameters + Into<Payload>,
    {
        self.sender.send_response_static(payload)
    }

    /// See [`SessionSender::send_event_static`].
    pub fn send_event_static<T>(&self, payload: T) -> Result<SendResult>
    where
        T: StaticPayloadParameters + Into<Payload>,
    {
        self.sender.send_event_static(payload)
    }

    /// See [`SessionSender::send_request`].
    pub fn send_request(
        &self,
        payload: impl Into<Option<Payload>>,
        parameters: MessageParameters,
    ) -> Result<SendResult> {
        self.sender.send_request(payload, parameters)
    }

    /// Route an inbound envelope to the subscribed handlers.
    pub fn receive(&self, envelope: &Envelope, parameters: &MessageParameters) -> Result<()> {
        tracing::debug!(
            kind = ?envelope.operation_kind(),
            payload = envelope.payload().type_name(),
            "envelope received"
        );
        envelope.dispatch(Some(&self.subscriptions), Some(parameters))
    }
}
