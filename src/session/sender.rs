//! Role-aware send surface of a session.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use super::{NetworkMessageSendService, PeerRole};
use crate::error::{PeerError, Result};
use crate::protocol::{
    DeliveryMethod, MessageParameters, OperationKind, Payload, SendResult, StaticPayloadParameters,
};
use crate::transport::ConnectionDetails;

/// Send handle shared by a session and its request handler.
#[derive(Clone)]
pub struct SessionSender {
    role: PeerRole,
    details: Arc<ConnectionDetails>,
    service: Arc<dyn NetworkMessageSendService>,
    defaults: Arc<RwLock<MessageParameters>>,
}

impl SessionSender {
    pub(crate) fn new(
        role: PeerRole,
        details: Arc<ConnectionDetails>,
        service: Arc<dyn NetworkMessageSendService>,
    ) -> Self {
        Self {
            role,
            details,
            service,
            defaults: Arc::default(),
        }
    }

    /// Shared by every clone, including the one held by the request handler.
    pub(crate) fn set_defaults(&self, defaults: MessageParameters) {
        *self.defaults.write().unwrap_or_else(PoisonError::into_inner) = defaults;
    }

    /// Parameters used by [`send_response_default`](Self::send_response_default)
    /// and [`send_event_default`](Self::send_event_default).
    pub fn defaults(&self) -> MessageParameters {
        *self.defaults.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Role of the owning session.
    pub fn role(&self) -> PeerRole {
        self.role
    }

    /// Connection the session runs on.
    pub fn details(&self) -> &ConnectionDetails {
        &self.details
    }

    /// Role permission AND transport permission, evaluated now.
    pub fn can_send(&self, kind: OperationKind) -> bool {
        self.role.permits(kind) && self.service.can_send(kind)
    }

    /// Send a response, unencrypted on channel 0.
    pub fn send_response(
        &self,
        payload: impl Into<Option<Payload>>,
        delivery_method: DeliveryMethod,
    ) -> Result<SendResult> {
        self.send_response_with(payload, delivery_method, false, 0)
    }

    /// Send a response with explicit encryption and channel.
    pub fn send_response_with(
        &self,
        payload: impl Into<Option<Payload>>,
        delivery_method: DeliveryMethod,
        encrypt: bool,
        channel: u8,
    ) -> Result<SendResult> {
        self.deliver(
            OperationKind::Response,
            payload.into(),
            MessageParameters {
                delivery_method,
                encrypted: encrypt,
                channel,
            },
        )
    }

    /// Send an event, unencrypted on channel 0.
    pub fn send_event(
        &self,
        payload: impl Into<Option<Payload>>,
        delivery_method: DeliveryMethod,
    ) -> Result<SendResult> {
        self.send_event_with(payload, delivery_method, false, 0)
    }

    /// Send an event with explicit encryption and channel.
    pub fn send_event_with(
        &self,
        payload: impl Into<Option<Payload>>,
        delivery_method: DeliveryMethod,
        encrypt: bool,
        channel: u8,
    ) -> Result<SendResult> {
        self.deliver(
            OperationKind::Event,
            payload.into(),
            MessageParameters {
                delivery_method,
                encrypted: encrypt,
                channel,
            },
        )
    }

    /// Send a response with the session's default parameters.
    pub fn send_response_default(
        &self,
        payload: impl Into<Option<Payload>>,
    ) -> Result<SendResult> {
        self.deliver(OperationKind::Response, payload.into(), self.defaults())
    }

    /// Send an event with the session's default parameters.
    pub fn send_event_default(&self, payload: impl Into<Option<Payload>>) -> Result<SendResult> {
        self.deliver(OperationKind::Event, payload.into(), self.defaults())
    }

    /// Send a response using the parameters baked into `T`.
    pub fn send_response_static<T>(&self, payload: T) -> Result<SendResult>
    where
        T: StaticPayloadParameters + Into<Payload>,
    {
        self.deliver(
            OperationKind::Response,
            Some(payload.into()),
            T::message_parameters(),
        )
    }

    /// Send an event using the parameters baked into `T`.
    pub fn send_event_static<T>(&self, payload: T) -> Result<SendResult>
    where
        T: StaticPayloadParameters + Into<Payload>,
    {
        self.deliver(
            OperationKind::Event,
            Some(payload.into()),
            T::message_parameters(),
        )
    }

    /// Send a request.
    ///
    /// Unlike the response and event helpers this consults
    /// [`can_send`](Self::can_send) first, so session roles get
    /// `PermissionDenied` without touching the transport.
    pub fn send_request(
        &self,
        payload: impl Into<Option<Payload>>,
        parameters: MessageParameters,
    ) -> Result<SendResult> {
        let payload = payload.into().ok_or_else(|| PeerError::missing("payload"))?;
        if !self.can_send(OperationKind::Request) {
            tracing::debug!(role = ?self.role, "request send denied");
            return Ok(SendResult::PermissionDenied);
        }
        self.service
            .try_send_message(OperationKind::Request, payload, parameters)
    }

    fn deliver(
        &self,
        kind: OperationKind,
        payload: Option<Payload>,
        parameters: MessageParameters,
    ) -> Result<SendResult> {
        let payload = payload.ok_or_else(|| PeerError::missing("payload"))?;
        let result = self.service.try_send_message(kind, payload, parameters)?;
        if !result.is_success() {
            tracing::warn!(
                ?kind,
                ?result,
                connection_id = %self.details.connection_id,
                "send failed"
            );
        }
        Ok(result)
    }
}

impl fmt::Debug for SessionSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSender")
            .field("role", &self.role)
            .field("details", &self.details)
            .field("defaults", &self.defaults())
            .finish_non_exhaustive()
    }
}
