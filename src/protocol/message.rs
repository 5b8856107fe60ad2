//! Envelopes wrapping payloads for routing and permission checks.
//!
//! An envelope's operation kind is fixed by its variant. Envelopes are built
//! through [`Envelope::create`], which picks the variant from the auxiliary
//! parameters, and delivered to receivers through [`Envelope::dispatch`].

use std::sync::{Mutex, PoisonError};

use super::payload::Payload;
use super::{MessageParameters, OperationKind};
use crate::error::{PeerError, Result};

/// Receives envelopes of every kind through one entry point.
///
/// Implementations match on the [`Envelope`] variant themselves.
pub trait EnvelopeReceiver {
    /// Called once per dispatched envelope.
    fn on_envelope_received(&self, envelope: &Envelope, parameters: &MessageParameters);
}

/// Auxiliary parameters selecting a request envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestParameters;

/// Auxiliary parameters selecting a response envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseParameters {
    /// Application-defined response code.
    pub response_code: u8,
}

impl ResponseParameters {
    /// Response parameters with the given code.
    pub fn new(response_code: u8) -> Self {
        Self { response_code }
    }
}

/// Auxiliary parameters selecting an event envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventParameters;

/// Auxiliary parameters for [`Envelope::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeParameters {
    /// Build a request
    Request(RequestParameters),
    /// Build a response
    Response(ResponseParameters),
    /// Build an event
    Event(EventParameters),
}

impl EnvelopeParameters {
    /// Default parameters for a kind (response code 0 for responses).
    pub fn for_kind(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Request => Self::Request(RequestParameters),
            OperationKind::Response => Self::Response(ResponseParameters::default()),
            OperationKind::Event => Self::Event(EventParameters),
        }
    }

    /// Kind of envelope these parameters select.
    pub fn operation_kind(&self) -> OperationKind {
        match self {
            Self::Request(_) => OperationKind::Request,
            Self::Response(_) => OperationKind::Response,
            Self::Event(_) => OperationKind::Event,
        }
    }
}

impl From<RequestParameters> for EnvelopeParameters {
    fn from(params: RequestParameters) -> Self {
        Self::Request(params)
    }
}

impl From<ResponseParameters> for EnvelopeParameters {
    fn from(params: ResponseParameters) -> Self {
        Self::Response(params)
    }
}

impl From<EventParameters> for EnvelopeParameters {
    fn from(params: EventParameters) -> Self {
        Self::Event(params)
    }
}

impl From<RequestParameters> for Option<EnvelopeParameters> {
    fn from(params: RequestParameters) -> Self {
        Some(params.into())
    }
}

impl From<ResponseParameters> for Option<EnvelopeParameters> {
    fn from(params: ResponseParameters) -> Self {
        Some(params.into())
    }
}

impl From<EventParameters> for Option<EnvelopeParameters> {
    fn from(params: EventParameters) -> Self {
        Some(params.into())
    }
}

/// Payload plus the lock guarding deep clones.
#[derive(Debug)]
struct MessageCore {
    payload: Payload,
    clone_lock: Mutex<()>,
}

impl MessageCore {
    fn new(payload: Payload) -> Self {
        Self {
            payload,
            clone_lock: Mutex::new(()),
        }
    }

    /// Envelope lock first, then the payload lock inside `shallow_clone`.
    fn clone_payload(&self) -> Payload {
        let _guard = self.clone_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.payload.shallow_clone()
    }
}

/// Request from a remote peer asking for something to be done.
#[derive(Debug)]
pub struct RequestMessage {
    core: MessageCore,
}

impl RequestMessage {
    /// Operation kind of every request.
    pub const OPERATION_KIND: OperationKind = OperationKind::Request;

    fn new(payload: Payload) -> Self {
        Self {
            core: MessageCore::new(payload),
        }
    }

    /// The carried payload.
    pub fn payload(&self) -> &Payload {
        &self.core.payload
    }

    /// Copy with an independent payload.
    pub fn deep_clone(&self) -> Self {
        Self::new(self.core.clone_payload())
    }
}

/// Response to a previously received request.
#[derive(Debug)]
pub struct ResponseMessage {
    core: MessageCore,
    response_code: u8,
}

impl ResponseMessage {
    /// Operation kind of every response.
    pub const OPERATION_KIND: OperationKind = OperationKind::Response;

    fn new(payload: Payload, response_code: u8) -> Self {
        Self {
            core: MessageCore::new(payload),
            response_code,
        }
    }

    /// The carried payload.
    pub fn payload(&self) -> &Payload {
        &self.core.payload
    }

    /// Application-defined response code.
    pub fn response_code(&self) -> u8 {
        self.response_code
    }

    /// Copy with an independent payload.
    pub fn deep_clone(&self) -> Self {
        Self::new(self.core.clone_payload(), self.response_code)
    }
}

/// Unsolicited notification.
#[derive(Debug)]
pub struct EventMessage {
    core: MessageCore,
}

impl EventMessage {
    /// Operation kind of every event.
    pub const OPERATION_KIND: OperationKind = OperationKind::Event;

    fn new(payload: Payload) -> Self {
        Self {
            core: MessageCore::new(payload),
        }
    }

    /// The carried payload.
    pub fn payload(&self) -> &Payload {
        &self.core.payload
    }

    /// Copy with an independent payload.
    pub fn deep_clone(&self) -> Self {
        Self::new(self.core.clone_payload())
    }
}

/// A payload wrapped as a request, response or event.
#[derive(Debug)]
pub enum Envelope {
    /// Request envelope
    Request(RequestMessage),
    /// Response envelope
    Response(ResponseMessage),
    /// Event envelope
    Event(EventMessage),
}

impl Envelope {
    /// Build an envelope whose variant follows the auxiliary parameters.
    ///
    /// Fails with an invalid-argument error if either input is absent.
    pub fn create(
        payload: impl Into<Option<Payload>>,
        parameters: impl Into<Option<EnvelopeParameters>>,
    ) -> Result<Self> {
        let payload = payload.into().ok_or_else(|| PeerError::missing("payload"))?;
        let parameters = parameters
            .into()
            .ok_or_else(|| PeerError::missing("parameters"))?;

        Ok(match parameters {
            EnvelopeParameters::Request(_) => Envelope::Request(RequestMessage::new(payload)),
            EnvelopeParameters::Response(params) => {
                Envelope::Response(ResponseMessage::new(payload, params.response_code))
            },
            EnvelopeParameters::Event(_) => Envelope::Event(EventMessage::new(payload)),
        })
    }

    /// Request envelope.
    pub fn request(payload: Payload) -> Self {
        Envelope::Request(RequestMessage::new(payload))
    }

    /// Response envelope with a response code.
    pub fn response(payload: Payload, response_code: u8) -> Self {
        Envelope::Response(ResponseMessage::new(payload, response_code))
    }

    /// Event envelope.
    pub fn event(payload: Payload) -> Self {
        Envelope::Event(EventMessage::new(payload))
    }

    /// Kind fixed by the variant.
    pub fn operation_kind(&self) -> OperationKind {
        match self {
            Envelope::Request(_) => RequestMessage::OPERATION_KIND,
            Envelope::Response(_) => ResponseMessage::OPERATION_KIND,
            Envelope::Event(_) => EventMessage::OPERATION_KIND,
        }
    }

    /// The carried payload.
    pub fn payload(&self) -> &Payload {
        match self {
            Envelope::Request(msg) => msg.payload(),
            Envelope::Response(msg) => msg.payload(),
            Envelope::Event(msg) => msg.payload(),
        }
    }

    /// Response code for responses, `None` otherwise.
    pub fn response_code(&self) -> Option<u8> {
        match self {
            Envelope::Response(msg) => Some(msg.response_code()),
            _ => None,
        }
    }

    /// Deliver this envelope to `receiver`.
    ///
    /// Fails with an invalid-argument error if either input is absent.
    pub fn dispatch<R>(
        &self,
        receiver: Option<&R>,
        parameters: Option<&MessageParameters>,
    ) -> Result<()>
    where
        R: EnvelopeReceiver + ?Sized,
    {
        let receiver = receiver.ok_or_else(|| PeerError::missing("receiver"))?;
        let parameters = parameters.ok_or_else(|| PeerError::missing("parameters"))?;

        receiver.on_envelope_received(self, parameters);
        Ok(())
    }

    /// Same variant, independent payload copy.
    pub fn deep_clone(&self) -> Self {
        match self {
            Envelope::Request(msg) => Envelope::Request(msg.deep_clone()),
            Envelope::Response(msg) => Envelope::Response(msg.deep_clone()),
            Envelope::Event(msg) => Envelope::Event(msg.deep_clone()),
        }
    }
}
