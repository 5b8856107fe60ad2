//! Envelope protocol: payloads, envelopes and the values that travel with them.
//!
//! # Envelope Kinds
//!
//! | Kind       | Typical direction | Purpose                                |
//! |------------|-------------------|----------------------------------------|
//! | `Request`  | Client → Server   | Ask the remote peer to do something    |
//! | `Response` | Server → Client   | Answer a request, with a response code |
//! | `Event`    | Either            | Unsolicited notification               |
//!
//! The kind of an envelope is fixed by its variant and is what the session
//! permission matrix is evaluated against.
//!
//! # Usage
//!
//! ```rust,ignore
//! use peerwire::protocol::{Envelope, Payload, ResponseParameters};
//!
//! let ping = Payload::new("Ping").with_field("seq", 1);
//! let envelope = Envelope::create(ping, ResponseParameters::new(0))?;
//! assert_eq!(envelope.operation_kind(), OperationKind::Response);
//! ```

mod message;
mod payload;

use serde::{Deserialize, Serialize};

pub use message::{
    Envelope, EnvelopeParameters, EnvelopeReceiver, EventMessage, EventParameters,
    RequestMessage, RequestParameters, ResponseMessage, ResponseParameters,
};
pub use payload::{Payload, PayloadSnapshot};

/// Category of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    /// Request for the remote peer
    Request,
    /// Answer to a request
    Response,
    /// Unsolicited notification
    Event,
}

impl OperationKind {
    /// Every kind, in wire order.
    pub const ALL: [OperationKind; 3] = [
        OperationKind::Request,
        OperationKind::Response,
        OperationKind::Event,
    ];

    const fn bit(self) -> u8 {
        match self {
            OperationKind::Request => 0b001,
            OperationKind::Response => 0b010,
            OperationKind::Event => 0b100,
        }
    }
}

/// Small set of operation kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct OperationKinds(u8);

impl OperationKinds {
    /// No kinds.
    pub const NONE: Self = Self(0);
    /// Every kind.
    pub const ALL: Self = Self(0b111);
    /// What sessions facing remote clients may send.
    pub const RESPONSES_AND_EVENTS: Self = Self(0b110);
    /// Only requests.
    pub const REQUESTS: Self = Self(0b001);

    /// Set containing exactly `kinds`.
    pub fn of(kinds: &[OperationKind]) -> Self {
        kinds.iter().fold(Self::NONE, |set, kind| set.with(*kind))
    }

    /// Set with `kind` added.
    pub const fn with(self, kind: OperationKind) -> Self {
        Self(self.0 | kind.bit())
    }

    /// Set with `kind` removed.
    pub const fn without(self, kind: OperationKind) -> Self {
        Self(self.0 & !kind.bit())
    }

    /// Membership test.
    pub const fn contains(self, kind: OperationKind) -> bool {
        self.0 & kind.bit() != 0
    }
}

/// Reliability and ordering mode for a send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum DeliveryMethod {
    /// Fire and forget; may be lost, duplicated or reordered
    Unreliable = 0,
    /// May be lost; late arrivals dropped
    UnreliableSequenced = 1,
    /// Guaranteed delivery, any order
    ReliableUnordered = 2,
    /// Guaranteed delivery of the latest message per channel
    ReliableSequenced = 3,
    /// Guaranteed, in-order delivery
    #[default]
    ReliableOrdered = 4,
}

impl DeliveryMethod {
    /// Whether the method guarantees delivery.
    pub fn is_reliable(self) -> bool {
        matches!(
            self,
            Self::ReliableUnordered | Self::ReliableSequenced | Self::ReliableOrdered
        )
    }

    /// Wire byte for the method.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse the wire byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unreliable),
            1 => Some(Self::UnreliableSequenced),
            2 => Some(Self::ReliableUnordered),
            3 => Some(Self::ReliableSequenced),
            4 => Some(Self::ReliableOrdered),
            _ => None,
        }
    }
}

/// How an envelope was (or is to be) sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageParameters {
    /// Reliability/ordering mode
    pub delivery_method: DeliveryMethod,
    /// Whether the payload is encrypted in transit
    pub encrypted: bool,
    /// Logical channel
    pub channel: u8,
}

impl MessageParameters {
    /// Parameters with a delivery method, unencrypted on channel 0.
    pub fn new(delivery_method: DeliveryMethod) -> Self {
        Self {
            delivery_method,
            encrypted: false,
            channel: 0,
        }
    }

    /// Set the encryption flag.
    pub fn with_encryption(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    /// Set the channel.
    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }
}

/// Outcome of a send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
    /// Written to the transport
    Sent,
    /// Accepted onto the outbound queue
    Enqueued,
    /// The connection is gone
    FailedNotConnected,
    /// The payload could not be encoded
    SerializationFailed,
    /// The role or transport does not permit this kind
    PermissionDenied,
}

impl SendResult {
    /// True for `Sent` and `Enqueued`.
    pub fn is_success(self) -> bool {
        matches!(self, SendResult::Sent | SendResult::Enqueued)
    }
}

/// Payload types that carry their own send parameters.
pub trait StaticPayloadParameters {
    /// Delivery method used for every send of this type.
    const DELIVERY_METHOD: DeliveryMethod;
    /// Whether sends of this type are encrypted.
    const ENCRYPT: bool = false;
    /// Channel used for every send of this type.
    const CHANNEL: u8 = 0;

    /// The baked-in parameters.
    fn message_parameters() -> MessageParameters {
        MessageParameters {
            delivery_method: Self::DELIVERY_METHOD,
            encrypted: Self::ENCRYPT,
            channel: Self::CHANNEL,
        }
    }
}
