//! Serializable envelope form.
//!
//! ```json
//! {"kind":"RESPONSE","response_code":2,"payload":{"type":"Pong","fields":{"seq":1}}}
//! ```
//!
//! Decoding goes through [`Envelope::create`], so a frame without a payload
//! is rejected the same way a local call without one would be.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::{
    Envelope, EnvelopeParameters, EventParameters, OperationKind, Payload, PayloadSnapshot,
    RequestParameters, ResponseParameters,
};

/// Wire form of an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeFrame {
    /// Envelope kind
    pub kind: OperationKind,
    /// Response code, responses only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_code: Option<u8>,
    /// Carried payload
    #[serde(default)]
    pub payload: Option<PayloadSnapshot>,
}

impl EnvelopeFrame {
    /// Capture an envelope.
    pub fn from_envelope(envelope: &Envelope) -> Self {
        Self {
            kind: envelope.operation_kind(),
            response_code: envelope.response_code(),
            payload: Some(envelope.payload().snapshot()),
        }
    }

    /// Rebuild the envelope.
    pub fn into_envelope(self) -> Result<Envelope> {
        let parameters: EnvelopeParameters = match self.kind {
            OperationKind::Request => RequestParameters.into(),
            OperationKind::Response => {
                ResponseParameters::new(self.response_code.unwrap_or_default()).into()
            },
            OperationKind::Event => EventParameters.into(),
        };
        Envelope::create(self.payload.map(Payload::from), parameters)
    }
}

/// Encode an envelope as JSON bytes.
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&EnvelopeFrame::from_envelope(envelope))?)
}

/// Decode JSON bytes into an envelope.
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope> {
    let frame: EnvelopeFrame = serde_json::from_slice(bytes)?;
    frame.into_envelope()
}
