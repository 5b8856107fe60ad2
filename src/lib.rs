//! # Peerwire - Peer Session Protocol Engine
//!
//! Typed envelopes, role-gated sends and buffer-safe transports for
//! client/server applications built on stream or datagram connections.
//!
//! ## Features
//!
//! - **Typed envelopes**: Request, Response and Event variants with a fixed
//!   operation kind, built through one factory and dispatched through one
//!   receiver entry point
//! - **Role-gated sessions**: a session may send a kind only when its role
//!   and its transport both allow it, checked on every send
//! - **Request routing**: inbound requests reach an application hook through
//!   the session's subscription table
//! - **Sync/async transports**: implement the async primitives once, get
//!   blocking forms, timeouts and cancellation for free
//! - **Buffer-safe reads**: a decorator serializes read-side operations and
//!   clears buffers after every message
//! - **Crypto pairing**: encryption and decryption halves keyed together
//!   (ChaCha20-Poly1305 with the `crypto` feature)
//!
//! ## Architecture
//!
//! ```text
//!  Remote peer                                         Application
//!      │                                                    ▲
//!      ▼                                                    │ on_receive_request
//!  TcpNetworkClient ─► FramedMessageClient ─► Decorator ─► PeerSession
//!      ▲                                                    │ send_response
//!      │                                                    ▼
//!      └──────────────── run_writer ◄──────────── QueuedSendService
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use peerwire::prelude::*;
//!
//! let tcp = TcpNetworkClient::from_stream(stream).await?;
//! let details = tcp.connection_details().ok_or(PeerError::NotConnected)?;
//! let client = Arc::new(ClearBuffersAfterReadDecorator::new(FramedMessageClient::new(tcp))?);
//!
//! let (service, outbound) = QueuedSendService::new(OperationKinds::RESPONSES_AND_EVENTS);
//! let handler = |sender: &SessionSender, request: &RequestMessage, _: &MessageParameters| {
//!     if request.payload().is("Ping") {
//!         let _ = sender.send_response(Payload::new("Pong"), DeliveryMethod::ReliableOrdered);
//!     }
//! };
//! let session = PeerSession::client(Arc::new(handler), Arc::new(service), details);
//!
//! let token = CancellationToken::new();
//! tokio::spawn(run_writer(Arc::clone(&client), outbound, token.clone()));
//! drive_session(&session, &*client, &token).await?;
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: Payloads, envelopes, message parameters
//! - [`session`]: Peer sessions, send services, read loop
//! - [`transport`]: Transport contract, framing, decorator, TCP
//! - [`serialization`]: Field/include tags and the envelope codec
//! - [`crypto`]: Crypto initialization pairing
//! - [`config`]: Configuration management
//! - [`logging`]: Tracing subscriber setup
//! - [`error`]: Error types and result aliases

pub mod config;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod serialization;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use config::Config;
pub use error::{PeerError, Result};
pub use protocol::{
    DeliveryMethod, Envelope, MessageParameters, OperationKind, OperationKinds, Payload,
    SendResult,
};
pub use session::{PeerRole, PeerSession, SessionSender};
pub use transport::{NetworkClient, NetworkMessageClient, ReadOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports for applications.
pub mod prelude {
    pub use tokio_util::sync::CancellationToken;

    pub use crate::error::{PeerError, Result};
    pub use crate::protocol::{
        DeliveryMethod, Envelope, EnvelopeReceiver, MessageParameters, OperationKind,
        OperationKinds, Payload, RequestMessage, SendResult, StaticPayloadParameters,
    };
    pub use crate::session::{
        drive_session, drive_session_with, run_writer, NetworkMessageSendService,
        PeerPayloadSendService, PeerRole, PeerSession, QueuedSendService, RequestHandler,
        SessionSender,
    };
    pub use crate::transport::{
        ClearBuffersAfterReadDecorator, ConnectionDetails, FramedMessageClient, NetworkClient,
        NetworkMessageClient, ReadOutcome, TcpNetworkClient,
    };
}
