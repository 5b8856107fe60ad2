//! Peer sessions.
//!
//! A [`PeerSession`] is one end of a logical connection. Its [`PeerRole`]
//! decides which envelope kinds it may send; the transport's
//! [`NetworkMessageSendService`] decides which kinds the connection can
//! carry right now. A send is permitted only when both agree, and the check
//! runs again on every attempt.
//!
//! # Roles
//!
//! | Role            | May send                    | Routes inbound requests |
//! |-----------------|-----------------------------|-------------------------|
//! | `Peer(kinds)`   | the kinds it was built with | no                      |
//! | `ClientSession` | `Response`, `Event`         | yes                     |
//! | `ServerSession` | `Response`, `Event`         | yes                     |
//!
//! # Data Flow
//!
//! ```text
//!  transport ─► decorator ─► drive_session ─► PeerSession::receive
//!                                                   │ dispatch
//!                                                   ▼
//!                                          SubscriptionTable
//!                                                   │ Request
//!                                                   ▼
//!                                   RequestHandler::on_receive_request
//!                                                   │ send_response
//!                                                   ▼
//!                   run_writer ◄─ QueuedSendService ◄─ SessionSender
//! ```

mod driver;
mod peer;
mod send_service;
mod sender;
mod subscription;

pub use driver::{drive_session, drive_session_with};
pub use peer::{PeerSession, RequestHandler};
pub use send_service::{run_writer, PeerPayloadSendService, QueuedSendService};
pub use sender::SessionSender;
pub use subscription::{EnvelopeHandler, SubscriptionTable};

use crate::error::Result;
use crate::protocol::{MessageParameters, OperationKind, OperationKinds, Payload, SendResult};

/// What a session is allowed to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    /// Generic peer with a capability set chosen at construction
    Peer(OperationKinds),
    /// Server-side view of a connected client
    ClientSession,
    /// Session with a remote server
    ServerSession,
}

impl PeerRole {
    /// Kinds the role itself allows.
    pub fn permitted_kinds(self) -> OperationKinds {
        match self {
            PeerRole::Peer(kinds) => kinds,
            PeerRole::ClientSession | PeerRole::ServerSession => {
                OperationKinds::RESPONSES_AND_EVENTS
            },
        }
    }

    /// Role-level permission for `kind`.
    pub fn permits(self, kind: OperationKind) -> bool {
        self.permitted_kinds().contains(kind)
    }

    /// Whether sessions of this role route inbound requests to a handler.
    pub fn handles_requests(self) -> bool {
        matches!(self, PeerRole::ClientSession | PeerRole::ServerSession)
    }
}

/// Transport-level send service used by sessions.
pub trait NetworkMessageSendService: Send + Sync {
    /// Whether the transport can carry `kind` right now.
    fn can_send(&self, kind: OperationKind) -> bool;

    /// Wrap `payload` as `kind` and send it.
    ///
    /// Permission and connection failures are reported in the
    /// [`SendResult`]; only precondition violations are errors.
    fn try_send_message(
        &self,
        kind: OperationKind,
        payload: Payload,
        parameters: MessageParameters,
    ) -> Result<SendResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_roles_never_send_requests() {
        for role in [PeerRole::ClientSession, PeerRole::ServerSession] {
            assert!(!role.permits(OperationKind::Request));
            assert!(role.permits(OperationKind::Response));
            assert!(role.permits(OperationKind::Event));
            assert!(role.handles_requests());
        }
    }

    #[test]
    fn test_generic_peer_uses_its_capabilities() {
        let role = PeerRole::Peer(OperationKinds::REQUESTS);
        assert!(role.permits(OperationKind::Request));
        assert!(!role.permits(OperationKind::Event));
        assert!(!role.handles_requests());
    }
}
