//! Read loop feeding a session.

use tokio_util::sync::CancellationToken;

use super::PeerSession;
use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::transport::{NetworkMessageClient, ReadOutcome};

/// Read messages from `client` and dispatch them into `session`.
///
/// Reads wait indefinitely; see [`drive_session_with`] for an idle timeout.
pub async fn drive_session<C>(
    session: &PeerSession,
    client: &C,
    token: &CancellationToken,
) -> Result<()>
where
    C: NetworkMessageClient + ?Sized,
{
    drive_session_with(session, client, token, &ConnectionConfig::default()).await
}

/// Read messages from `client` and dispatch them into `session`.
///
/// Returns `Ok(())` when the peer disconnects or `token` fires. When no
/// message arrives within `config.read_timeout()` the client is
/// disconnected after `config.disconnect_delay()` and the loop ends.
///
/// A failure confined to one message (bad checksum, undecodable body,
/// refused ciphertext) is logged and skipped, as is a dispatch failure.
/// Any other read error ends the loop with that error.
pub async fn drive_session_with<C>(
    session: &PeerSession,
    client: &C,
    token: &CancellationToken,
    config: &ConnectionConfig,
) -> Result<()>
where
    C: NetworkMessageClient + ?Sized,
{
    let connection_id = session.details().connection_id;
    let read_timeout = config.read_timeout();
    loop {
        let outcome = match client.read_message_within(token, read_timeout).await {
            Ok(outcome) => outcome,
            Err(err) if err.is_message_scoped() => {
                tracing::warn!(%connection_id, error = %err, "skipping malformed message");
                continue;
            },
            Err(err) => return Err(err),
        };

        match outcome {
            ReadOutcome::Aborted if token.is_cancelled() => {
                tracing::debug!(%connection_id, "session read loop cancelled");
                return Ok(());
            },
            ReadOutcome::Aborted => {
                tracing::info!(%connection_id, ?read_timeout, "peer idle, disconnecting");
                client.disconnect_async(config.disconnect_delay()).await?;
                return Ok(());
            },
            ReadOutcome::Completed(None) => {
                tracing::info!(%connection_id, "peer disconnected");
                return Ok(());
            },
            ReadOutcome::Completed(Some(message)) => {
                if let Err(err) = session.receive(&message.envelope, &message.parameters) {
                    tracing::debug!(%connection_id, error = %err, "dispatch failed");
                }
            },
        }
    }
}
