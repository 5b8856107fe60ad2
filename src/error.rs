//! Peerwire error types.
//!
//! # Error Classification
//!
//! Errors are split by how a caller is expected to react:
//!
//! - **Fail fast**: invalid arguments, invalid serialization tags and
//!   crypto preconditions are reported at the call that introduced them.
//! - **Values, not errors**: permission denials and dropped connections on
//!   the send path surface as [`SendResult`](crate::protocol::SendResult),
//!   and cancelled reads surface as
//!   [`ReadOutcome::Aborted`](crate::transport::ReadOutcome), so a session
//!   loop keeps running after one failed operation.
//!
//! The `Crypto` variant preserves the full error chain via `#[source]`.

use thiserror::Error;

use crate::crypto::CryptoError;

/// Peerwire errors.
#[derive(Error, Debug)]
pub enum PeerError {
    /// A required argument was absent or malformed.
    #[error("Invalid argument `{name}`: {reason}")]
    InvalidArgument {
        /// Name of the offending argument.
        name: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// Serialization tag outside the valid index range.
    #[error("Invalid serialization tag {tag}: must be within 1..={max}")]
    InvalidTag {
        /// The rejected tag.
        tag: i64,
        /// Largest accepted tag.
        max: u32,
    },

    /// Serialization tag already registered for the same type.
    #[error("Tag {tag} already registered on `{type_name}`")]
    DuplicateTag {
        /// Type the tag was registered on.
        type_name: String,
        /// The duplicated tag.
        tag: u32,
    },

    /// Operation requires a connected transport.
    #[error("Not connected")]
    NotConnected,

    /// Encrypted operation attempted before both crypto halves were keyed.
    #[error("Crypto pairing not initialized")]
    CryptoNotInitialized,

    /// Cryptographic operation failed.
    #[error("Crypto error: {0}")]
    Crypto(#[source] CryptoError),

    /// Malformed or unexpected wire data.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Frame body exceeds the configured limit.
    #[error("Frame of {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge {
        /// Declared body size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A blocking transport call was made from inside an async runtime.
    #[error("Blocking call made from within an async context")]
    BlockingInAsyncContext,

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for peerwire operations
pub type Result<T> = std::result::Result<T, PeerError>;

impl PeerError {
    /// Build an [`PeerError::InvalidArgument`].
    pub fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        PeerError::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    /// Shorthand for an absent required argument.
    pub fn missing(name: &'static str) -> Self {
        Self::invalid_argument(name, "argument is absent")
    }

    /// True for errors that indicate a caller bug rather than a runtime failure.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            PeerError::InvalidArgument { .. }
                | PeerError::InvalidTag { .. }
                | PeerError::DuplicateTag { .. }
        )
    }
}

impl PeerError {
    /// True for read failures confined to one message.
    ///
    /// The offending frame has already been consumed, so the stream is
    /// still aligned on a frame boundary and the next read can proceed.
    /// I/O errors, disconnects and oversized frames leave the stream in an
    /// unknown position and are not message-scoped.
    pub fn is_message_scoped(&self) -> bool {
        matches!(
            self,
            PeerError::InvalidArgument { .. }
                | PeerError::Protocol(_)
                | PeerError::Json(_)
                | PeerError::Crypto(_)
                | PeerError::CryptoNotInitialized
        )
    }
}

impl From<CryptoError> for PeerError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::NotKeyed => PeerError::CryptoNotInitialized,
            other => PeerError::Crypto(other),
        }
    }
}

impl From<toml::de::Error> for PeerError {
    fn from(err: toml::de::Error) -> Self {
        PeerError::Config(format!("Failed to parse config: {err}"))
    }
}
