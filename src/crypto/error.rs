//! Cryptographic error type.

use thiserror::Error;

/// Errors from crypto pairing and cipher operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key material rejected by a handle.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// A cipher handle was used before it was keyed.
    #[error("Cipher handle not keyed")]
    NotKeyed,

    /// Encryption failed.
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed (auth tag mismatch or corrupted data)
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Sealed data shorter than nonce + tag.
    #[error("Ciphertext too short")]
    DataTooShort,
}
