//! Crypto initialization pairing.
//!
//! A transport that encrypts payloads needs two keyed handles: one that
//! seals outgoing frames and one that opens incoming frames. The pairing
//! contract exposes both handles separately, typed over the same key
//! material, and requires them to be keyed together:
//!
//! ```text
//!            KeyMaterial
//!                 │
//!        initialize_pair(&key)
//!          ┌──────┴──────┐
//!          ▼             ▼
//!   encryption half  decryption half
//!          │             │
//!     seal(frame)    open(frame)
//! ```
//!
//! Nothing derives one half from the other. If keying the second half fails
//! the first half is reset, so a pairing is either fully keyed or not keyed.
//!
//! Encrypted sends before the pairing is keyed are a precondition violation
//! and surface as [`PeerError::CryptoNotInitialized`](crate::PeerError).

mod error;
mod key;

#[cfg(feature = "crypto")]
mod aead;

pub use error::CryptoError;
pub use key::KeyMaterial;

#[cfg(feature = "crypto")]
pub use aead::{AeadCryptoPairing, AeadHandle};

/// Nonce size for ChaCha20-Poly1305 (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size for ChaCha20-Poly1305 (128 bits)
pub const AEAD_TAG_SIZE: usize = 16;

/// Minimum key size (256 bits)
pub const MIN_KEY_SIZE: usize = 32;

/// A handle that becomes usable once keyed with material of type `K`.
pub trait CryptoKeyInitializable<K: ?Sized>: Send + Sync {
    /// Key the handle. On error the handle keeps its previous state.
    fn initialize(&self, key: &K) -> Result<(), CryptoError>;

    /// Whether the handle has been keyed.
    fn is_initialized(&self) -> bool;

    /// Drop any key held by the handle.
    fn reset(&self);
}

/// A matched pair of encryption and decryption initializables.
pub trait FullCryptoInitializationService<K: ?Sized>: Send + Sync {
    /// The encryption initializable.
    fn encryption_initializable(&self) -> &dyn CryptoKeyInitializable<K>;

    /// The decryption initializable.
    fn decryption_initializable(&self) -> &dyn CryptoKeyInitializable<K>;

    /// Key both halves from the same material, or neither.
    ///
    /// If the first half refuses the key both halves keep their previous
    /// state. If the second half refuses it both halves are reset.
    fn initialize_pair(&self, key: &K) -> Result<(), CryptoError> {
        let encryption = self.encryption_initializable();
        let decryption = self.decryption_initializable();

        encryption.initialize(key)?;
        if let Err(err) = decryption.initialize(key) {
            // The decryption half may still hold an earlier key.
            encryption.reset();
            decryption.reset();
            return Err(err);
        }
        Ok(())
    }

    /// True only when both halves are keyed.
    fn is_keyed(&self) -> bool {
        self.encryption_initializable().is_initialized()
            && self.decryption_initializable().is_initialized()
    }
}

/// Seals and opens frame bodies for a transport.
pub trait PayloadCipher: Send + Sync {
    /// Whether both directions are ready.
    fn is_ready(&self) -> bool;

    /// Encrypt `plaintext`, binding `associated_data`.
    fn seal(&self, associated_data: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt `sealed`, verifying `associated_data`.
    fn open(&self, associated_data: &[u8], sealed: &[u8]) -> Result<Vec<u8>, CryptoError>;
}
