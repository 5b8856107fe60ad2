//! ChaCha20-Poly1305 crypto pairing.
//!
//! Sealed format: `nonce (12) || ciphertext || tag (16)`. Nonces are fresh
//! random 96-bit values per seal, so no counter state has to survive a
//! reconnect.

use std::sync::{Mutex, PoisonError, RwLock};

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::RngCore;

use super::{
    CryptoError, CryptoKeyInitializable, FullCryptoInitializationService, KeyMaterial,
    PayloadCipher, AEAD_TAG_SIZE, MIN_KEY_SIZE, NONCE_SIZE,
};

/// One direction of an AEAD pairing.
#[derive(Default)]
pub struct AeadHandle {
    cipher: RwLock<Option<ChaCha20Poly1305>>,
}

impl AeadHandle {
    /// Create an unkeyed handle.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_cipher<T>(
        &self,
        f: impl FnOnce(&ChaCha20Poly1305) -> Result<T, CryptoError>,
    ) -> Result<T, CryptoError> {
        let guard = self.cipher.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(cipher) => f(cipher),
            None => Err(CryptoError::NotKeyed),
        }
    }

    /// Encrypt with a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);

        self.with_cipher(|cipher| {
            let ciphertext = cipher
                .encrypt(
                    Nonce::from_slice(&nonce),
                    Payload {
                        msg: plaintext,
                        aad: associated_data,
                    },
                )
                .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

            let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
            sealed.extend_from_slice(&nonce);
            sealed.extend_from_slice(&ciphertext);
            Ok(sealed)
        })
    }

    /// Decrypt `nonce || ciphertext || tag`.
    pub fn decrypt(&self, sealed: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < NONCE_SIZE + AEAD_TAG_SIZE {
            return Err(CryptoError::DataTooShort);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);

        self.with_cipher(|cipher| {
            cipher
                .decrypt(
                    Nonce::from_slice(nonce),
                    Payload {
                        msg: ciphertext,
                        aad: associated_data,
                    },
                )
                .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
        })
    }
}

impl CryptoKeyInitializable<KeyMaterial> for AeadHandle {
    fn initialize(&self, key: &KeyMaterial) -> Result<(), CryptoError> {
        if key.len() < MIN_KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "Key too short: {} bytes (need {})",
                key.len(),
                MIN_KEY_SIZE
            )));
        }

        let cipher = ChaCha20Poly1305::new_from_slice(&key.as_bytes()[..MIN_KEY_SIZE])
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

        *self.cipher.write().unwrap_or_else(PoisonError::into_inner) = Some(cipher);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.cipher
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn reset(&self) {
        *self.cipher.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Encryption and decryption handles keyed from the same [`KeyMaterial`].
#[derive(Default)]
pub struct AeadCryptoPairing {
    encryption: AeadHandle,
    decryption: AeadHandle,
    /// Serializes `initialize_pair` so two callers cannot interleave halves.
    init_gate: Mutex<()>,
}

impl AeadCryptoPairing {
    /// Create an unkeyed pairing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pairing keyed from `key`.
    pub fn keyed(key: &KeyMaterial) -> Result<Self, CryptoError> {
        let pairing = Self::new();
        pairing.initialize_pair(key)?;
        Ok(pairing)
    }
}

impl FullCryptoInitializationService<KeyMaterial> for AeadCryptoPairing {
    fn encryption_initializable(&self) -> &dyn CryptoKeyInitializable<KeyMaterial> {
        &self.encryption
    }

    fn decryption_initializable(&self) -> &dyn CryptoKeyInitializable<KeyMaterial> {
        &self.decryption
    }

    fn initialize_pair(&self, key: &KeyMaterial) -> Result<(), CryptoError> {
        let _gate = self.init_gate.lock().unwrap_or_else(PoisonError::into_inner);

        self.encryption.initialize(key)?;
        if let Err(err) = self.decryption.initialize(key) {
            self.encryption.reset();
            self.decryption.reset();
            return Err(err);
        }
        tracing::debug!("crypto pairing keyed");
        Ok(())
    }
}

impl PayloadCipher for AeadCryptoPairing {
    fn is_ready(&self) -> bool {
        self.is_keyed()
    }

    fn seal(&self, associated_data: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.encryption.encrypt(plaintext, associated_data)
    }

    fn open(&self, associated_data: &[u8], sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.decryption.decrypt(sealed, associated_data)
    }
}

impl std::fmt::Debug for AeadCryptoPairing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AeadCryptoPairing")
            .field("encryption_keyed", &self.encryption.is_initialized())
            .field("decryption_keyed", &self.decryption.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> KeyMaterial {
        KeyMaterial::new(vec![0x42u8; 32])
    }

    #[test]
    fn test_pairing_seal_open() {
        let pairing = AeadCryptoPairing::keyed(&test_key()).unwrap();
        assert!(pairing.is_ready());

        let sealed = pairing.seal(b"header", b"Hello, World!").unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + 13 + AEAD_TAG_SIZE);

        let opened = pairing.open(b"header", &sealed).unwrap();
        assert_eq!(opened, b"Hello, World!");
    }

    #[test]
    fn test_unkeyed_pairing_refuses_to_seal() {
        let pairing = AeadCryptoPairing::new();
        assert!(!pairing.is_ready());
        assert!(matches!(
            pairing.seal(b"", b"data"),
            Err(CryptoError::NotKeyed)
        ));
    }

    #[test]
    fn test_short_key_leaves_pairing_unkeyed() {
        let pairing = AeadCryptoPairing::new();
        let result = pairing.initialize_pair(&KeyMaterial::new(vec![0u8; 16]));

        assert!(matches!(result, Err(CryptoError::InvalidKey(_))));
        assert!(!pairing.encryption_initializable().is_initialized());
        assert!(!pairing.decryption_initializable().is_initialized());
    }

    #[test]
    fn test_refused_rekey_keeps_both_halves_on_old_key() {
        let pairing = AeadCryptoPairing::keyed(&test_key()).unwrap();
        let sealed = pairing.seal(b"", b"before").unwrap();

        assert!(pairing
            .initialize_pair(&KeyMaterial::new(vec![3u8; 8]))
            .is_err());
        assert!(pairing.encryption_initializable().is_initialized());
        assert!(pairing.decryption_initializable().is_initialized());
        assert_eq!(pairing.open(b"", &sealed).unwrap(), b"before");
    }

    #[test]
    fn test_tamper_detection() {
        let pairing = AeadCryptoPairing::keyed(&test_key()).unwrap();
        let mut sealed = pairing.seal(b"aad", b"payload").unwrap();
        sealed[NONCE_SIZE + 1] ^= 0xFF;

        assert!(matches!(
            pairing.open(b"aad", &sealed),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_wrong_associated_data() {
        let pairing = AeadCryptoPairing::keyed(&test_key()).unwrap();
        let sealed = pairing.seal(b"correct aad", b"payload").unwrap();
        assert!(pairing.open(b"wrong aad", &sealed).is_err());
    }

    #[test]
    fn test_mismatched_keys_cannot_open() {
        let sender = AeadCryptoPairing::keyed(&KeyMaterial::new(vec![1u8; 32])).unwrap();
        let receiver = AeadCryptoPairing::keyed(&KeyMaterial::new(vec![2u8; 32])).unwrap();

        let sealed = sender.seal(b"", b"payload").unwrap();
        assert!(receiver.open(b"", &sealed).is_err());
    }

    #[test]
    fn test_data_too_short() {
        let pairing = AeadCryptoPairing::keyed(&test_key()).unwrap();
        assert!(matches!(
            pairing.open(b"", &[0u8; 10]),
            Err(CryptoError::DataTooShort)
        ));
    }

    #[test]
    fn test_random_nonces_differ() {
        let pairing = AeadCryptoPairing::keyed(&test_key()).unwrap();
        let first = pairing.seal(b"", b"same").unwrap();
        let second = pairing.seal(b"", b"same").unwrap();
        assert_ne!(first, second);
    }
}
