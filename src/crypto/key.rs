//! Key material shared by both halves of a crypto pairing.

use std::fmt;

/// Key material (secret bytes)
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    bytes: Vec<u8>,
}

impl KeyMaterial {
    /// Create new key material from bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Generate random key material of `len` bytes.
    #[cfg(feature = "crypto")]
    pub fn random(len: usize) -> Self {
        use rand::RngCore;

        let mut bytes = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::new(bytes)
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Get the key length
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the key is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Don't leak key material in debug output
        write!(f, "KeyMaterial([REDACTED, {} bytes])", self.bytes.len())
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        #[cfg(feature = "crypto")]
        {
            use zeroize::Zeroize;
            self.bytes.zeroize();
        }

        #[cfg(not(feature = "crypto"))]
        for byte in &mut self.bytes {
            *byte = 0;
        }
    }
}
