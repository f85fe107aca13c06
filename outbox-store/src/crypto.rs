//! Encryption at rest for sensitive record fields.
//!
//! XChaCha20-Poly1305 AEAD with a random 192-bit nonce per field. The
//! sealed form is `base64(nonce || ciphertext)`, so each value is
//! self-contained and a row can be decrypted field by field.
//!
//! Decryption never errors out of a read path: a value sealed under a
//! rotated or wrong key opens as `None` and the caller degrades it to an
//! empty value, so one stale record cannot crash a bulk read.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use thiserror::Error;

const NONCE_LEN: usize = 24;
const KEY_LEN: usize = 32;

/// Errors building a [`Cryptor`].
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The configured key is not valid base64.
    #[error("encryption key is not valid base64: {0}")]
    KeyEncoding(#[from] base64::DecodeError),

    /// The decoded key is not exactly 32 bytes.
    #[error("encryption key must be {KEY_LEN} bytes, got {0}")]
    KeyLength(usize),

    /// Field encryption failed.
    #[error("encryption failed")]
    Seal,
}

/// Seals and opens sensitive field values.
#[derive(Clone)]
pub struct Cryptor {
    cipher: XChaCha20Poly1305,
}

impl std::fmt::Debug for Cryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cryptor").finish_non_exhaustive()
    }
}

impl Cryptor {
    /// Build a cryptor from a raw 32-byte key.
    #[must_use]
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self {
            cipher: XChaCha20Poly1305::new(key.into()),
        }
    }

    /// Build a cryptor from a base64-encoded 32-byte key, as carried in
    /// the configuration file.
    ///
    /// # Errors
    /// Returns [`CryptoError`] if the key is not valid base64 or has the
    /// wrong length.
    pub fn from_base64_key(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = BASE64.decode(encoded.trim())?;
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|bytes: Vec<u8>| CryptoError::KeyLength(bytes.len()))?;

        Ok(Self::new(&key))
    }

    /// Seal a plaintext value.
    ///
    /// # Errors
    /// Returns [`CryptoError::Seal`] if the cipher rejects the input.
    pub fn seal(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Seal)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(sealed))
    }

    /// Open a sealed value.
    ///
    /// Returns `None` when the value is malformed or was sealed under a
    /// different key.
    #[must_use]
    pub fn open(&self, sealed: &str) -> Option<String> {
        let bytes = BASE64.decode(sealed.trim()).ok()?;
        if bytes.len() < NONCE_LEN {
            return None;
        }

        let nonce = XNonce::from_slice(&bytes[..NONCE_LEN]);
        let plaintext = self.cipher.decrypt(nonce, &bytes[NONCE_LEN..]).ok()?;

        String::from_utf8(plaintext).ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cryptor() -> Cryptor {
        Cryptor::new(&[7u8; 32])
    }

    #[test]
    fn seal_and_open_round_trip() {
        let cryptor = cryptor();
        let sealed = cryptor.seal("john@doe.com").unwrap();

        assert_ne!(sealed, "john@doe.com");
        assert_eq!(cryptor.open(&sealed).as_deref(), Some("john@doe.com"));
    }

    #[test]
    fn sealing_twice_produces_distinct_ciphertext() {
        let cryptor = cryptor();
        let first = cryptor.seal("Hello").unwrap();
        let second = cryptor.seal("Hello").unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn opening_with_the_wrong_key_degrades_to_none() {
        let sealed = cryptor().seal("secret").unwrap();
        let other = Cryptor::new(&[9u8; 32]);

        assert_eq!(other.open(&sealed), None);
    }

    #[test]
    fn opening_garbage_degrades_to_none() {
        let cryptor = cryptor();

        assert_eq!(cryptor.open("not base64!!"), None);
        assert_eq!(cryptor.open(""), None);
        assert_eq!(cryptor.open(&BASE64.encode(b"short")), None);
    }

    #[test]
    fn key_parsing_validates_length_and_encoding() {
        let good = BASE64.encode([1u8; 32]);
        assert!(Cryptor::from_base64_key(&good).is_ok());

        let short = BASE64.encode([1u8; 16]);
        assert!(matches!(
            Cryptor::from_base64_key(&short),
            Err(CryptoError::KeyLength(16))
        ));

        assert!(matches!(
            Cryptor::from_base64_key("!!not base64!!"),
            Err(CryptoError::KeyEncoding(_))
        ));
    }
}
