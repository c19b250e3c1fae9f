//! Codecs that seal credential configs before they are written to SQLite.

use std::env;

use base64::Engine;
use rand_core::{OsRng, RngCore};
use thiserror::Error;
use xsalsa20poly1305::aead::{Aead, KeyInit};
use xsalsa20poly1305::{Key, Nonce, XSalsa20Poly1305};

/// Scheme name prefixed to stored secretbox payloads.
pub const SECRETBOX_SCHEME: &str = "secretbox-v1";

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 24;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("credential key {0} is not set")]
    KeyNotSet(String),
    #[error("credential key must be 32 bytes, got {0}")]
    KeyLength(usize),
    #[error("credential key is neither hex nor base64: {0}")]
    KeyEncoding(String),
    #[error("sealed payload is {0} bytes, shorter than its nonce")]
    Truncated(usize),
    #[error("could not seal credential payload")]
    Seal,
    #[error("could not open credential payload: wrong key or corrupted data")]
    Open,
}

/// Byte-level transform applied to credential configs at rest.
pub trait PayloadCodec: Send + Sync {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;
    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError>;
    /// Scheme written in front of stored payloads. `None` stores plaintext.
    fn scheme(&self) -> Option<&'static str>;
}

/// Stores configs as plain JSON. Tests and local development only.
#[derive(Debug, Default)]
pub struct NoopCodec;

impl PayloadCodec for NoopCodec {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(plaintext.to_vec())
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(sealed.to_vec())
    }

    fn scheme(&self) -> Option<&'static str> {
        None
    }
}

/// XSalsa20-Poly1305 secretbox with a fresh random nonce per payload.
///
/// Sealed layout: 24-byte nonce followed by the ciphertext and its tag.
#[derive(Clone)]
pub struct SecretBoxCodec {
    cipher: XSalsa20Poly1305,
}

impl std::fmt::Debug for SecretBoxCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretBoxCodec(<redacted>)")
    }
}

impl SecretBoxCodec {
    /// Read the key from an environment variable.
    pub fn from_env(var: &str) -> Result<Self, CryptoError> {
        let value = env::var(var).map_err(|_| CryptoError::KeyNotSet(var.to_string()))?;
        Self::from_encoded(&value)
    }

    /// Accepts a 32-byte key as hex (bare or `hex:`-prefixed) or standard base64.
    pub fn from_encoded(value: &str) -> Result<Self, CryptoError> {
        Ok(Self::from_key(parse_key(value)?))
    }

    pub fn from_key(key: [u8; KEY_LEN]) -> Self {
        Self {
            cipher: XSalsa20Poly1305::new(Key::from_slice(&key)),
        }
    }
}

impl PayloadCodec for SecretBoxCodec {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce = Nonce::default();
        OsRng.fill_bytes(nonce.as_mut_slice());
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::Seal)?;

        let mut sealed = nonce.to_vec();
        sealed.extend(ciphertext);
        Ok(sealed)
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < NONCE_LEN {
            return Err(CryptoError::Truncated(sealed.len()));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Open)
    }

    fn scheme(&self) -> Option<&'static str> {
        Some(SECRETBOX_SCHEME)
    }
}

fn parse_key(value: &str) -> Result<[u8; KEY_LEN], CryptoError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CryptoError::KeyNotSet("(empty)".to_string()));
    }

    let looks_like_hex = value.len() == KEY_LEN * 2 && value.bytes().all(|b| b.is_ascii_hexdigit());
    let bytes = match value.strip_prefix("hex:") {
        Some(hex_value) => hex::decode(hex_value).map_err(|e| CryptoError::KeyEncoding(e.to_string()))?,
        None if looks_like_hex => hex::decode(value).map_err(|e| CryptoError::KeyEncoding(e.to_string()))?,
        None => base64::engine::general_purpose::STANDARD
            .decode(value)
            .map_err(|e| CryptoError::KeyEncoding(e.to_string()))?,
    };

    <[u8; KEY_LEN]>::try_from(bytes.as_slice()).map_err(|_| CryptoError::KeyLength(bytes.len()))
}
