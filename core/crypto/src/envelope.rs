//! Wrapping content keys under identity keys.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::encoding::{decode_base64, encode_base64};
use crate::identity::{IdentityPrivateKey, IdentityPublicKey};
use crate::keys::ContentKey;
use crate::provider::CryptoProvider;
use zkshare_common::{Error, Result};

/// Maximum plaintext a single RSA-4096 OAEP-SHA256 wrap can carry.
pub const MAX_WRAP_PLAINTEXT: usize = 446;

/// A content key encrypted under one principal's public key, base64 encoded.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WrappedKey(String);

impl WrappedKey {
    /// Accept a base64 wrapped key from transport.
    ///
    /// # Errors
    /// - `MalformedInput` if the value is empty or not base64
    pub fn from_base64(encoded: impl Into<String>) -> Result<Self> {
        let encoded = encoded.into();
        decode_base64(&encoded, "wrappedKey")?;
        Ok(Self(encoded))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WrappedKey({} chars)", self.0.len())
    }
}

/// Asymmetric envelope around content keys.
#[derive(Debug, Clone)]
pub struct KeyEnvelope {
    provider: CryptoProvider,
}

impl KeyEnvelope {
    pub fn new(provider: CryptoProvider) -> Self {
        Self { provider }
    }

    /// Wrap `key` for the holder of `recipient`.
    ///
    /// # Errors
    /// - `KeySizeMismatch` if the key does not export to exactly 32 bytes
    pub fn wrap(&self, key: &ContentKey, recipient: &IdentityPublicKey) -> Result<WrappedKey> {
        let raw = Zeroizing::new(key.as_bytes().to_vec());
        self.wrap_raw(&raw, recipient)
    }

    /// Wrap raw content key bytes, checking the length first.
    pub fn wrap_raw(&self, raw: &[u8], recipient: &IdentityPublicKey) -> Result<WrappedKey> {
        if raw.len() != crate::keys::KEY_LENGTH {
            return Err(Error::KeySizeMismatch {
                expected: crate::keys::KEY_LENGTH,
                actual: raw.len(),
            });
        }
        let sealed = self.seal(raw, recipient)?;
        Ok(WrappedKey(encode_base64(&sealed)))
    }

    /// Encrypt a short payload under `recipient`.
    ///
    /// # Errors
    /// - `EmptyInput` for an empty payload
    /// - `MalformedInput` if the payload exceeds [`MAX_WRAP_PLAINTEXT`] or
    ///   the recipient key's capacity; the asymmetric engine is not invoked
    pub fn seal(&self, payload: &[u8], recipient: &IdentityPublicKey) -> Result<Vec<u8>> {
        if payload.is_empty() {
            return Err(Error::EmptyInput("wrap payload cannot be empty".to_string()));
        }
        let limit = MAX_WRAP_PLAINTEXT.min(recipient.max_payload());
        if payload.len() > limit {
            return Err(Error::MalformedInput(format!(
                "wrap payload of {} bytes exceeds the {} byte limit",
                payload.len(),
                limit
            )));
        }
        self.provider
            .asymmetric()
            .encrypt(self.provider.random(), recipient.as_rsa(), payload)
    }

    /// Recover a content key with the owner's private key.
    ///
    /// # Errors
    /// - `MalformedInput` for bad base64
    /// - `AuthenticationFailure` if OAEP decryption fails
    /// - `KeySizeMismatch` if the plaintext is not exactly 32 bytes
    pub fn unwrap(&self, wrapped: &WrappedKey, owner: &IdentityPrivateKey) -> Result<ContentKey> {
        let ciphertext = decode_base64(wrapped.as_str(), "wrappedKey")?;
        let raw = Zeroizing::new(self.open(&ciphertext, owner)?);
        ContentKey::from_slice(&raw)
    }

    /// Decrypt a payload sealed with [`KeyEnvelope::seal`].
    pub fn open(&self, ciphertext: &[u8], owner: &IdentityPrivateKey) -> Result<Vec<u8>> {
        self.provider
            .asymmetric()
            .decrypt(self.provider.random(), owner.as_rsa(), ciphertext)
    }
}
