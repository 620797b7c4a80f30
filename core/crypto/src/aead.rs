//! Authenticated symmetric encryption of file contents.
//!
//! AES-256-GCM with a fresh random 96-bit nonce per call and a detached
//! 128-bit tag. Ciphertext, nonce and tag travel as three separate fields.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::encoding::{decode_base64, decode_base64_exact, encode_base64};
use crate::keys::{ContentKey, SymmetricKey, KEY_LENGTH};
use crate::provider::CryptoProvider;
use zkshare_common::{Error, Result};

/// Nonce size for AES-GCM (12 bytes).
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Output of an AEAD encryption.
#[derive(Clone, PartialEq, Eq)]
pub struct SealedData {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_SIZE],
    pub tag: [u8; TAG_SIZE],
}

impl SealedData {
    /// Assemble from raw parts, enforcing exact nonce and tag lengths.
    ///
    /// # Errors
    /// - `MalformedInput` if nonce is not 12 bytes or tag is not 16 bytes
    pub fn from_parts(ciphertext: Vec<u8>, nonce: &[u8], tag: &[u8]) -> Result<Self> {
        let nonce = <[u8; NONCE_SIZE]>::try_from(nonce).map_err(|_| {
            Error::MalformedInput(format!(
                "nonce must be {} bytes, got {}",
                NONCE_SIZE,
                nonce.len()
            ))
        })?;
        let tag = <[u8; TAG_SIZE]>::try_from(tag).map_err(|_| {
            Error::MalformedInput(format!("tag must be {} bytes, got {}", TAG_SIZE, tag.len()))
        })?;
        Ok(Self {
            ciphertext,
            nonce,
            tag,
        })
    }

    /// Decode the base64 transport form.
    pub fn from_base64(encoded: &SealedBase64) -> Result<Self> {
        Ok(Self {
            ciphertext: decode_base64(&encoded.ciphertext, "ciphertext")?,
            nonce: decode_base64_exact::<NONCE_SIZE>(&encoded.nonce, "nonce")?,
            tag: decode_base64_exact::<TAG_SIZE>(&encoded.tag, "tag")?,
        })
    }

    /// Encode each field as base64.
    pub fn to_base64(&self) -> SealedBase64 {
        SealedBase64 {
            ciphertext: encode_base64(&self.ciphertext),
            nonce: encode_base64(&self.nonce),
            tag: encode_base64(&self.tag),
        }
    }
}

impl fmt::Debug for SealedData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedData")
            .field("ciphertext_len", &self.ciphertext.len())
            .finish_non_exhaustive()
    }
}

/// Base64 transport form of [`SealedData`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedBase64 {
    pub ciphertext: String,
    pub nonce: String,
    pub tag: String,
}

/// Content-key generation and AEAD encryption.
#[derive(Debug, Clone)]
pub struct SymmetricCipher {
    provider: CryptoProvider,
}

impl SymmetricCipher {
    pub fn new(provider: CryptoProvider) -> Self {
        Self { provider }
    }

    /// Generate a random 256-bit content key.
    ///
    /// # Errors
    /// - `RandomnessUnavailable` if the random source fails
    pub fn generate_content_key(&self) -> Result<ContentKey> {
        let mut key = [0u8; KEY_LENGTH];
        self.provider.random().fill(&mut key)?;
        let content_key = ContentKey::from_bytes(key);
        zeroize::Zeroize::zeroize(&mut key);
        Ok(content_key)
    }

    /// Encrypt plaintext under `key`.
    ///
    /// # Preconditions
    /// - `plaintext` must not be empty
    ///
    /// # Postconditions
    /// - A fresh random nonce is drawn for every call
    /// - `ciphertext.len() == plaintext.len()`
    ///
    /// # Errors
    /// - `EmptyInput` for empty plaintext
    /// - `RandomnessUnavailable` if no nonce can be drawn
    pub fn encrypt<K: SymmetricKey>(&self, plaintext: &[u8], key: &K) -> Result<SealedData> {
        if plaintext.is_empty() {
            return Err(Error::EmptyInput("plaintext cannot be empty".to_string()));
        }

        let mut nonce = [0u8; NONCE_SIZE];
        self.provider.random().fill(&mut nonce)?;

        let (ciphertext, tag) = self.provider.aead().seal(key.key_bytes(), &nonce, plaintext)?;

        Ok(SealedData {
            ciphertext,
            nonce,
            tag,
        })
    }

    /// Verify and decrypt.
    ///
    /// # Errors
    /// - `AuthenticationFailure` on a wrong key or any tampering; no partial
    ///   plaintext is ever returned
    pub fn decrypt<K: SymmetricKey>(&self, sealed: &SealedData, key: &K) -> Result<Vec<u8>> {
        self.provider
            .aead()
            .open(key.key_bytes(), &sealed.nonce, &sealed.ciphertext, &sealed.tag)
    }

    /// Verify and decrypt from unchecked parts.
    ///
    /// Nonce and tag lengths are checked before the cipher runs.
    pub fn decrypt_parts<K: SymmetricKey>(
        &self,
        ciphertext: &[u8],
        nonce: &[u8],
        tag: &[u8],
        key: &K,
    ) -> Result<Vec<u8>> {
        let sealed = SealedData::from_parts(ciphertext.to_vec(), nonce, tag)?;
        self.decrypt(&sealed, key)
    }
}
