//! Key types with secure memory handling.
//!
//! All symmetric key types zeroize their memory on drop and are not `Clone`,
//! so each key has exactly one owner for the duration of the operation that
//! needs it.

use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::encoding;
use zkshare_common::{Error, Result};

/// Length of symmetric keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Length of the password KDF salt in bytes.
pub const SALT_LENGTH: usize = 32;

/// Length of the hex form of a salt.
pub const SALT_HEX_LENGTH: usize = SALT_LENGTH * 2;

/// A 256-bit key usable with the AEAD cipher.
pub trait SymmetricKey {
    /// Raw key bytes, for handing to the cipher engine only.
    fn key_bytes(&self) -> &[u8; KEY_LENGTH];
}

/// Per-file symmetric content key.
///
/// Lives only in memory while a file is being encrypted, decrypted or
/// re-wrapped for another principal.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ContentKey {
    key: [u8; KEY_LENGTH],
}

impl ContentKey {
    /// Create a content key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Create a content key from a slice, checking its length.
    ///
    /// # Errors
    /// - `KeySizeMismatch` if `bytes` is not exactly KEY_LENGTH long
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LENGTH {
            return Err(Error::KeySizeMismatch {
                expected: KEY_LENGTH,
                actual: bytes.len(),
            });
        }
        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl SymmetricKey for ContentKey {
    fn key_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl PartialEq for ContentKey {
    fn eq(&self, other: &Self) -> bool {
        self.key.ct_eq(&other.key).into()
    }
}

impl Eq for ContentKey {}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentKey([REDACTED])")
    }
}

/// Key derived from a password, used to protect the private identity key.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct WrappingKey {
    key: [u8; KEY_LENGTH],
}

impl WrappingKey {
    /// Create a wrapping key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Get the key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl SymmetricKey for WrappingKey {
    fn key_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for WrappingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WrappingKey([REDACTED])")
    }
}

/// Salt for password key derivation.
///
/// Transported as exactly SALT_HEX_LENGTH hex characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Salt([u8; SALT_LENGTH]);

impl Salt {
    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; SALT_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Parse a salt from its hex form.
    ///
    /// # Errors
    /// - `MalformedInput` unless `hex_str` is exactly 64 hex characters
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        if hex_str.len() != SALT_HEX_LENGTH {
            return Err(Error::MalformedInput(format!(
                "salt must be {} hex characters, got {}",
                SALT_HEX_LENGTH,
                hex_str.len()
            )));
        }
        let bytes = encoding::decode_hex(hex_str, "salt")?;
        let mut salt = [0u8; SALT_LENGTH];
        salt.copy_from_slice(&bytes);
        Ok(Self(salt))
    }

    /// Encode as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get the salt bytes.
    pub fn as_bytes(&self) -> &[u8; SALT_LENGTH] {
        &self.0
    }
}
