//! Password-based key derivation.
//!
//! The default is PBKDF2-HMAC-SHA256 at 100,000 iterations, which keeps the
//! wrapping key compatible with existing protected private keys. Argon2id
//! is available as a memory-hard alternative; both sides of a login must
//! agree on the parameters, since the protected-key format does not carry
//! them.

use std::sync::Arc;

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::keys::{Salt, WrappingKey, KEY_LENGTH};
use zkshare_common::{Error, Result};

/// Iteration count used when none is configured.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;

/// Derives a symmetric wrapping key from a password and salt.
pub trait PasswordKdf: Send + Sync {
    /// Derive the wrapping key.
    ///
    /// # Errors
    /// - `EmptyInput` if `password` is empty
    fn derive(&self, password: &[u8], salt: &Salt) -> Result<WrappingKey>;
}

/// Parameters selecting and tuning the password KDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "kebab-case")]
pub enum KdfParams {
    /// PBKDF2 with HMAC-SHA256.
    Pbkdf2Sha256 {
        /// Number of iterations.
        iterations: u32,
    },
    /// Argon2id.
    Argon2id {
        /// Memory cost in KiB (e.g., 65536 = 64 MiB).
        memory_cost: u32,
        /// Number of iterations.
        time_cost: u32,
        /// Degree of parallelism.
        parallelism: u32,
    },
}

impl KdfParams {
    /// PBKDF2 with a custom iteration count.
    pub fn pbkdf2(iterations: u32) -> Self {
        Self::Pbkdf2Sha256 { iterations }
    }

    /// Argon2id parameters suitable for interactive use.
    pub fn argon2id_interactive() -> Self {
        Self::Argon2id {
            memory_cost: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
        }
    }

    /// Argon2id parameters for mobile devices.
    pub fn argon2id_moderate() -> Self {
        Self::Argon2id {
            memory_cost: 32768, // 32 MiB
            time_cost: 3,
            parallelism: 2,
        }
    }

    /// Check the parameters without deriving anything.
    pub fn validate(&self) -> Result<()> {
        match *self {
            KdfParams::Pbkdf2Sha256 { iterations } => {
                if iterations == 0 {
                    return Err(Error::InvalidInput(
                        "PBKDF2 iterations must be positive".to_string(),
                    ));
                }
                Ok(())
            }
            KdfParams::Argon2id {
                memory_cost,
                time_cost,
                parallelism,
            } => Params::new(memory_cost, time_cost, parallelism, Some(KEY_LENGTH))
                .map(|_| ())
                .map_err(|e| Error::InvalidInput(format!("Invalid KDF parameters: {}", e))),
        }
    }

    /// Build the KDF these parameters describe.
    pub fn build(&self) -> Arc<dyn PasswordKdf> {
        match *self {
            KdfParams::Pbkdf2Sha256 { iterations } => Arc::new(Pbkdf2Kdf { iterations }),
            KdfParams::Argon2id {
                memory_cost,
                time_cost,
                parallelism,
            } => Arc::new(Argon2idKdf {
                memory_cost,
                time_cost,
                parallelism,
            }),
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::pbkdf2(DEFAULT_PBKDF2_ITERATIONS)
    }
}

/// PBKDF2-HMAC-SHA256.
#[derive(Debug, Clone, Copy)]
pub struct Pbkdf2Kdf {
    iterations: u32,
}

impl Pbkdf2Kdf {
    pub fn new(iterations: u32) -> Self {
        Self { iterations }
    }
}

impl PasswordKdf for Pbkdf2Kdf {
    fn derive(&self, password: &[u8], salt: &Salt) -> Result<WrappingKey> {
        if password.is_empty() {
            return Err(Error::EmptyInput("password cannot be empty".to_string()));
        }
        if self.iterations == 0 {
            return Err(Error::InvalidInput(
                "PBKDF2 iterations must be positive".to_string(),
            ));
        }

        let mut key_bytes = [0u8; KEY_LENGTH];
        pbkdf2::pbkdf2_hmac::<Sha256>(password, salt.as_bytes(), self.iterations, &mut key_bytes);
        Ok(WrappingKey::from_bytes(key_bytes))
    }
}

/// Argon2id, version 0x13.
#[derive(Debug, Clone, Copy)]
pub struct Argon2idKdf {
    memory_cost: u32,
    time_cost: u32,
    parallelism: u32,
}

impl PasswordKdf for Argon2idKdf {
    fn derive(&self, password: &[u8], salt: &Salt) -> Result<WrappingKey> {
        if password.is_empty() {
            return Err(Error::EmptyInput("password cannot be empty".to_string()));
        }

        let params = Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            Some(KEY_LENGTH),
        )
        .map_err(|e| Error::InvalidInput(format!("Invalid KDF parameters: {}", e)))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key_bytes = [0u8; KEY_LENGTH];
        argon2
            .hash_password_into(password, salt.as_bytes(), &mut key_bytes)
            .map_err(|e| Error::Crypto(format!("Key derivation failed: {}", e)))?;

        Ok(WrappingKey::from_bytes(key_bytes))
    }
}
