//! Client-side cryptography for zkshare.
//!
//! This crate provides:
//! - Per-file content keys and AES-256-GCM encryption
//! - RSA-4096 OAEP identity keys with SPKI / PKCS#8 interchange
//! - Password protection of the private identity key (PBKDF2 or Argon2id)
//! - Wrapping of content keys under identity keys
//!
//! # Security Guarantees
//! - Symmetric key material is zeroized on drop
//! - Nothing in this crate logs
//! - All engines are reached through an injectable [`CryptoProvider`]

pub mod aead;
pub mod encoding;
pub mod envelope;
pub mod identity;
pub mod kdf;
pub mod keys;
pub mod protect;
pub mod provider;

pub use aead::{SealedBase64, SealedData, SymmetricCipher, NONCE_SIZE, TAG_SIZE};
pub use envelope::{KeyEnvelope, WrappedKey, MAX_WRAP_PLAINTEXT};
pub use identity::{IdentityKeyPair, IdentityKeys, IdentityPrivateKey, IdentityPublicKey};
pub use kdf::{KdfParams, PasswordKdf};
pub use keys::{ContentKey, Salt, SymmetricKey, WrappingKey, KEY_LENGTH};
pub use protect::{PasswordWrapper, ProtectedPrivateKey};
pub use provider::{AeadCipher, AsymmetricCipher, CryptoProvider, SecureRandom};

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, OnceLock};

    use rsa::RsaPrivateKey;

    use crate::identity::{IdentityKeyPair, IdentityPrivateKey, MODULUS_BITS};
    use crate::kdf::KdfParams;
    use crate::provider::{
        AsymmetricCipher, CryptoProvider, OsRandom, RsaOaepCipher, SecureRandom,
    };
    use zkshare_common::{Error, Result};

    const FIXTURE_KEYS: usize = 2;

    static KEYS: OnceLock<Vec<RsaPrivateKey>> = OnceLock::new();

    /// One of a small set of RSA-4096 identities generated once per test run.
    pub fn identity(index: usize) -> IdentityKeyPair {
        let keys = KEYS.get_or_init(|| {
            std::thread::scope(|scope| {
                let handles: Vec<_> = (0..FIXTURE_KEYS)
                    .map(|_| scope.spawn(|| RsaOaepCipher.generate(&OsRandom, MODULUS_BITS)))
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap().unwrap())
                    .collect()
            })
        });
        let key = keys[index % FIXTURE_KEYS].clone();
        IdentityKeyPair::from_private(IdentityPrivateKey::from_rsa(key))
    }

    /// System engines with a cheap KDF.
    pub fn fast_provider() -> CryptoProvider {
        CryptoProvider::system(&KdfParams::pbkdf2(1_000))
    }

    /// A random source that always fails.
    pub struct ExhaustedRandom;

    impl SecureRandom for ExhaustedRandom {
        fn fill(&self, _dest: &mut [u8]) -> Result<()> {
            Err(Error::RandomnessUnavailable("exhausted".to_string()))
        }
    }

    /// [`fast_provider`] with a random source that always fails.
    pub fn exhausted_provider() -> CryptoProvider {
        fast_provider().with_random(Arc::new(ExhaustedRandom))
    }
}
