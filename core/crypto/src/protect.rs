//! Password protection of the private identity key at rest.
//!
//! The PKCS#8 bytes of the private key are sealed with AES-256-GCM under a
//! key derived from the user's password and a fresh 32-byte salt. The
//! result is stored as `ciphertext|nonce|tag` (each base64) alongside the
//! salt in hex. A wrong password surfaces only as an AEAD authentication
//! failure; there is no separate verifier.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::aead::{SealedBase64, SealedData, SymmetricCipher};
use crate::identity::IdentityPrivateKey;
use crate::keys::{Salt, SALT_LENGTH};
use crate::provider::CryptoProvider;
use zkshare_common::{Error, Result};

/// Separator between the three base64 fields of a protected key.
pub const FIELD_SEPARATOR: char = '|';

/// A private key sealed under a password-derived key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectedPrivateKey {
    /// `ciphertext|nonce|tag`, each field base64.
    pub protected_key: String,
    /// 64 lowercase hex characters.
    pub salt: String,
}

impl fmt::Debug for ProtectedPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectedPrivateKey")
            .field("protected_key_len", &self.protected_key.len())
            .field("salt", &self.salt)
            .finish()
    }
}

fn join_fields(sealed: &SealedData) -> String {
    let encoded = sealed.to_base64();
    format!(
        "{}{sep}{}{sep}{}",
        encoded.ciphertext,
        encoded.nonce,
        encoded.tag,
        sep = FIELD_SEPARATOR
    )
}

fn split_fields(protected_key: &str) -> Result<SealedData> {
    let fields: Vec<&str> = protected_key.split(FIELD_SEPARATOR).collect();
    let [ciphertext, nonce, tag] = fields.as_slice() else {
        return Err(Error::MalformedInput(format!(
            "protected key must have 3 fields, got {}",
            fields.len()
        )));
    };
    SealedData::from_base64(&SealedBase64 {
        ciphertext: ciphertext.to_string(),
        nonce: nonce.to_string(),
        tag: tag.to_string(),
    })
}

/// Seals and unseals private identity keys with a password.
#[derive(Debug, Clone)]
pub struct PasswordWrapper {
    provider: CryptoProvider,
    cipher: SymmetricCipher,
}

impl PasswordWrapper {
    pub fn new(provider: CryptoProvider) -> Self {
        let cipher = SymmetricCipher::new(provider.clone());
        Self { provider, cipher }
    }

    /// Draw a fresh random salt.
    pub fn generate_salt(&self) -> Result<Salt> {
        let mut bytes = [0u8; SALT_LENGTH];
        self.provider.random().fill(&mut bytes)?;
        Ok(Salt::from_bytes(bytes))
    }

    /// Protect `private_key` under `password`.
    ///
    /// # Errors
    /// - `EmptyInput` for an empty password
    /// - `RandomnessUnavailable` if no salt or nonce can be drawn
    pub fn protect(
        &self,
        private_key: &IdentityPrivateKey,
        password: &str,
    ) -> Result<ProtectedPrivateKey> {
        if password.is_empty() {
            return Err(Error::EmptyInput("password cannot be empty".to_string()));
        }

        let salt = self.generate_salt()?;
        let wrapping_key = self.provider.kdf().derive(password.as_bytes(), &salt)?;
        let der = private_key.to_pkcs8_der()?;
        let sealed = self.cipher.encrypt(&der, &wrapping_key)?;

        Ok(ProtectedPrivateKey {
            protected_key: join_fields(&sealed),
            salt: salt.to_hex(),
        })
    }

    /// Recover the private key sealed by [`PasswordWrapper::protect`].
    ///
    /// The salt and field layout are validated before any KDF work.
    ///
    /// # Errors
    /// - `MalformedInput` for a bad salt, a field count other than 3, bad
    ///   base64 or wrong nonce/tag lengths
    /// - `AuthenticationFailure` for a wrong password or tampered data
    pub fn unprotect(
        &self,
        protected_key: &str,
        password: &str,
        salt_hex: &str,
    ) -> Result<IdentityPrivateKey> {
        let salt = Salt::from_hex(salt_hex)?;
        let sealed = split_fields(protected_key)?;
        if password.is_empty() {
            return Err(Error::EmptyInput("password cannot be empty".to_string()));
        }

        let wrapping_key = self.provider.kdf().derive(password.as_bytes(), &salt)?;
        let der = Zeroizing::new(self.cipher.decrypt(&sealed, &wrapping_key)?);
        IdentityPrivateKey::from_pkcs8_der(&der)
    }

    /// Convenience over [`PasswordWrapper::unprotect`] for a stored record.
    pub fn unprotect_record(
        &self,
        record: &ProtectedPrivateKey,
        password: &str,
    ) -> Result<IdentityPrivateKey> {
        self.unprotect(&record.protected_key, password, &record.salt)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::envelope::KeyEnvelope;
    use crate::kdf::{PasswordKdf, Pbkdf2Kdf};
    use crate::keys::{ContentKey, WrappingKey};
    use crate::test_support::{exhausted_provider, fast_provider, identity};

    #[derive(Default)]
    struct CountingKdf {
        calls: AtomicUsize,
    }

    impl PasswordKdf for CountingKdf {
        fn derive(&self, password: &[u8], salt: &Salt) -> Result<WrappingKey> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Pbkdf2Kdf::new(1_000).derive(password, salt)
        }
    }

    fn wrapper() -> PasswordWrapper {
        PasswordWrapper::new(fast_provider())
    }

    #[test]
    fn test_protect_unprotect_roundtrip() {
        let pair = identity(0);
        let wrapper = wrapper();

        let protected = wrapper.protect(pair.private_key(), "correctPw").unwrap();
        assert_eq!(protected.salt.len(), 64);
        assert_eq!(protected.protected_key.split('|').count(), 3);

        let recovered = wrapper.unprotect_record(&protected, "correctPw").unwrap();

        let envelope = KeyEnvelope::new(fast_provider());
        let key = ContentKey::from_bytes([11u8; 32]);
        let wrapped = envelope.wrap(&key, pair.public_key()).unwrap();
        assert_eq!(envelope.unwrap(&wrapped, &recovered).unwrap(), key);
    }

    #[test]
    fn test_wrong_password_is_authentication_failure() {
        let pair = identity(0);
        let wrapper = wrapper();

        let protected = wrapper.protect(pair.private_key(), "correctPw").unwrap();
        let result = wrapper.unprotect_record(&protected, "wrongPw");

        assert!(matches!(result, Err(Error::AuthenticationFailure)));
    }

    #[test]
    fn test_fresh_salt_per_protect() {
        let pair = identity(0);
        let wrapper = wrapper();

        let a = wrapper.protect(pair.private_key(), "pw").unwrap();
        let b = wrapper.protect(pair.private_key(), "pw").unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.protected_key, b.protected_key);
    }

    #[test]
    fn test_bad_salt_rejected_before_kdf() {
        let pair = identity(0);
        let kdf = Arc::new(CountingKdf::default());
        let wrapper = PasswordWrapper::new(fast_provider().with_kdf(kdf.clone()));

        let protected = wrapper.protect(pair.private_key(), "pw").unwrap();
        assert_eq!(kdf.calls.load(Ordering::SeqCst), 1);

        let short = &protected.salt[..63];
        assert!(matches!(
            wrapper.unprotect(&protected.protected_key, "pw", short),
            Err(Error::MalformedInput(_))
        ));

        let non_hex = format!("{}zz", &protected.salt[..62]);
        assert!(matches!(
            wrapper.unprotect(&protected.protected_key, "pw", &non_hex),
            Err(Error::MalformedInput(_))
        ));

        assert_eq!(kdf.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_salt_requires_randomness() {
        let pair = identity(0);
        let kdf = Arc::new(CountingKdf::default());
        let wrapper = PasswordWrapper::new(exhausted_provider().with_kdf(kdf.clone()));

        assert!(matches!(
            wrapper.generate_salt(),
            Err(Error::RandomnessUnavailable(_))
        ));
        assert!(matches!(
            wrapper.protect(pair.private_key(), "pw"),
            Err(Error::RandomnessUnavailable(_))
        ));
        assert_eq!(kdf.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_field_count_enforced() {
        let pair = identity(0);
        let kdf = Arc::new(CountingKdf::default());
        let wrapper = PasswordWrapper::new(fast_provider().with_kdf(kdf.clone()));
        let protected = wrapper.protect(pair.private_key(), "pw").unwrap();

        let two_fields = protected.protected_key.rsplitn(2, '|').last().unwrap().to_string();
        let four_fields = format!("{}|AAAA", protected.protected_key);

        for bad in [two_fields, four_fields] {
            assert!(matches!(
                wrapper.unprotect(&bad, "pw", &protected.salt),
                Err(Error::MalformedInput(_))
            ));
        }
        assert_eq!(kdf.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let pair = identity(0);
        let wrapper = wrapper();
        let protected = wrapper.protect(pair.private_key(), "pw").unwrap();

        let mut sealed = split_fields(&protected.protected_key).unwrap();
        sealed.ciphertext[0] ^= 0x80;
        let tampered = join_fields(&sealed);

        assert!(matches!(
            wrapper.unprotect(&tampered, "pw", &protected.salt),
            Err(Error::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_empty_password_rejected() {
        let pair = identity(0);
        assert!(matches!(
            wrapper().protect(pair.private_key(), ""),
            Err(Error::EmptyInput(_))
        ));
    }
}
