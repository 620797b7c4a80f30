//! Injectable cryptographic capabilities.
//!
//! Every service in this crate reaches the underlying engines through a
//! [`CryptoProvider`] instead of ambient global state, so tests can swap in
//! deterministic, instrumented or failing implementations.

use std::fmt;
use std::sync::Arc;

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce, Tag};
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::aead::{NONCE_SIZE, TAG_SIZE};
use crate::kdf::{KdfParams, PasswordKdf};
use crate::keys::KEY_LENGTH;
use zkshare_common::{Error, Result};

/// Source of cryptographically secure random bytes.
pub trait SecureRandom: Send + Sync {
    /// Fill `dest` entirely with random bytes.
    ///
    /// # Errors
    /// - `RandomnessUnavailable` if the source cannot deliver; callers must
    ///   abort rather than fall back to a weaker source
    fn fill(&self, dest: &mut [u8]) -> Result<()>;
}

/// Operating system randomness.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl SecureRandom for OsRandom {
    fn fill(&self, dest: &mut [u8]) -> Result<()> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| Error::RandomnessUnavailable(e.to_string()))
    }
}

/// Seed a CSPRNG from `random`.
///
/// Engines that demand an infallible `RngCore` (RSA key generation, OAEP
/// padding, blinding) draw from this generator, so a failing source is
/// reported up front instead of panicking midway through an operation.
pub fn seeded_rng(random: &dyn SecureRandom) -> Result<StdRng> {
    let mut seed = Zeroizing::new([0u8; 32]);
    random.fill(seed.as_mut())?;
    Ok(StdRng::from_seed(*seed))
}

/// Authenticated symmetric cipher with detached tags.
pub trait AeadCipher: Send + Sync {
    /// Encrypt `plaintext`, returning the ciphertext and its tag.
    fn seal(
        &self,
        key: &[u8; KEY_LENGTH],
        nonce: &[u8; NONCE_SIZE],
        plaintext: &[u8],
    ) -> Result<(Vec<u8>, [u8; TAG_SIZE])>;

    /// Verify `tag` and decrypt `ciphertext`.
    ///
    /// # Errors
    /// - `AuthenticationFailure` if the tag does not verify; no plaintext
    ///   is returned in that case
    fn open(
        &self,
        key: &[u8; KEY_LENGTH],
        nonce: &[u8; NONCE_SIZE],
        ciphertext: &[u8],
        tag: &[u8; TAG_SIZE],
    ) -> Result<Vec<u8>>;
}

/// AES-256-GCM with a 96-bit nonce and 128-bit tag.
#[derive(Debug, Default, Clone, Copy)]
pub struct Aes256GcmCipher;

impl AeadCipher for Aes256GcmCipher {
    fn seal(
        &self,
        key: &[u8; KEY_LENGTH],
        nonce: &[u8; NONCE_SIZE],
        plaintext: &[u8],
    ) -> Result<(Vec<u8>, [u8; TAG_SIZE])> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        let mut buffer = plaintext.to_vec();

        let tag = cipher
            .encrypt_in_place_detached(Nonce::from_slice(nonce), b"", &mut buffer)
            .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

        let mut tag_bytes = [0u8; TAG_SIZE];
        tag_bytes.copy_from_slice(tag.as_slice());
        Ok((buffer, tag_bytes))
    }

    fn open(
        &self,
        key: &[u8; KEY_LENGTH],
        nonce: &[u8; NONCE_SIZE],
        ciphertext: &[u8],
        tag: &[u8; TAG_SIZE],
    ) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        let mut buffer = ciphertext.to_vec();

        match cipher.decrypt_in_place_detached(
            Nonce::from_slice(nonce),
            b"",
            &mut buffer,
            Tag::from_slice(tag),
        ) {
            Ok(()) => Ok(buffer),
            Err(_) => {
                buffer.zeroize();
                Err(Error::AuthenticationFailure)
            }
        }
    }
}

/// Asymmetric cipher used for identity keys.
pub trait AsymmetricCipher: Send + Sync {
    /// Generate a private key with a modulus of `bits` bits.
    fn generate(&self, random: &dyn SecureRandom, bits: usize) -> Result<RsaPrivateKey>;

    /// Encrypt a short payload under `key`.
    fn encrypt(
        &self,
        random: &dyn SecureRandom,
        key: &RsaPublicKey,
        plaintext: &[u8],
    ) -> Result<Vec<u8>>;

    /// Decrypt a payload with `key`.
    ///
    /// # Errors
    /// - `AuthenticationFailure` for any padding or decryption failure
    fn decrypt(
        &self,
        random: &dyn SecureRandom,
        key: &RsaPrivateKey,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>>;
}

/// RSA with OAEP padding over SHA-256.
#[derive(Debug, Default, Clone, Copy)]
pub struct RsaOaepCipher;

impl AsymmetricCipher for RsaOaepCipher {
    fn generate(&self, random: &dyn SecureRandom, bits: usize) -> Result<RsaPrivateKey> {
        let mut rng = seeded_rng(random)?;
        RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| Error::Crypto(format!("Key generation failed: {}", e)))
    }

    fn encrypt(
        &self,
        random: &dyn SecureRandom,
        key: &RsaPublicKey,
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        let mut rng = seeded_rng(random)?;
        key.encrypt(&mut rng, Oaep::new::<Sha256>(), plaintext)
            .map_err(|e| Error::Crypto(format!("Wrap failed: {}", e)))
    }

    fn decrypt(
        &self,
        random: &dyn SecureRandom,
        key: &RsaPrivateKey,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        let mut rng = seeded_rng(random)?;
        key.decrypt_blinded(&mut rng, Oaep::new::<Sha256>(), ciphertext)
            .map_err(|_| Error::AuthenticationFailure)
    }
}

/// Bundle of the capabilities the services depend on.
#[derive(Clone)]
pub struct CryptoProvider {
    random: Arc<dyn SecureRandom>,
    aead: Arc<dyn AeadCipher>,
    asymmetric: Arc<dyn AsymmetricCipher>,
    kdf: Arc<dyn PasswordKdf>,
}

impl CryptoProvider {
    /// Platform engines with the given password KDF.
    pub fn system(kdf_params: &KdfParams) -> Self {
        Self {
            random: Arc::new(OsRandom),
            aead: Arc::new(Aes256GcmCipher),
            asymmetric: Arc::new(RsaOaepCipher),
            kdf: kdf_params.build(),
        }
    }

    /// Replace the randomness source.
    pub fn with_random(mut self, random: Arc<dyn SecureRandom>) -> Self {
        self.random = random;
        self
    }

    /// Replace the AEAD engine.
    pub fn with_aead(mut self, aead: Arc<dyn AeadCipher>) -> Self {
        self.aead = aead;
        self
    }

    /// Replace the asymmetric engine.
    pub fn with_asymmetric(mut self, asymmetric: Arc<dyn AsymmetricCipher>) -> Self {
        self.asymmetric = asymmetric;
        self
    }

    /// Replace the password KDF.
    pub fn with_kdf(mut self, kdf: Arc<dyn PasswordKdf>) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn random(&self) -> &dyn SecureRandom {
        self.random.as_ref()
    }

    pub fn aead(&self) -> &dyn AeadCipher {
        self.aead.as_ref()
    }

    pub fn asymmetric(&self) -> &dyn AsymmetricCipher {
        self.asymmetric.as_ref()
    }

    pub fn kdf(&self) -> &dyn PasswordKdf {
        self.kdf.as_ref()
    }
}

impl Default for CryptoProvider {
    fn default() -> Self {
        Self::system(&KdfParams::default())
    }
}

impl fmt::Debug for CryptoProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoProvider").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenRandom;

    impl SecureRandom for BrokenRandom {
        fn fill(&self, _dest: &mut [u8]) -> Result<()> {
            Err(Error::RandomnessUnavailable("entropy pool closed".to_string()))
        }
    }

    #[test]
    fn test_os_random_fills() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        OsRandom.fill(&mut a).unwrap();
        OsRandom.fill(&mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_seeded_rng_propagates_failure() {
        assert!(matches!(
            seeded_rng(&BrokenRandom),
            Err(Error::RandomnessUnavailable(_))
        ));
    }

    #[test]
    fn test_rsa_generation_aborts_without_randomness() {
        let result = RsaOaepCipher.generate(&BrokenRandom, 1024);
        assert!(matches!(result, Err(Error::RandomnessUnavailable(_))));
    }

    #[test]
    fn test_aes_gcm_detached_roundtrip() {
        let key = [9u8; KEY_LENGTH];
        let nonce = [3u8; NONCE_SIZE];
        let (ciphertext, tag) = Aes256GcmCipher.seal(&key, &nonce, b"payload").unwrap();
        assert_eq!(ciphertext.len(), b"payload".len());

        let plaintext = Aes256GcmCipher.open(&key, &nonce, &ciphertext, &tag).unwrap();
        assert_eq!(plaintext, b"payload");
    }

    #[test]
    fn test_aes_gcm_wrong_tag_fails() {
        let key = [9u8; KEY_LENGTH];
        let nonce = [3u8; NONCE_SIZE];
        let (ciphertext, mut tag) = Aes256GcmCipher.seal(&key, &nonce, b"payload").unwrap();
        tag[0] ^= 0x01;

        assert!(matches!(
            Aes256GcmCipher.open(&key, &nonce, &ciphertext, &tag),
            Err(Error::AuthenticationFailure)
        ));
    }
}
