//! Per-user asymmetric identity keys.
//!
//! RSA-4096 with OAEP over SHA-256. The public half travels as base64
//! SubjectPublicKeyInfo DER, the private half as base64 PKCS#8 DER.
//!
//! Capability separation is carried by the types: [`IdentityPublicKey`] can
//! only be used to wrap and [`IdentityPrivateKey`] can only be used to
//! unwrap (see [`crate::envelope::KeyEnvelope`]).

use std::fmt;

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroizing;

use crate::encoding::{decode_base64, encode_base64};
use crate::provider::CryptoProvider;
use zkshare_common::{Error, Result};

/// Modulus size of identity keys, in bits.
pub const MODULUS_BITS: usize = 4096;

/// OAEP overhead for a SHA-256 label hash (2 * 32 + 2 bytes).
const OAEP_SHA256_OVERHEAD: usize = 66;

type Blake2b256 = Blake2b<U32>;

fn require_modulus_bits(bits: usize) -> Result<()> {
    if bits != MODULUS_BITS {
        return Err(Error::MalformedInput(format!(
            "identity keys must be {}-bit RSA, got {} bits",
            MODULUS_BITS, bits
        )));
    }
    Ok(())
}

/// Public half of an identity key pair. Wrap only.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityPublicKey {
    key: RsaPublicKey,
}

impl IdentityPublicKey {
    /// Import from SubjectPublicKeyInfo DER.
    ///
    /// # Errors
    /// - `MalformedInput` for bad DER or a modulus other than
    ///   [`MODULUS_BITS`]
    pub fn from_spki_der(der: &[u8]) -> Result<Self> {
        let key = RsaPublicKey::from_public_key_der(der)
            .map_err(|e| Error::MalformedInput(format!("invalid public key: {}", e)))?;
        require_modulus_bits(key.size() * 8)?;
        Ok(Self { key })
    }

    /// Import from base64 SubjectPublicKeyInfo DER.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        Self::from_spki_der(&decode_base64(encoded, "publicKey")?)
    }

    /// Export as SubjectPublicKeyInfo DER.
    pub fn to_spki_der(&self) -> Result<Vec<u8>> {
        let document = self
            .key
            .to_public_key_der()
            .map_err(|e| Error::Crypto(format!("public key export failed: {}", e)))?;
        Ok(document.as_bytes().to_vec())
    }

    /// Export as base64 SubjectPublicKeyInfo DER.
    pub fn to_base64(&self) -> Result<String> {
        Ok(encode_base64(&self.to_spki_der()?))
    }

    /// Hex BLAKE2b-256 digest of the SPKI DER, for out-of-band comparison.
    pub fn fingerprint(&self) -> Result<String> {
        let digest = Blake2b256::digest(self.to_spki_der()?);
        Ok(hex::encode(digest))
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.key.size() * 8
    }

    /// Largest payload a single OAEP encryption under this key can carry.
    pub fn max_payload(&self) -> usize {
        self.key.size().saturating_sub(OAEP_SHA256_OVERHEAD)
    }

    pub(crate) fn as_rsa(&self) -> &RsaPublicKey {
        &self.key
    }
}

impl fmt::Debug for IdentityPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityPublicKey")
            .field("bits", &self.bits())
            .finish()
    }
}

/// Private half of an identity key pair. Unwrap only.
///
/// The inner key is zeroized on drop by the `rsa` crate.
pub struct IdentityPrivateKey {
    key: RsaPrivateKey,
}

impl IdentityPrivateKey {
    pub(crate) fn from_rsa(key: RsaPrivateKey) -> Self {
        Self { key }
    }

    /// Import from PKCS#8 DER.
    ///
    /// # Errors
    /// - `MalformedInput` for bad DER or a modulus other than
    ///   [`MODULUS_BITS`]
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let key = RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| Error::MalformedInput(format!("invalid private key: {}", e)))?;
        require_modulus_bits(key.size() * 8)?;
        Ok(Self { key })
    }

    /// Import from base64 PKCS#8 DER.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let der = Zeroizing::new(decode_base64(encoded, "privateKey")?);
        Self::from_pkcs8_der(&der)
    }

    /// Export as PKCS#8 DER.
    ///
    /// # Security
    /// The buffer is zeroized when dropped; do not copy it elsewhere.
    pub fn to_pkcs8_der(&self) -> Result<Zeroizing<Vec<u8>>> {
        let document = self
            .key
            .to_pkcs8_der()
            .map_err(|e| Error::Crypto(format!("private key export failed: {}", e)))?;
        Ok(Zeroizing::new(document.as_bytes().to_vec()))
    }

    /// Export as base64 PKCS#8 DER.
    pub fn to_base64(&self) -> Result<Zeroizing<String>> {
        let der = self.to_pkcs8_der()?;
        Ok(Zeroizing::new(encode_base64(&der)))
    }

    /// Derive the matching public key.
    pub fn public_key(&self) -> IdentityPublicKey {
        IdentityPublicKey {
            key: self.key.to_public_key(),
        }
    }

    pub(crate) fn as_rsa(&self) -> &RsaPrivateKey {
        &self.key
    }
}

impl fmt::Debug for IdentityPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityPrivateKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// A user's identity key pair.
#[derive(Debug)]
pub struct IdentityKeyPair {
    public: IdentityPublicKey,
    private: IdentityPrivateKey,
}

impl IdentityKeyPair {
    pub fn from_private(private: IdentityPrivateKey) -> Self {
        Self {
            public: private.public_key(),
            private,
        }
    }

    pub fn public_key(&self) -> &IdentityPublicKey {
        &self.public
    }

    pub fn private_key(&self) -> &IdentityPrivateKey {
        &self.private
    }

    pub fn into_parts(self) -> (IdentityPublicKey, IdentityPrivateKey) {
        (self.public, self.private)
    }
}

/// Identity key generation.
#[derive(Debug, Clone)]
pub struct IdentityKeys {
    provider: CryptoProvider,
}

impl IdentityKeys {
    pub fn new(provider: CryptoProvider) -> Self {
        Self { provider }
    }

    /// Generate a fresh RSA-4096 key pair.
    ///
    /// This is slow (seconds); async callers should run it off the
    /// scheduler thread.
    ///
    /// # Errors
    /// - `RandomnessUnavailable` if the random source fails
    pub fn generate_key_pair(&self) -> Result<IdentityKeyPair> {
        let key = self
            .provider
            .asymmetric()
            .generate(self.provider.random(), MODULUS_BITS)?;
        Ok(IdentityKeyPair::from_private(IdentityPrivateKey::from_rsa(key)))
    }
}
