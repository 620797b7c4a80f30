//! Common error types for zkshare.

use thiserror::Error;

/// Top-level error type for zkshare operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Wrong field length or encoding (bad base64/hex, nonce, tag, salt size,
    /// key serialization format). Raised before any primitive runs.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// A required input was empty (plaintext, password).
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// AEAD tag mismatch or OAEP decryption failure.
    ///
    /// Deliberately carries no detail: a wrong password, a wrong key and a
    /// tampered ciphertext must be indistinguishable to the caller.
    #[error("Decryption failed")]
    AuthenticationFailure,

    /// A key came out of export or unwrap with an unexpected size.
    #[error("Key size mismatch: expected {expected} bytes, got {actual}")]
    KeySizeMismatch { expected: usize, actual: usize },

    /// The platform secure random source failed.
    #[error("Secure randomness unavailable: {0}")]
    RandomnessUnavailable(String),

    /// A principal attempted to share a file with itself.
    #[error("Cannot share a file with its owner or with yourself")]
    SelfShareRejected,

    /// The (file, recipient) grant already exists.
    #[error("Grant already exists: {0}")]
    DuplicateGrant(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller lacks the permission required for the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not permitted in the current state (e.g. locked session).
    #[error("Not permitted: {0}")]
    NotPermitted(String),

    /// Cryptographic engine failure other than authentication.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Storage collaborator failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is one of the per-recipient policy errors raised
    /// by the share protocol.
    pub fn is_policy(&self) -> bool {
        matches!(
            self,
            Error::SelfShareRejected
                | Error::DuplicateGrant(_)
                | Error::NotFound(_)
                | Error::Forbidden(_)
        )
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_failure_is_opaque() {
        let msg = Error::AuthenticationFailure.to_string();
        assert_eq!(msg, "Decryption failed");
        assert!(!msg.to_lowercase().contains("password"));
    }

    #[test]
    fn test_policy_classification() {
        assert!(Error::SelfShareRejected.is_policy());
        assert!(Error::DuplicateGrant("f/r".into()).is_policy());
        assert!(!Error::AuthenticationFailure.is_policy());
        assert!(!Error::Storage("down".into()).is_policy());
    }
}
