//! Contracts the client core requires from the account and storage layer.
//!
//! Every payload here carries only public keys, sealed private keys,
//! ciphertext and wrapped content keys. Field encodings are base64 except
//! the salt, which is hex.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use zkshare_common::{FileId, GrantPermissions, PrincipalId, Result};

/// Registration payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub username: String,
    /// Base64 SubjectPublicKeyInfo.
    pub public_key: String,
    /// `ciphertext|nonce|tag`, each base64.
    pub protected_private_key: String,
    /// 64 hex characters.
    pub salt: String,
}

/// Public view of a principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalRecord {
    pub id: PrincipalId,
    pub username: String,
    pub public_key: String,
}

/// Everything a client needs to open a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub principal_id: PrincipalId,
    pub username: String,
    pub public_key: String,
    pub protected_private_key: String,
    pub salt: String,
    /// Opaque bearer token; never interpreted by the client core.
    pub token: String,
}

/// File upload payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUpload {
    pub owner: PrincipalId,
    pub filename: String,
    pub mime_type: String,
    /// Plaintext size in bytes.
    pub size: u64,
    pub ciphertext: String,
    pub nonce: String,
    pub tag: String,
    /// Content key wrapped under the owner's public key.
    pub wrapped_key: String,
}

/// Stored file metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub id: FileId,
    pub owner: PrincipalId,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// File fetch response: ciphertext plus the caller's own wrapped key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFetch {
    pub metadata: FileMetadata,
    pub ciphertext: String,
    pub nonce: String,
    pub tag: String,
    pub wrapped_key: String,
}

/// The caller's access to a file's content key, without the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyAccess {
    pub metadata: FileMetadata,
    pub wrapped_key: String,
    pub permissions: GrantPermissions,
    pub is_owner: bool,
}

/// Share payload for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRequest {
    pub file_id: FileId,
    pub granted_by: PrincipalId,
    pub recipient_id: PrincipalId,
    /// Content key wrapped under the recipient's public key.
    pub wrapped_key: String,
    #[serde(flatten)]
    pub permissions: GrantPermissions,
}

/// A stored grant, as listed to the file owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRecord {
    pub file_id: FileId,
    pub recipient_id: PrincipalId,
    pub recipient_username: String,
    pub granted_by: PrincipalId,
    #[serde(flatten)]
    pub permissions: GrantPermissions,
    pub created_at: DateTime<Utc>,
}

/// A file visible to a principal through a grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedFile {
    pub metadata: FileMetadata,
    pub granted_by: PrincipalId,
    #[serde(flatten)]
    pub permissions: GrantPermissions,
    pub shared_at: DateTime<Utc>,
}

/// Account directory.
///
/// Stores public keys and password-sealed private keys. It never sees a
/// password and performs no password check: only a client that can unseal
/// the private key can use the account.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Register a new principal.
    ///
    /// # Errors
    /// - `AlreadyExists` if the username is taken
    /// - `InvalidInput` for an empty username, public key or sealed key, or
    ///   a salt that is not 64 hex characters
    async fn register(&self, registration: Registration) -> Result<PrincipalRecord>;

    /// Fetch the sealed key material of `username`.
    ///
    /// # Errors
    /// - `NotFound` if no such user exists
    async fn login(&self, username: &str) -> Result<LoginResponse>;

    /// Look up a principal by id.
    async fn principal(&self, id: &PrincipalId) -> Result<PrincipalRecord>;

    /// Look up a principal by username.
    async fn principal_by_username(&self, username: &str) -> Result<PrincipalRecord>;
}

/// Ciphertext and key-grant storage.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Store a new file and the owner's implicit grant.
    ///
    /// # Errors
    /// - `InvalidInput` if nonce is not 12 bytes, tag is not 16 bytes, the
    ///   wrapped key or ciphertext is empty, or the size exceeds the limit
    /// - `NotFound` if the owner is unknown
    async fn upload(&self, upload: FileUpload) -> Result<FileMetadata>;

    /// Fetch ciphertext and the caller's wrapped key.
    ///
    /// # Errors
    /// - `NotFound` if the file does not exist or the caller holds no grant
    /// - `Forbidden` if the caller's grant does not allow download
    async fn fetch(&self, file_id: &FileId, caller: &PrincipalId) -> Result<FileFetch>;

    /// Fetch only the caller's wrapped key and permissions.
    ///
    /// # Errors
    /// - `NotFound` if the file does not exist or the caller holds no grant
    async fn key_access(&self, file_id: &FileId, caller: &PrincipalId) -> Result<KeyAccess>;

    /// Store one grant.
    ///
    /// # Errors
    /// - `NotFound` if the file or recipient does not exist
    /// - `Forbidden` if `granted_by` is neither owner nor a resharer
    /// - `SelfShareRejected` if the recipient owns the file
    /// - `DuplicateGrant` if the recipient already holds a grant
    async fn create_grant(&self, grant: GrantRequest) -> Result<GrantRecord>;

    /// Delete exactly the (file, recipient) grant.
    ///
    /// # Errors
    /// - `NotFound` if the file or the grant does not exist
    /// - `Forbidden` if `caller` is not the owner
    async fn delete_grant(
        &self,
        file_id: &FileId,
        caller: &PrincipalId,
        recipient: &PrincipalId,
    ) -> Result<()>;

    /// List every grant of a file. Owner only.
    async fn list_grants(&self, file_id: &FileId, caller: &PrincipalId) -> Result<Vec<GrantRecord>>;

    /// List the files shared with `principal`.
    async fn shared_with(&self, principal: &PrincipalId) -> Result<Vec<SharedFile>>;

    /// List the files owned by `principal`.
    async fn owned_by(&self, principal: &PrincipalId) -> Result<Vec<FileMetadata>>;

    /// Delete a file and every grant of it. Owner only.
    async fn delete_file(&self, file_id: &FileId, caller: &PrincipalId) -> Result<()>;
}
