//! JSON-file-backed store.
//!
//! The whole state lives in one `store.json` document under the root
//! directory. Every mutation is applied to a copy, written to a temporary
//! file, renamed over the previous document and only then published in
//! memory, so a failed write leaves both disk and memory unchanged.
//!
//! Ciphertexts are kept inline in that document, so every mutation clones
//! and rewrites all stored files. This makes it a development and
//! single-user store; it does not scale to many or large files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::provider::{
    AccountDirectory, FileFetch, FileMetadata, FileStore, FileUpload, GrantRecord, GrantRequest,
    KeyAccess, LoginResponse, PrincipalRecord, Registration, SharedFile,
};
use crate::state::StoreState;
use crate::DEFAULT_MAX_FILE_SIZE;
use zkshare_common::{Error, FileId, PrincipalId, Result};

const STATE_FILE: &str = "store.json";

/// Local filesystem store for development and single-user setups.
pub struct LocalStore {
    root: PathBuf,
    state: RwLock<StoreState>,
    max_file_size: u64,
}

impl LocalStore {
    /// Open the store under `root`, creating the directory if needed.
    ///
    /// # Errors
    /// - I/O errors creating or reading the directory
    /// - `Serialization` if the existing document cannot be parsed
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;

        let path = root.join(STATE_FILE);
        let state = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| Error::Serialization(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(e) => return Err(e.into()),
        };
        debug!(root = %root.display(), "Opened local store");

        Ok(Self {
            root,
            state: RwLock::new(state),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        })
    }

    /// Override the accepted upload size.
    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn persist(&self, state: &StoreState) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let temp = self.root.join(format!("{}.tmp", STATE_FILE));
        fs::write(&temp, &bytes).await?;
        fs::rename(&temp, self.root.join(STATE_FILE)).await?;
        Ok(())
    }

    /// Apply `change` to a copy of the state, persist it, then publish it.
    async fn mutate<T>(&self, change: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        let output = change(&mut next)?;
        self.persist(&next).await?;
        *guard = next;
        Ok(output)
    }
}

#[async_trait]
impl AccountDirectory for LocalStore {
    async fn register(&self, registration: Registration) -> Result<PrincipalRecord> {
        let record = self.mutate(|s| s.register(registration)).await?;
        info!(principal = %record.id, username = %record.username, "Registered principal");
        Ok(record)
    }

    async fn login(&self, username: &str) -> Result<LoginResponse> {
        self.state.read().await.login(username)
    }

    async fn principal(&self, id: &PrincipalId) -> Result<PrincipalRecord> {
        self.state.read().await.principal(id)
    }

    async fn principal_by_username(&self, username: &str) -> Result<PrincipalRecord> {
        self.state.read().await.principal_by_username(username)
    }
}

#[async_trait]
impl FileStore for LocalStore {
    async fn upload(&self, upload: FileUpload) -> Result<FileMetadata> {
        let max = self.max_file_size;
        let metadata = self.mutate(|s| s.upload(upload, max)).await?;
        info!(file = %metadata.id, owner = %metadata.owner, size = metadata.size, "Stored file");
        Ok(metadata)
    }

    async fn fetch(&self, file_id: &FileId, caller: &PrincipalId) -> Result<FileFetch> {
        self.state.read().await.fetch(file_id, caller)
    }

    async fn key_access(&self, file_id: &FileId, caller: &PrincipalId) -> Result<KeyAccess> {
        self.state.read().await.key_access(file_id, caller)
    }

    async fn create_grant(&self, grant: GrantRequest) -> Result<GrantRecord> {
        let record = self.mutate(|s| s.create_grant(grant)).await?;
        info!(file = %record.file_id, recipient = %record.recipient_id, "Created grant");
        Ok(record)
    }

    async fn delete_grant(
        &self,
        file_id: &FileId,
        caller: &PrincipalId,
        recipient: &PrincipalId,
    ) -> Result<()> {
        self.mutate(|s| s.delete_grant(file_id, caller, recipient))
            .await?;
        info!(file = %file_id, recipient = %recipient, "Deleted grant");
        Ok(())
    }

    async fn list_grants(&self, file_id: &FileId, caller: &PrincipalId) -> Result<Vec<GrantRecord>> {
        self.state.read().await.list_grants(file_id, caller)
    }

    async fn shared_with(&self, principal: &PrincipalId) -> Result<Vec<SharedFile>> {
        Ok(self.state.read().await.shared_with(principal))
    }

    async fn owned_by(&self, principal: &PrincipalId) -> Result<Vec<FileMetadata>> {
        Ok(self.state.read().await.owned_by(principal))
    }

    async fn delete_file(&self, file_id: &FileId, caller: &PrincipalId) -> Result<()> {
        let grants = self.mutate(|s| s.delete_file(file_id, caller)).await?;
        info!(file = %file_id, grants, "Deleted file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registration(username: &str) -> Registration {
        Registration {
            username: username.to_string(),
            public_key: "cHVibGlj".to_string(),
            protected_private_key: "YQ==|Yg==|Yw==".to_string(),
            salt: "a1".repeat(32),
        }
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let temp = TempDir::new().unwrap();

        let alice = {
            let store = LocalStore::open(temp.path()).await.unwrap();
            store.register(registration("alice")).await.unwrap().id
        };

        let reopened = LocalStore::open(temp.path()).await.unwrap();
        assert_eq!(reopened.login("alice").await.unwrap().principal_id, alice);
        assert!(temp.path().join(STATE_FILE).exists());
        assert!(!temp.path().join("store.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_failed_mutation_is_not_persisted() {
        let temp = TempDir::new().unwrap();
        let store = LocalStore::open(temp.path()).await.unwrap();
        store.register(registration("alice")).await.unwrap();

        assert!(matches!(
            store.register(registration("alice")).await,
            Err(Error::AlreadyExists(_))
        ));

        let reopened = LocalStore::open(temp.path()).await.unwrap();
        assert!(reopened.principal_by_username("alice").await.is_ok());
    }

    #[tokio::test]
    async fn test_corrupt_document_is_reported() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(STATE_FILE), b"{ not json").unwrap();

        assert!(matches!(
            LocalStore::open(temp.path()).await,
            Err(Error::Serialization(_))
        ));
    }
}
