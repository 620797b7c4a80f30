//! In-memory store for tests and development.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::provider::{
    AccountDirectory, FileFetch, FileMetadata, FileStore, FileUpload, GrantRecord, GrantRequest,
    KeyAccess, LoginResponse, PrincipalRecord, Registration, SharedFile,
};
use crate::state::StoreState;
use crate::DEFAULT_MAX_FILE_SIZE;
use zkshare_common::{FileId, PrincipalId, Result};

/// In-memory account directory and file store.
///
/// All data is lost on drop.
pub struct MemoryStore {
    state: RwLock<StoreState>,
    max_file_size: u64,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    /// Override the accepted upload size.
    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountDirectory for MemoryStore {
    async fn register(&self, registration: Registration) -> Result<PrincipalRecord> {
        let record = self.state.write().await.register(registration)?;
        info!(principal = %record.id, username = %record.username, "Registered principal");
        Ok(record)
    }

    async fn login(&self, username: &str) -> Result<LoginResponse> {
        let response = self.state.read().await.login(username)?;
        debug!(principal = %response.principal_id, "Issued login material");
        Ok(response)
    }

    async fn principal(&self, id: &PrincipalId) -> Result<PrincipalRecord> {
        self.state.read().await.principal(id)
    }

    async fn principal_by_username(&self, username: &str) -> Result<PrincipalRecord> {
        self.state.read().await.principal_by_username(username)
    }
}

#[async_trait]
impl FileStore for MemoryStore {
    async fn upload(&self, upload: FileUpload) -> Result<FileMetadata> {
        let metadata = self.state.write().await.upload(upload, self.max_file_size)?;
        info!(file = %metadata.id, owner = %metadata.owner, size = metadata.size, "Stored file");
        Ok(metadata)
    }

    async fn fetch(&self, file_id: &FileId, caller: &PrincipalId) -> Result<FileFetch> {
        debug!(file = %file_id, caller = %caller, "Fetching file");
        self.state.read().await.fetch(file_id, caller)
    }

    async fn key_access(&self, file_id: &FileId, caller: &PrincipalId) -> Result<KeyAccess> {
        self.state.read().await.key_access(file_id, caller)
    }

    async fn create_grant(&self, grant: GrantRequest) -> Result<GrantRecord> {
        let record = self.state.write().await.create_grant(grant)?;
        info!(file = %record.file_id, recipient = %record.recipient_id, "Created grant");
        Ok(record)
    }

    async fn delete_grant(
        &self,
        file_id: &FileId,
        caller: &PrincipalId,
        recipient: &PrincipalId,
    ) -> Result<()> {
        self.state
            .write()
            .await
            .delete_grant(file_id, caller, recipient)?;
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
        let grants = self.state.write().await.delete_file(file_id, caller)?;
        info!(file = %file_id, grants, "Deleted file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zkshare_common::{Error, GrantPermissions};

    fn registration(username: &str) -> Registration {
        Registration {
            username: username.to_string(),
            public_key: "cHVibGlj".to_string(),
            protected_private_key: "YQ==|Yg==|Yw==".to_string(),
            salt: "0f".repeat(32),
        }
    }

    fn upload_for(owner: &PrincipalId, size: u64) -> FileUpload {
        FileUpload {
            owner: owner.clone(),
            filename: "report.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            size,
            ciphertext: "Y2lwaGVy".to_string(),
            nonce: "AAAAAAAAAAAAAAAA".to_string(),
            tag: "AAAAAAAAAAAAAAAAAAAAAA==".to_string(),
            wrapped_key: "d3JhcHBlZA==".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let store = MemoryStore::new();
        let record = store.register(registration("alice")).await.unwrap();

        let login = store.login("alice").await.unwrap();
        assert_eq!(login.principal_id, record.id);
        assert_eq!(login.public_key, "cHVibGlj");
        assert!(!login.token.is_empty());

        assert_eq!(store.principal_by_username("alice").await.unwrap(), record);
        assert!(matches!(store.login("bob").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_upload_respects_limit() {
        let store = MemoryStore::new().with_max_file_size(10);
        let alice = store.register(registration("alice")).await.unwrap().id;

        assert!(store.upload(upload_for(&alice, 10)).await.is_ok());
        assert!(matches!(
            store.upload(upload_for(&alice, 11)).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_grant_lifecycle() {
        let store = MemoryStore::new();
        let alice = store.register(registration("alice")).await.unwrap().id;
        let bob = store.register(registration("bob")).await.unwrap().id;
        let file = store.upload(upload_for(&alice, 6)).await.unwrap().id;

        store
            .create_grant(GrantRequest {
                file_id: file.clone(),
                granted_by: alice.clone(),
                recipient_id: bob.clone(),
                wrapped_key: "Ym9i".to_string(),
                permissions: GrantPermissions::default(),
            })
            .await
            .unwrap();

        let fetched = store.fetch(&file, &bob).await.unwrap();
        assert_eq!(fetched.wrapped_key, "Ym9i");
        assert_eq!(store.shared_with(&bob).await.unwrap().len(), 1);

        store.delete_grant(&file, &alice, &bob).await.unwrap();
        assert!(matches!(store.fetch(&file, &bob).await, Err(Error::NotFound(_))));
    }
}
