//! Account, file and grant state shared by the in-memory and local stores.
//!
//! All policy checks of the storage side live here so both stores enforce
//! the same rules. Methods are synchronous; callers provide the locking.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::provider::{
    FileFetch, FileMetadata, FileUpload, GrantRecord, GrantRequest, KeyAccess, LoginResponse,
    PrincipalRecord, Registration, SharedFile,
};
use zkshare_common::{Error, FileId, GrantPermissions, PrincipalId, Result};

const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;
const SALT_HEX_LENGTH: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredAccount {
    id: PrincipalId,
    username: String,
    public_key: String,
    protected_private_key: String,
    salt: String,
    created_at: DateTime<Utc>,
}

impl StoredAccount {
    fn record(&self) -> PrincipalRecord {
        PrincipalRecord {
            id: self.id.clone(),
            username: self.username.clone(),
            public_key: self.public_key.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredFile {
    metadata: FileMetadata,
    ciphertext: String,
    nonce: String,
    tag: String,
    owner_wrapped_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredGrant {
    granted_by: PrincipalId,
    wrapped_key: String,
    permissions: GrantPermissions,
    created_at: DateTime<Utc>,
}

/// How a caller reaches a file.
struct Access<'a> {
    file: &'a StoredFile,
    wrapped_key: &'a str,
    permissions: GrantPermissions,
    is_owner: bool,
}

fn require_non_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{} cannot be empty", field)));
    }
    Ok(())
}

fn require_decoded_length(value: &str, field: &str, expected: usize) -> Result<()> {
    let decoded = STANDARD
        .decode(value.trim())
        .map_err(|e| Error::InvalidInput(format!("{} is not valid base64: {}", field, e)))?;
    if decoded.len() != expected {
        return Err(Error::InvalidInput(format!(
            "{} must be {} bytes, got {}",
            field,
            expected,
            decoded.len()
        )));
    }
    Ok(())
}

/// Complete store state, serializable as one JSON document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct StoreState {
    accounts: BTreeMap<PrincipalId, StoredAccount>,
    files: BTreeMap<FileId, StoredFile>,
    grants: BTreeMap<FileId, BTreeMap<PrincipalId, StoredGrant>>,
}

impl StoreState {
    fn account_by_username(&self, username: &str) -> Option<&StoredAccount> {
        self.accounts.values().find(|a| a.username == username)
    }

    fn file(&self, file_id: &FileId) -> Result<&StoredFile> {
        self.files
            .get(file_id)
            .ok_or_else(|| Error::NotFound(format!("File not found: {}", file_id)))
    }

    fn access(&self, file_id: &FileId, caller: &PrincipalId) -> Result<Access<'_>> {
        let file = self.file(file_id)?;
        if &file.metadata.owner == caller {
            return Ok(Access {
                file,
                wrapped_key: &file.owner_wrapped_key,
                permissions: GrantPermissions::full(),
                is_owner: true,
            });
        }

        let grant = self
            .grants
            .get(file_id)
            .and_then(|grants| grants.get(caller))
            .ok_or_else(|| {
                Error::NotFound(format!("No grant on {} for {}", file_id, caller))
            })?;

        Ok(Access {
            file,
            wrapped_key: &grant.wrapped_key,
            permissions: grant.permissions,
            is_owner: false,
        })
    }

    fn require_owner(&self, file_id: &FileId, caller: &PrincipalId) -> Result<&StoredFile> {
        let file = self.file(file_id)?;
        if &file.metadata.owner != caller {
            return Err(Error::Forbidden(format!(
                "Only the owner may manage {}",
                file_id
            )));
        }
        Ok(file)
    }

    pub(crate) fn register(&mut self, registration: Registration) -> Result<PrincipalRecord> {
        require_non_empty(&registration.username, "username")?;
        require_non_empty(&registration.public_key, "publicKey")?;
        require_non_empty(&registration.protected_private_key, "protectedPrivateKey")?;
        if registration.salt.len() != SALT_HEX_LENGTH
            || !registration.salt.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(Error::InvalidInput(format!(
                "salt must be {} hex characters",
                SALT_HEX_LENGTH
            )));
        }
        if self.account_by_username(&registration.username).is_some() {
            return Err(Error::AlreadyExists(format!(
                "Username already taken: {}",
                registration.username
            )));
        }

        let account = StoredAccount {
            id: PrincipalId::generate(),
            username: registration.username,
            public_key: registration.public_key,
            protected_private_key: registration.protected_private_key,
            salt: registration.salt,
            created_at: Utc::now(),
        };
        let record = account.record();
        self.accounts.insert(account.id.clone(), account);
        Ok(record)
    }

    pub(crate) fn login(&self, username: &str) -> Result<LoginResponse> {
        let account = self
            .account_by_username(username)
            .ok_or_else(|| Error::NotFound(format!("User not found: {}", username)))?;

        Ok(LoginResponse {
            principal_id: account.id.clone(),
            username: account.username.clone(),
            public_key: account.public_key.clone(),
            protected_private_key: account.protected_private_key.clone(),
            salt: account.salt.clone(),
            token: Uuid::new_v4().to_string(),
        })
    }

    pub(crate) fn principal(&self, id: &PrincipalId) -> Result<PrincipalRecord> {
        self.accounts
            .get(id)
            .map(StoredAccount::record)
            .ok_or_else(|| Error::NotFound(format!("Principal not found: {}", id)))
    }

    pub(crate) fn principal_by_username(&self, username: &str) -> Result<PrincipalRecord> {
        self.account_by_username(username)
            .map(StoredAccount::record)
            .ok_or_else(|| Error::NotFound(format!("User not found: {}", username)))
    }

    pub(crate) fn upload(&mut self, upload: FileUpload, max_file_size: u64) -> Result<FileMetadata> {
        if !self.accounts.contains_key(&upload.owner) {
            return Err(Error::NotFound(format!("Principal not found: {}", upload.owner)));
        }
        require_non_empty(&upload.filename, "filename")?;
        require_non_empty(&upload.ciphertext, "ciphertext")?;
        require_non_empty(&upload.wrapped_key, "wrappedKey")?;
        require_decoded_length(&upload.nonce, "nonce", NONCE_LENGTH)?;
        require_decoded_length(&upload.tag, "tag", TAG_LENGTH)?;
        if upload.size > max_file_size {
            return Err(Error::InvalidInput(format!(
                "File of {} bytes exceeds the {} byte limit",
                upload.size, max_file_size
            )));
        }

        let metadata = FileMetadata {
            id: FileId::generate(),
            owner: upload.owner,
            filename: upload.filename,
            mime_type: upload.mime_type,
            size: upload.size,
            created_at: Utc::now(),
        };
        self.files.insert(
            metadata.id.clone(),
            StoredFile {
                metadata: metadata.clone(),
                ciphertext: upload.ciphertext,
                nonce: upload.nonce,
                tag: upload.tag,
                owner_wrapped_key: upload.wrapped_key,
            },
        );
        Ok(metadata)
    }

    pub(crate) fn fetch(&self, file_id: &FileId, caller: &PrincipalId) -> Result<FileFetch> {
        let access = self.access(file_id, caller)?;
        if !access.permissions.can_download {
            return Err(Error::Forbidden(format!(
                "Download of {} not permitted",
                file_id
            )));
        }

        Ok(FileFetch {
            metadata: access.file.metadata.clone(),
            ciphertext: access.file.ciphertext.clone(),
            nonce: access.file.nonce.clone(),
            tag: access.file.tag.clone(),
            wrapped_key: access.wrapped_key.to_string(),
        })
    }

    pub(crate) fn key_access(&self, file_id: &FileId, caller: &PrincipalId) -> Result<KeyAccess> {
        let access = self.access(file_id, caller)?;
        Ok(KeyAccess {
            metadata: access.file.metadata.clone(),
            wrapped_key: access.wrapped_key.to_string(),
            permissions: access.permissions,
            is_owner: access.is_owner,
        })
    }

    pub(crate) fn create_grant(&mut self, grant: GrantRequest) -> Result<GrantRecord> {
        require_non_empty(&grant.wrapped_key, "wrappedKey")?;

        let granter = self.access(&grant.file_id, &grant.granted_by)?;
        if !granter.is_owner && !granter.permissions.can_reshare {
            return Err(Error::Forbidden(format!(
                "{} may not reshare {}",
                grant.granted_by, grant.file_id
            )));
        }
        let granter_permissions = granter.permissions;
        let owner = granter.file.metadata.owner.clone();

        if grant.recipient_id == grant.granted_by || grant.recipient_id == owner {
            return Err(Error::SelfShareRejected);
        }
        let recipient = self
            .accounts
            .get(&grant.recipient_id)
            .ok_or_else(|| {
                Error::NotFound(format!("Principal not found: {}", grant.recipient_id))
            })?;
        let recipient_username = recipient.username.clone();

        let file_grants = self.grants.entry(grant.file_id.clone()).or_default();
        if file_grants.contains_key(&grant.recipient_id) {
            return Err(Error::DuplicateGrant(grant.recipient_id.to_string()));
        }

        // A resharer cannot hand out more than it holds.
        let permissions = GrantPermissions {
            can_download: grant.permissions.can_download && granter_permissions.can_download,
            can_reshare: grant.permissions.can_reshare && granter_permissions.can_reshare,
        };
        let stored = StoredGrant {
            granted_by: grant.granted_by.clone(),
            wrapped_key: grant.wrapped_key,
            permissions,
            created_at: Utc::now(),
        };
        let record = GrantRecord {
            file_id: grant.file_id,
            recipient_id: grant.recipient_id.clone(),
            recipient_username,
            granted_by: grant.granted_by,
            permissions,
            created_at: stored.created_at,
        };
        file_grants.insert(grant.recipient_id, stored);
        Ok(record)
    }

    pub(crate) fn delete_grant(
        &mut self,
        file_id: &FileId,
        caller: &PrincipalId,
        recipient: &PrincipalId,
    ) -> Result<()> {
        self.require_owner(file_id, caller)?;
        self.grants
            .get_mut(file_id)
            .and_then(|grants| grants.remove(recipient))
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("No grant on {} for {}", file_id, recipient)))
    }

    pub(crate) fn list_grants(
        &self,
        file_id: &FileId,
        caller: &PrincipalId,
    ) -> Result<Vec<GrantRecord>> {
        self.require_owner(file_id, caller)?;
        let Some(grants) = self.grants.get(file_id) else {
            return Ok(Vec::new());
        };

        Ok(grants
            .iter()
            .map(|(recipient_id, grant)| GrantRecord {
                file_id: file_id.clone(),
                recipient_id: recipient_id.clone(),
                recipient_username: self
                    .accounts
                    .get(recipient_id)
                    .map(|a| a.username.clone())
                    .unwrap_or_default(),
                granted_by: grant.granted_by.clone(),
                permissions: grant.permissions,
                created_at: grant.created_at,
            })
            .collect())
    }

    pub(crate) fn shared_with(&self, principal: &PrincipalId) -> Vec<SharedFile> {
        let mut shared: Vec<SharedFile> = self
            .grants
            .iter()
            .filter_map(|(file_id, grants)| {
                let grant = grants.get(principal)?;
                let file = self.files.get(file_id)?;
                Some(SharedFile {
                    metadata: file.metadata.clone(),
                    granted_by: grant.granted_by.clone(),
                    permissions: grant.permissions,
                    shared_at: grant.created_at,
                })
            })
            .collect();
        shared.sort_by(|a, b| b.shared_at.cmp(&a.shared_at));
        shared
    }

    pub(crate) fn owned_by(&self, principal: &PrincipalId) -> Vec<FileMetadata> {
        let mut owned: Vec<FileMetadata> = self
            .files
            .values()
            .filter(|f| &f.metadata.owner == principal)
            .map(|f| f.metadata.clone())
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned
    }

    pub(crate) fn delete_file(&mut self, file_id: &FileId, caller: &PrincipalId) -> Result<usize> {
        self.require_owner(file_id, caller)?;
        self.files.remove(file_id);
        Ok(self.grants.remove(file_id).map(|g| g.len()).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: u64 = 1024;

    fn b64(len: usize) -> String {
        STANDARD.encode(vec![1u8; len])
    }

    fn register(state: &mut StoreState, username: &str) -> PrincipalId {
        state
            .register(Registration {
                username: username.to_string(),
                public_key: b64(32),
                protected_private_key: "YQ==|Yg==|Yw==".to_string(),
                salt: "ab".repeat(32),
            })
            .unwrap()
            .id
    }

    fn upload(state: &mut StoreState, owner: &PrincipalId) -> FileId {
        state
            .upload(
                FileUpload {
                    owner: owner.clone(),
                    filename: "notes.txt".to_string(),
                    mime_type: "text/plain".to_string(),
                    size: 5,
                    ciphertext: b64(5),
                    nonce: b64(NONCE_LENGTH),
                    tag: b64(TAG_LENGTH),
                    wrapped_key: b64(512),
                },
                MAX,
            )
            .unwrap()
            .id
    }

    fn grant(file_id: &FileId, by: &PrincipalId, to: &PrincipalId, perms: GrantPermissions) -> GrantRequest {
        GrantRequest {
            file_id: file_id.clone(),
            granted_by: by.clone(),
            recipient_id: to.clone(),
            wrapped_key: b64(512),
            permissions: perms,
        }
    }

    #[test]
    fn test_username_is_unique() {
        let mut state = StoreState::default();
        register(&mut state, "alice");
        let result = state.register(Registration {
            username: "alice".to_string(),
            public_key: b64(32),
            protected_private_key: "a|b|c".to_string(),
            salt: "00".repeat(32),
        });
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn test_register_rejects_bad_salt() {
        let mut state = StoreState::default();
        let result = state.register(Registration {
            username: "alice".to_string(),
            public_key: b64(32),
            protected_private_key: "a|b|c".to_string(),
            salt: "0".repeat(63),
        });
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_upload_validates_lengths_and_limit() {
        let mut state = StoreState::default();
        let alice = register(&mut state, "alice");
        let base = FileUpload {
            owner: alice,
            filename: "f".to_string(),
            mime_type: "application/octet-stream".to_string(),
            size: 5,
            ciphertext: b64(5),
            nonce: b64(NONCE_LENGTH),
            tag: b64(TAG_LENGTH),
            wrapped_key: b64(512),
        };

        let mut bad_nonce = base.clone();
        bad_nonce.nonce = b64(11);
        assert!(matches!(state.upload(bad_nonce, MAX), Err(Error::InvalidInput(_))));

        let mut bad_tag = base.clone();
        bad_tag.tag = b64(15);
        assert!(matches!(state.upload(bad_tag, MAX), Err(Error::InvalidInput(_))));

        let mut no_key = base.clone();
        no_key.wrapped_key = String::new();
        assert!(matches!(state.upload(no_key, MAX), Err(Error::InvalidInput(_))));

        let mut too_big = base.clone();
        too_big.size = MAX + 1;
        assert!(matches!(state.upload(too_big, MAX), Err(Error::InvalidInput(_))));

        assert!(state.upload(base, MAX).is_ok());
    }

    #[test]
    fn test_grant_policy() {
        let mut state = StoreState::default();
        let alice = register(&mut state, "alice");
        let bob = register(&mut state, "bob");
        let carol = register(&mut state, "carol");
        let file = upload(&mut state, &alice);

        assert!(matches!(
            state.create_grant(grant(&file, &alice, &alice, GrantPermissions::default())),
            Err(Error::SelfShareRejected)
        ));

        state
            .create_grant(grant(&file, &alice, &bob, GrantPermissions::default()))
            .unwrap();
        assert!(matches!(
            state.create_grant(grant(&file, &alice, &bob, GrantPermissions::default())),
            Err(Error::DuplicateGrant(_))
        ));

        // bob lacks canReshare
        assert!(matches!(
            state.create_grant(grant(&file, &bob, &carol, GrantPermissions::default())),
            Err(Error::Forbidden(_))
        ));

        // carol holds nothing
        assert!(matches!(
            state.create_grant(grant(&file, &carol, &bob, GrantPermissions::default())),
            Err(Error::NotFound(_))
        ));

        let ghost = PrincipalId::new("ghost").unwrap();
        assert!(matches!(
            state.create_grant(grant(&file, &alice, &ghost, GrantPermissions::default())),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_reshare_cannot_escalate() {
        let mut state = StoreState::default();
        let alice = register(&mut state, "alice");
        let bob = register(&mut state, "bob");
        let carol = register(&mut state, "carol");
        let file = upload(&mut state, &alice);

        let view_and_reshare = GrantPermissions {
            can_download: false,
            can_reshare: true,
        };
        state
            .create_grant(grant(&file, &alice, &bob, view_and_reshare))
            .unwrap();
        let record = state
            .create_grant(grant(&file, &bob, &carol, GrantPermissions::full()))
            .unwrap();

        assert!(!record.permissions.can_download);
        assert!(record.permissions.can_reshare);

        assert!(matches!(
            state.create_grant(grant(&file, &bob, &alice, GrantPermissions::default())),
            Err(Error::SelfShareRejected)
        ));
    }

    #[test]
    fn test_fetch_requires_download_permission() {
        let mut state = StoreState::default();
        let alice = register(&mut state, "alice");
        let bob = register(&mut state, "bob");
        let file = upload(&mut state, &alice);

        let no_download = GrantPermissions {
            can_download: false,
            can_reshare: false,
        };
        state.create_grant(grant(&file, &alice, &bob, no_download)).unwrap();

        assert!(matches!(state.fetch(&file, &bob), Err(Error::Forbidden(_))));
        assert!(state.key_access(&file, &bob).is_ok());
        assert!(state.fetch(&file, &alice).is_ok());
    }

    #[test]
    fn test_delete_grant_and_listings() {
        let mut state = StoreState::default();
        let alice = register(&mut state, "alice");
        let bob = register(&mut state, "bob");
        let carol = register(&mut state, "carol");
        let file = upload(&mut state, &alice);

        state.create_grant(grant(&file, &alice, &bob, GrantPermissions::default())).unwrap();
        state.create_grant(grant(&file, &alice, &carol, GrantPermissions::default())).unwrap();
        assert_eq!(state.list_grants(&file, &alice).unwrap().len(), 2);
        assert!(matches!(state.list_grants(&file, &bob), Err(Error::Forbidden(_))));
        assert!(matches!(state.delete_grant(&file, &bob, &carol), Err(Error::Forbidden(_))));

        state.delete_grant(&file, &alice, &bob).unwrap();
        assert!(matches!(state.delete_grant(&file, &alice, &bob), Err(Error::NotFound(_))));
        assert!(matches!(state.fetch(&file, &bob), Err(Error::NotFound(_))));
        assert!(state.fetch(&file, &carol).is_ok());

        assert!(state.shared_with(&bob).is_empty());
        assert_eq!(state.shared_with(&carol).len(), 1);
        assert_eq!(state.owned_by(&alice).len(), 1);
    }

    #[test]
    fn test_delete_file_removes_grants() {
        let mut state = StoreState::default();
        let alice = register(&mut state, "alice");
        let bob = register(&mut state, "bob");
        let file = upload(&mut state, &alice);
        state.create_grant(grant(&file, &alice, &bob, GrantPermissions::default())).unwrap();

        assert!(matches!(state.delete_file(&file, &bob), Err(Error::Forbidden(_))));
        assert_eq!(state.delete_file(&file, &alice).unwrap(), 1);
        assert!(matches!(state.fetch(&file, &alice), Err(Error::NotFound(_))));
        assert!(state.shared_with(&bob).is_empty());
    }

    #[test]
    fn test_state_serializes() {
        let mut state = StoreState::default();
        let alice = register(&mut state, "alice");
        let bob = register(&mut state, "bob");
        let file = upload(&mut state, &alice);
        state.create_grant(grant(&file, &alice, &bob, GrantPermissions::default())).unwrap();

        let json = serde_json::to_vec(&state).unwrap();
        let restored: StoreState = serde_json::from_slice(&json).unwrap();
        assert!(restored.fetch(&file, &bob).is_ok());
        assert_eq!(restored.login("alice").unwrap().principal_id, alice);
    }
}
