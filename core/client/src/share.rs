//! The share protocol.
//!
//! One share operation moves through
//! `Fetching -> Unwrapping -> FanOutWrapping -> Uploading -> Done`, or to
//! `Failed` from any of them. The caller's own wrapped content key is
//! fetched and unwrapped once, then re-wrapped for every recipient and
//! uploaded as one grant per recipient.
//!
//! Fan-out is settle-all: wrapping and uploading each run as a set of
//! independent futures joined at a single point, and every recipient gets
//! its own outcome. Recipients that succeeded are not rolled back when
//! others fail.
//!
//! Revoking a grant deletes that recipient's wrapped copy only. The content
//! key is not rotated and the file is not re-encrypted, so a principal that
//! kept the unwrapped key before revocation can still read the unchanged
//! ciphertext.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::session::UserSession;
use crate::{run_blocking, Client};
use zkshare_common::{Error, FileId, GrantPermissions, PrincipalId, Result};
use zkshare_crypto::{ContentKey, CryptoProvider, IdentityPublicKey, KeyEnvelope, WrappedKey};
use zkshare_storage::{AccountDirectory, FileStore, GrantRecord, GrantRequest, SharedFile};

/// Stage of a share operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareState {
    Fetching,
    Unwrapping,
    FanOutWrapping,
    Uploading,
    Done,
    Failed,
}

impl fmt::Display for ShareState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShareState::Fetching => "fetching",
            ShareState::Unwrapping => "unwrapping",
            ShareState::FanOutWrapping => "fan-out-wrapping",
            ShareState::Uploading => "uploading",
            ShareState::Done => "done",
            ShareState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One recipient of a share.
#[derive(Debug, Clone)]
pub struct ShareTarget {
    pub recipient: PrincipalId,
    /// Resolved from the account directory when absent.
    pub public_key: Option<IdentityPublicKey>,
    /// Falls back to the client's default permissions when absent.
    pub permissions: Option<GrantPermissions>,
}

impl ShareTarget {
    pub fn new(recipient: PrincipalId) -> Self {
        Self {
            recipient,
            public_key: None,
            permissions: None,
        }
    }

    pub fn with_public_key(mut self, public_key: IdentityPublicKey) -> Self {
        self.public_key = Some(public_key);
        self
    }

    pub fn with_permissions(mut self, permissions: GrantPermissions) -> Self {
        self.permissions = Some(permissions);
        self
    }
}

/// Outcome for a single recipient.
#[derive(Debug)]
pub struct RecipientReport {
    pub recipient: PrincipalId,
    pub outcome: Result<GrantRecord>,
}

impl RecipientReport {
    pub fn is_granted(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Result of a share operation that got past its batch-level checks.
#[derive(Debug)]
pub struct ShareReport {
    pub file_id: FileId,
    /// States visited, in order.
    pub states: Vec<ShareState>,
    /// One entry per requested recipient, in request order.
    pub recipients: Vec<RecipientReport>,
}

impl ShareReport {
    /// Final state of the operation.
    pub fn state(&self) -> ShareState {
        self.states.last().copied().unwrap_or(ShareState::Done)
    }

    pub fn granted(&self) -> impl Iterator<Item = &RecipientReport> {
        self.recipients.iter().filter(|r| r.is_granted())
    }

    pub fn failed(&self) -> impl Iterator<Item = &RecipientReport> {
        self.recipients.iter().filter(|r| !r.is_granted())
    }

    pub fn all_granted(&self) -> bool {
        self.recipients.iter().all(RecipientReport::is_granted)
    }

    /// Outcome for `recipient`, if it was part of the request.
    pub fn outcome_for(&self, recipient: &PrincipalId) -> Option<&Result<GrantRecord>> {
        self.recipients
            .iter()
            .find(|r| &r.recipient == recipient)
            .map(|r| &r.outcome)
    }
}

/// Tracks the state path of one operation.
struct Progress<'a> {
    file_id: &'a FileId,
    states: Vec<ShareState>,
}

impl<'a> Progress<'a> {
    fn new(file_id: &'a FileId) -> Self {
        Self {
            file_id,
            states: Vec::new(),
        }
    }

    fn enter(&mut self, state: ShareState) {
        debug!(file = %self.file_id, %state, "Share state");
        self.states.push(state);
    }

    fn fail(&mut self, error: Error) -> Error {
        let from = self.states.last().copied().unwrap_or(ShareState::Fetching);
        warn!(file = %self.file_id, %from, error = %error, "Share failed");
        self.states.push(ShareState::Failed);
        error
    }
}

/// Grants access to a file to further principals.
#[derive(Clone)]
pub struct ShareProtocol {
    envelope: KeyEnvelope,
    accounts: Arc<dyn AccountDirectory>,
    files: Arc<dyn FileStore>,
    default_permissions: GrantPermissions,
}

impl ShareProtocol {
    pub fn new(
        provider: CryptoProvider,
        accounts: Arc<dyn AccountDirectory>,
        files: Arc<dyn FileStore>,
        default_permissions: GrantPermissions,
    ) -> Self {
        Self {
            envelope: KeyEnvelope::new(provider),
            accounts,
            files,
            default_permissions,
        }
    }

    /// Share `file_id` with every target.
    ///
    /// Targets naming the caller fail with `SelfShareRejected` and repeated
    /// targets fail with `DuplicateGrant`, both before any store call. If no
    /// target remains, the stores are never contacted.
    ///
    /// # Errors
    /// Batch-level failures only; per-recipient failures are in the report.
    /// - `InvalidInput` for an empty target list
    /// - `NotPermitted` if the session is locked
    /// - `NotFound` if the file is gone or the caller holds no grant
    /// - `Forbidden` if the caller holds a grant without `canReshare`
    /// - `AuthenticationFailure` / `KeySizeMismatch` if the caller's wrapped
    ///   key cannot be unwrapped
    pub async fn share(
        &self,
        session: &UserSession,
        file_id: &FileId,
        targets: Vec<ShareTarget>,
    ) -> Result<ShareReport> {
        if targets.is_empty() {
            return Err(Error::InvalidInput("no share recipients given".to_string()));
        }
        let caller = session.principal_id();
        let private_key = session.private_key_handle()?;

        let mut reports: Vec<(usize, RecipientReport)> = Vec::with_capacity(targets.len());
        let mut pending = Vec::with_capacity(targets.len());
        let mut seen = HashSet::new();
        for (index, target) in targets.into_iter().enumerate() {
            let rejection = if &target.recipient == caller {
                Some(Error::SelfShareRejected)
            } else if !seen.insert(target.recipient.clone()) {
                Some(Error::DuplicateGrant(target.recipient.to_string()))
            } else {
                None
            };
            match rejection {
                Some(error) => reports.push((
                    index,
                    RecipientReport {
                        recipient: target.recipient,
                        outcome: Err(error),
                    },
                )),
                None => pending.push((index, target)),
            }
        }

        let mut progress = Progress::new(file_id);
        if pending.is_empty() {
            progress.enter(ShareState::Done);
            return Ok(Self::finish(file_id, progress, reports));
        }

        progress.enter(ShareState::Fetching);
        let access = match self.files.key_access(file_id, caller).await {
            Ok(access) => access,
            Err(e) => return Err(progress.fail(e)),
        };
        if !access.is_owner && !access.permissions.can_reshare {
            return Err(progress.fail(Error::Forbidden(format!(
                "{} may not reshare {}",
                caller, file_id
            ))));
        }
        let owner = access.metadata.owner;

        progress.enter(ShareState::Unwrapping);
        let envelope = self.envelope.clone();
        let wrapped_key = access.wrapped_key;
        let unwrapped = run_blocking(move || {
            let wrapped = WrappedKey::from_base64(wrapped_key)?;
            envelope.unwrap(&wrapped, &private_key)
        })
        .await;
        let content_key = match unwrapped {
            Ok(key) => Arc::new(key),
            Err(e) => return Err(progress.fail(e)),
        };

        progress.enter(ShareState::FanOutWrapping);
        let wrapping = pending.into_iter().map(|(index, target)| {
            let content_key = Arc::clone(&content_key);
            let owner = &owner;
            async move {
                let wrapped = if &target.recipient == owner {
                    Err(Error::SelfShareRejected)
                } else {
                    self.wrap_for(&target, content_key).await
                };
                (index, target, wrapped)
            }
        });
        let wrapped = join_all(wrapping).await;
        drop(content_key);

        progress.enter(ShareState::Uploading);
        let mut requests = Vec::with_capacity(wrapped.len());
        for (index, target, result) in wrapped {
            match result {
                Ok(wrapped_key) => requests.push((
                    index,
                    GrantRequest {
                        file_id: file_id.clone(),
                        granted_by: caller.clone(),
                        recipient_id: target.recipient,
                        wrapped_key: wrapped_key.into_string(),
                        permissions: target.permissions.unwrap_or(self.default_permissions),
                    },
                )),
                Err(error) => reports.push((
                    index,
                    RecipientReport {
                        recipient: target.recipient,
                        outcome: Err(error),
                    },
                )),
            }
        }

        let uploads = requests.into_iter().map(|(index, request)| async move {
            let recipient = request.recipient_id.clone();
            let outcome = self.files.create_grant(request).await;
            (
                index,
                RecipientReport {
                    recipient,
                    outcome,
                },
            )
        });
        reports.extend(join_all(uploads).await);

        progress.enter(ShareState::Done);
        let report = Self::finish(file_id, progress, reports);
        info!(
            file = %file_id,
            granted = report.granted().count(),
            failed = report.failed().count(),
            "Share complete"
        );
        Ok(report)
    }

    fn finish(
        file_id: &FileId,
        progress: Progress<'_>,
        mut reports: Vec<(usize, RecipientReport)>,
    ) -> ShareReport {
        reports.sort_by_key(|(index, _)| *index);
        ShareReport {
            file_id: file_id.clone(),
            states: progress.states,
            recipients: reports.into_iter().map(|(_, report)| report).collect(),
        }
    }

    async fn wrap_for(
        &self,
        target: &ShareTarget,
        content_key: Arc<ContentKey>,
    ) -> Result<WrappedKey> {
        let public_key = match &target.public_key {
            Some(key) => key.clone(),
            None => {
                let record = self.accounts.principal(&target.recipient).await?;
                IdentityPublicKey::from_base64(&record.public_key)?
            }
        };
        let envelope = self.envelope.clone();
        run_blocking(move || envelope.wrap(&content_key, &public_key)).await
    }

    /// Revoke exactly the (file, recipient) grant.
    ///
    /// No re-wrapping and no content key rotation take place.
    ///
    /// # Errors
    /// - `NotFound` if no such grant exists
    /// - `Forbidden` if the caller does not own the file
    pub async fn unshare(
        &self,
        session: &UserSession,
        file_id: &FileId,
        recipient: &PrincipalId,
    ) -> Result<()> {
        self.files
            .delete_grant(file_id, session.principal_id(), recipient)
            .await?;
        info!(file = %file_id, recipient = %recipient, "Grant revoked");
        Ok(())
    }

    /// List every grant of an owned file.
    pub async fn list_grants(&self, session: &UserSession, file_id: &FileId) -> Result<Vec<GrantRecord>> {
        self.files.list_grants(file_id, session.principal_id()).await
    }

    /// List the files shared with the caller.
    pub async fn shared_with_me(&self, session: &UserSession) -> Result<Vec<SharedFile>> {
        self.files.shared_with(session.principal_id()).await
    }
}

impl Client {
    /// See [`ShareProtocol::share`].
    pub async fn share(
        &self,
        session: &UserSession,
        file_id: &FileId,
        targets: Vec<ShareTarget>,
    ) -> Result<ShareReport> {
        self.share_protocol().share(session, file_id, targets).await
    }

    /// See [`ShareProtocol::unshare`].
    pub async fn unshare(
        &self,
        session: &UserSession,
        file_id: &FileId,
        recipient: &PrincipalId,
    ) -> Result<()> {
        self.share_protocol().unshare(session, file_id, recipient).await
    }

    /// See [`ShareProtocol::list_grants`].
    pub async fn list_grants(&self, session: &UserSession, file_id: &FileId) -> Result<Vec<GrantRecord>> {
        self.share_protocol().list_grants(session, file_id).await
    }

    /// See [`ShareProtocol::shared_with_me`].
    pub async fn shared_with_me(&self, session: &UserSession) -> Result<Vec<SharedFile>> {
        self.share_protocol().shared_with_me(session).await
    }
}
