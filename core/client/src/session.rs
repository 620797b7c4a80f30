//! User session management.
//!
//! A session holds the unsealed private identity key for as long as the
//! user is logged in. The key is dropped (and zeroized) when the session
//! is locked or dropped.

use std::fmt;
use std::sync::Arc;

use zkshare_common::{Error, PrincipalId, Result};
use zkshare_crypto::{IdentityPrivateKey, IdentityPublicKey};

/// State of a user session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The private key is available.
    Active,
    /// The private key has been cleared.
    Locked,
}

/// A logged-in principal.
pub struct UserSession {
    principal_id: PrincipalId,
    username: String,
    public_key: IdentityPublicKey,
    private_key: Option<Arc<IdentityPrivateKey>>,
    /// Opaque bearer token from the account directory.
    token: String,
    state: SessionState,
}

impl UserSession {
    pub(crate) fn new(
        principal_id: PrincipalId,
        username: String,
        private_key: IdentityPrivateKey,
        token: String,
    ) -> Self {
        Self {
            principal_id,
            username,
            public_key: private_key.public_key(),
            private_key: Some(Arc::new(private_key)),
            token,
            state: SessionState::Active,
        }
    }

    pub fn principal_id(&self) -> &PrincipalId {
        &self.principal_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn public_key(&self) -> &IdentityPublicKey {
        &self.public_key
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Get the private key, if the session is active.
    ///
    /// # Errors
    /// - `NotPermitted` if the session is locked
    pub fn private_key(&self) -> Result<&IdentityPrivateKey> {
        self.active_key().map(Arc::as_ref)
    }

    /// Shared handle to the private key, for work moved off the scheduler.
    ///
    /// Locking the session does not revoke a handle already taken; the key
    /// is zeroized once the last handle is dropped.
    pub(crate) fn private_key_handle(&self) -> Result<Arc<IdentityPrivateKey>> {
        self.active_key().cloned()
    }

    fn active_key(&self) -> Result<&Arc<IdentityPrivateKey>> {
        match self.state {
            SessionState::Active => self
                .private_key
                .as_ref()
                .ok_or_else(|| Error::NotPermitted("Private key not available".to_string())),
            SessionState::Locked => Err(Error::NotPermitted("Session is locked".to_string())),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Lock the session, dropping the private key.
    ///
    /// # Postconditions
    /// - The private key is zeroized and removed
    /// - Operations needing the private key fail with `NotPermitted`
    pub fn lock(&mut self) {
        self.private_key.take();
        self.token.clear();
        self.state = SessionState::Locked;
    }
}

impl fmt::Debug for UserSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserSession")
            .field("principal_id", &self.principal_id)
            .field("username", &self.username)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Drop for UserSession {
    fn drop(&mut self) {
        self.lock();
    }
}
