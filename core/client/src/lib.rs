//! Client core for zkshare.
//!
//! Ties the crypto services to the account and file stores:
//! - Registration and login (identity keys sealed under the password)
//! - Upload and download of envelope-encrypted files
//! - The share protocol, unsharing and grant listings
//!
//! Every secret stays on the client. Stores receive only ciphertext,
//! public keys, sealed private keys and wrapped content keys.

pub mod account;
pub mod config;
pub mod files;
pub mod session;
pub mod share;

use std::sync::Arc;

use zkshare_common::{Error, Result};
use zkshare_crypto::CryptoProvider;
use zkshare_storage::{AccountDirectory, FileStore};

pub use config::{ClientConfig, CONFIG_FILENAME};
pub use files::DownloadedFile;
pub use session::{SessionState, UserSession};
pub use share::{RecipientReport, ShareProtocol, ShareReport, ShareState, ShareTarget};

/// Entry point for all client operations.
#[derive(Clone)]
pub struct Client {
    config: ClientConfig,
    provider: CryptoProvider,
    accounts: Arc<dyn AccountDirectory>,
    files: Arc<dyn FileStore>,
}

impl Client {
    /// Create a client using the system crypto engines.
    pub fn new(
        config: ClientConfig,
        accounts: Arc<dyn AccountDirectory>,
        files: Arc<dyn FileStore>,
    ) -> Result<Self> {
        config.validate()?;
        let provider = CryptoProvider::system(&config.kdf);
        Ok(Self {
            config,
            provider,
            accounts,
            files,
        })
    }

    /// Replace the crypto engines.
    pub fn with_provider(mut self, provider: CryptoProvider) -> Self {
        self.provider = provider;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn provider(&self) -> &CryptoProvider {
        &self.provider
    }

    pub fn accounts(&self) -> Arc<dyn AccountDirectory> {
        self.accounts.clone()
    }

    pub fn files(&self) -> Arc<dyn FileStore> {
        self.files.clone()
    }

    /// The share protocol bound to this client's stores.
    pub fn share_protocol(&self) -> ShareProtocol {
        ShareProtocol::new(
            self.provider.clone(),
            self.accounts.clone(),
            self.files.clone(),
            self.config.default_permissions,
        )
    }
}

/// Run CPU-bound crypto (key generation, key derivation, bulk AEAD, RSA)
/// on the blocking pool so other tasks keep running.
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::Crypto(format!("Background task failed: {}", e)))?
}
