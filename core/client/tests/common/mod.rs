//! Shared fixtures for the client integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use rsa::{RsaPrivateKey, RsaPublicKey};

use zkshare_client::{Client, ClientConfig, UserSession};
use zkshare_common::{FileId, PrincipalId, Result};
use zkshare_crypto::identity::MODULUS_BITS;
use zkshare_crypto::provider::{AsymmetricCipher, OsRandom, RsaOaepCipher, SecureRandom};
use zkshare_crypto::{CryptoProvider, KdfParams};
use zkshare_storage::{
    FileFetch, FileMetadata, FileStore, FileUpload, GrantRecord, GrantRequest, KeyAccess,
    MemoryStore, SharedFile,
};

const POOL_SIZE: usize = 4;

static POOL: OnceLock<Vec<RsaPrivateKey>> = OnceLock::new();

fn pool() -> &'static [RsaPrivateKey] {
    POOL.get_or_init(|| {
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..POOL_SIZE)
                .map(|_| scope.spawn(|| RsaOaepCipher.generate(&OsRandom, MODULUS_BITS).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    })
}

/// Hands out pre-generated RSA-4096 keys; each provider instance starts at
/// the first one, so users within one test get distinct identities.
#[derive(Default)]
pub struct PooledKeys {
    next: AtomicUsize,
}

impl AsymmetricCipher for PooledKeys {
    fn generate(&self, _random: &dyn SecureRandom, bits: usize) -> Result<RsaPrivateKey> {
        assert_eq!(bits, MODULUS_BITS);
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        assert!(index < POOL_SIZE, "test registered more than {} users", POOL_SIZE);
        Ok(pool()[index].clone())
    }

    fn encrypt(
        &self,
        random: &dyn SecureRandom,
        key: &RsaPublicKey,
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        RsaOaepCipher.encrypt(random, key, plaintext)
    }

    fn decrypt(
        &self,
        random: &dyn SecureRandom,
        key: &RsaPrivateKey,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        RsaOaepCipher.decrypt(random, key, ciphertext)
    }
}

pub fn test_config() -> ClientConfig {
    ClientConfig::default().with_kdf(KdfParams::pbkdf2(1_000))
}

pub fn test_provider(config: &ClientConfig) -> CryptoProvider {
    CryptoProvider::system(&config.kdf).with_asymmetric(Arc::new(PooledKeys::default()))
}

pub fn client_over<F>(accounts: Arc<MemoryStore>, files: Arc<F>) -> Client
where
    F: FileStore + 'static,
{
    let config = test_config();
    let provider = test_provider(&config);
    Client::new(config, accounts, files)
        .unwrap()
        .with_provider(provider)
}

pub fn memory_client() -> (Client, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (client_over(store.clone(), store.clone()), store)
}

pub fn password_for(username: &str) -> String {
    format!("{}-correct-horse", username)
}

/// Register `username` and log in.
pub async fn user(client: &Client, username: &str) -> UserSession {
    let password = password_for(username);
    client.register(username, &password).await.unwrap();
    client.login(username, &password).await.unwrap()
}

/// Counts calls into the wrapped file store and optionally delays grants.
pub struct InstrumentedStore {
    inner: Arc<MemoryStore>,
    calls: AtomicUsize,
    grant_delay: Option<Duration>,
}

impl InstrumentedStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            grant_delay: None,
        }
    }

    pub fn with_grant_delay(mut self, delay: Duration) -> Self {
        self.grant_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl FileStore for InstrumentedStore {
    async fn upload(&self, upload: FileUpload) -> Result<FileMetadata> {
        self.count();
        self.inner.upload(upload).await
    }

    async fn fetch(&self, file_id: &FileId, caller: &PrincipalId) -> Result<FileFetch> {
        self.count();
        self.inner.fetch(file_id, caller).await
    }

    async fn key_access(&self, file_id: &FileId, caller: &PrincipalId) -> Result<KeyAccess> {
        self.count();
        self.inner.key_access(file_id, caller).await
    }

    async fn create_grant(&self, grant: GrantRequest) -> Result<GrantRecord> {
        self.count();
        if let Some(delay) = self.grant_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.create_grant(grant).await
    }

    async fn delete_grant(
        &self,
        file_id: &FileId,
        caller: &PrincipalId,
        recipient: &PrincipalId,
    ) -> Result<()> {
        self.count();
        self.inner.delete_grant(file_id, caller, recipient).await
    }

    async fn list_grants(&self, file_id: &FileId, caller: &PrincipalId) -> Result<Vec<GrantRecord>> {
        self.count();
        self.inner.list_grants(file_id, caller).await
    }

    async fn shared_with(&self, principal: &PrincipalId) -> Result<Vec<SharedFile>> {
        self.count();
        self.inner.shared_with(principal).await
    }

    async fn owned_by(&self, principal: &PrincipalId) -> Result<Vec<FileMetadata>> {
        self.count();
        self.inner.owned_by(principal).await
    }

    async fn delete_file(&self, file_id: &FileId, caller: &PrincipalId) -> Result<()> {
        self.count();
        self.inner.delete_file(file_id, caller).await
    }
}
