//! Client configuration.

use serde::{Deserialize, Serialize};

use zkshare_common::{Error, GrantPermissions, Result};
use zkshare_crypto::KdfParams;
use zkshare_storage::DEFAULT_MAX_FILE_SIZE;

/// Configuration file name inside a store directory.
pub const CONFIG_FILENAME: &str = "config.json";

/// Tunables of the client core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Password KDF used when protecting a private key.
    pub kdf: KdfParams,
    /// Largest plaintext accepted for upload, in bytes.
    pub max_file_size: u64,
    /// Permissions granted when a share target does not specify any.
    pub default_permissions: GrantPermissions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            default_permissions: GrantPermissions::default(),
        }
    }
}

impl ClientConfig {
    /// Use different KDF parameters.
    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    /// Use a different upload limit.
    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        self.kdf.validate()?;
        if self.max_file_size == 0 {
            return Err(Error::InvalidInput(
                "max_file_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Serialize to bytes for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}
