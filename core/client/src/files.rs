//! Upload and download of envelope-encrypted files.

use std::fmt;

use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::session::UserSession;
use crate::{run_blocking, Client};
use zkshare_common::{Error, FileId, Result, SensitiveBytes};
use zkshare_crypto::{KeyEnvelope, SealedBase64, SealedData, SymmetricCipher, WrappedKey};
use zkshare_storage::{FileFetch, FileMetadata, FileUpload};

/// A decrypted file.
pub struct DownloadedFile {
    pub metadata: FileMetadata,
    /// Plaintext, zeroized on drop.
    pub content: SensitiveBytes,
}

impl fmt::Debug for DownloadedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadedFile")
            .field("metadata", &self.metadata)
            .field("content_len", &self.content.len())
            .finish()
    }
}

impl Client {
    /// Encrypt and upload a file.
    ///
    /// A fresh content key is generated, used once and dropped. Only the
    /// ciphertext and the key wrapped under the owner's public key leave
    /// the client.
    ///
    /// # Errors
    /// - `EmptyInput` for empty content
    /// - `InvalidInput` if the content exceeds `max_file_size`
    /// - `NotPermitted` if the session is locked
    pub async fn upload(
        &self,
        session: &UserSession,
        filename: &str,
        mime_type: &str,
        content: &[u8],
    ) -> Result<FileMetadata> {
        session.private_key()?;
        if content.len() as u64 > self.config().max_file_size {
            return Err(Error::InvalidInput(format!(
                "File of {} bytes exceeds the {} byte limit",
                content.len(),
                self.config().max_file_size
            )));
        }

        let provider = self.provider().clone();
        let owner_key = session.public_key().clone();
        let plaintext = Zeroizing::new(content.to_vec());
        let (encoded, wrapped) = run_blocking(move || {
            let cipher = SymmetricCipher::new(provider.clone());
            let content_key = cipher.generate_content_key()?;
            let sealed = cipher.encrypt(&plaintext, &content_key)?;
            let wrapped = KeyEnvelope::new(provider).wrap(&content_key, &owner_key)?;
            Ok((sealed.to_base64(), wrapped))
        })
        .await?;

        debug!(filename, size = content.len(), "Uploading encrypted file");
        let metadata = self
            .files()
            .upload(FileUpload {
                owner: session.principal_id().clone(),
                filename: filename.to_string(),
                mime_type: mime_type.to_string(),
                size: content.len() as u64,
                ciphertext: encoded.ciphertext,
                nonce: encoded.nonce,
                tag: encoded.tag,
                wrapped_key: wrapped.into_string(),
            })
            .await?;

        info!(file = %metadata.id, size = metadata.size, "File uploaded");
        Ok(metadata)
    }

    /// Fetch and decrypt a file.
    ///
    /// # Errors
    /// - `NotFound` if the file is gone or the caller holds no grant
    /// - `Forbidden` if the caller's grant does not allow download
    /// - `MalformedInput` for bad encodings or nonce/tag lengths
    /// - `AuthenticationFailure` for a wrong key or tampered ciphertext
    pub async fn download(&self, session: &UserSession, file_id: &FileId) -> Result<DownloadedFile> {
        let private_key = session.private_key_handle()?;
        let FileFetch {
            metadata,
            ciphertext,
            nonce,
            tag,
            wrapped_key,
        } = self.files().fetch(file_id, session.principal_id()).await?;

        let provider = self.provider().clone();
        let content = run_blocking(move || {
            let sealed = SealedData::from_base64(&SealedBase64 {
                ciphertext,
                nonce,
                tag,
            })?;
            let wrapped = WrappedKey::from_base64(wrapped_key)?;
            let content_key = KeyEnvelope::new(provider.clone()).unwrap(&wrapped, &private_key)?;
            SymmetricCipher::new(provider).decrypt(&sealed, &content_key)
        })
        .await?;

        debug!(file = %file_id, size = content.len(), "File decrypted");
        Ok(DownloadedFile {
            metadata,
            content: SensitiveBytes::new(content),
        })
    }

    /// Delete an owned file and every grant of it.
    pub async fn delete_file(&self, session: &UserSession, file_id: &FileId) -> Result<()> {
        self.files().delete_file(file_id, session.principal_id()).await?;
        info!(file = %file_id, "File deleted");
        Ok(())
    }

    /// List the caller's own files.
    pub async fn my_files(&self, session: &UserSession) -> Result<Vec<FileMetadata>> {
        self.files().owned_by(session.principal_id()).await
    }
}
