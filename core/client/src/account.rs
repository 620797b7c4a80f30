//! Registration and login.

use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::session::UserSession;
use crate::{run_blocking, Client};
use zkshare_common::{Error, Result};
use zkshare_crypto::{IdentityKeys, IdentityPublicKey, PasswordWrapper};
use zkshare_storage::{PrincipalRecord, Registration};

impl Client {
    /// Register a new account.
    ///
    /// Generates an identity key pair, seals the private half under
    /// `password` and hands the public key plus the sealed key to the
    /// account directory. The password never leaves this function.
    ///
    /// # Errors
    /// - `InvalidInput` for an empty username
    /// - `EmptyInput` for an empty password
    /// - `AlreadyExists` if the username is taken
    pub async fn register(&self, username: &str, password: &str) -> Result<PrincipalRecord> {
        let username = username.trim();
        if username.is_empty() {
            return Err(Error::InvalidInput("username cannot be empty".to_string()));
        }
        if password.is_empty() {
            return Err(Error::EmptyInput("password cannot be empty".to_string()));
        }

        debug!(username, "Generating identity key pair");
        let keys = IdentityKeys::new(self.provider().clone());
        let pair = run_blocking(move || keys.generate_key_pair()).await?;
        let (public_key, private_key) = pair.into_parts();

        let wrapper = PasswordWrapper::new(self.provider().clone());
        let password = Zeroizing::new(password.to_string());
        let protected = run_blocking(move || wrapper.protect(&private_key, &password)).await?;

        let record = self
            .accounts()
            .register(Registration {
                username: username.to_string(),
                public_key: public_key.to_base64()?,
                protected_private_key: protected.protected_key,
                salt: protected.salt,
            })
            .await?;

        info!(principal = %record.id, username, "Account registered");
        Ok(record)
    }

    /// Log in and unseal the private key.
    ///
    /// A wrong password is reported as `AuthenticationFailure`, exactly like
    /// any other decryption failure.
    ///
    /// # Errors
    /// - `NotFound` if the user does not exist
    /// - `AuthenticationFailure` for a wrong password
    /// - `Crypto` if the unsealed key does not match the published
    ///   public key
    pub async fn login(&self, username: &str, password: &str) -> Result<UserSession> {
        let response = self.accounts().login(username.trim()).await?;

        let wrapper = PasswordWrapper::new(self.provider().clone());
        let password = Zeroizing::new(password.to_string());
        let protected_key = response.protected_private_key.clone();
        let salt = response.salt.clone();
        let private_key =
            run_blocking(move || wrapper.unprotect(&protected_key, &password, &salt)).await?;

        let published = IdentityPublicKey::from_base64(&response.public_key)?;
        if private_key.public_key() != published {
            return Err(Error::Crypto(
                "Unsealed private key does not match the published public key".to_string(),
            ));
        }

        info!(principal = %response.principal_id, "Logged in");
        Ok(UserSession::new(
            response.principal_id,
            response.username,
            private_key,
            response.token,
        ))
    }

    /// Look up a user's published public key.
    pub async fn public_key_of(&self, username: &str) -> Result<(PrincipalRecord, IdentityPublicKey)> {
        let record = self.accounts().principal_by_username(username).await?;
        let key = IdentityPublicKey::from_base64(&record.public_key)?;
        Ok((record, key))
    }
}
