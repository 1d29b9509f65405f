//! Per-user recognizer credentials
//!
//! Maps a platform user id to the token the recognition service issued for
//! it. Tokens are stored encrypted through a pluggable [`CredentialStore`]
//! and fronted by an in-memory cache that coalesces concurrent lookups, so a
//! user is provisioned at most once even when several events race.

use crate::crypto::{CryptoError, TokenCipher};
use crate::platform::{MessagingPlatform, PlatformError};
use crate::recognizer::{RecognitionGateway, RecognizerConnector, RecognizerError};
use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Errors raised while resolving or provisioning a credential
#[derive(Error, Debug)]
pub enum CredentialError {
    /// Backing store failed
    #[error("Credential store error: {0}")]
    Store(String),
    /// Stored token could not be encrypted or decrypted
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
    /// Profile lookup failed
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
    /// Registration with the recognition service failed
    #[error("Recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    /// Error produced by a lookup another task was already running
    #[error(transparent)]
    Shared(Arc<CredentialError>),
}

/// Stored mapping from a platform user to a recognizer token
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredential {
    /// Platform user id
    pub user_id: String,
    /// Recognizer token, ciphertext when `encrypted_at_rest` is set
    pub service_token: String,
    /// Whether `service_token` is encrypted
    pub encrypted_at_rest: bool,
}

impl std::fmt::Debug for UserCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredential")
            .field("user_id", &self.user_id)
            .field("encrypted_at_rest", &self.encrypted_at_rest)
            .finish_non_exhaustive()
    }
}

/// Key-value persistence for credentials
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the credential for `user_id`, if any
    async fn load(&self, user_id: &str) -> Result<Option<UserCredential>, CredentialError>;
    /// Insert or replace a credential
    async fn save(&self, credential: UserCredential) -> Result<(), CredentialError>;
}

/// Process-local store, lost on restart
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<HashMap<String, UserCredential>>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, user_id: &str) -> Result<Option<UserCredential>, CredentialError> {
        Ok(self.entries.read().await.get(user_id).cloned())
    }

    async fn save(&self, credential: UserCredential) -> Result<(), CredentialError> {
        self.entries
            .write()
            .await
            .insert(credential.user_id.clone(), credential);
        Ok(())
    }
}

/// Resolves, provisions and rotates user credentials
pub struct Credentials {
    store: Arc<dyn CredentialStore>,
    cipher: Arc<TokenCipher>,
    platform: Arc<dyn MessagingPlatform>,
    connector: Arc<dyn RecognizerConnector>,
    cache: Cache<String, UserCredential>,
}

impl Credentials {
    /// Create the credential service.
    ///
    /// # Arguments
    ///
    /// * `store` - Persistent credential storage
    /// * `cipher` - Cipher protecting tokens at rest
    /// * `platform` - Used to look up display names when registering
    /// * `connector` - Source of the admin client that registers users
    /// * `max_capacity` - Maximum number of cached credentials
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        cipher: Arc<TokenCipher>,
        platform: Arc<dyn MessagingPlatform>,
        connector: Arc<dyn RecognizerConnector>,
        max_capacity: u64,
    ) -> Self {
        Self {
            store,
            cipher,
            platform,
            connector,
            cache: Cache::builder().max_capacity(max_capacity).build(),
        }
    }

    /// Plaintext recognizer token for `user_id`, provisioning the user on first use.
    ///
    /// Concurrent calls for the same user share a single load-or-provision run.
    ///
    /// # Errors
    ///
    /// Returns an error when the store, the platform, the recognizer or the
    /// cipher fails.
    pub async fn token(&self, user_id: &str) -> Result<String, CredentialError> {
        let credential = self
            .cache
            .try_get_with(user_id.to_string(), self.load_or_provision(user_id))
            .await
            .map_err(CredentialError::Shared)?;
        self.reveal(&credential)
    }

    /// Gateway acting as `user_id`.
    ///
    /// # Errors
    ///
    /// Same as [`Credentials::token`].
    pub async fn gateway(
        &self,
        user_id: &str,
    ) -> Result<Arc<dyn RecognitionGateway>, CredentialError> {
        let token = self.token(user_id).await?;
        Ok(self.connector.user(user_id, &token))
    }

    /// Replace the credential of `user_id` with a freshly issued one.
    ///
    /// Used when the recognizer stops accepting the stored token. The last
    /// rotation wins when two run concurrently.
    ///
    /// # Errors
    ///
    /// Returns an error when registration or storage fails.
    pub async fn rotate(
        &self,
        user_id: &str,
    ) -> Result<Arc<dyn RecognitionGateway>, CredentialError> {
        warn!(user_id = %user_id, "Rotating recognizer credential");
        self.cache.invalidate(user_id).await;
        let credential = self.provision(user_id).await?;
        let token = self.reveal(&credential)?;
        self.cache.insert(user_id.to_string(), credential).await;
        Ok(self.connector.user(user_id, &token))
    }

    async fn load_or_provision(&self, user_id: &str) -> Result<UserCredential, CredentialError> {
        if let Some(credential) = self.store.load(user_id).await? {
            debug!(user_id = %user_id, "Credential loaded from store");
            return Ok(credential);
        }
        self.provision(user_id).await
    }

    async fn provision(&self, user_id: &str) -> Result<UserCredential, CredentialError> {
        let profile = self.platform.get_profile(user_id).await?;
        let token = self
            .connector
            .admin()
            .register_user(user_id, &profile.display_name)
            .await?;

        let credential = UserCredential {
            user_id: user_id.to_string(),
            service_token: self.cipher.encrypt(&token)?,
            encrypted_at_rest: true,
        };
        self.store.save(credential.clone()).await?;
        info!(user_id = %user_id, "Provisioned recognizer credential");
        Ok(credential)
    }

    fn reveal(&self, credential: &UserCredential) -> Result<String, CredentialError> {
        if credential.encrypted_at_rest {
            Ok(self.cipher.decrypt(&credential.service_token)?)
        } else {
            Ok(credential.service_token.clone())
        }
    }
}
