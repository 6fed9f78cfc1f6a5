//! Credential resolution for generators.
//!
//! - [`AuthResolver`]: maps a generator's [`AuthSpec`] to [`Credentials`]
//! - [`SecretStore`]: vault lookup seam, shared through [`SharedSecretStore`]
//! - [`CredentialsFileStore`]: bundled TOML-file backend

mod file_store;
mod store;

pub use file_store::CredentialsFileStore;
pub use store::{SecretStore, SecretStoreError, SecretStoreOpener, SharedSecretStore};

use std::time::Duration;

use tracing::warn;

use crate::config::SecretsConfig;
use crate::domain::{AuthSpec, Credentials};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("secret store still locked after {attempts} attempts looking up '{key}'")]
    StoreLocked { key: String, attempts: u32 },

    #[error(transparent)]
    Store(#[from] SecretStoreError),
}

/// Fixed-delay retry for a locked secret store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            max_attempts: Some(60),
        }
    }
}

impl From<&SecretsConfig> for RetryPolicy {
    fn from(config: &SecretsConfig) -> Self {
        Self {
            delay: config.retry_delay,
            max_attempts: config.max_attempts,
        }
    }
}

pub struct AuthResolver {
    store: SharedSecretStore,
    retry: RetryPolicy,
}

impl AuthResolver {
    pub fn new(store: SharedSecretStore, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Resolver without a secret store; only RAW credentials resolve.
    pub fn raw_only() -> Self {
        Self::new(SharedSecretStore::unconfigured(), RetryPolicy::default())
    }

    /// Resolve credentials for one generator.
    ///
    /// Unknown auth types resolve to empty credentials; the generator's own
    /// `authenticate` decides whether that is acceptable.
    pub async fn resolve(&mut self, auth: Option<&AuthSpec>) -> Result<Credentials, AuthError> {
        match auth {
            None => Ok(Credentials::default()),
            Some(AuthSpec::Raw { login, password }) => Ok(Credentials {
                login: login.clone(),
                password: password.clone(),
            }),
            Some(AuthSpec::SecretStore { item_url }) => self.lookup(item_url).await,
            Some(AuthSpec::Unknown(tag)) => {
                warn!("Unsupported auth type '{}', continuing without credentials", tag);
                Ok(Credentials::default())
            }
        }
    }

    async fn lookup(&mut self, key: &str) -> Result<Credentials, AuthError> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.store.get_auth_data(key) {
                Ok(credentials) => return Ok(credentials),
                Err(SecretStoreError::Locked(reason)) => {
                    if self.retry.max_attempts.is_some_and(|max| attempts >= max) {
                        return Err(AuthError::StoreLocked {
                            key: key.to_string(),
                            attempts,
                        });
                    }
                    warn!(attempt = attempts, "Secret store unavailable: {}", reason);
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Tear down the shared secret store connection.
    pub fn close(&mut self) {
        self.store.close();
    }
}
