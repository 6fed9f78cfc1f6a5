use tracing::{debug, info};

use crate::domain::Credentials;

/// Failure modes of a secret store lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecretStoreError {
    /// The store exists but cannot be read yet (locked vault, missing file).
    /// Lookups are retried.
    #[error("secret store is locked or unavailable: {0}")]
    Locked(String),

    #[error("no secret store entry for '{0}'")]
    NotFound(String),

    #[error("secret store failure: {0}")]
    Backend(String),
}

/// Process-wide credential vault.
pub trait SecretStore: Send {
    fn get_auth_data(&mut self, lookup_key: &str) -> Result<Credentials, SecretStoreError>;

    /// Release the underlying connection.
    fn close(&mut self) {}
}

pub type SecretStoreOpener =
    Box<dyn FnMut() -> Result<Box<dyn SecretStore>, SecretStoreError> + Send>;

/// Single shared secret store connection.
///
/// Opened on first lookup, reused by every generator in every cycle and
/// closed once by [`SharedSecretStore::close`].
pub struct SharedSecretStore {
    opener: SecretStoreOpener,
    connection: Option<Box<dyn SecretStore>>,
}

impl SharedSecretStore {
    pub fn new(opener: SecretStoreOpener) -> Self {
        Self {
            opener,
            connection: None,
        }
    }

    /// A store that has no backend; every lookup fails with `Backend`.
    pub fn unconfigured() -> Self {
        Self::new(Box::new(|| {
            Err(SecretStoreError::Backend(
                "no secret store configured ([secrets] credentials)".into(),
            ))
        }))
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn get_auth_data(&mut self, lookup_key: &str) -> Result<Credentials, SecretStoreError> {
        if self.connection.is_none() {
            debug!("Opening secret store connection");
            self.connection = Some((self.opener)()?);
        }
        match self.connection.as_mut() {
            Some(store) => store.get_auth_data(lookup_key),
            None => Err(SecretStoreError::Backend("connection not established".into())),
        }
    }

    pub fn close(&mut self) {
        if let Some(mut store) = self.connection.take() {
            info!("Closing secret store connection");
            store.close();
        }
    }
}
