use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::auth::store::{SecretStore, SecretStoreError};
use crate::domain::Credentials;

/// Secret store backed by a TOML file of credential entries:
///
/// ```toml
/// [[entry]]
/// url = "https://portal.example.com"
/// login = "user"
/// password = "secret"
/// ```
///
/// A file that does not exist yet is reported as `Locked`, so lookups keep
/// retrying until it appears.
pub struct CredentialsFileStore {
    path: PathBuf,
    entries: Vec<CredentialsEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CredentialsFile {
    entry: Vec<CredentialsEntry>,
}

#[derive(Debug, Deserialize)]
struct CredentialsEntry {
    url: String,
    login: Option<String>,
    password: Option<String>,
}

impl CredentialsFileStore {
    pub fn open(path: &Path) -> Result<Self, SecretStoreError> {
        if !path.exists() {
            return Err(SecretStoreError::Locked(format!(
                "credentials file {} not present",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| SecretStoreError::Locked(format!("{}: {}", path.display(), e)))?;
        let file: CredentialsFile = toml::from_str(&content)
            .map_err(|e| SecretStoreError::Backend(format!("{}: {}", path.display(), e)))?;

        info!(
            "Loaded {} credential entries from {}",
            file.entry.len(),
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            entries: file.entry,
        })
    }
}

impl SecretStore for CredentialsFileStore {
    fn get_auth_data(&mut self, lookup_key: &str) -> Result<Credentials, SecretStoreError> {
        let mut matches = self.entries.iter().filter(|e| e.url == lookup_key);
        match (matches.next(), matches.next()) {
            (Some(entry), None) => Ok(Credentials {
                login: entry.login.clone(),
                password: entry.password.clone(),
            }),
            (Some(_), Some(_)) => Err(SecretStoreError::Backend(format!(
                "ambiguous entries for '{}' in {}",
                lookup_key,
                self.path.display()
            ))),
            (None, _) => Err(SecretStoreError::NotFound(lookup_key.to_string())),
        }
    }

    fn close(&mut self) {
        self.entries.clear();
    }
}
