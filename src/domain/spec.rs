use std::collections::BTreeMap;
use std::fmt;

/// Files produced by one generator run, keyed by path relative to the
/// generator's output directory.
pub type Payload = BTreeMap<String, String>;

/// Generator-specific parameters, passed through untouched from the config.
pub type GeneratorParams = toml::Table;

/// How a generator obtains its credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSpec {
    /// Login and password written directly in the configuration.
    Raw {
        login: Option<String>,
        password: Option<String>,
    },
    /// Credentials looked up in the secret store by `item_url`.
    SecretStore { item_url: String },
    /// Unrecognised `type` tag. Resolves to empty credentials.
    Unknown(String),
}

impl AuthSpec {
    pub fn type_name(&self) -> &str {
        match self {
            AuthSpec::Raw { .. } => "RAW",
            AuthSpec::SecretStore { .. } => "KEEPASSXC",
            AuthSpec::Unknown(tag) => tag,
        }
    }
}

/// Configuration-derived descriptor of one generator entry.
#[derive(Debug, Clone)]
pub struct GeneratorSpec {
    /// Unique key; also the name of the output subdirectory.
    pub id: String,
    /// Catalog name of the generator implementation.
    pub kind: String,
    pub enabled: bool,
    pub auth: Option<AuthSpec>,
    pub params: GeneratorParams,
}

impl GeneratorSpec {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            enabled: true,
            auth: None,
            params: GeneratorParams::new(),
        }
    }
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub login: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: Some(login.into()),
            password: Some(password.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.login.as_deref().map_or(true, str::is_empty)
            && self.password.as_deref().map_or(true, str::is_empty)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}
