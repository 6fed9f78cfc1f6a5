//! Configuration management for rssforward.
//!
//! Configuration is read from the TOML file given on the command line.
//! If no file is given, or it doesn't exist, the default configuration is used
//! (no generators, data under the user data directory).

use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::domain::{AuthSpec, GeneratorParams, GeneratorSpec};

const APP_DIR_NAME: &str = "rssforward";
const WATERMARK_FILE: &str = "recentdate.json";
const LOG_FILE: &str = "log.txt";
// Stands in for a file name when parsing config text that has no file.
const INLINE_SOURCE: &str = "<inline>";

/// Main configuration struct.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub general: GeneralConfig,
    pub secrets: SecretsConfig,
    pub generators: Vec<GeneratorSpec>,
}

/// `[general]` section, with directories already resolved to absolute paths.
#[derive(Debug, Clone)]
pub struct GeneralConfig {
    pub data_root: PathBuf,
    pub log_dir: PathBuf,
    pub refresh_time_secs: u64,
    pub startup_delay_secs: u64,
    pub gen_loop: bool,
    pub start_server: bool,
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_root: resolve_dir(None, None, "data"),
            log_dir: resolve_dir(None, None, "log"),
            refresh_time_secs: 3600,
            startup_delay_secs: 0,
            gen_loop: true,
            start_server: true,
            port: 8080,
        }
    }
}

impl GeneralConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_time_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join(LOG_FILE)
    }
}

/// `[secrets]` section: where KEEPASSXC-type credentials are looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretsConfig {
    pub credentials_file: Option<PathBuf>,
    pub retry_delay: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            credentials_file: None,
            retry_delay: Duration::from_millis(1000),
            max_attempts: Some(60),
        }
    }
}

// On-disk layout. Kept separate so that path resolution and auth tag parsing
// happen once, in `Config::from_raw`.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    general: RawGeneral,
    secrets: RawSecrets,
    item: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawGeneral {
    dataroot: Option<PathBuf>,
    logdir: Option<PathBuf>,
    refreshtime: u64,
    startupdelay: u64,
    genloop: bool,
    startserver: bool,
    port: u16,
}

impl Default for RawGeneral {
    fn default() -> Self {
        Self {
            dataroot: None,
            logdir: None,
            refreshtime: 3600,
            startupdelay: 0,
            genloop: true,
            startserver: true,
            port: 8080,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawSecrets {
    credentials: Option<PathBuf>,
    retry_delay_ms: u64,
    max_attempts: u32,
}

impl Default for RawSecrets {
    fn default() -> Self {
        Self {
            credentials: None,
            retry_delay_ms: 1000,
            max_attempts: 60,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawItem {
    generator: String,
    id: Option<String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    params: GeneratorParams,
    auth: Option<RawAuth>,
}

#[derive(Debug, Deserialize)]
struct RawAuth {
    #[serde(rename = "type")]
    auth_type: String,
    login: Option<String>,
    pass: Option<String>,
    itemurl: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl Config {
    /// Load configuration from `path`.
    ///
    /// A missing path or a missing file yields the default configuration.
    /// Relative directories in the file are resolved against the file's directory.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            warn!("No config file given, using defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path, path.parent())
    }

    /// Parse configuration content. `base_dir` anchors relative paths.
    pub fn from_toml(content: &str, base_dir: Option<&Path>) -> Result<Self, ConfigError> {
        Self::parse(content, Path::new(INLINE_SOURCE), base_dir)
    }

    fn parse(content: &str, source: &Path, base_dir: Option<&Path>) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: source.to_path_buf(),
            source: e,
        })?;
        Self::from_raw(raw, base_dir)
    }

    /// Application data directory: `<user data dir>/rssforward`.
    pub fn app_data_dir() -> Result<PathBuf, ConfigError> {
        let data_dir = dirs::data_dir().ok_or(ConfigError::NoDataDir)?;
        Ok(data_dir.join(APP_DIR_NAME))
    }

    /// Fixed location of the persisted watermark.
    pub fn watermark_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::app_data_dir()?.join(WATERMARK_FILE))
    }

    fn from_raw(raw: RawConfig, base_dir: Option<&Path>) -> Result<Self, ConfigError> {
        if raw.general.refreshtime == 0 {
            return Err(ConfigError::Invalid(
                "general.refreshtime must be at least 1 second".into(),
            ));
        }

        let general = GeneralConfig {
            data_root: resolve_dir(raw.general.dataroot.as_deref(), base_dir, "data"),
            log_dir: resolve_dir(raw.general.logdir.as_deref(), base_dir, "log"),
            refresh_time_secs: raw.general.refreshtime,
            startup_delay_secs: raw.general.startupdelay,
            gen_loop: raw.general.genloop,
            start_server: raw.general.startserver,
            port: raw.general.port,
        };

        let secrets = SecretsConfig {
            credentials_file: raw
                .secrets
                .credentials
                .map(|p| resolve_relative(&p, base_dir)),
            retry_delay: Duration::from_millis(raw.secrets.retry_delay_ms),
            max_attempts: (raw.secrets.max_attempts > 0).then_some(raw.secrets.max_attempts),
        };

        let mut seen = HashSet::new();
        let mut generators = Vec::with_capacity(raw.item.len());
        for item in raw.item {
            let id = item.id.unwrap_or_else(|| item.generator.clone());
            validate_id(&id)?;
            if !seen.insert(id.clone()) {
                return Err(ConfigError::DuplicateId(id));
            }
            let auth = item.auth.map(|a| parse_auth(&id, a)).transpose()?;
            generators.push(GeneratorSpec {
                id,
                kind: item.generator,
                enabled: item.enabled,
                auth,
                params: item.params,
            });
        }

        Ok(Self {
            general,
            secrets,
            generators,
        })
    }
}

/// An id names the generator's output directory, so it must be exactly one
/// plain path component. `a`, `./a` and `a/` would otherwise share a directory.
fn validate_id(id: &str) -> Result<(), ConfigError> {
    let mut components = Path::new(id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == OsStr::new(id) => Ok(()),
        _ => Err(ConfigError::Invalid(format!(
            "generator id '{}' must be a single directory name",
            id
        ))),
    }
}

fn parse_auth(id: &str, raw: RawAuth) -> Result<AuthSpec, ConfigError> {
    match raw.auth_type.to_ascii_uppercase().as_str() {
        "RAW" => Ok(AuthSpec::Raw {
            login: raw.login,
            password: raw.pass,
        }),
        "KEEPASSXC" => match raw.itemurl {
            Some(item_url) => Ok(AuthSpec::SecretStore { item_url }),
            None => Err(ConfigError::Invalid(format!(
                "generator '{}': KEEPASSXC auth requires 'itemurl'",
                id
            ))),
        },
        _ => Ok(AuthSpec::Unknown(raw.auth_type)),
    }
}

/// Resolve a configured directory: unset means `<app data dir>/<default_dir>`,
/// relative means relative to the config file.
fn resolve_dir(value: Option<&Path>, base_dir: Option<&Path>, default_dir: &str) -> PathBuf {
    match value {
        Some(dir) => resolve_relative(dir, base_dir),
        None => Config::app_data_dir()
            .map(|d| d.join(default_dir))
            .unwrap_or_else(|_| PathBuf::from(default_dir)),
    }
}

fn resolve_relative(path: &Path, base_dir: Option<&Path>) -> PathBuf {
    let joined = match base_dir {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    };
    std::path::absolute(&joined).unwrap_or(joined)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine user data directory")]
    NoDataDir,

    #[error("Failed to read config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Duplicate generator id: {0}")]
    DuplicateId(String),

    #[error("{0}")]
    Invalid(String),
}
