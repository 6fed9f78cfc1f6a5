use url::Url;

use crate::app::{Result, RssForwardError};
use crate::domain::{GeneratorParams, GeneratorSpec};

/// Typed accessors over a generator's opaque `params` table.
pub struct Params<'a> {
    id: &'a str,
    table: &'a GeneratorParams,
}

impl<'a> Params<'a> {
    pub fn new(spec: &'a GeneratorSpec) -> Self {
        Self {
            id: &spec.id,
            table: &spec.params,
        }
    }

    pub fn error(&self, reason: impl Into<String>) -> RssForwardError {
        RssForwardError::Generator {
            id: self.id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn str(&self, key: &str) -> Result<Option<&'a str>> {
        match self.table.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| self.error(format!("parameter '{}' must be a string", key))),
        }
    }

    pub fn required_str(&self, key: &str) -> Result<&'a str> {
        self.str(key)?
            .ok_or_else(|| self.error(format!("missing parameter '{}'", key)))
    }

    pub fn string_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self.str(key)?.unwrap_or(default).to_string())
    }

    pub fn url(&self, key: &str) -> Result<Url> {
        let raw = self.required_str(key)?;
        Url::parse(raw).map_err(|e| self.error(format!("parameter '{}': {}", key, e)))
    }

    pub fn usize(&self, key: &str) -> Result<Option<usize>> {
        match self.table.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_integer()
                .and_then(|n| usize::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| {
                    self.error(format!("parameter '{}' must be a non-negative integer", key))
                }),
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.table.get(key) {
            None => Ok(default),
            Some(value) => value
                .as_bool()
                .ok_or_else(|| self.error(format!("parameter '{}' must be a boolean", key))),
        }
    }

    pub fn table(&self, key: &str) -> Result<Option<&'a toml::Table>> {
        match self.table.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_table()
                .map(Some)
                .ok_or_else(|| self.error(format!("parameter '{}' must be a table", key))),
        }
    }

    /// Output file name; must stay inside the generator's directory.
    pub fn out_file(&self, default: &str) -> Result<String> {
        let name = self.string_or("outfile", default)?;
        let path = std::path::Path::new(&name);
        let escapes = path.is_absolute()
            || path
                .components()
                .any(|c| !matches!(c, std::path::Component::Normal(_)));
        if name.is_empty() || escapes {
            return Err(self.error(format!("invalid outfile '{}'", name)));
        }
        Ok(name)
    }
}
