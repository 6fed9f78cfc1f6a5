//! Writes generator payloads under the data root.
//!
//! Layout: `<root>/<generator id>/<relative file name>`. Files are
//! overwritten every cycle; nothing is diffed or appended.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::domain::Payload;

#[derive(Debug, Clone)]
pub struct OutputWriter {
    root: PathBuf,
}

impl OutputWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist `payload` for `generator_id`. `None` or an empty payload is a no-op.
    pub fn write(&self, generator_id: &str, payload: Option<&Payload>) -> io::Result<()> {
        let Some(payload) = payload.filter(|p| !p.is_empty()) else {
            return Ok(());
        };

        let dir = self.root.join(checked_dir_name(generator_id)?);
        for (name, content) in payload {
            let path = dir.join(checked_relative(name)?);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, content)?;
            debug!(path = %path.display(), bytes = content.len(), "Wrote output file");
        }
        Ok(())
    }
}

/// A generator id must be one plain component, so that no two ids share a
/// directory.
fn checked_dir_name(id: &str) -> io::Result<&Path> {
    let path = Path::new(id);
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == path.as_os_str() => Ok(path),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("generator id '{}' is not a plain directory name", id),
        )),
    }
}

/// Reject names that would land outside the directory they are joined to.
fn checked_relative(name: &str) -> io::Result<&Path> {
    let path = Path::new(name);
    let inside = !name.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if inside {
        Ok(path)
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("output path '{}' escapes the data root", name),
        ))
    }
}
