//! Persisted "recent processed date".

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::app::Result;

#[derive(Debug, Serialize, Deserialize)]
struct Stored {
    recent: DateTime<FixedOffset>,
}

/// Single timestamp-with-offset stored as JSON.
#[derive(Debug, Clone)]
pub struct WatermarkStore {
    path: PathBuf,
}

impl WatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored watermark, or `None` if there is none yet.
    ///
    /// An unreadable file is treated as absent.
    pub fn read(&self) -> Result<Option<DateTime<FixedOffset>>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<Stored>(&content) {
            Ok(stored) => Ok(Some(stored.recent)),
            Err(e) => {
                warn!(path = %self.path.display(), "Ignoring corrupt watermark file: {}", e);
                Ok(None)
            }
        }
    }

    pub fn write(&self, recent: DateTime<FixedOffset>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&Stored { recent })?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}
