use crate::config::{load_config, ConfigError};
use crate::keymap::Keymap;
use log::debug;
use std::path::{Path, PathBuf};

/// Rebuilds the keymap from the config file on disk.
#[derive(Debug, Clone)]
pub struct Reloader {
    path: PathBuf,
}

impl Reloader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Reloader { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the config again and builds a fresh keymap. Nothing is published;
    /// on error the caller keeps the keymap it has.
    pub fn reload(&self) -> Result<Keymap, ConfigError> {
        let config = load_config(&self.path)?;
        let keymap = Keymap::from_config(&config)?;
        debug!("Reloaded {} commands from {}", keymap.len(), self.path.display());
        Ok(keymap)
    }
}
