//! Manager preferences persisted between runs
//!
//! Only the installation path is remembered, so the tool and its bundled
//! runtime can be found again when the manager is started elsewhere.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// Directory containing the tool jar
    #[serde(rename = "ipedPath", default, skip_serializing_if = "Option::is_none")]
    pub install_path: Option<PathBuf>,
}

impl Preferences {
    pub fn path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(crate::constants::config::APP_DIR);
        path.push(crate::constants::config::FILENAME);
        path
    }

    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Missing or unreadable preferences fall back to defaults
    pub fn load_from(path: &Path) -> Self {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => {
                info!(path = %path.display(), "No preferences file, using defaults");
                return Self::default();
            }
        };
        match serde_json::from_str(&contents) {
            Ok(prefs) => prefs,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable preferences file");
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create preferences directory {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize preferences")?;
        fs::write(path, json).with_context(|| format!("Failed to write preferences to {:?}", path))?;
        info!(path = %path.display(), "Saved preferences");
        Ok(())
    }

    pub fn install_path(&self) -> Option<&Path> {
        self.install_path.as_deref()
    }
}
