//! Profile directories under `<install>/profiles/`
//!
//! A profile is a snapshot of the main config file and the conf/ tree.
//! Profiles are managed as whole directories; merging one into the live
//! config is done by [`ConfigRegistry::load_profile_config`].
//!
//! [`ConfigRegistry::load_profile_config`]: super::registry::ConfigRegistry::load_profile_config

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

use super::error::ConfigError;
use super::registry::ConfigRegistry;
use crate::constants::{files, layout, profile};

/// Strategy when a profile with the same name already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStrategy {
    /// Fail with `ProfileExists`
    KeepExisting,
    /// Copy over the existing profile
    Overwrite,
}

/// Profile directories of one installation
#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store for the installation the registry points at
    pub fn for_registry(registry: &ConfigRegistry) -> Result<Self, ConfigError> {
        registry
            .profiles_path()
            .map(Self::new)
            .ok_or(ConfigError::NotInitialized)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Profile names sorted case-insensitively; empty if there is no profiles dir
    pub fn list(&self) -> Result<Vec<String>, ConfigError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir).map_err(|e| ConfigError::io(&self.dir, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ConfigError::io(&self.dir, e))?;
            if entry.path().is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort_by_key(|name| name.to_lowercase());
        Ok(names)
    }

    pub fn exists(&self, name: &str) -> bool {
        checked_name(name).is_ok_and(|name| self.dir.join(name).is_dir())
    }

    /// Snapshot the on-disk main config and conf/ tree into a new profile.
    /// Returns the sanitized profile name.
    pub fn create(
        &self,
        name: &str,
        registry: &ConfigRegistry,
        strategy: SnapshotStrategy,
    ) -> Result<String, ConfigError> {
        let name = sanitize_name(name)?;
        let root = registry.root().ok_or(ConfigError::NotInitialized)?;
        let conf = registry.conf_path().ok_or(ConfigError::NotInitialized)?;

        let target = self.dir.join(&name);
        if self.exists(&name) && strategy == SnapshotStrategy::KeepExisting {
            return Err(ConfigError::ProfileExists(name));
        }
        fs::create_dir_all(&target).map_err(|e| ConfigError::io(&target, e))?;

        let main_config = root.join(files::MAIN_CONFIG);
        if main_config.exists() {
            let dest = target.join(files::MAIN_CONFIG);
            fs::copy(&main_config, &dest).map_err(|e| ConfigError::io(&main_config, e))?;
        }

        let target_conf = target.join(layout::CONF_DIR);
        copy_tree(conf, &target_conf).map_err(|e| ConfigError::io(conf, e))?;

        info!(profile = %name, path = %target.display(), "Created profile snapshot");
        Ok(name)
    }

    /// Rename a profile directory. Returns the sanitized new name.
    pub fn rename(&self, old: &str, new: &str) -> Result<String, ConfigError> {
        let old = checked_name(old)?;
        let new = sanitize_name(new)?;
        let from = self.dir.join(old);
        if !from.is_dir() {
            return Err(ConfigError::ProfileNotFound(old.to_string()));
        }
        if new == old {
            return Ok(new);
        }
        let to = self.dir.join(&new);
        if to.exists() {
            return Err(ConfigError::ProfileExists(new));
        }
        fs::rename(&from, &to).map_err(|e| ConfigError::io(&from, e))?;
        info!(from = old, to = %new, "Renamed profile");
        Ok(new)
    }

    /// Delete a profile directory and everything in it
    pub fn delete(&self, name: &str) -> Result<(), ConfigError> {
        let path = self.dir.join(checked_name(name)?);
        if !path.is_dir() {
            return Err(ConfigError::ProfileNotFound(name.to_string()));
        }
        fs::remove_dir_all(&path).map_err(|e| ConfigError::io(&path, e))?;
        info!(profile = name, "Deleted profile");
        Ok(())
    }
}

/// Trim and replace characters that are not allowed in directory names
pub fn sanitize_name(name: &str) -> Result<String, ConfigError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyProfileName);
    }
    let sanitized: String = trimmed
        .chars()
        .map(|c| if profile::FORBIDDEN_CHARS.contains(&c) { '_' } else { c })
        .collect();
    checked_name(&sanitized)?;
    Ok(sanitized)
}

/// Accept only a single plain directory name, so a profile path can never
/// leave the profiles directory
pub(crate) fn checked_name(name: &str) -> Result<&str, ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::EmptyProfileName);
    }
    let mut components = Path::new(name).components();
    let single = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !single || name.contains(['/', '\\']) {
        return Err(ConfigError::InvalidProfileName(name.to_string()));
    }
    Ok(name)
}

fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    if !from.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let source = entry.path();
        let dest = to.join(entry.file_name());
        if source.is_dir() {
            copy_tree(&source, &dest)?;
        } else {
            fs::copy(&source, &dest)?;
            debug!(file = %dest.display(), "Copied into profile");
        }
    }
    Ok(())
}
