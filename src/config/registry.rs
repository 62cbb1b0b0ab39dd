//! Cache of config documents for one tool installation
//!
//! Documents are loaded lazily on first access and handed out as borrows of
//! the registry, so a handle can never outlive a `reload()`.
//! Failed loads are remembered until the next `reload()`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use super::document::ConfigDocument;
use super::error::ConfigError;
use super::profile::checked_name;
use crate::constants::{files, layout, profile};

/// Root and conf/ directories derived from the tool jar location
#[derive(Debug, Clone, PartialEq, Eq)]
struct InstallLayout {
    root: PathBuf,
    conf: PathBuf,
}

/// Process-wide set of loaded config documents
#[derive(Debug, Default)]
pub struct ConfigRegistry {
    layout: Option<InstallLayout>,
    documents: HashMap<String, ConfigDocument>,
    /// Names whose load failed since the last reload
    missing: HashSet<String>,
}

/// One main-config key changed by a profile overlay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChange {
    pub key: String,
    pub old: Option<String>,
    pub new: String,
}

impl fmt::Display for KeyChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let old = self.old.as_deref().unwrap_or(profile::ABSENT);
        write!(f, "{} = {} -> {}", self.key, old, self.new)
    }
}

/// What a profile overlay changed in memory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileMerge {
    /// Whether the profile carried a main config overlay that was applied
    pub main_applied: bool,
    /// Main config keys whose value actually changed
    pub main_changes: Vec<KeyChange>,
    /// conf/ files whose overlay was applied
    pub merged_files: Vec<String>,
}

impl ProfileMerge {
    /// True if at least one overlay was merged
    pub fn applied(&self) -> bool {
        self.main_applied || !self.merged_files.is_empty()
    }
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry already pointed at a tool jar
    pub fn for_tool(tool_jar: &Path) -> Self {
        let mut registry = Self::new();
        registry.initialize(tool_jar);
        registry
    }

    /// Derive root and conf/ from the tool jar path and drop the cache.
    /// Safe to call again when the user picks another installation.
    pub fn initialize(&mut self, tool_jar: &Path) {
        let root = match tool_jar.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let conf = root.join(layout::CONF_DIR);
        info!(root = %root.display(), conf = %conf.display(), "Config registry initialized");
        self.layout = Some(InstallLayout { root, conf });
        self.reload();
    }

    /// Forget every cached document; the next access re-reads from disk
    pub fn reload(&mut self) {
        debug!(cached = self.cached_count(), "Clearing config cache");
        self.documents.clear();
        self.missing.clear();
    }

    pub fn root(&self) -> Option<&Path> {
        self.layout.as_ref().map(|l| l.root.as_path())
    }

    pub fn conf_path(&self) -> Option<&Path> {
        self.layout.as_ref().map(|l| l.conf.as_path())
    }

    pub fn profiles_path(&self) -> Option<PathBuf> {
        self.root().map(|root| root.join(layout::PROFILES_DIR))
    }

    /// True once initialized against an installation that has a conf/ dir
    pub fn is_valid(&self) -> bool {
        self.conf_path().is_some_and(Path::is_dir)
    }

    /// Number of documents currently cached
    pub fn cached_count(&self) -> usize {
        self.documents.len()
    }

    /// Document `conf/<name>`, or `None` if it cannot be loaded
    pub fn config_file(&mut self, name: &str) -> Option<&mut ConfigDocument> {
        let candidates = vec![self.conf_path()?.join(name)];
        self.cached_or_load(name, candidates)
    }

    /// LocalConfig, looked up at the installation root first, then in conf/
    pub fn local_config(&mut self) -> Option<&mut ConfigDocument> {
        self.root_then_conf(files::LOCAL_CONFIG)
    }

    /// Main config, looked up at the installation root first, then in conf/
    pub fn main_config(&mut self) -> Option<&mut ConfigDocument> {
        self.root_then_conf(files::MAIN_CONFIG)
    }

    pub fn html_report_config(&mut self) -> Option<&mut ConfigDocument> {
        self.config_file(files::HTML_REPORT_CONFIG)
    }

    /// Any managed document, by file name or by alias (`main`, `ocr`, ...)
    pub fn document(&mut self, name: &str) -> Option<&mut ConfigDocument> {
        match resolve_file_name(name) {
            files::MAIN_CONFIG => self.main_config(),
            files::LOCAL_CONFIG => self.local_config(),
            files::HTML_REPORT_CONFIG => self.html_report_config(),
            file => self.config_file(file),
        }
    }

    fn root_then_conf(&mut self, name: &str) -> Option<&mut ConfigDocument> {
        let layout = self.layout.as_ref()?;
        let candidates = vec![layout.root.join(name), layout.conf.join(name)];
        self.cached_or_load(name, candidates)
    }

    fn cached_or_load(&mut self, name: &str, candidates: Vec<PathBuf>) -> Option<&mut ConfigDocument> {
        if !self.documents.contains_key(name) {
            if self.missing.contains(name) {
                return None;
            }
            match load_first(&candidates) {
                Some(doc) => {
                    self.documents.insert(name.to_string(), doc);
                }
                None => {
                    debug!(file = name, "Config file unavailable, caching miss");
                    self.missing.insert(name.to_string());
                    return None;
                }
            }
        }
        self.documents.get_mut(name)
    }

    /// Back up and save every cached document.
    /// Backup failures are logged and ignored; any failed save fails the call.
    pub fn save_all(&mut self) -> Result<usize, ConfigError> {
        let mut saved = 0;
        let mut failed = Vec::new();

        for doc in self.documents.values_mut() {
            debug!(path = %doc.path().display(), staged = !doc.is_loaded(), "Saving config file");
            if let Err(e) = doc.backup() {
                warn!(path = %doc.path().display(), error = %e, "Backup failed, saving anyway");
            }
            match doc.save() {
                Ok(()) => saved += 1,
                Err(e) => {
                    error!(path = %doc.path().display(), error = %e, "Failed to save config file");
                    failed.push(doc.path().to_path_buf());
                }
            }
        }

        if failed.is_empty() {
            info!(saved, "Saved all config files");
            Ok(saved)
        } else {
            Err(ConfigError::SaveFailed { failed })
        }
    }

    /// Overlay `profiles/<name>` onto the cached documents.
    ///
    /// Keys in the profile overwrite the base values; keys missing from the
    /// profile are left alone. Nothing is written to disk until `save_all()`.
    pub fn load_profile_config(&mut self, name: &str) -> Result<ProfileMerge, ConfigError> {
        let name = checked_name(name)?;
        let profiles = self.profiles_path().ok_or(ConfigError::NotInitialized)?;
        let profile_dir = profiles.join(name);
        if !profile_dir.is_dir() {
            return Err(ConfigError::ProfileNotFound(name.to_string()));
        }

        let mut merge = ProfileMerge::default();

        let overlay_path = profile_dir.join(files::MAIN_CONFIG);
        if overlay_path.exists() {
            match ConfigDocument::open(&overlay_path) {
                Ok(overlay) => {
                    merge.main_changes = self.merge_main_config(&overlay)?;
                    merge.main_applied = true;
                    for change in &merge.main_changes {
                        info!(profile = name, "Changed: {change}");
                    }
                    info!(profile = name, changed = merge.main_changes.len(), "Total changed settings");
                }
                Err(e) => warn!(path = %overlay_path.display(), error = %e, "Skipping unreadable profile overlay"),
            }
        }

        let overlay_conf = profile_dir.join(layout::CONF_DIR);
        if overlay_conf.is_dir() {
            match config_files_in(&overlay_conf) {
                Ok(paths) => {
                    for path in paths {
                        if let Some(file_name) = self.merge_conf_file(&path) {
                            merge.merged_files.push(file_name);
                        }
                    }
                }
                Err(e) => error!(path = %overlay_conf.display(), error = %e, "Failed to list profile conf/"),
            }
        }

        if !merge.applied() {
            warn!(profile = name, "Profile had nothing to merge");
        }
        Ok(merge)
    }

    fn merge_main_config(&mut self, overlay: &ConfigDocument) -> Result<Vec<KeyChange>, ConfigError> {
        if self.main_config().is_none() {
            // Stage an empty document at the canonical location so the
            // overlay can still be saved later
            let path = self.root().ok_or(ConfigError::NotInitialized)?.join(files::MAIN_CONFIG);
            warn!(path = %path.display(), "Base main config missing, starting from empty");
            self.missing.remove(files::MAIN_CONFIG);
            self.documents
                .insert(files::MAIN_CONFIG.to_string(), ConfigDocument::new(path));
        }
        let base = self
            .documents
            .get_mut(files::MAIN_CONFIG)
            .ok_or(ConfigError::NotInitialized)?;
        Ok(apply_overlay(base, overlay))
    }

    fn merge_conf_file(&mut self, overlay_path: &Path) -> Option<String> {
        let file_name = overlay_path.file_name()?.to_str()?.to_string();
        let overlay = match ConfigDocument::open(overlay_path) {
            Ok(overlay) => overlay,
            Err(e) => {
                warn!(path = %overlay_path.display(), error = %e, "Skipping unreadable profile file");
                return None;
            }
        };
        match self.config_file(&file_name) {
            Some(base) => {
                let changes = apply_overlay(base, &overlay);
                debug!(file = %file_name, changed = changes.len(), "Merged profile file");
                Some(file_name)
            }
            None => {
                warn!(file = %file_name, "No base config for profile file, skipping");
                None
            }
        }
    }
}

/// Map an alias to its file name; anything else is taken as a file name
pub fn resolve_file_name(name: &str) -> &str {
    files::ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(name))
        .map_or(name, |&(_, file)| file)
}

/// Copy every overlay key into `base`, reporting the ones whose value changed
fn apply_overlay(base: &mut ConfigDocument, overlay: &ConfigDocument) -> Vec<KeyChange> {
    let mut changes = Vec::new();
    for (key, value) in overlay.iter() {
        let old = base.contains_key(key).then(|| base.get(key).to_string());
        if old.as_deref() != Some(value) {
            changes.push(KeyChange {
                key: key.to_string(),
                old,
                new: value.to_string(),
            });
        }
        base.set(key, value);
    }
    changes
}

fn load_first(candidates: &[PathBuf]) -> Option<ConfigDocument> {
    candidates.iter().find_map(|path| match ConfigDocument::open(path) {
        Ok(doc) => Some(doc),
        Err(ConfigError::NotFound(_)) => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to load config file");
            None
        }
    })
}

/// `*.txt` files directly inside `dir`, sorted by name
fn config_files_in(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_config = path
            .extension()
            .is_some_and(|ext| ext == layout::CONFIG_EXTENSION);
        if is_config && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
