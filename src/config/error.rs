use std::path::PathBuf;

/// Errors raised at the config document and registry boundaries.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config file is not valid UTF-8: {}", .0.display())]
    Decode(PathBuf),

    #[error("Registry has no tool location yet, call initialize() first")]
    NotInitialized,

    #[error("Profile name is empty")]
    EmptyProfileName,

    /// Names that are not a single plain directory name (`..`, `a/b`)
    #[error("Invalid profile name '{0}'")]
    InvalidProfileName(String),

    #[error("Profile '{0}' does not exist")]
    ProfileNotFound(String),

    #[error("Profile '{0}' already exists")]
    ProfileExists(String),

    #[error("Failed to save {} config file(s): {}", failed.len(), join_paths(failed))]
    SaveFailed { failed: Vec<PathBuf> },
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.into(),
            source,
        }
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
