//! Evidence and processing options passed to the command builder

use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::constants::evidence;

/// One forensic source to process
///
/// The path, size and format are fixed at construction; the remaining
/// fields are edited freely before building a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evidence {
    path: PathBuf,
    size: u64,
    format: String,
    is_directory: bool,
    /// Name shown by the tool, defaults to the file or folder name
    pub display_name: String,
    pub password: String,
    pub timezone: String,
    /// Raw argument fragment appended after this evidence
    pub additional_commands: String,
}

impl Evidence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let is_directory = path.is_dir();
        let display_name = file_name_of(&path);
        let format = if is_directory {
            evidence::FOLDER_FORMAT.to_string()
        } else {
            format_of(&path)
        };

        Self {
            size: size_of(&path),
            format,
            is_directory,
            display_name,
            password: String::new(),
            timezone: String::new(),
            additional_commands: String::new(),
            path,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }

    /// Bytes; directories are summed recursively
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Uppercased extension, `FOLDER` for directories
    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    /// Size scaled to B/KB/MB/GB/TB with at most one decimal
    pub fn size_readable(&self) -> String {
        human_size(self.size)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn format_of(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_uppercase())
        .unwrap_or_else(|| evidence::UNKNOWN_FORMAT.to_string())
}

fn size_of(path: &Path) -> u64 {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => meta.len(),
        Ok(meta) if meta.is_dir() => folder_size(path),
        Ok(_) => 0,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot read evidence size");
            0
        }
    }
}

fn folder_size(dir: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(dir) else {
        warn!(path = %dir.display(), "Cannot list evidence folder");
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .map(|entry| {
            let path = entry.path();
            match entry.metadata() {
                Ok(meta) if meta.is_file() => meta.len(),
                Ok(meta) if meta.is_dir() => folder_size(&path),
                _ => 0,
            }
        })
        .sum()
}

pub fn human_size(size: u64) -> String {
    if size == 0 {
        return "0 B".to_string();
    }
    let units = evidence::SIZE_UNITS;
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < units.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{} {}", rounded as u64, units[unit])
    } else {
        format!("{:.1} {}", rounded, units[unit])
    }
}

/// Switches and free-text parameters for one run of the tool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessingOptions {
    pub continue_processing: bool,
    pub restart: bool,
    pub append: bool,
    pub no_gui: bool,
    pub no_log: bool,
    pub portable: bool,
    pub add_owner: bool,
    pub no_pst_attachments: bool,
    pub download_internet_data: bool,
    /// 0 leaves the tool's own default
    pub max_memory_gb: u32,
    pub extra_params: String,
    pub splash_message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_evidence_sums_sizes_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let case = dir.path().join("case");
        fs::create_dir_all(case.join("nested")).unwrap();
        fs::write(case.join("a.bin"), vec![0u8; 10]).unwrap();
        fs::write(case.join("b.bin"), vec![0u8; 20]).unwrap();
        fs::write(case.join("nested/c.bin"), vec![0u8; 30]).unwrap();

        let evidence = Evidence::new(&case);
        assert!(evidence.is_directory());
        assert_eq!(evidence.size(), 60);
        assert_eq!(evidence.format(), "FOLDER");
        assert_eq!(evidence.display_name, "case");
    }

    #[test]
    fn test_file_evidence_format_is_uppercased_extension() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("image.E01");
        fs::write(&image, vec![0u8; 42]).unwrap();
        let raw = dir.path().join("disk.dd");
        fs::write(&raw, b"").unwrap();

        let evidence = Evidence::new(&image);
        assert_eq!(evidence.format(), "E01");
        assert_eq!(evidence.size(), 42);
        assert_eq!(evidence.display_name, "image.E01");
        assert_eq!(evidence.path(), image.as_path());
        assert_eq!(Evidence::new(&raw).format(), "DD");
    }

    #[test]
    fn test_file_without_extension_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let blob = dir.path().join("blob");
        fs::write(&blob, b"x").unwrap();
        assert_eq!(Evidence::new(&blob).format(), "UNKNOWN");
    }

    #[test]
    fn test_missing_evidence_has_zero_size() {
        let dir = tempfile::tempdir().unwrap();
        let evidence = Evidence::new(dir.path().join("gone.E01"));
        assert_eq!(evidence.size(), 0);
        assert_eq!(evidence.format(), "E01");
    }

    #[test]
    fn test_display_name_is_editable() {
        let evidence = Evidence::new("/cases/disk.E01").with_display_name("Suspect laptop");
        assert_eq!(evidence.display_name, "Suspect laptop");
        assert_eq!(evidence.file_name(), "disk.E01");
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(1024), "1 KB");
        assert_eq!(human_size(1536), "1.5 KB");
        assert_eq!(human_size(5 * 1024 * 1024 * 1024), "5 GB");
    }
}
