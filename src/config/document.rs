//! Line-oriented `key = value` config files
//!
//! The tool's config format is a loose cousin of Java properties: one
//! `key = value` per line, `#` comments, no escaping and no sections.
//! Saving rewrites only the value half of known lines so comments, blank
//! lines and anything unparseable survive an edit untouched.
//!
//! Line endings are kept per line, so a file mixing `\n` and `\r\n` only
//! changes on the lines whose value was rewritten. Appended keys use
//! `\r\n` if the file has any, `\n` otherwise.
//!
//! Duplicate keys: the last occurrence wins when reading, but only the
//! first occurrence is rewritten on save. Later duplicates are left on
//! disk exactly as they were.

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::error::ConfigError;
use crate::constants::layout;

const BOM: char = '\u{feff}';

/// One config file held in memory
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    path: PathBuf,
    loaded: bool,
    /// Raw lines as last read or written, used when the file vanished before save
    entries: Vec<String>,
    values: HashMap<String, String>,
    /// First-seen order of keys: file order, then keys added at runtime
    key_order: Vec<String>,
}

impl ConfigDocument {
    /// Create an empty, unloaded document bound to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            loaded: false,
            entries: Vec::new(),
            values: HashMap::new(),
            key_order: Vec::new(),
        }
    }

    /// Create a document and load it in one step
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let mut doc = Self::new(path);
        doc.load()?;
        Ok(doc)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Read the file from disk, replacing any in-memory values.
    /// On failure the document keeps its previous state.
    pub fn load(&mut self) -> Result<(), ConfigError> {
        let source = SourceText::read(&self.path)?
            .ok_or_else(|| ConfigError::NotFound(self.path.clone()))?;

        let mut values = HashMap::new();
        let mut key_order = Vec::new();
        for line in &source.lines {
            if let Some((key, value)) = parse_line(line) {
                if values.insert(key.to_string(), value.to_string()).is_none() {
                    key_order.push(key.to_string());
                }
            }
        }

        debug!(path = %self.path.display(), keys = values.len(), "Loaded config file");
        self.entries = source.lines;
        self.values = values;
        self.key_order = key_order;
        self.loaded = true;
        Ok(())
    }

    /// Write the in-memory values back to disk.
    ///
    /// The current on-disk text is re-read so external edits to comments
    /// are kept. The first line carrying a known key gets its value
    /// replaced, everything else is copied verbatim, and keys never seen
    /// in the file are appended at the end.
    pub fn save(&mut self) -> Result<(), ConfigError> {
        let source = match SourceText::read(&self.path)? {
            Some(source) => source,
            None => SourceText::from_entries(&self.entries),
        };

        let lines = self.render_lines(&source.lines);
        let text = source.assemble(&lines);
        fs::write(&self.path, text).map_err(|e| ConfigError::io(&self.path, e))?;

        info!(path = %self.path.display(), "Saved config file");
        self.entries = lines;
        Ok(())
    }

    /// Copy the current on-disk file to `<name>.bak`
    pub fn backup(&self) -> Result<PathBuf, ConfigError> {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(layout::BACKUP_SUFFIX);
        let backup_path = PathBuf::from(name);
        fs::copy(&self.path, &backup_path).map_err(|e| ConfigError::io(&self.path, e))?;
        debug!(backup = %backup_path.display(), "Backed up config file");
        Ok(backup_path)
    }

    fn render_lines(&self, original: &[String]) -> Vec<String> {
        let mut written: HashSet<&str> = HashSet::new();
        let mut output = Vec::with_capacity(original.len() + self.values.len());

        for line in original {
            match parse_line(line) {
                Some((key, _)) if !written.contains(key) => match self.values.get(key) {
                    Some(value) => {
                        output.push(format_entry(key, value));
                        written.insert(key);
                    }
                    None => output.push(line.clone()),
                },
                _ => output.push(line.clone()),
            }
        }

        for key in &self.key_order {
            if written.contains(key.as_str()) {
                continue;
            }
            if let Some(value) = self.values.get(key) {
                output.push(format_entry(key, value));
            }
        }
        output
    }

    /// Value for `key`, or an empty string when unset
    pub fn get(&self, key: &str) -> &str {
        self.get_or(key, "")
    }

    /// Value for `key`, or `default` when unset
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.values.get(key).map(String::as_str).unwrap_or(default)
    }

    /// `true`, `yes` and `1` (any case) are true, any other text is false.
    /// Unset or empty values yield `default`.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.values.get(key).map(|v| v.trim()) {
            None | Some("") => default,
            Some(value) => parse_bool(value),
        }
    }

    /// Base-10 integer value, or `default` on any parse failure
    pub fn get_int(&self, key: &str, default: i32) -> i32 {
        self.get(key).trim().parse().unwrap_or(default)
    }

    pub fn set(&mut self, key: &str, value: &str) {
        let key = key.trim();
        let value = value.trim().to_string();
        if self.values.insert(key.to_string(), value).is_none() {
            self.key_order.push(key.to_string());
        }
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.set(key, if value { "true" } else { "false" });
    }

    pub fn set_int(&mut self, key: &str, value: i32) {
        self.set(key, &value.to_string());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Keys in first-seen order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.key_order.iter().map(String::as_str)
    }

    /// `(key, value)` pairs in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.key_order
            .iter()
            .filter_map(|k| self.values.get(k).map(|v| (k.as_str(), v.as_str())))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub(crate) fn parse_bool(value: &str) -> bool {
    let value = value.trim();
    value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes") || value == "1"
}

/// Split a data line into trimmed key and value.
/// Comments, blank lines and lines without a usable `=` yield `None`.
fn parse_line(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    match trimmed.find('=') {
        Some(eq) if eq > 0 => Some((trimmed[..eq].trim(), trimmed[eq + 1..].trim())),
        _ => None,
    }
}

fn format_entry(key: &str, value: &str) -> String {
    format!("{key} = {value}")
}

/// File text split into lines plus what is needed to write it back
/// byte-for-byte: BOM and the ending of every line.
struct SourceText {
    lines: Vec<String>,
    /// `"\r\n"`, `"\n"` or `""` (last line without a newline), one per line
    endings: Vec<&'static str>,
    bom: bool,
    /// Ending for lines added on save
    newline: &'static str,
    /// Whether the text ends with a newline (an empty file counts as yes)
    final_newline: bool,
}

impl SourceText {
    /// `Ok(None)` when the file does not exist
    fn read(path: &Path) -> Result<Option<Self>, ConfigError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ConfigError::io(path, e)),
        };
        let text = String::from_utf8(bytes).map_err(|_| ConfigError::Decode(path.to_path_buf()))?;
        Ok(Some(Self::parse(&text)))
    }

    fn parse(text: &str) -> Self {
        let (bom, body) = match text.strip_prefix(BOM) {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let mut lines = Vec::new();
        let mut endings = Vec::new();
        for piece in body.split_inclusive('\n') {
            let (line, ending) = if let Some(line) = piece.strip_suffix("\r\n") {
                (line, "\r\n")
            } else if let Some(line) = piece.strip_suffix('\n') {
                (line, "\n")
            } else {
                (piece, "")
            };
            lines.push(line.to_string());
            endings.push(ending);
        }

        Self {
            lines,
            endings,
            bom,
            newline: if body.contains("\r\n") { "\r\n" } else { "\n" },
            final_newline: body.is_empty() || body.ends_with('\n'),
        }
    }

    fn from_entries(entries: &[String]) -> Self {
        Self {
            lines: entries.to_vec(),
            endings: vec!["\n"; entries.len()],
            bom: false,
            newline: "\n",
            final_newline: true,
        }
    }

    /// Join `lines` (the original lines, possibly rewritten, then any appended
    /// ones) keeping each original line's own ending
    fn assemble(&self, lines: &[String]) -> String {
        let mut text = String::new();
        if self.bom {
            text.push(BOM);
        }
        let last = lines.len().saturating_sub(1);
        for (i, line) in lines.iter().enumerate() {
            text.push_str(line);
            let ending = match self.endings.get(i) {
                Some(&"") if i < last => self.newline,
                Some(&ending) => ending,
                None if i < last || self.final_newline => self.newline,
                None => "",
            };
            text.push_str(ending);
        }
        text
    }
}
