//! Argument vector for the external tool
//!
//! Token order matters to the tool and is kept fixed:
//! runtime, `-jar`, jar, memory, evidences, output, profile, flags,
//! extra parameters, splash message.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::{files, flags, layout, profile};
use crate::types::{Evidence, ProcessingOptions};

/// Where the tool jar and the runtime to launch it live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolLocation {
    pub runtime: PathBuf,
    pub tool_jar: PathBuf,
}

impl ToolLocation {
    /// Pair a known tool jar with the best runtime for it
    pub fn for_jar(tool_jar: impl Into<PathBuf>, remembered: Option<&Path>) -> Self {
        let tool_jar = tool_jar.into();
        let runtime = resolve_runtime(&tool_jar, remembered);
        Self { runtime, tool_jar }
    }

    /// Find the tool jar in `cwd`, then in the remembered installation
    pub fn detect(cwd: &Path, remembered: Option<&Path>) -> Option<Self> {
        let tool_jar = std::iter::once(cwd)
            .chain(remembered)
            .map(|dir| dir.join(files::TOOL_JAR))
            .find(|jar| jar.is_file())?;
        Some(Self::for_jar(tool_jar, remembered))
    }

    /// Directory the tool is run from
    pub fn working_dir(&self) -> PathBuf {
        match self.tool_jar.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn command_builder(&self) -> CommandBuilder {
        CommandBuilder::new(self.runtime.clone(), self.tool_jar.clone())
    }
}

/// Bundled runtime next to the jar, then under the remembered installation,
/// then whatever `java` is on PATH
pub fn resolve_runtime(tool_jar: &Path, remembered: Option<&Path>) -> PathBuf {
    let bundled_in = |dir: &Path| dir.join(layout::RUNTIME_DIR).join(layout::RUNTIME_EXE);

    let candidates = tool_jar.parent().into_iter().chain(remembered).map(bundled_in);
    for candidate in candidates {
        if candidate.is_file() {
            debug!(runtime = %candidate.display(), "Using bundled runtime");
            return candidate;
        }
    }
    debug!("No bundled runtime found, using system runtime");
    PathBuf::from(layout::SYSTEM_RUNTIME)
}

/// Builds the argument vector for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBuilder {
    runtime: String,
    tool_jar: String,
}

impl CommandBuilder {
    pub fn new(runtime: impl AsRef<Path>, tool_jar: impl AsRef<Path>) -> Self {
        Self {
            runtime: runtime.as_ref().display().to_string(),
            tool_jar: tool_jar.as_ref().display().to_string(),
        }
    }

    pub fn build(
        &self,
        evidences: &[Evidence],
        output_path: &str,
        profile_name: &str,
        options: &ProcessingOptions,
    ) -> Vec<String> {
        let mut cmd = vec![self.runtime.clone(), flags::JAR.to_string(), self.tool_jar.clone()];

        // after the jar: the tool's launcher re-parses it for the child JVM
        if options.max_memory_gb > 0 {
            cmd.push(format!("-Xmx{}G", options.max_memory_gb));
        }

        for evidence in evidences {
            cmd.push(flags::EVIDENCE.to_string());
            cmd.push(evidence.path().display().to_string());
            push_pair(&mut cmd, flags::DISPLAY_NAME, &evidence.display_name);
            push_verbatim_pair(&mut cmd, flags::PASSWORD, &evidence.password);
            push_verbatim_pair(&mut cmd, flags::TIMEZONE, &evidence.timezone);
            push_raw(&mut cmd, &evidence.additional_commands);
        }

        cmd.push(flags::OUTPUT.to_string());
        cmd.push(output_path.to_string());

        if is_explicit_profile(profile_name) {
            cmd.push(flags::PROFILE.to_string());
            cmd.push(profile_name.to_string());
        }

        let switches = [
            (options.continue_processing, flags::CONTINUE),
            (options.restart, flags::RESTART),
            (options.append, flags::APPEND),
            (options.no_gui, flags::NO_GUI),
            (options.no_log, flags::NO_LOG),
            (options.portable, flags::PORTABLE),
            (options.add_owner, flags::ADD_OWNER),
            (options.no_pst_attachments, flags::NO_PST_ATTACHMENTS),
            (options.download_internet_data, flags::DOWNLOAD_INTERNET_DATA),
        ];
        cmd.extend(
            switches
                .into_iter()
                .filter(|(enabled, _)| *enabled)
                .map(|(_, flag)| flag.to_string()),
        );

        push_raw(&mut cmd, &options.extra_params);
        push_pair(&mut cmd, flags::SPLASH, &options.splash_message);

        cmd
    }
}

/// `default` and the custom-settings sentinel never reach the tool
fn is_explicit_profile(name: &str) -> bool {
    !name.is_empty()
        && !name.eq_ignore_ascii_case(profile::DEFAULT)
        && !name.eq_ignore_ascii_case(profile::CUSTOM)
}

fn push_pair(cmd: &mut Vec<String>, flag: &str, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        cmd.push(flag.to_string());
        cmd.push(value.to_string());
    }
}

/// Blank values are skipped, anything else is passed untouched
fn push_verbatim_pair(cmd: &mut Vec<String>, flag: &str, value: &str) {
    if !value.trim().is_empty() {
        cmd.push(flag.to_string());
        cmd.push(value.to_string());
    }
}

/// Free-text fragments go through as one token, never split
fn push_raw(cmd: &mut Vec<String>, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        cmd.push(value.to_string());
    }
}

/// Human-readable form of a command, quoting tokens that contain whitespace.
/// For display only; not meant to be parsed back.
pub fn command_string(cmd: &[String]) -> String {
    cmd.iter()
        .map(|arg| {
            if arg.chars().any(char::is_whitespace) {
                format!("\"{arg}\"")
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn builder() -> CommandBuilder {
        CommandBuilder::new("java", "/opt/iped/iped.jar")
    }

    fn evidence(path: &str) -> Evidence {
        Evidence::new(path)
    }

    #[test]
    fn test_minimal_command() {
        let cmd = builder().build(&[], "/out", "", &ProcessingOptions::default());
        assert_eq!(cmd, vec!["java", "-jar", "/opt/iped/iped.jar", "-o", "/out"]);
    }

    #[test]
    fn test_full_command_order() {
        let mut ev = evidence("/cases/disk.E01").with_display_name(" Laptop ");
        ev.password = "secret".to_string();
        ev.timezone = "Europe/Rome".to_string();
        ev.additional_commands = "  --skip x  ".to_string();

        let options = ProcessingOptions {
            continue_processing: true,
            no_gui: true,
            portable: true,
            download_internet_data: true,
            max_memory_gb: 16,
            extra_params: " -threads 8 ".to_string(),
            splash_message: " Case 42 ".to_string(),
            ..Default::default()
        };

        let cmd = builder().build(&[ev], "/out dir", "forensic", &options);
        assert_eq!(
            cmd,
            vec![
                "java",
                "-jar",
                "/opt/iped/iped.jar",
                "-Xmx16G",
                "-d",
                "/cases/disk.E01",
                "-dname",
                "Laptop",
                "-p",
                "secret",
                "-tz",
                "Europe/Rome",
                "--skip x",
                "-o",
                "/out dir",
                "-profile",
                "forensic",
                "--continue",
                "--nogui",
                "--portable",
                "--downloadInternetData",
                "-threads 8",
                "-splash",
                "Case 42",
            ]
        );
    }

    #[test]
    fn test_all_flags_in_fixed_order() {
        let options = ProcessingOptions {
            continue_processing: true,
            restart: true,
            append: true,
            no_gui: true,
            no_log: true,
            portable: true,
            add_owner: true,
            no_pst_attachments: true,
            download_internet_data: true,
            ..Default::default()
        };
        let cmd = builder().build(&[], "/out", "", &options);
        assert_eq!(
            &cmd[5..],
            &[
                "--continue",
                "--restart",
                "--append",
                "--nogui",
                "--nologfile",
                "--portable",
                "--addowner",
                "--nopstattachs",
                "--downloadInternetData",
            ]
        );
    }

    #[test]
    fn test_password_and_timezone_are_not_trimmed() {
        let mut ev = evidence("/cases/disk.E01").with_display_name(" Laptop ");
        ev.password = " pass ".to_string();
        ev.timezone = " UTC".to_string();

        let cmd = builder().build(&[ev], "/out", "", &ProcessingOptions::default());
        assert!(cmd.windows(2).any(|w| w == ["-p", " pass "]));
        assert!(cmd.windows(2).any(|w| w == ["-tz", " UTC"]));
        assert!(cmd.windows(2).any(|w| w == ["-dname", "Laptop"]));
    }

    #[test]
    fn test_blank_evidence_fields_are_omitted() {
        let mut ev = evidence("/cases/disk.E01").with_display_name("   ");
        ev.password = "  ".to_string();
        ev.timezone = "\t".to_string();
        let cmd = builder().build(&[ev], "/out", "", &ProcessingOptions::default());
        assert_eq!(
            cmd,
            vec!["java", "-jar", "/opt/iped/iped.jar", "-d", "/cases/disk.E01", "-o", "/out"]
        );
    }

    #[test]
    fn test_profile_sentinels_are_suppressed() {
        for name in ["", "default", "DEFAULT", "custom", "Custom", "CUSTOM"] {
            let cmd = builder().build(&[], "/out", name, &ProcessingOptions::default());
            assert!(!cmd.iter().any(|t| t == "-profile"), "profile {name:?}");
        }
        let cmd = builder().build(&[], "/out", "triage", &ProcessingOptions::default());
        assert!(cmd.windows(2).any(|w| w == ["-profile", "triage"]));
    }

    #[test]
    fn test_build_is_deterministic_and_order_follows_evidence() {
        let a = evidence("/cases/a.E01");
        let b = evidence("/cases/b.dd");
        let options = ProcessingOptions {
            restart: true,
            ..Default::default()
        };

        let first = builder().build(&[a.clone(), b.clone()], "/out", "triage", &options);
        let again = builder().build(&[a.clone(), b.clone()], "/out", "triage", &options);
        assert_eq!(first, again);

        let swapped = builder().build(&[b, a], "/out", "triage", &options);
        assert_eq!(first.len(), swapped.len());
        assert_eq!(first[..3], swapped[..3]);
        assert_eq!(first[3..7], swapped[7..11]);
        assert_eq!(first[7..11], swapped[3..7]);
        assert_eq!(first[11..], swapped[11..]);
    }

    #[test]
    fn test_zero_memory_emits_no_flag() {
        let cmd = builder().build(&[], "/out", "", &ProcessingOptions::default());
        assert!(!cmd.iter().any(|t| t.starts_with("-Xmx")));
    }

    #[test]
    fn test_command_string_quotes_whitespace() {
        let cmd: Vec<String> = ["java", "-o", "/out dir", "tab\there", "plain"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            command_string(&cmd),
            "java -o \"/out dir\" \"tab\there\" plain"
        );
        assert_eq!(command_string(&[]), "");
    }

    #[test]
    fn test_runtime_prefers_bundled_then_remembered_then_system() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("tool");
        let saved = dir.path().join("saved");
        fs::create_dir_all(&tool).unwrap();
        fs::create_dir_all(saved.join("jre/bin")).unwrap();
        let jar = tool.join("iped.jar");

        assert_eq!(resolve_runtime(&jar, None), PathBuf::from("java"));

        let saved_runtime = saved.join("jre").join(layout::RUNTIME_EXE);
        fs::write(&saved_runtime, b"").unwrap();
        assert_eq!(resolve_runtime(&jar, Some(&saved)), saved_runtime);

        fs::create_dir_all(tool.join("jre/bin")).unwrap();
        let bundled = tool.join("jre").join(layout::RUNTIME_EXE);
        fs::write(&bundled, b"").unwrap();
        assert_eq!(resolve_runtime(&jar, Some(&saved)), bundled);
    }

    #[test]
    fn test_detect_tool_in_cwd_then_remembered() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path().join("cwd");
        let saved = dir.path().join("saved");
        fs::create_dir_all(&cwd).unwrap();
        fs::create_dir_all(&saved).unwrap();

        assert!(ToolLocation::detect(&cwd, Some(&saved)).is_none());

        fs::write(saved.join("iped.jar"), b"").unwrap();
        let found = ToolLocation::detect(&cwd, Some(&saved)).unwrap();
        assert_eq!(found.tool_jar, saved.join("iped.jar"));
        assert_eq!(found.working_dir(), saved);

        fs::write(cwd.join("iped.jar"), b"").unwrap();
        let found = ToolLocation::detect(&cwd, Some(&saved)).unwrap();
        assert_eq!(found.tool_jar, cwd.join("iped.jar"));
    }
}
