#![forbid(unsafe_code)]

mod command;
mod config;
mod constants;
mod preferences;
mod runner;
mod types;
mod validation;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn, Level as TraceLevel};
use tracing_subscriber::FmtSubscriber;

use command::{command_string, ToolLocation};
use config::{ConfigDocument, ConfigRegistry, ProfileStore, SnapshotStrategy};
use constants::{defaults, files, keys, profile};
use preferences::Preferences;
use runner::ProcessRunner;
use types::{Evidence, ProcessingOptions};

#[derive(Parser)]
#[command(
    name = "iped-manager",
    version,
    about = "Manage IPED configuration files and profiles, and launch processing runs"
)]
struct Cli {
    /// Tool jar or the directory containing it (default: current directory,
    /// then the remembered installation)
    #[arg(long, global = true)]
    tool: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Remember an installation directory for later runs.
    Locate { dir: PathBuf },

    /// Print every entry of a config file (a file name, or an alias such as
    /// main, local, ocr, elastic, minio, html-report).
    Show { file: String },

    /// Print one value.
    Get { file: String, key: String },

    /// Change one value and save (a .bak copy is kept). Booleans and
    /// integers are written in canonical form.
    Set { file: String, key: String, value: String },

    /// Check cross-file configuration dependencies.
    Validate,

    /// Manage configuration profiles.
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Print the command a run would execute.
    Command(RunArgs),

    /// Validate, then run the tool and stream its output.
    Run {
        #[command(flatten)]
        args: RunArgs,

        /// Launch even if validation reports problems.
        #[arg(long)]
        skip_validation: bool,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// List profiles.
    List,

    /// Snapshot the current configuration into a new profile.
    Create {
        name: String,

        /// Replace an existing profile with the same name.
        #[arg(long)]
        overwrite: bool,
    },

    Rename { old: String, new: String },

    Delete { name: String },

    /// Merge a profile into the current configuration.
    Apply {
        name: String,

        /// Show what would change without saving.
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Evidence files or folders, in processing order.
    #[arg(required = true)]
    evidence: Vec<PathBuf>,

    #[arg(short, long)]
    output: PathBuf,

    /// Display names, matched to the evidence by position.
    #[arg(long = "dname")]
    display_names: Vec<String>,

    /// Profile passed to the tool; `default` and `custom` use the current settings.
    #[arg(long, default_value = profile::DEFAULT)]
    profile: String,

    /// Timezone applied to every evidence.
    #[arg(long)]
    timezone: Option<String>,

    /// Password applied to every evidence.
    #[arg(long)]
    password: Option<String>,

    /// Heap limit in GB (default: maxMemoryGB from LocalConfig, or 8).
    #[arg(long)]
    max_memory: Option<u32>,

    #[arg(long = "continue")]
    continue_processing: bool,
    #[arg(long)]
    restart: bool,
    #[arg(long)]
    append: bool,
    #[arg(long)]
    no_gui: bool,
    #[arg(long)]
    no_log: bool,
    #[arg(long)]
    portable: bool,
    #[arg(long)]
    add_owner: bool,
    #[arg(long)]
    no_pst_attachments: bool,
    #[arg(long)]
    download_internet_data: bool,

    /// Extra parameters passed through as one token.
    #[arg(long, default_value = "")]
    extra: String,

    #[arg(long, default_value = "")]
    splash: String,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    // Parse log level from environment variable
    let log_level = match std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    };

    // stdout is reserved for command output
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install logger: {e}");
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut prefs = Preferences::load();

    if let Command::Locate { dir } = &cli.command {
        return locate(&mut prefs, dir);
    }

    let location = find_tool(cli.tool.as_deref(), prefs.install_path())?;
    info!(jar = %location.tool_jar.display(), runtime = %location.runtime.display(), "Using tool");
    let mut registry = ConfigRegistry::for_tool(&location.tool_jar);
    if !registry.is_valid() {
        warn!(root = ?registry.root(), "Installation has no conf/ directory");
    }

    match cli.command {
        Command::Locate { .. } => Ok(ExitCode::SUCCESS),
        Command::Show { file } => {
            let doc = open_document(&mut registry, &file)?;
            for (key, value) in doc.iter() {
                println!("{key} = {value}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Get { file, key } => {
            let doc = open_document(&mut registry, &file)?;
            if !doc.contains_key(&key) {
                eprintln!("{key} is not set in {file}");
                return Ok(ExitCode::FAILURE);
            }
            println!("{}", doc.get(&key));
            Ok(ExitCode::SUCCESS)
        }
        Command::Set { file, key, value } => {
            let doc = open_document(&mut registry, &file)?;
            let value = value.trim();
            if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false") {
                doc.set_bool(&key, value.eq_ignore_ascii_case("true"));
            } else if let Ok(number) = value.parse::<i32>() {
                doc.set_int(&key, number);
            } else {
                doc.set(&key, value);
            }
            registry.save_all()?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Validate => Ok(if report_validation(&mut registry) {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }),
        Command::Profile { action } => run_profile(&mut registry, action),
        Command::Command(args) => {
            let cmd = build_command(&location, &mut registry, &args)?;
            println!("{}", command_string(&cmd));
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            args,
            skip_validation,
        } => {
            if skip_validation {
                warn!("Skipping configuration validation");
            } else if !report_validation(&mut registry) {
                eprintln!("Fix the problems above or pass --skip-validation.");
                return Ok(ExitCode::FAILURE);
            }
            let cmd = build_command(&location, &mut registry, &args)?;
            launch(&location, &cmd)
        }
    }
}

fn locate(prefs: &mut Preferences, dir: &Path) -> Result<ExitCode> {
    let dir = std::path::absolute(dir)
        .with_context(|| format!("Invalid installation path {:?}", dir))?;
    if !dir.join(files::TOOL_JAR).is_file() {
        bail!("{} not found in {}", files::TOOL_JAR, dir.display());
    }
    prefs.install_path = Some(dir.clone());
    prefs.save()?;
    println!("Remembered installation {}", dir.display());
    Ok(ExitCode::SUCCESS)
}

fn find_tool(explicit: Option<&Path>, remembered: Option<&Path>) -> Result<ToolLocation> {
    if let Some(path) = explicit {
        let jar = if path.is_dir() {
            path.join(files::TOOL_JAR)
        } else {
            path.to_path_buf()
        };
        if !jar.is_file() {
            bail!("Tool jar not found: {}", jar.display());
        }
        return Ok(ToolLocation::for_jar(jar, remembered));
    }

    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    ToolLocation::detect(&cwd, remembered).with_context(|| {
        format!(
            "{} not found in {} or a remembered installation; use --tool or `locate`",
            files::TOOL_JAR,
            cwd.display()
        )
    })
}

fn open_document<'a>(registry: &'a mut ConfigRegistry, name: &str) -> Result<&'a mut ConfigDocument> {
    registry
        .document(name)
        .with_context(|| format!("Config file {name} not found or unreadable"))
}

/// Print validation results; true when there is nothing to fix
fn report_validation(registry: &mut ConfigRegistry) -> bool {
    let issues = validation::validate_configuration(registry);
    if issues.is_empty() {
        println!("Configuration OK");
        return true;
    }
    for issue in &issues {
        println!("- {issue}");
    }
    false
}

fn run_profile(registry: &mut ConfigRegistry, action: ProfileAction) -> Result<ExitCode> {
    let store = ProfileStore::for_registry(registry)?;
    match action {
        ProfileAction::List => {
            let names = store.list()?;
            if names.is_empty() {
                println!("No profiles in {}", store.dir().display());
            }
            for name in names {
                println!("{name}");
            }
        }
        ProfileAction::Create { name, overwrite } => {
            let strategy = if overwrite {
                SnapshotStrategy::Overwrite
            } else {
                SnapshotStrategy::KeepExisting
            };
            let name = store.create(&name, registry, strategy)?;
            println!("Created profile {name}");
        }
        ProfileAction::Rename { old, new } => {
            let new = store.rename(&old, &new)?;
            println!("Renamed {old} to {new}");
        }
        ProfileAction::Delete { name } => {
            store.delete(&name)?;
            println!("Deleted profile {name}");
        }
        ProfileAction::Apply { name, dry_run } => {
            let merge = registry.load_profile_config(&name)?;
            for change in &merge.main_changes {
                println!("{change}");
            }
            for file in &merge.merged_files {
                println!("merged {file}");
            }
            if !merge.applied() {
                println!("Profile {name} had nothing to merge");
            } else if dry_run {
                println!("Dry run, nothing saved");
            } else {
                let saved = registry.save_all()?;
                println!("Applied profile {name} ({saved} file(s) saved)");
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn build_command(
    location: &ToolLocation,
    registry: &mut ConfigRegistry,
    args: &RunArgs,
) -> Result<Vec<String>> {
    if args.display_names.len() > args.evidence.len() {
        bail!(
            "{} display names given for {} evidence",
            args.display_names.len(),
            args.evidence.len()
        );
    }

    let mut evidences = Vec::with_capacity(args.evidence.len());
    for (i, path) in args.evidence.iter().enumerate() {
        if !path.exists() {
            bail!("Evidence not found: {}", path.display());
        }
        let mut evidence = Evidence::new(path);
        if let Some(name) = args.display_names.get(i) {
            evidence = evidence.with_display_name(name.as_str());
        }
        if let Some(tz) = &args.timezone {
            evidence.timezone = tz.clone();
        }
        if let Some(password) = &args.password {
            evidence.password = password.clone();
        }
        info!(
            path = %evidence.path().display(),
            format = evidence.format(),
            size = %evidence.size_readable(),
            "Added evidence"
        );
        evidences.push(evidence);
    }

    let max_memory_gb = args.max_memory.unwrap_or_else(|| {
        let configured = registry
            .local_config()
            .map(|local| local.get_int(keys::MAX_MEMORY_GB, defaults::MAX_MEMORY_GB))
            .unwrap_or(defaults::MAX_MEMORY_GB);
        u32::try_from(configured).unwrap_or(0)
    });

    let options = ProcessingOptions {
        continue_processing: args.continue_processing,
        restart: args.restart,
        append: args.append,
        no_gui: args.no_gui,
        no_log: args.no_log,
        portable: args.portable,
        add_owner: args.add_owner,
        no_pst_attachments: args.no_pst_attachments,
        download_internet_data: args.download_internet_data,
        max_memory_gb,
        extra_params: args.extra.clone(),
        splash_message: args.splash.clone(),
    };

    let output = args.output.display().to_string();
    Ok(location
        .command_builder()
        .build(&evidences, &output, &args.profile, &options))
}

fn launch(location: &ToolLocation, cmd: &[String]) -> Result<ExitCode> {
    let mut runner = ProcessRunner::for_tool(location);
    let cancel = runner.cancel_handle();

    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGINT, SIGTERM};
        signal_hook::flag::register(SIGINT, cancel.flag())?;
        signal_hook::flag::register(SIGTERM, cancel.flag())?;
    }
    #[cfg(not(unix))]
    let _ = cancel;

    info!(cwd = %runner.working_dir().display(), "Running: {}", command_string(cmd));
    let outcome = runner.execute(cmd, |line| println!("{line}"))?;

    if outcome.cancelled {
        warn!("Processing cancelled");
        return Ok(ExitCode::from(130));
    }
    match outcome.code() {
        Some(0) => {
            info!("Processing finished");
            Ok(ExitCode::SUCCESS)
        }
        code => {
            error!(exit = ?code, "Processing failed");
            Ok(ExitCode::FAILURE)
        }
    }
}
