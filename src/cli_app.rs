//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde::Serialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use cold_backup_mover::core::config::Config;
use cold_backup_mover::core::errors::MoverError;
use cold_backup_mover::logger::{self, LogSettings};
use cold_backup_mover::monitor::fs_stats::{DiskUsage, DiskUsageProbe};
use cold_backup_mover::mount::{MountReconciler, MountState};
use cold_backup_mover::notify::{self, ReportKind};
use cold_backup_mover::platform::pal::detect_platform;
use cold_backup_mover::runner::{self, RunOutcome, RunReport};
use cold_backup_mover::transfer::naming::get_new_name;
use cold_backup_mover::transfer::source::{
    discover_sources, get_file_list, get_oldest_file, get_size,
};

/// Cold Backup Mover: rotates month backups onto an external disk.
#[derive(Debug, Parser)]
#[command(
    name = "mover",
    author,
    version,
    about = "Cold Backup Mover - rotate month backups onto an external disk",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Log at DEBUG level.
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Mount the disk, move backups until the threshold, unmount and report.
    Run,
    /// Show disk presence, mount state and usage without changing anything.
    Status,
    /// List the next file each source would hand over.
    Pending,
    /// Show total/used/free space of the filesystem holding a path.
    Usage(UsageArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct UsageArgs {
    /// Any path on the filesystem to measure.
    #[arg(value_name = "PATH")]
    path: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Bad configuration or invalid user input.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// The mount point is in a state that must not be touched.
    #[error("{0}")]
    Fatal(String),
    /// The report could not be assembled.
    #[error("{0}")]
    Notification(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Json(_) | Self::Io(_) => 2,
            Self::Fatal(_) => 3,
            Self::Notification(_) => 4,
        }
    }
}

impl From<MoverError> for CliError {
    fn from(err: MoverError) -> Self {
        let message = err.to_string();
        match err {
            MoverError::InvalidConfig { .. }
            | MoverError::MissingConfig { .. }
            | MoverError::ConfigParse { .. }
            | MoverError::MissingKey { .. } => Self::User(message),
            MoverError::HangingMountPersists { .. } | MoverError::UnknownMountState { .. } => {
                Self::Fatal(message)
            }
            MoverError::AttachmentMissing { .. } => Self::Notification(message),
            _ => Self::Runtime(message),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Run => run_rotation(cli),
        Command::Status => run_status(cli),
        Command::Pending => run_pending(cli),
        Command::Usage(args) => run_usage(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn run_rotation(cli: &Cli) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let handle = logger::init(&LogSettings::from_config(&config, cli.verbose, !cli.no_color))?;
    let platform = detect_platform()?;
    let notifier = notify::from_config(&config)?;

    let report = runner::run_once(&config, platform, notifier.as_ref(), Some(handle.path()))?;

    match output_mode(cli) {
        OutputMode::Json => write_json_line(&report),
        OutputMode::Human => {
            print_run_report(&report);
            Ok(())
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusView {
    mount_point: PathBuf,
    uuids: Vec<String>,
    threshold_gb: f64,
    #[serde(flatten)]
    state: MountState,
    usage: Option<DiskUsage>,
}

fn run_status(cli: &Cli) -> Result<(), CliError> {
    init_console_logging(cli)?;
    let config = Config::load(cli.config.as_deref())?;
    let platform = detect_platform()?;

    let reconciler = MountReconciler::new(platform.clone(), &config.disk);
    let state = reconciler.state()?;
    let usage = match state {
        MountState::MountedCorrectly { .. } => {
            Some(DiskUsageProbe::new(platform).disk_usage(&config.disk.mount_point)?)
        }
        _ => None,
    };
    let view = StatusView {
        mount_point: config.disk.mount_point.clone(),
        uuids: config.disk.uuids.clone(),
        threshold_gb: config.disk.threshold_gb,
        state,
        usage,
    };

    match output_mode(cli) {
        OutputMode::Json => write_json_line(&view),
        OutputMode::Human => {
            println!("{}", "Cold Backup Mover status".bold());
            println!("  mount point: {}", view.mount_point.display());
            println!("  disk uuids:  {}", view.uuids.join(", "));
            println!("  threshold:   {:.2} GB", view.threshold_gb);
            let state_line = view.state.to_string();
            let colored_state = match view.state {
                MountState::MountedCorrectly { .. } => state_line.green(),
                MountState::MountedWrong { .. } => state_line.yellow(),
                MountState::Unmounted { .. } => state_line.normal(),
            };
            println!("  state:       {colored_state}");
            if let Some(usage) = &view.usage {
                print_usage(usage);
            }
            Ok(())
        }
    }
}

#[derive(Debug, Serialize)]
struct PendingEntry {
    source: PathBuf,
    server_name: String,
    oldest: Option<PathBuf>,
    size_gb: Option<f64>,
    destination: Option<PathBuf>,
    files: usize,
}

fn run_pending(cli: &Cli) -> Result<(), CliError> {
    init_console_logging(cli)?;
    let config = Config::load(cli.config.as_deref())?;
    let entries = pending_entries(&config.paths.source_dir, &config.disk.mount_point)?;

    match output_mode(cli) {
        OutputMode::Json => write_json_line(&entries),
        OutputMode::Human => {
            if entries.is_empty() {
                println!("no source folders under {}", config.paths.source_dir.display());
            }
            for entry in &entries {
                match (&entry.oldest, entry.size_gb, &entry.destination) {
                    (Some(oldest), Some(size), Some(dest)) => println!(
                        "{} ({} files): {} [{size:.2} GB] -> {}",
                        entry.server_name.bold(),
                        entry.files,
                        oldest.display(),
                        dest.display()
                    ),
                    _ => println!("{}: {}", entry.server_name.bold(), "empty".dimmed()),
                }
            }
            Ok(())
        }
    }
}

fn pending_entries(source_dir: &Path, mount_point: &Path) -> Result<Vec<PendingEntry>, CliError> {
    let mut pending = Vec::new();
    for entry in discover_sources(source_dir)? {
        let files = get_file_list(&entry)?;
        let mut view = PendingEntry {
            source: entry.path.clone(),
            server_name: entry.server_name.clone(),
            oldest: None,
            size_gb: None,
            destination: None,
            files: files.len(),
        };
        if !files.is_empty() {
            let oldest = get_oldest_file(&files)?;
            view.size_gb = Some(get_size(&oldest)?);
            view.destination = Some(
                mount_point
                    .join(&entry.server_name)
                    .join(get_new_name(&oldest)?),
            );
            view.oldest = Some(oldest);
        }
        pending.push(view);
    }
    Ok(pending)
}

fn run_usage(cli: &Cli, args: &UsageArgs) -> Result<(), CliError> {
    init_console_logging(cli)?;
    let usage = DiskUsageProbe::new(detect_platform()?).disk_usage(&args.path)?;
    match output_mode(cli) {
        OutputMode::Json => write_json_line(&usage),
        OutputMode::Human => {
            println!("{}", args.path.display().to_string().bold());
            print_usage(&usage);
            Ok(())
        }
    }
}

fn init_console_logging(cli: &Cli) -> Result<(), CliError> {
    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    logger::init_console(level, !cli.no_color)?;
    Ok(())
}

fn print_run_report(report: &RunReport) {
    let tag = match report.report.kind {
        ReportKind::Success => report.report.subject.green().bold(),
        ReportKind::Warning => report.report.subject.yellow().bold(),
        ReportKind::Error => report.report.subject.red().bold(),
    };
    println!("{tag}");
    let outcome = match &report.outcome {
        RunOutcome::Completed => "every month folder was emptied".to_string(),
        RunOutcome::ThresholdReached => "stopped at the free-space threshold".to_string(),
        RunOutcome::Stalled { files } => format!("{} file(s) could not be moved", files.len()),
        RunOutcome::NotExecuted => "the disk could not be mounted".to_string(),
        RunOutcome::Aborted { error } => format!("aborted: {error}"),
    };
    println!("  outcome:   {outcome}");
    if let Some(uuid) = &report.uuid {
        println!("  disk uuid: {uuid}");
    }
    if let Some(summary) = &report.transfers {
        println!(
            "  moved:     {} file(s), {:.2} GB in {} pass(es)",
            summary.moved_count(),
            summary.moved_gb(),
            summary.passes
        );
    }
    if let Some(usage) = &report.usage {
        print_usage(usage);
    }
    if report.transfers.is_some() || report.usage.is_some() {
        println!("  unmounted: {}", if report.unmounted { "yes" } else { "no" });
    }
}

fn print_usage(usage: &DiskUsage) {
    println!("  total:       {:.2} GB", usage.total_gb);
    println!("  used:        {:.2} GB", usage.used_gb);
    println!("  free:        {:.2} GB", usage.free_gb);
}

fn write_json_line<T: Serialize + ?Sized>(payload: &T) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("MOVER_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
