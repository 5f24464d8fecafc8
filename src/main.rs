//! configdrive-init - provision a VM from its config drive
//!
//! Finds the config drive, merges its documents and applies network settings
//! and local accounts. Exit status is 0 on a clean run, 1 when nothing could
//! be scanned and 2 when the run finished with failures.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use configdrive_init::control::dry_run::DryRun;
use configdrive_init::control::linux::Linux;
use configdrive_init::control::netsh::Netsh;
use configdrive_init::provision::FileStatus;
use configdrive_init::{ControlPlane, DirectorySource, ProvisionOptions, Provisioner};

const EXIT_FATAL: u8 = 1;
const EXIT_PARTIAL: u8 = 2;

#[derive(Parser)]
#[command(name = "configdrive-init")]
#[command(author, version, about = "Provision a VM from its config drive", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the config drive and apply it (default)
    Provision(ProvisionArgs),
    /// Print the config root without reading it
    Locate(DiscoveryArgs),
    /// Print the merged config without applying it
    Show(DiscoveryArgs),
}

#[derive(Parser, Debug, Clone)]
struct DiscoveryArgs {
    /// Use this directory as the config root, skipping volume discovery
    #[arg(long, env = "CONFIGDRIVE_ROOT")]
    root: Option<PathBuf>,

    /// Probe this directory instead of the host's volumes (repeatable)
    #[arg(long = "search-dir")]
    search_dirs: Vec<PathBuf>,

    /// Volume label identifying the config drive
    #[arg(long)]
    label: Option<String>,
}

impl DiscoveryArgs {
    fn options(&self) -> ProvisionOptions {
        ProvisionOptions {
            root: self.root.clone(),
            search_dirs: self.search_dirs.clone(),
            label: self.label.clone(),
        }
    }
}

#[derive(Parser, Debug, Clone)]
struct ProvisionArgs {
    #[command(flatten)]
    discovery: DiscoveryArgs,

    /// Backend used to change host state
    #[arg(long, value_enum, default_value_t = PlaneKind::Auto, env = "CONFIGDRIVE_CONTROL_PLANE")]
    control_plane: PlaneKind,

    /// Log changes instead of making them
    #[arg(long, env = "CONFIGDRIVE_DRY_RUN")]
    dry_run: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum PlaneKind {
    Auto,
    Netsh,
    Linux,
}

impl PlaneKind {
    fn build(self, dry_run: bool) -> Box<dyn ControlPlane> {
        let kind = match self {
            PlaneKind::Auto if cfg!(windows) => PlaneKind::Netsh,
            PlaneKind::Auto => PlaneKind::Linux,
            other => other,
        };

        match (kind, dry_run) {
            (PlaneKind::Netsh, false) => Box::new(Netsh::new()),
            (PlaneKind::Netsh, true) => Box::new(DryRun::new(Netsh::new())),
            (_, false) => Box::new(Linux::new()),
            (_, true) => Box::new(DryRun::new(Linux::new())),
        }
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let command = match cli.command {
        Some(command) => command,
        None => {
            info!("No command specified, running provision");
            // Picks up the CONFIGDRIVE_* environment variables
            Commands::Provision(ProvisionArgs::parse_from(["configdrive-init"]))
        }
    };

    match command {
        Commands::Provision(args) => provision(&args, cli.format),
        Commands::Locate(args) => locate(&args, cli.format),
        Commands::Show(args) => show(&args, cli.format),
    }
}

fn provision(args: &ProvisionArgs, format: OutputFormat) -> Result<ExitCode> {
    let control = args.control_plane.build(args.dry_run);
    let source = DirectorySource::new();

    let report = Provisioner::new(args.discovery.options(), &source, control.as_ref())
        .run()
        .context("Provisioning aborted")?;

    match format {
        OutputFormat::Text => println!("{}", report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    Ok(exit_code(report.has_failures()))
}

fn locate(args: &DiscoveryArgs, format: OutputFormat) -> Result<ExitCode> {
    // Locating never mutates, so any plane will do
    let control = DryRun::new(Linux::new());
    let source = DirectorySource::new();

    let root = Provisioner::new(args.options(), &source, &control)
        .locate()
        .context("Config drive discovery failed")?;

    match format {
        OutputFormat::Text => println!("{}", root.path.display()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&root)?),
    }

    Ok(ExitCode::SUCCESS)
}

fn show(args: &DiscoveryArgs, format: OutputFormat) -> Result<ExitCode> {
    let control = DryRun::new(Linux::new());
    let source = DirectorySource::new();

    let scan = Provisioner::new(args.options(), &source, &control)
        .scan()
        .context("Config scan failed")?;
    let config = scan.config();

    match format {
        OutputFormat::Text => {
            println!("Config root: {}", scan.root.path.display());
            for file in &scan.files {
                println!("  {}  {}", file.name, file.status);
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        OutputFormat::Json => {
            let output = json!({
                "root": &scan.root,
                "files": &scan.files,
                "config": &config,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    let failed = scan.files.iter().any(|f| {
        matches!(
            f.status,
            FileStatus::ReadFailed { .. } | FileStatus::ParseFailed { .. }
        )
    });
    Ok(exit_code(failed))
}

fn exit_code(failed: bool) -> ExitCode {
    if failed {
        ExitCode::from(EXIT_PARTIAL)
    } else {
        ExitCode::SUCCESS
    }
}
