use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

use aim::config::{self, Config};
use aim::elevate::{DirectRunner, ElevationRunner, PkexecRunner};
use aim::install::{self, InstallOutcome, InstallRequest};
use aim::leftover::{self, LeftoverKind};
use aim::registry::{AppRecord, AppRegistry, ManagementType};
use aim::resolve::InstallMode;

#[derive(Parser)]
#[command(name = "aim", about = "AppImage installer and integrator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the registry file
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Reduce log output (show warnings/errors only)
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract an archive into an install directory and integrate it
    Install {
        /// AppImage file to install
        archive: PathBuf,

        /// Install destination: user, system, or custom
        #[arg(long, default_value = "user")]
        mode: InstallMode,

        /// Base directory for custom mode
        #[arg(long)]
        prefix: Option<PathBuf>,

        /// Show what would be done (for system mode, the exact elevated script)
        #[arg(long)]
        dry_run: bool,
    },
    /// Keep an archive whole in the library and add launcher plumbing
    Register {
        /// AppImage file to register
        archive: PathBuf,
    },
    /// Remove a managed app and its integration
    Uninstall {
        /// App id or name
        app: String,
    },
    /// List managed apps
    List,
    /// Show detailed information about a managed app
    Query {
        /// App id or name
        app: String,
    },
    /// Find untracked installs, orphaned menu entries and app data
    Scan {
        /// Also scan config/cache directories for this app name
        #[arg(long)]
        app: Option<String>,
    },
    /// Remove the given leftover paths
    Clean {
        /// Paths reported by scan
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut filter = if cli.quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::new("info")
    };
    if cli.verbose > 0 {
        filter = EnvFilter::new("debug");
    }
    if cli.verbose > 1 {
        filter = EnvFilter::new("trace");
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load(cli.config.as_deref()).context("failed to load config")?;
    let registry_path = cli
        .registry
        .unwrap_or_else(|| config.general.registry_path.clone());
    let mut registry =
        AppRegistry::open(&registry_path).context("failed to open registry")?;
    let runner: Box<dyn ElevationRunner> = if config::running_as_root() {
        Box::new(DirectRunner)
    } else {
        Box::new(PkexecRunner)
    };

    match cli.command {
        Commands::Install { archive, mode, prefix, dry_run } => {
            let request = InstallRequest {
                archive,
                mode,
                custom_prefix: prefix,
                dry_run,
            };
            match install::install_archive(&config, &mut registry, &request, runner.as_ref()) {
                Ok(InstallOutcome::Installed(record)) => {
                    println!(
                        "installed {} {}",
                        record.name.green(),
                        record.version.as_deref().unwrap_or(""),
                    );
                    println!("  location: {}", record.install_path.display());
                    if let Some(link) = &record.executable_symlink {
                        println!("  launcher: {}", link.display());
                    }
                }
                Ok(InstallOutcome::DryRun(report)) => print!("{report}"),
                Err(e) => fail(e),
            }
        }
        Commands::Register { archive } => {
            match install::register_archive(&config, &mut registry, &archive) {
                Ok(record) => {
                    println!("registered {}", record.name.green());
                    println!("  archive: {}", record.install_path.display());
                }
                Err(e) => fail(e),
            }
        }
        Commands::Uninstall { app } => {
            match aim::uninstall::uninstall_app(&config, &mut registry, &app, runner.as_ref()) {
                Ok(report) => {
                    println!("removed {}", report.record.name.green());
                    for warning in &report.warnings {
                        println!("  {} {}", "warning:".yellow(), warning);
                    }
                }
                Err(e) => fail(e),
            }
        }
        Commands::List => {
            if registry.list().is_empty() {
                println!("no apps under management");
            }
            for record in registry.list() {
                let kind = match record.management_type {
                    ManagementType::Installed => "installed",
                    ManagementType::Registered => "registered",
                };
                let short_id = &record.id[..8.min(record.id.len())];
                println!(
                    "{}  {}  {}  ({})",
                    short_id.dimmed(),
                    record.name.bold(),
                    record.version.as_deref().unwrap_or("-"),
                    kind,
                );
            }
        }
        Commands::Query { app } => match registry.find(&app) {
            Some(record) => print_record(record),
            None => fail(aim::error::AimError::AppNotFound(app)),
        },
        Commands::Scan { app } => {
            let mut candidates = leftover::scan_untracked_installs(&config, &registry);
            candidates.extend(leftover::scan_orphaned_desktop_files(&config, &registry));
            if let Some(name) = &app {
                candidates.extend(leftover::scan_user_data(&config::home_dir(), name));
            }
            if candidates.is_empty() {
                println!("nothing found");
            }
            for c in &candidates {
                let label = match c.kind {
                    LeftoverKind::MarkedLeftover => "leftover install".red().to_string(),
                    LeftoverKind::UnmarkedLeftover => "untracked dir".yellow().to_string(),
                    LeftoverKind::OrphanedIntegration => "orphaned entry".red().to_string(),
                    LeftoverKind::UserDataLeftover => "app data".cyan().to_string(),
                };
                println!("{label:<18} {}  [{}]", c.path.display(), c.display_name);
            }
        }
        Commands::Clean { paths } => {
            let candidates: Vec<_> = paths
                .into_iter()
                .map(|path| aim::leftover::LeftoverCandidate {
                    display_name: path.display().to_string(),
                    path,
                    kind: LeftoverKind::MarkedLeftover,
                })
                .collect();
            let (removed, failed) = leftover::remove_candidates(&candidates);
            println!("removed {removed} item(s), {failed} failure(s)");
            if failed > 0 {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn print_record(record: &AppRecord) {
    println!("{}", record.name.bold());
    println!("  id:        {}", record.id);
    println!("  version:   {}", record.version.as_deref().unwrap_or("unknown"));
    println!("  mode:      {}", record.install_mode);
    println!(
        "  type:      {}",
        match record.management_type {
            ManagementType::Installed => "installed",
            ManagementType::Registered => "registered",
        }
    );
    println!("  location:  {}", record.install_path.display());
    if let Some(p) = &record.executable_path {
        println!("  exec:      {}", p.display());
    }
    if let Some(p) = &record.executable_symlink {
        println!("  launcher:  {}", p.display());
    }
    if let Some(p) = &record.desktop_file_path {
        println!("  desktop:   {}", p.display());
    }
    println!("  installed: {}", record.install_date.format("%Y-%m-%d %H:%M"));
    if record.requires_root {
        println!("  requires root to remove");
    }
}

fn fail(e: aim::error::AimError) -> ! {
    eprintln!("error: {e}");
    std::process::exit(1);
}
