// CLI module - Command-line entry point of the launcher

use crate::backup::{handle_backups, BackupPolicy};
use crate::config::{self, keys, ConfigProvider, EnvProvider, FileProvider, ServerConfig, SupervisorSettings};
use crate::error::{chain, LauncherError, Result};
use crate::logs;
use crate::process::{Clock, RestartSchedule, ServerSupervisor, SystemClock};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Server launcher - runs a server, restarts it daily and keeps its backups
#[derive(Parser)]
#[command(name = "server-launcher")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Environment file holding the configuration (default: ./.env if present)
    #[arg(long, global = true, conflicts_with = "config")]
    env_file: Option<PathBuf>,

    /// TOML or JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server and supervise it (default)
    Run {
        /// Skip the backup cycle that runs before the first start
        #[arg(long)]
        no_initial_backup: bool,
    },

    /// Run a single backup cycle and exit
    Backup,

    /// Validate the configuration and print the launch command
    Check,
}

impl Cli {
    /// Run the CLI application
    pub async fn run() -> Result<()> {
        let cli = Cli::parse();
        cli.execute().await
    }

    /// Execute the parsed command
    pub async fn execute(self) -> Result<()> {
        let provider = self.provider()?;

        match self.command.unwrap_or(Commands::Run {
            no_initial_backup: false,
        }) {
            Commands::Run { no_initial_backup } => launch(provider, !no_initial_backup).await,
            Commands::Backup => backup_once(provider).await,
            Commands::Check => check(provider.as_ref()),
        }
    }

    fn provider(&self) -> Result<Box<dyn ConfigProvider>> {
        if let Some(ref path) = self.config {
            return Ok(Box::new(FileProvider::from_file(path)?));
        }

        let provider = match self.env_file {
            Some(ref path) => EnvProvider::with_file(path)?,
            None => EnvProvider::discover()?,
        };
        Ok(Box::new(provider))
    }
}

/// Log a fatal error with its causes before handing it back
fn fatal(err: LauncherError) -> LauncherError {
    error!("{}", chain(&err));
    err
}

fn init_logging(provider: &dyn ConfigProvider) -> Result<()> {
    let log_dir = config::require(provider, keys::LOGS_LAUNCHER_PATH)?;
    let log_path = logs::init(Path::new(&log_dir))?;
    info!("Logger initialised ({})", log_path.display());
    Ok(())
}

async fn launch(provider: Box<dyn ConfigProvider>, initial_backup: bool) -> Result<()> {
    init_logging(provider.as_ref())?;
    info!("Starting the launcher");

    if initial_backup {
        let policy = BackupPolicy::load(provider.as_ref()).map_err(fatal)?;
        handle_backups(&policy, SystemClock.now())
            .await
            .map_err(fatal)?;
    }

    let mut supervisor = ServerSupervisor::new(provider, Box::new(SystemClock)).map_err(fatal)?;
    supervisor.run().await?;

    info!("Launcher finished");
    Ok(())
}

async fn backup_once(provider: Box<dyn ConfigProvider>) -> Result<()> {
    init_logging(provider.as_ref())?;

    let policy = BackupPolicy::load(provider.as_ref()).map_err(fatal)?;
    let report = handle_backups(&policy, SystemClock.now())
        .await
        .map_err(fatal)?;

    match report.created {
        Some(ref path) => println!("✓ Created {}", path.display()),
        None => println!("✓ A recent backup exists, nothing created"),
    }
    if !report.deleted.is_empty() {
        println!("✓ Deleted {} expired backup(s)", report.deleted.len());
    }
    Ok(())
}

fn check(provider: &dyn ConfigProvider) -> Result<()> {
    logs::init_stderr();

    let log_dir = config::require(provider, keys::LOGS_LAUNCHER_PATH)?;
    let server = ServerConfig::load(provider)?;
    let settings = SupervisorSettings::load(provider)?;
    let restart_time = RestartSchedule::load_time(provider)?;
    let policy = BackupPolicy::load(provider)?;

    println!("Launch command:   {}", server.command_line());
    println!("Working dir:      {}", server.server_dir.display());
    println!("Daily restart:    {}", restart_time);
    println!("Check interval:   {}s", settings.poll_interval.as_secs());
    match settings.stop_timeout {
        Some(timeout) => println!("Stop timeout:     {}s", timeout.as_secs()),
        None => println!("Stop timeout:     none"),
    }
    println!("Log directory:    {}", log_dir);
    println!("Backup directory: {}", policy.archive_dir.display());
    println!(
        "Retention:        {} day(s), new backup after {} hour(s)",
        policy.retention_days, policy.min_interval_hours
    );
    println!("Archive name:     {}", policy.archive_name(SystemClock.now()));
    println!("✓ Configuration is valid");
    Ok(())
}
