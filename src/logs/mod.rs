// Logs module - Launcher log file and tracing subscriber setup

use crate::error::{LauncherError, Result};
use chrono::{Local, NaiveDateTime};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Timestamp format used in log lines
const LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Name of the log file for a launcher run started at `started_at`
pub fn log_file_name(started_at: NaiveDateTime) -> String {
    format!("log_launcher_{}.log", started_at.format("%Y%m%d_%H%M%S"))
}

/// Create the log directory and a fresh (truncated) log file for this run
pub fn create_log_file(log_dir: &Path, started_at: NaiveDateTime) -> Result<(PathBuf, std::fs::File)> {
    std::fs::create_dir_all(log_dir).map_err(|e| {
        LauncherError::LogError(format!(
            "Failed to create log directory {}: {}",
            log_dir.display(),
            e
        ))
    })?;

    let path = log_dir.join(log_file_name(started_at));
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
        .map_err(|e| {
            LauncherError::LogError(format!("Failed to open log file {}: {}", path.display(), e))
        })?;

    Ok((path, file))
}

/// Install the process-wide subscriber: one layer writing to the run's log
/// file and one writing to stderr
///
/// The level comes from `RUST_LOG` and defaults to `info`. Must be called
/// once, at process entry.
pub fn init(log_dir: &Path) -> Result<PathBuf> {
    let (path, file) = create_log_file(log_dir, Local::now().naive_local())?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_timer(ChronoLocal::new(LOG_TIME_FORMAT.to_string()))
        .with_writer(Mutex::new(file));

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_timer(ChronoLocal::new(LOG_TIME_FORMAT.to_string()))
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| LauncherError::LogError(format!("Failed to install logger: {}", e)))?;

    Ok(path)
}

/// Install a stderr-only subscriber for commands that do not own a log file
pub fn init_stderr() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}
