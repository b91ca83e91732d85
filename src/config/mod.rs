// Config module - Named configuration values and the typed views built on them

mod sources;

pub use sources::{EnvProvider, FileProvider, StaticProvider};

use crate::error::{LauncherError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Configuration keys understood by the launcher
pub mod keys {
    pub const LOGS_LAUNCHER_PATH: &str = "LOGS_LAUNCHER_PATH";
    pub const SERVER_PATH: &str = "SERVER_PATH";
    pub const BACKUPS_PATH: &str = "BACKUPS_PATH";
    pub const NB_DAYS_BEFORE_DELETE_BACKUP: &str = "NB_DAYS_BEFORE_DELETE_BACKUP";
    pub const NB_HOURS_BEFORE_NEW_BACKUP: &str = "NB_HOURS_BEFORE_NEW_BACKUP";
    pub const TIME_WHEN_REBOOT: &str = "TIME_WHEN_REBOOT";
    pub const JAVA_EXE_PATH: &str = "JAVA_EXE_PATH";
    pub const MAX_RAM_GB: &str = "MAX_RAM_GB";
    pub const MIN_RAM_GB: &str = "MIN_RAM_GB";
    pub const SERVER_JAR_PATH: &str = "SERVER_JAR_PATH";
    pub const SECONDS_BETWEEN_CHECKS: &str = "SECONDS_BETWEEN_CHECKS";
    pub const SERVICE_NAME: &str = "SERVICE_NAME";
    pub const STOP_TIMEOUT_SECS: &str = "STOP_TIMEOUT_SECS";

    /// Earlier names still accepted for a few keys
    pub(crate) fn legacy_name(key: &str) -> Option<&'static str> {
        match key {
            SERVER_PATH => Some("MINECRAFT_SERVER_PATH"),
            SERVER_JAR_PATH => Some("MINECRAFT_SERVER_JAR_PATH"),
            _ => None,
        }
    }
}

/// Service name used in archive file names when `SERVICE_NAME` is not set
pub const DEFAULT_SERVICE_NAME: &str = "server";

/// A source of named configuration values
///
/// Values are looked up on every read. `refresh` lets file-backed sources
/// pick up edits; the supervisor only calls it at a restart boundary.
pub trait ConfigProvider: Send + Sync {
    /// Look up the raw value for a key
    fn lookup(&self, key: &str) -> Option<String>;

    /// Re-read the underlying source
    fn refresh(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Look up a value, falling back to the key's earlier name
fn lookup(provider: &dyn ConfigProvider, key: &str) -> Option<String> {
    provider.lookup(key).or_else(|| {
        let legacy = keys::legacy_name(key)?;
        let value = provider.lookup(legacy)?;
        tracing::warn!("{} is deprecated, rename it to {}", legacy, key);
        Some(value)
    })
}

/// Read a required value
pub fn require(provider: &dyn ConfigProvider, key: &str) -> Result<String> {
    lookup(provider, key).ok_or_else(|| LauncherError::MissingValue(key.to_string()))
}

/// Read and parse a required value
pub fn require_parsed<T>(provider: &dyn ConfigProvider, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = require(provider, key)?;
    parse_value(key, raw)
}

/// Read and parse a value that may be absent
pub fn optional_parsed<T>(provider: &dyn ConfigProvider, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(provider, key)
        .map(|raw| parse_value(key, raw))
        .transpose()
}

fn parse_value<T>(key: &str, raw: String) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| LauncherError::InvalidValue {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })
}

/// Settings describing how to launch the supervised server
///
/// Re-read from the provider at every restart boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Runtime executable (e.g. the `java` binary)
    pub java_exe: PathBuf,

    /// Upper memory bound in GB (`-Xmx`)
    pub max_ram_gb: u32,

    /// Lower memory bound in GB (`-Xms`)
    pub min_ram_gb: u32,

    /// Working directory of the server, also the backup source
    pub server_dir: PathBuf,

    /// Entrypoint artifact passed to `-jar`
    pub jar_path: PathBuf,
}

impl ServerConfig {
    pub fn load(provider: &dyn ConfigProvider) -> Result<Self> {
        Ok(Self {
            server_dir: PathBuf::from(require(provider, keys::SERVER_PATH)?),
            java_exe: PathBuf::from(require(provider, keys::JAVA_EXE_PATH)?),
            max_ram_gb: require_parsed(provider, keys::MAX_RAM_GB)?,
            min_ram_gb: require_parsed(provider, keys::MIN_RAM_GB)?,
            jar_path: PathBuf::from(require(provider, keys::SERVER_JAR_PATH)?),
        })
    }

    /// Arguments passed to the runtime executable
    pub fn args(&self) -> Vec<String> {
        vec![
            format!("-Xmx{}G", self.max_ram_gb),
            format!("-Xms{}G", self.min_ram_gb),
            "-jar".to_string(),
            self.jar_path.to_string_lossy().into_owned(),
            "nogui".to_string(),
        ]
    }

    /// Full command line, for logs and error messages
    pub fn command_line(&self) -> String {
        let mut parts = vec![self.java_exe.to_string_lossy().into_owned()];
        parts.extend(self.args());
        parts.join(" ")
    }
}

/// Loop settings for the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Sleep between two health checks
    pub poll_interval: Duration,

    /// Bound on the graceful stop wait; `None` waits until the server exits
    pub stop_timeout: Option<Duration>,
}

impl SupervisorSettings {
    pub fn load(provider: &dyn ConfigProvider) -> Result<Self> {
        let poll_secs: u64 = require_parsed(provider, keys::SECONDS_BETWEEN_CHECKS)?;
        let stop_timeout_secs: Option<u64> = optional_parsed(provider, keys::STOP_TIMEOUT_SECS)?;

        let settings = Self {
            poll_interval: Duration::from_secs(poll_secs),
            stop_timeout: stop_timeout_secs.map(Duration::from_secs),
        };
        if settings.may_skip_restart_minute() {
            tracing::warn!(
                "{} is {}s: checks may skip the minute of the scheduled restart",
                keys::SECONDS_BETWEEN_CHECKS,
                poll_secs
            );
        }
        Ok(settings)
    }

    /// A check interval of a minute or more can step over the restart minute
    pub fn may_skip_restart_minute(&self) -> bool {
        self.poll_interval >= Duration::from_secs(60)
    }
}
