use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the launcher
#[derive(Debug, Error)]
pub enum LauncherError {
    // Configuration errors
    #[error("No value defined for configuration key \"{0}\"")]
    MissingValue(String),

    #[error("Invalid value \"{value}\" for configuration key \"{key}\": {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    // Supervised process errors
    #[error("Unable to start the server with command `{command}`")]
    StartupFailure {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to restart the server with command `{command}`")]
    RestartFailure {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server process exited unexpectedly with return code {0}")]
    UnexpectedExit(i32),

    #[error("Failed to stop server process {pid}")]
    StopFailure {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    // Backup errors
    #[error("Directory to compress does not exist: {0}")]
    SourceNotFound(PathBuf),

    #[error("Path is not a directory: {0}")]
    SourceNotADirectory(PathBuf),

    #[error("Failed to compress {source_dir} into {archive}")]
    CompressionFailure {
        source_dir: PathBuf,
        archive: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Backup retention failed on {path}")]
    RetentionFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Log errors
    #[error("Log error: {0}")]
    LogError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for launcher operations
pub type Result<T> = std::result::Result<T, LauncherError>;

/// Render an error followed by all of its causes, joined by ` -> `
pub fn chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(" -> ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
