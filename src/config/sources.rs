use super::ConfigProvider;
use crate::error::{LauncherError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Dotenv file looked up in the working directory when none is given
const DEFAULT_ENV_FILE: &str = ".env";

/// Values from the process environment, backed by an optional dotenv file
///
/// The process environment wins over the file, so a value exported by the
/// service manager is never shadowed by a stale `.env` entry.
#[derive(Debug, Clone)]
pub struct EnvProvider {
    env_file: Option<PathBuf>,
    file_values: HashMap<String, String>,
}

impl EnvProvider {
    /// Use an explicit dotenv file, which must exist
    pub fn with_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(LauncherError::InvalidConfig(format!(
                "Environment file does not exist: {}",
                path.display()
            )));
        }

        let mut provider = Self {
            env_file: Some(path),
            file_values: HashMap::new(),
        };
        provider.refresh()?;
        Ok(provider)
    }

    /// Use `.env` from the working directory if there is one
    pub fn discover() -> Result<Self> {
        Self::discover_in(&std::env::current_dir()?)
    }

    /// Use `.env` from `dir` if there is one
    pub fn discover_in(dir: &Path) -> Result<Self> {
        let default = dir.join(DEFAULT_ENV_FILE);
        if default.is_file() {
            Self::with_file(default)
        } else {
            Ok(Self::environment_only())
        }
    }

    /// Only read the process environment
    pub fn environment_only() -> Self {
        Self {
            env_file: None,
            file_values: HashMap::new(),
        }
    }

    pub fn env_file(&self) -> Option<&Path> {
        self.env_file.as_deref()
    }
}

impl ConfigProvider for EnvProvider {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .or_else(|| self.file_values.get(key).cloned())
    }

    fn refresh(&mut self) -> Result<()> {
        let Some(ref path) = self.env_file else {
            return Ok(());
        };

        let iter = dotenvy::from_path_iter(path).map_err(|e| {
            LauncherError::InvalidConfig(format!(
                "Failed to read environment file {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut values = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|e| {
                LauncherError::InvalidConfig(format!(
                    "Failed to parse environment file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            values.insert(key, value);
        }

        tracing::debug!(
            "Loaded {} value(s) from {}",
            values.len(),
            path.display()
        );
        self.file_values = values;
        Ok(())
    }
}

/// A scalar entry of a flat configuration file
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScalarValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Flag(bool),
}

impl ScalarValue {
    fn into_string(self) -> String {
        match self {
            ScalarValue::Text(s) => s,
            ScalarValue::Integer(i) => i.to_string(),
            ScalarValue::Float(f) => f.to_string(),
            ScalarValue::Flag(b) => b.to_string(),
        }
    }
}

/// Values from a flat TOML or JSON file, re-read on refresh
#[derive(Debug, Clone)]
pub struct FileProvider {
    path: PathBuf,
    values: HashMap<String, String>,
}

impl FileProvider {
    /// Load a configuration file (supports TOML and JSON)
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = Self::read(&path)?;
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(path: &Path) -> Result<HashMap<String, String>> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            LauncherError::InvalidConfig(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        // Determine format based on file extension
        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let table: HashMap<String, ScalarValue> = match extension {
            "toml" => toml::from_str(&contents)
                .map_err(|e| LauncherError::InvalidConfig(format!("Failed to parse TOML: {}", e)))?,
            "json" => serde_json::from_str(&contents)
                .map_err(|e| LauncherError::InvalidConfig(format!("Failed to parse JSON: {}", e)))?,
            _ => {
                return Err(LauncherError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        Ok(table
            .into_iter()
            .map(|(key, value)| (key, value.into_string()))
            .collect())
    }
}

impl ConfigProvider for FileProvider {
    fn lookup(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn refresh(&mut self) -> Result<()> {
        self.values = Self::read(&self.path)?;
        tracing::debug!("Reloaded configuration from {}", self.path.display());
        Ok(())
    }
}

/// In-memory values
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    values: HashMap<String, String>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }
}

impl ConfigProvider for StaticProvider {
    fn lookup(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}
