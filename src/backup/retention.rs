use crate::backup::archive::compress_directory;
use crate::config::{self, keys, ConfigProvider, DEFAULT_SERVICE_NAME};
use crate::error::{LauncherError, Result};
use chrono::{DateTime, Duration, Local, NaiveDateTime};
use std::path::{Path, PathBuf};

/// Suffix identifying archives in the backup directory
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// What to back up, where, and how long to keep it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPolicy {
    /// Directory holding the archives
    pub archive_dir: PathBuf,

    /// Directory to archive
    pub source_dir: PathBuf,

    /// Archives older than this many days are deleted
    pub retention_days: u32,

    /// An archive younger than this many hours makes a new one unnecessary
    pub min_interval_hours: u32,

    /// Name used in archive file names
    pub service_name: String,
}

impl BackupPolicy {
    pub fn load(provider: &dyn ConfigProvider) -> Result<Self> {
        Ok(Self {
            source_dir: PathBuf::from(config::require(provider, keys::SERVER_PATH)?),
            archive_dir: PathBuf::from(config::require(provider, keys::BACKUPS_PATH)?),
            retention_days: config::require_parsed(provider, keys::NB_DAYS_BEFORE_DELETE_BACKUP)?,
            min_interval_hours: config::require_parsed(provider, keys::NB_HOURS_BEFORE_NEW_BACKUP)?,
            service_name: provider
                .lookup(keys::SERVICE_NAME)
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
        })
    }

    fn retention_window(&self) -> Duration {
        Duration::days(i64::from(self.retention_days))
    }

    fn min_interval(&self) -> Duration {
        Duration::hours(i64::from(self.min_interval_hours))
    }

    /// File name of an archive created at `now`
    pub fn archive_name(&self, now: NaiveDateTime) -> String {
        format!(
            "backup_{}_{}{}",
            self.service_name,
            now.format("%Y%m%d_%H%M%S"),
            ARCHIVE_EXTENSION
        )
    }
}

/// One entry of the archive directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub created: NaiveDateTime,
    pub is_file: bool,
}

/// What a retention pass decided
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    /// Archives past the retention window
    pub expired: Vec<String>,

    /// Archives younger than the minimum interval
    pub recent: Vec<String>,

    /// Entries that are not archives
    pub ignored: Vec<String>,

    /// The directory had no entries at all
    pub was_empty: bool,
}

impl RetentionPlan {
    pub fn needs_new_archive(&self) -> bool {
        self.was_empty || self.recent.is_empty()
    }
}

/// Decide which archives expire and whether a new one is needed
///
/// Expiry is checked before recency, so an archive is never both; every
/// age is measured against the same `now`.
pub fn plan(entries: &[DirEntryInfo], policy: &BackupPolicy, now: NaiveDateTime) -> RetentionPlan {
    let mut plan = RetentionPlan {
        was_empty: entries.is_empty(),
        ..RetentionPlan::default()
    };

    for entry in entries {
        if !entry.is_file || !entry.name.ends_with(ARCHIVE_EXTENSION) {
            plan.ignored.push(entry.name.clone());
            continue;
        }

        let age = now - entry.created;
        if age > policy.retention_window() {
            plan.expired.push(entry.name.clone());
        } else if age < policy.min_interval() {
            plan.recent.push(entry.name.clone());
        }
    }

    plan
}

/// List the archive directory
pub fn list_directory_entries(dir: &Path) -> Result<Vec<DirEntryInfo>> {
    let read_dir = std::fs::read_dir(dir).map_err(|source| LauncherError::RetentionFailure {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut entries = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|source| LauncherError::RetentionFailure {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let metadata = entry
            .metadata()
            .map_err(|source| LauncherError::RetentionFailure {
                path: path.clone(),
                source,
            })?;
        let modified = metadata
            .modified()
            .map_err(|source| LauncherError::RetentionFailure { path, source })?;

        entries.push(DirEntryInfo {
            name: entry.file_name().to_string_lossy().into_owned(),
            created: DateTime::<Local>::from(modified).naive_local(),
            is_file: metadata.is_file(),
        });
    }

    // Stable order for the logs
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Outcome of a backup cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub deleted: Vec<PathBuf>,
    pub recent: Vec<String>,
    pub ignored: Vec<String>,
    pub created: Option<PathBuf>,
}

/// Run one backup cycle: delete expired archives, then archive the source
/// directory unless a recent archive already exists
pub async fn handle_backups(policy: &BackupPolicy, now: NaiveDateTime) -> Result<BackupReport> {
    tracing::info!("Starting backup cycle");

    if !policy.archive_dir.exists() {
        std::fs::create_dir_all(&policy.archive_dir).map_err(|source| {
            LauncherError::RetentionFailure {
                path: policy.archive_dir.clone(),
                source,
            }
        })?;
        tracing::info!("Created backup directory {}", policy.archive_dir.display());
    }

    let entries = list_directory_entries(&policy.archive_dir)?;
    let plan = plan(&entries, policy, now);

    for name in &plan.ignored {
        tracing::info!("{} is not a {} archive, ignoring it", name, ARCHIVE_EXTENSION);
    }

    let mut deleted = Vec::with_capacity(plan.expired.len());
    for name in &plan.expired {
        let path = policy.archive_dir.join(name);
        std::fs::remove_file(&path).map_err(|source| LauncherError::RetentionFailure {
            path: path.clone(),
            source,
        })?;
        tracing::info!(
            "Deleted {} as it is older than {} day(s)",
            name,
            policy.retention_days
        );
        deleted.push(path);
    }

    for name in &plan.recent {
        tracing::info!(
            "Backup {} was created less than {} hour(s) ago",
            name,
            policy.min_interval_hours
        );
    }

    let created = if plan.needs_new_archive() {
        if plan.was_empty {
            tracing::info!("No existing backup, creating one");
        }
        let archive = policy.archive_dir.join(policy.archive_name(now));
        compress_directory(&policy.source_dir, &archive).await?;
        Some(archive)
    } else {
        None
    };

    tracing::info!("Backup cycle finished");

    Ok(BackupReport {
        deleted,
        recent: plan.recent,
        ignored: plan.ignored,
        created,
    })
}
