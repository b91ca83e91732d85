// Backup module - Archive retention and creation around restarts

pub mod archive;
pub mod retention;

pub use archive::compress_directory;
pub use retention::{
    handle_backups, list_directory_entries, plan, BackupPolicy, BackupReport, DirEntryInfo,
    RetentionPlan, ARCHIVE_EXTENSION,
};
