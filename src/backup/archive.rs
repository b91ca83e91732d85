use crate::error::{LauncherError, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tar::Builder;
use walkdir::WalkDir;

/// Compress `source` into a gzip tarball at `destination`
///
/// The archive holds a single top-level directory named after `source`, so
/// extracting it recreates that folder. Runs on the blocking pool.
pub async fn compress_directory(source: &Path, destination: &Path) -> Result<()> {
    if !source.exists() {
        return Err(LauncherError::SourceNotFound(source.to_path_buf()));
    }
    if !source.is_dir() {
        return Err(LauncherError::SourceNotADirectory(source.to_path_buf()));
    }

    tracing::info!("Compressing directory {}...", source.display());

    let source_dir = source.to_path_buf();
    let archive = destination.to_path_buf();
    let result = {
        let source_dir = source_dir.clone();
        let archive = archive.clone();
        tokio::task::spawn_blocking(move || write_archive(&source_dir, &archive))
            .await
            .unwrap_or_else(|e| Err(io::Error::new(io::ErrorKind::Other, e)))
    };

    if let Err(source) = result {
        // A truncated archive must not pass for a recent backup later on
        if archive.exists() {
            if let Err(e) = std::fs::remove_file(&archive) {
                tracing::warn!(
                    "Failed to remove partial archive {}: {}",
                    archive.display(),
                    e
                );
            }
        }
        return Err(LauncherError::CompressionFailure {
            source_dir,
            archive,
            source,
        });
    }

    tracing::info!(
        "Compressed directory {} into {}",
        source.display(),
        destination.display()
    );
    Ok(())
}

fn write_archive(source: &Path, destination: &Path) -> io::Result<()> {
    let root = archive_root(source);

    let file = File::create(destination)?;
    let encoder = GzEncoder::new(file, Compression::best());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);

    for entry in WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry?;
        let path = entry.path();
        let name = match path.strip_prefix(source) {
            Ok(relative) if relative.as_os_str().is_empty() => root.clone(),
            Ok(relative) => root.join(relative),
            Err(_) => continue,
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            builder.append_dir(&name, path)?;
        } else if file_type.is_file() || file_type.is_symlink() {
            builder.append_path_with_name(path, &name)?;
        } else {
            // sockets, fifos and device nodes
            tracing::warn!("Skipping {}: unsupported file type", path.display());
        }
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?.sync_all()?;
    Ok(())
}

/// Top-level entry name inside the archive
fn archive_root(source: &Path) -> PathBuf {
    match source.file_name() {
        Some(name) => PathBuf::from(name),
        // `/` or a path ending in `..` has no base name
        None => PathBuf::from("."),
    }
}
