//! Local directory listing.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::DirectoryError;
use crate::listing::{DirectoryListing, Entry};

/// List the direct children of `path`.
///
/// Best effort: an entry that vanishes or cannot be stat'ed between
/// enumeration and the size query is left out rather than failing the call.
/// Symlinks are classified by their target; dangling links are skipped.
pub fn list(path: impl AsRef<Path>) -> Result<DirectoryListing, DirectoryError> {
    let path = path.as_ref();
    let shown = path.display().to_string();

    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(DirectoryError::NotADirectory(shown)),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            return Err(DirectoryError::PermissionDenied(shown))
        }
        Err(_) => return Err(DirectoryError::NotADirectory(shown)),
    }

    let mut entries = Vec::new();
    for item in WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
    {
        let item = match item {
            Ok(item) => item,
            Err(e) => {
                // Depth 0 errors mean the directory itself could not be opened.
                if e.depth() == 0 {
                    return Err(match e.io_error().map(io::Error::kind) {
                        Some(io::ErrorKind::PermissionDenied) => {
                            DirectoryError::PermissionDenied(shown)
                        }
                        _ => DirectoryError::NotADirectory(shown),
                    });
                }
                debug!("skipping entry in {}: {}", shown, e);
                continue;
            }
        };

        let name = item.file_name().to_string_lossy().into_owned();
        if item.file_type().is_dir() {
            entries.push(Entry::directory(name));
            continue;
        }
        match item.metadata() {
            Ok(meta) => entries.push(Entry::file(name, meta.len())),
            Err(e) => debug!("skipping {} in {}: {}", name, shown, e),
        }
    }

    Ok(DirectoryListing::from_entries(entries))
}

/// Parent of a local directory for "up one" navigation; `"."` when there is none.
pub fn parent(path: impl AsRef<Path>) -> PathBuf {
    match path.as_ref().parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
