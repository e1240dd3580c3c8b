//! ABOUTME: Filesystem walk for the retention sweep
//! ABOUTME: Deletes files older than a cutoff, prunes empty directories bottom-up

use std::{io, path::Path, time::SystemTime};
use tracing::{debug, info, warn};

/// Recursively delete regular files with mtime older than `cutoff`.
///
/// Per-file failures are logged and skipped; the walk continues. Returns the
/// number of files deleted and their total size in bytes.
pub(crate) fn remove_files_older_than(dir: &Path, cutoff: SystemTime) -> (usize, u64) {
    let mut deleted = 0usize;
    let mut bytes = 0u64;

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Failed to read directory");
            return (0, 0);
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let (d, b) = remove_files_older_than(&path, cutoff);
            deleted += d;
            bytes += b;
            continue;
        }

        match older_than(&path, cutoff) {
            Ok(false) => {}
            Ok(true) => {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                match std::fs::remove_file(&path) {
                    Ok(()) => {
                        deleted += 1;
                        bytes += size;
                        info!(path = %path.display(), "Deleted old recording");
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to delete old recording");
                    }
                }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to stat recording");
            }
        }
    }

    (deleted, bytes)
}

fn older_than(path: &Path, cutoff: SystemTime) -> io::Result<bool> {
    Ok(path.metadata()?.modified()? < cutoff)
}

/// Remove empty directories under `root`, deepest first; `root` itself stays
pub(crate) fn prune_empty_dirs(root: &Path) {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %root.display(), error = %e, "Failed to read directory");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        prune_empty_dirs(&path);
        let is_empty = std::fs::read_dir(&path)
            .map(|mut contents| contents.next().is_none())
            .unwrap_or(false);
        if is_empty {
            match std::fs::remove_dir(&path) {
                Ok(()) => debug!(dir = %path.display(), "Removed empty directory"),
                Err(e) => warn!(dir = %path.display(), error = %e, "Failed to remove directory"),
            }
        }
    }
}
