use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{MediaKind, STAGING_PREFIX};
use crate::error::{Result, MuxError};

/// Options for a directory walk
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub recursive: bool,
    /// Subtree to leave out, typically an output directory nested inside the input
    pub exclude: Option<PathBuf>,
}

/// Candidate files of a directory, sorted by path
pub fn enumerate_candidates(root: &Path, options: &ScanOptions) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(MuxError::Input(format!(
            "Path is not a directory: {}",
            root.display()
        )));
    }

    let exclude = options
        .exclude
        .as_ref()
        .and_then(|p| p.canonicalize().ok())
        .filter(|p| root.canonicalize().map(|r| &r != p).unwrap_or(true));

    let max_depth = if options.recursive { usize::MAX } else { 1 };
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
                return false;
            }
            match (&exclude, entry.file_type().is_dir()) {
                (Some(excluded), true) => entry
                    .path()
                    .canonicalize()
                    .map(|p| &p != excluded)
                    .unwrap_or(true),
                _ => true,
            }
        });

    let mut candidates = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if MediaKind::from_path(entry.path()).is_some() {
            candidates.push(entry.into_path());
        } else {
            debug!("Ignoring non-media file: {}", entry.path().display());
        }
    }

    candidates.sort();
    Ok(candidates)
}
