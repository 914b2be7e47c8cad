use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Lists regular files directly under `directory` whose name ends with
/// `extension` (case-sensitive). Paths are absolute and sorted.
pub fn list_files_with_extension(directory: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !directory.is_dir() {
        bail!("Source directory does not exist: {}", directory.display());
    }
    let root = std::fs::canonicalize(directory)
        .with_context(|| format!("Failed to resolve {}", directory.display()))?;

    let mut files = Vec::new();

    let walker = WalkDir::new(&root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true);
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry in {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if !entry.file_name().to_string_lossy().ends_with(extension) {
            continue;
        }
        files.push(entry.into_path());
    }

    files.sort();
    Ok(files)
}
