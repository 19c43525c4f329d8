//! 📂 The File Walker: turns `--files` into actual paths.
//!
//! 🧠 Knowledge graph:
//! - A directory → every regular file directly inside it. Not recursive. Subdirectories are ignored.
//!   Symlinks to files count as files. Sorted by name so runs are reproducible.
//! - Anything else → split on commas, trim, drop empty tokens. `a.gz, b.zst,` is two files.
//! - No existence checks. A missing file is the supervisor's problem (one failed file), not ours.
//! - No suffix filtering either. A README in the log directory gets its chance, fails, and is counted.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ShovelError;

/// 🔎 Expand a directory path or a comma-separated list into concrete file paths.
pub async fn discover_files(expression: &str) -> Result<Vec<PathBuf>, ShovelError> {
    let candidate = Path::new(expression.trim());
    let is_dir = tokio::fs::metadata(candidate)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false);

    if is_dir {
        list_directory(candidate).await
    } else {
        Ok(split_file_list(expression))
    }
}

/// ✂️ `"a.gz, b.zst,,"` → `["a.gz", "b.zst"]`.
pub fn split_file_list(expression: &str) -> Vec<PathBuf> {
    expression
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(PathBuf::from)
        .collect()
}

async fn list_directory(directory: &Path) -> Result<Vec<PathBuf>, ShovelError> {
    let walk_error = |source| ShovelError::Walk {
        path: directory.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(directory).await.map_err(walk_error)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(walk_error)? {
        let path = entry.path();
        // -- 🔗 metadata() follows symlinks, file_type() would not
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => files.push(path),
            Ok(_) => debug!("📂 skipping non-file {}", path.display()),
            Err(err) => debug!("📂 skipping unreadable entry {}: {err}", path.display()),
        }
    }
    files.sort();
    Ok(files)
}
