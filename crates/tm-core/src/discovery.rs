//! Migration file discovery

use crate::error::{CoreError, CoreResult};
use crate::manifest::MigrationFile;
use std::path::Path;

/// Collect every `*.sql` file under `root`, classified by its first directory.
///
/// Paths are relative to `root` and always use `/` separators. Hidden
/// entries are skipped. The result is sorted by path.
pub fn discover_migration_files(root: &Path) -> CoreResult<Vec<MigrationFile>> {
    if !root.is_dir() {
        return Err(CoreError::IoWithPath {
            path: root.display().to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "migrations directory not found",
            ),
        });
    }

    let mut files = Vec::new();
    discover_recursive(root, root, &mut files)?;
    files.sort_by(|a, b| a.path.as_bytes().cmp(b.path.as_bytes()));
    Ok(files)
}

fn discover_recursive(root: &Path, dir: &Path, files: &mut Vec<MigrationFile>) -> CoreResult<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| CoreError::IoWithPath {
        path: dir.display().to_string(),
        source: e,
    })?;

    for entry in entries {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if hidden {
            continue;
        }

        if path.is_dir() {
            discover_recursive(root, &path, files)?;
        } else if path.extension().is_some_and(|e| e == "sql") {
            let relative = relative_path(root, &path)?;
            let content = std::fs::read(&path).map_err(|e| CoreError::IoWithPath {
                path: path.display().to_string(),
                source: e,
            })?;
            files.push(MigrationFile::classified(relative, content));
        }
    }
    Ok(())
}

fn relative_path(root: &Path, path: &Path) -> CoreResult<String> {
    let invalid = |message: &str| CoreError::IoWithPath {
        path: path.display().to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, message.to_string()),
    };
    let relative = path
        .strip_prefix(root)
        .map_err(|_| invalid("path is outside the migrations directory"))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        let part = component
            .as_os_str()
            .to_str()
            .ok_or_else(|| invalid("path is not valid UTF-8"))?;
        parts.push(part);
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
#[path = "discovery_test.rs"]
mod tests;
