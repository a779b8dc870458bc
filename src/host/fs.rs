//! Workspace-confined text file access.
//!
//! Every path the agent names is checked against the workspace root before
//! it is touched: `..` traversal and symlink escapes are rejected. Writes go
//! through a temporary file in the target directory and are renamed into
//! place, so a crash never leaves a half-written file.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;

use crate::{AppError, Result};

/// Validate that `candidate` resides within `workspace_root`.
///
/// Returns the resolved absolute path on success.
///
/// # Errors
///
/// Returns `AppError::PathViolation` if:
/// - The workspace root cannot be canonicalized.
/// - The candidate path contains `..` segments that escape the root.
/// - The resolved path, after following symlinks, escapes the workspace.
pub fn validate_path(workspace_root: &Path, candidate: impl AsRef<Path>) -> Result<PathBuf> {
    let root = workspace_root
        .canonicalize()
        .map_err(|err| AppError::PathViolation(format!("workspace root invalid: {err}")))?;

    let mut normalized = PathBuf::new();
    for component in candidate.as_ref().components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(AppError::PathViolation(
                        "path attempts to escape workspace".into(),
                    ));
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {
                normalized.clear();
                normalized.push(component.as_os_str());
            }
            Component::Normal(part) => normalized.push(part),
        }
    }

    let absolute = if normalized.is_absolute() {
        normalized
    } else {
        root.join(normalized)
    };

    // Resolve symlinks on the path, or on its parent when the file does
    // not exist yet, before checking containment.
    let resolved = if absolute.exists() {
        absolute
            .canonicalize()
            .map_err(|err| AppError::PathViolation(format!("cannot resolve path: {err}")))?
    } else {
        match (absolute.parent(), absolute.file_name()) {
            (Some(parent), Some(name)) if parent.exists() => parent
                .canonicalize()
                .map_err(|err| AppError::PathViolation(format!("cannot resolve path: {err}")))?
                .join(name),
            _ => absolute,
        }
    };

    if !resolved.starts_with(&root) {
        return Err(AppError::PathViolation(format!(
            "{} is outside the workspace",
            resolved.display()
        )));
    }
    Ok(resolved)
}

/// Window of `content` starting at 1-based `line`, at most `limit` lines.
///
/// Line terminators are preserved. A start past the end yields an empty
/// string; `line = 0` is treated as 1.
#[must_use]
pub fn slice_lines(content: &str, line: Option<u32>, limit: Option<u32>) -> String {
    if line.is_none() && limit.is_none() {
        return content.to_owned();
    }
    let skip = line.map_or(0, |l| to_usize(l.saturating_sub(1)));
    let take = limit.map_or(usize::MAX, to_usize);
    content.split_inclusive('\n').skip(skip).take(take).collect()
}

fn to_usize(n: u32) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

/// Read the text file at the already validated `path`.
///
/// # Errors
///
/// Returns `AppError::NotFound` if the file does not exist and
/// `AppError::Io` for other read failures, including non-UTF-8 content.
pub async fn read_text(path: &Path, line: Option<u32>, limit: Option<u32>) -> Result<String> {
    let content = tokio::fs::read_to_string(path).await.map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            AppError::NotFound(format!("{} does not exist", path.display()))
        } else {
            AppError::Io(format!("failed to read {}: {err}", path.display()))
        }
    })?;
    Ok(slice_lines(&content, line, limit))
}

/// Atomically write `content` to the already validated `path`, creating
/// parent directories as needed.
///
/// # Errors
///
/// Returns `AppError::Io` on directory creation, temp file, or rename
/// failure.
pub fn write_text(path: &Path, content: &str) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| AppError::Io(format!("{} has no parent directory", path.display())))?;

    std::fs::create_dir_all(parent).map_err(|err| {
        AppError::Io(format!(
            "failed to create parent directories for {}: {err}",
            path.display()
        ))
    })?;

    let mut tmp = NamedTempFile::new_in(parent)
        .map_err(|err| AppError::Io(format!("failed to create temporary file: {err}")))?;
    tmp.write_all(content.as_bytes())
        .map_err(|err| AppError::Io(format!("failed to write temporary file: {err}")))?;
    tmp.persist(path).map_err(|err| {
        AppError::Io(format!("failed to persist file to {}: {err}", path.display()))
    })?;
    Ok(())
}
