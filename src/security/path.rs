//! Workspace path confinement.
//!
//! Tool-supplied paths are resolved against the workspace and must stay
//! inside it after `..` components and symlinks are resolved.

use std::path::{Component, Path, PathBuf};

use crate::error::{Result, StewardError};

/// A path verified to lie inside the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafePath(PathBuf);

impl SafePath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

impl AsRef<Path> for SafePath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl std::fmt::Display for SafePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Resolve `path` (absolute, or relative to `workspace`) and verify it stays
/// inside `workspace`.
///
/// The target need not exist; its nearest existing ancestor is canonicalized
/// so a symlink cannot be used to escape.
///
/// # Example
/// ```
/// use steward::security::validate_path_in_workspace;
///
/// let dir = std::env::temp_dir();
/// let workspace = dir.to_str().unwrap();
/// assert!(validate_path_in_workspace("notes/todo.txt", workspace).is_ok());
/// assert!(validate_path_in_workspace("../../etc/passwd", workspace).is_err());
/// ```
pub fn validate_path_in_workspace(path: &str, workspace: &str) -> Result<SafePath> {
    let root = Path::new(workspace).canonicalize().map_err(|e| {
        StewardError::SecurityViolation(format!(
            "Workspace '{}' is not accessible: {}",
            workspace, e
        ))
    })?;

    let requested = Path::new(path);
    let joined = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        root.join(requested)
    };

    let normalized = normalize(&joined).ok_or_else(|| escape_error(path))?;
    let resolved = resolve_existing_prefix(&normalized)?;

    if resolved.starts_with(&root) {
        Ok(SafePath(resolved))
    } else {
        Err(escape_error(path))
    }
}

fn escape_error(path: &str) -> StewardError {
    StewardError::SecurityViolation(format!("Path '{}' escapes the workspace", path))
}

/// Lexically resolve `.` and `..`. Returns `None` when `..` climbs above the
/// filesystem root.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}

/// Canonicalize the longest existing prefix and re-append the rest.
fn resolve_existing_prefix(path: &Path) -> Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut rest: Vec<std::ffi::OsString> = Vec::new();

    while !existing.exists() {
        match existing.file_name() {
            Some(name) => {
                rest.push(name.to_os_string());
                existing.pop();
            }
            None => break,
        }
    }

    let mut resolved = existing.canonicalize()?;
    for part in rest.into_iter().rev() {
        resolved.push(part);
    }
    Ok(resolved)
}
