//! Filesystem tools for Steward
//!
//! This module provides tools for file system operations including reading,
//! writing, editing, deleting and listing. All paths can be either absolute or
//! relative to the workspace in the tool context, and must resolve inside it.
//!
//! Mutating tools report a `(path, before, after)` snapshot to the context's
//! [`FileHistory`](crate::history::FileHistory) once per successful change.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::{Result, StewardError};
use crate::security::validate_path_in_workspace;

use super::{Tool, ToolCategory, ToolContext, ToolOutput};

/// Resolve and validate a path relative to the workspace.
///
/// Requires a workspace to be configured: filesystem tools never operate
/// outside one.
fn resolve_path(path: &str, ctx: &ToolContext) -> Result<PathBuf> {
    let workspace = ctx.workspace.as_ref().ok_or_else(|| {
        StewardError::SecurityViolation(
            "Workspace not configured; filesystem tools require a workspace".to_string(),
        )
    })?;
    Ok(validate_path_in_workspace(path, workspace)?.into_path_buf())
}

fn str_arg<'a>(args: &'a Value, name: &str) -> Result<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| StewardError::Tool(format!("Missing '{}' argument", name)))
}

/// Contents before a mutation, or `None` when the file does not exist.
///
/// Only taken when a history is attached. A file that exists but cannot be
/// captured (not UTF-8, unreadable) fails the mutation before anything is
/// touched, since `None` would claim the file was absent.
async fn snapshot(path: &Path, ctx: &ToolContext) -> Result<Option<String>> {
    if ctx.history.is_none() {
        return Ok(None);
    }
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StewardError::Tool(format!(
            "Cannot snapshot '{}' for file history: {}",
            path.display(),
            e
        ))),
    }
}

/// Report a completed mutation. A history failure never fails the tool.
async fn record_change(
    ctx: &ToolContext,
    path: &Path,
    before: Option<String>,
    after: Option<String>,
) {
    if let Some(history) = &ctx.history {
        if let Err(e) = history.record(path, before, after).await {
            warn!(path = %path.display(), error = %e, "Failed to record file history");
        }
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > 50 {
        format!("{}...", text.chars().take(50).collect::<String>())
    } else {
        text.to_string()
    }
}

/// Tool for reading file contents.
///
/// # Parameters
/// - `path`: The path to the file to read (required)
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file at the specified path"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The path to the file to read"
                }
            },
            "required": ["path"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::FilesystemRead
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let full_path = resolve_path(str_arg(&args, "path")?, ctx)?;

        let content = tokio::fs::read_to_string(&full_path).await.map_err(|e| {
            StewardError::Tool(format!(
                "Failed to read file '{}': {}",
                full_path.display(),
                e
            ))
        })?;
        Ok(ToolOutput::success(content))
    }
}

/// Tool for writing content to a file, creating it (and its parent
/// directories) if needed.
///
/// # Parameters
/// - `path`: The path to the file to write (required)
/// - `content`: The content to write to the file (required)
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file at the specified path, creating it if necessary"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The path to the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write to the file"
                }
            },
            "required": ["path", "content"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::FilesystemWrite
    }

    fn describe_action(&self, args: &Value) -> String {
        let path = args.get("path").and_then(Value::as_str).unwrap_or("?");
        let bytes = args
            .get("content")
            .and_then(Value::as_str)
            .map(str::len)
            .unwrap_or(0);
        format!("Write {} bytes to {}", bytes, path)
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let path = str_arg(&args, "path")?;
        let content = str_arg(&args, "content")?;
        let full_path = resolve_path(path, ctx)?;

        let before = snapshot(&full_path, ctx).await?;
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StewardError::Tool(format!("Failed to create parent directories: {}", e))
            })?;
        }

        tokio::fs::write(&full_path, content).await.map_err(|e| {
            StewardError::Tool(format!(
                "Failed to write file '{}': {}",
                full_path.display(),
                e
            ))
        })?;
        record_change(ctx, &full_path, before, Some(content.to_string())).await;

        Ok(ToolOutput::success(format!(
            "Successfully wrote {} bytes to {}",
            content.len(),
            path
        )))
    }
}

/// Tool for editing a file by replacing every occurrence of a string.
///
/// # Parameters
/// - `path`: The path to the file to edit (required)
/// - `old_text`: The text to search for and replace (required)
/// - `new_text`: The text to replace it with (required)
pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Edit a file by replacing specified text with new content"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The path to the file to edit"
                },
                "old_text": {
                    "type": "string",
                    "description": "The text to search for and replace"
                },
                "new_text": {
                    "type": "string",
                    "description": "The text to replace it with"
                }
            },
            "required": ["path", "old_text", "new_text"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::FilesystemWrite
    }

    fn describe_action(&self, args: &Value) -> String {
        let path = args.get("path").and_then(Value::as_str).unwrap_or("?");
        format!("Edit {}", path)
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let path = str_arg(&args, "path")?;
        let old_text = str_arg(&args, "old_text")?;
        let new_text = str_arg(&args, "new_text")?;
        if old_text.is_empty() {
            return Err(StewardError::Tool("'old_text' must not be empty".into()));
        }
        let full_path = resolve_path(path, ctx)?;

        let content = tokio::fs::read_to_string(&full_path).await.map_err(|e| {
            StewardError::Tool(format!(
                "Failed to read file '{}': {}",
                full_path.display(),
                e
            ))
        })?;

        let replacements = content.matches(old_text).count();
        if replacements == 0 {
            return Err(StewardError::Tool(format!(
                "Text '{}' not found in file '{}'",
                preview(old_text),
                path
            )));
        }

        let new_content = content.replace(old_text, new_text);
        tokio::fs::write(&full_path, &new_content)
            .await
            .map_err(|e| {
                StewardError::Tool(format!(
                    "Failed to write file '{}': {}",
                    full_path.display(),
                    e
                ))
            })?;
        record_change(ctx, &full_path, Some(content), Some(new_content)).await;

        Ok(ToolOutput::success(format!(
            "Successfully replaced {} occurrence(s) in {}",
            replacements, path
        )))
    }
}

/// Tool for deleting a single file.
///
/// # Parameters
/// - `path`: The path to the file to delete (required)
pub struct DeleteFileTool;

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a file at the specified path"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The path to the file to delete"
                }
            },
            "required": ["path"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Destructive
    }

    fn describe_action(&self, args: &Value) -> String {
        let path = args.get("path").and_then(Value::as_str).unwrap_or("?");
        format!("Delete {}", path)
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let path = str_arg(&args, "path")?;
        let full_path = resolve_path(path, ctx)?;

        let metadata = tokio::fs::metadata(&full_path).await.map_err(|e| {
            StewardError::Tool(format!("Cannot delete '{}': {}", path, e))
        })?;
        if metadata.is_dir() {
            return Err(StewardError::Tool(format!(
                "'{}' is a directory; only files can be deleted",
                path
            )));
        }

        let before = snapshot(&full_path, ctx).await?;
        tokio::fs::remove_file(&full_path).await.map_err(|e| {
            StewardError::Tool(format!("Failed to delete '{}': {}", path, e))
        })?;
        record_change(ctx, &full_path, before, None).await;

        Ok(ToolOutput::success(format!("Deleted {}", path)))
    }
}

/// Tool for listing directory contents.
///
/// Directories are suffixed with `/` and symlinks with `@`.
///
/// # Parameters
/// - `path`: The directory to list (optional, defaults to the workspace root)
pub struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "ls"
    }

    fn description(&self) -> &str {
        "List the contents of a directory (defaults to the workspace root)"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The path to the directory to list"
                }
            }
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::FilesystemRead
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let path = args.get("path").and_then(Value::as_str).unwrap_or(".");
        let full_path = resolve_path(path, ctx)?;

        let mut entries = tokio::fs::read_dir(&full_path).await.map_err(|e| {
            StewardError::Tool(format!("Failed to read directory '{}': {}", path, e))
        })?;

        let mut items = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StewardError::Tool(format!("Failed to read directory entry: {}", e)))?
        {
            let file_name = entry.file_name().to_string_lossy().to_string();
            let type_indicator = match entry.file_type().await.ok() {
                Some(ft) if ft.is_dir() => "/",
                Some(ft) if ft.is_symlink() => "@",
                _ => "",
            };
            items.push(format!("{}{}", file_name, type_indicator));
        }

        if items.is_empty() {
            return Ok(ToolOutput::success("(empty directory)"));
        }
        items.sort();
        Ok(ToolOutput::success(items.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{InMemoryHistory, MockFileHistory};
    use std::fs;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn workspace() -> (TempDir, ToolContext) {
        let dir = tempdir().unwrap();
        // Canonical path avoids /var -> /private/var mismatches on macOS
        let canonical = dir.path().canonicalize().unwrap();
        let ctx = ToolContext::new().with_workspace(canonical.to_str().unwrap());
        (dir, ctx)
    }

    #[tokio::test]
    async fn test_read_file_tool() {
        let (dir, ctx) = workspace();
        fs::write(dir.path().join("read.txt"), "test content").unwrap();

        let out = ReadFileTool
            .execute(json!({"path": "read.txt"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out.content, "test content");
        assert!(!out.is_error);
    }

    #[tokio::test]
    async fn test_read_file_tool_not_found() {
        let (_dir, ctx) = workspace();
        let err = ReadFileTool
            .execute(json!({"path": "nonexistent_file.txt"}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read file"));
    }

    #[tokio::test]
    async fn test_read_file_tool_rejects_no_workspace() {
        let err = ReadFileTool
            .execute(json!({"path": "a.txt"}), &ToolContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StewardError::SecurityViolation(_)));
    }

    #[tokio::test]
    async fn test_path_traversal_blocked() {
        let (_dir, ctx) = workspace();
        let err = ReadFileTool
            .execute(json!({"path": "../../../etc/hostname"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, StewardError::SecurityViolation(_)));
    }

    #[tokio::test]
    async fn test_write_file_tool_records_history_once() {
        let (dir, ctx) = workspace();
        let history = Arc::new(InMemoryHistory::new());
        let ctx = ctx.with_history(history.clone());

        let out = WriteFileTool
            .execute(json!({"path": "nested/dir/out.txt", "content": "hello"}), &ctx)
            .await
            .unwrap();
        assert!(out.content.contains("5 bytes"));
        assert_eq!(
            fs::read_to_string(dir.path().join("nested/dir/out.txt")).unwrap(),
            "hello"
        );

        let changes = history.changes();
        assert_eq!(changes.len(), 1);
        assert!(changes[0].before.is_none());
        assert_eq!(changes[0].after.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_write_over_non_utf8_file_fails_before_touching_it() {
        let (dir, ctx) = workspace();
        let target = dir.path().join("blob.bin");
        let original = vec![0xff, 0xfe, 0x00, 0x80];
        fs::write(&target, &original).unwrap();
        let history = Arc::new(InMemoryHistory::new());
        let ctx = ctx.with_history(history.clone());

        let err = WriteFileTool
            .execute(json!({"path": "blob.bin", "content": "text"}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("snapshot"));
        assert_eq!(fs::read(&target).unwrap(), original);

        let err = DeleteFileTool
            .execute(json!({"path": "blob.bin"}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("snapshot"));
        assert!(target.exists());
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_write_over_non_utf8_file_without_history() {
        let (dir, ctx) = workspace();
        let target = dir.path().join("blob.bin");
        fs::write(&target, [0xffu8, 0xfe]).unwrap();

        WriteFileTool
            .execute(json!({"path": "blob.bin", "content": "text"}), &ctx)
            .await
            .unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "text");
    }

    #[tokio::test]
    async fn test_edit_file_tool() {
        let (dir, ctx) = workspace();
        fs::write(dir.path().join("edit.txt"), "a b a").unwrap();
        let history = Arc::new(InMemoryHistory::new());
        let ctx = ctx.with_history(history.clone());

        let out = EditFileTool
            .execute(
                json!({"path": "edit.txt", "old_text": "a", "new_text": "z"}),
                &ctx,
            )
            .await
            .unwrap();
        assert!(out.content.contains("2 occurrence(s)"));
        assert_eq!(fs::read_to_string(dir.path().join("edit.txt")).unwrap(), "z b z");
        assert_eq!(history.changes()[0].before.as_deref(), Some("a b a"));
    }

    #[tokio::test]
    async fn test_edit_file_tool_text_not_found_leaves_history_untouched() {
        let (dir, ctx) = workspace();
        fs::write(dir.path().join("edit.txt"), "hello").unwrap();
        let history = Arc::new(InMemoryHistory::new());
        let ctx = ctx.with_history(history.clone());

        let err = EditFileTool
            .execute(
                json!({"path": "edit.txt", "old_text": "absent", "new_text": "x"}),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_delete_file_tool() {
        let (dir, ctx) = workspace();
        let target = dir.path().join("gone.txt");
        fs::write(&target, "bye").unwrap();

        let mut mock = MockFileHistory::new();
        mock.expect_record()
            .withf(|_, before, after| before.as_deref() == Some("bye") && after.is_none())
            .times(1)
            .returning(|_, _, _| Ok(()));
        let ctx = ctx.with_history(Arc::new(mock));

        DeleteFileTool
            .execute(json!({"path": "gone.txt"}), &ctx)
            .await
            .unwrap();
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_delete_file_tool_rejects_directory() {
        let (dir, ctx) = workspace();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let err = DeleteFileTool
            .execute(json!({"path": "sub"}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("directory"));
        assert!(dir.path().join("sub").exists());
    }

    #[tokio::test]
    async fn test_history_failure_does_not_fail_write() {
        let (_dir, ctx) = workspace();
        let mut mock = MockFileHistory::new();
        mock.expect_record()
            .times(1)
            .returning(|_, _, _| Err(StewardError::Tool("disk full".into())));
        let ctx = ctx.with_history(Arc::new(mock));

        let out = WriteFileTool
            .execute(json!({"path": "x.txt", "content": "x"}), &ctx)
            .await
            .unwrap();
        assert!(!out.is_error);
    }

    #[tokio::test]
    async fn test_list_dir_tool_defaults_to_workspace_root() {
        let (dir, ctx) = workspace();
        fs::write(dir.path().join("b.txt"), "").unwrap();
        fs::write(dir.path().join("a.txt"), "").unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();

        let out = ListDirTool.execute(json!({}), &ctx).await.unwrap();
        assert_eq!(out.content, "a.txt\nb.txt\nsrc/");
    }

    #[tokio::test]
    async fn test_list_dir_tool_empty() {
        let (_dir, ctx) = workspace();
        let out = ListDirTool.execute(json!({"path": "."}), &ctx).await.unwrap();
        assert_eq!(out.content, "(empty directory)");
    }

    #[test]
    fn test_sensitivity_by_category() {
        assert!(!ReadFileTool.is_sensitive());
        assert!(!ListDirTool.is_sensitive());
        assert!(WriteFileTool.is_sensitive());
        assert!(EditFileTool.is_sensitive());
        assert!(DeleteFileTool.is_sensitive());
        assert_eq!(DeleteFileTool.category(), ToolCategory::Destructive);
    }

    #[test]
    fn test_describe_action() {
        assert_eq!(
            WriteFileTool.describe_action(&json!({"path": "a.txt", "content": "abc"})),
            "Write 3 bytes to a.txt"
        );
        assert_eq!(
            DeleteFileTool.describe_action(&json!({"path": "a.txt"})),
            "Delete a.txt"
        );
    }
}
