use std::path::{Component, Path};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::common::error::{not_found, validation_error};
use crate::workspace::WorkspaceManager;

/// Largest file `read_file` will return without an explicit larger limit.
pub const DEFAULT_MAX_READ_BYTES: u64 = 10 * 1024 * 1024;

/// Metadata of one file inside a workspace directory.
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub relative_path: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Contents of a workspace file, with enough metadata for the caller to
/// decide whether to fetch the full file another way.
#[derive(Debug, Serialize)]
pub struct FileContent {
    pub relative_path: String,
    pub size: u64,
    pub content: String,
}

impl WorkspaceManager {
    /// Lists the files of a workspace recursively, sorted by relative path.
    /// The metadata record itself is included like any other file.
    pub fn list_files(&self, workspace_id: &str) -> crate::Result<Vec<FileInfo>> {
        let Some(workspace) = self.get(workspace_id) else {
            return not_found(format!("Workspace {workspace_id} not found"));
        };

        let mut files = Vec::new();
        collect_files(&workspace.path, &workspace.path, &mut files)?;
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(files)
    }

    /// Reads a file from a workspace as text.
    ///
    /// The path must be relative and must stay inside the workspace
    /// directory; `..` components, absolute paths and `~` prefixes are
    /// rejected. Files larger than `max_bytes` are refused rather than
    /// truncated.
    pub fn read_file(
        &self,
        workspace_id: &str,
        relative_path: &str,
        max_bytes: u64,
    ) -> crate::Result<FileContent> {
        let Some(workspace) = self.get(workspace_id) else {
            return not_found(format!("Workspace {workspace_id} not found"));
        };
        validate_relative_path(relative_path)?;

        let path = workspace.path.join(relative_path);
        if !path.is_file() {
            return not_found(format!(
                "File '{relative_path}' not found in workspace {workspace_id}"
            ));
        }

        let size = path.metadata()?.len();
        if size > max_bytes {
            return validation_error(format!(
                "File '{relative_path}' is {size} bytes, larger than the {max_bytes} byte \
                 limit. Fetch it directly from {}",
                path.display()
            ));
        }

        log::info!("Reading {relative_path} from workspace {workspace_id}");
        let bytes = std::fs::read(&path)?;
        Ok(FileContent {
            relative_path: relative_path.to_string(),
            size,
            content: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

/// Rejects paths that could escape the workspace directory.
fn validate_relative_path(relative_path: &str) -> crate::Result<()> {
    let rejected = |reason: &str| {
        validation_error(format!("Invalid file path '{relative_path}': {reason}"))
    };

    if relative_path.is_empty() {
        return rejected("empty path");
    }
    if relative_path.starts_with('~') {
        return rejected("home-relative paths are not allowed");
    }
    let path = Path::new(relative_path);
    if path.is_absolute() {
        return rejected("absolute paths are not allowed");
    }
    if path
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return rejected("parent directory components are not allowed");
    }
    Ok(())
}

fn collect_files(root: &Path, dir: &Path, files: &mut Vec<FileInfo>) -> crate::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, files)?;
            continue;
        }
        let metadata = entry.metadata()?;
        let relative_path = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .into_owned();
        files.push(FileInfo {
            relative_path,
            size: metadata.len(),
            modified: metadata.modified().map(DateTime::from)?,
        });
    }
    Ok(())
}
