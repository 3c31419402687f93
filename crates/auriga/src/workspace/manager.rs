use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::RngCore;

use crate::common::env::AURIGA_WORKSPACE_DIR;
use crate::common::error::not_found;
use crate::common::fsutils::{absolute_path, sanitize_dir_name};
use crate::workspace::{JobWorkspace, WorkspaceStatus};

/// Metadata filename stored in each workspace directory.
pub const WORKSPACE_METADATA_FILE: &str = ".auriga-workspace.json";

const DEFAULT_WORKSPACE_DIRNAME: &str = "auriga-jobs";

/// Fields of a workspace record that [`WorkspaceManager::update`] may change.
/// Absent fields are left untouched; `metadata` entries are merged in.
#[derive(Debug, Default, Clone)]
pub struct WorkspaceUpdate {
    pub status: Option<WorkspaceStatus>,
    pub job_id: Option<String>,
    pub script_path: Option<PathBuf>,
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
}

/// Result of a cleanup attempt, carrying the reason when nothing was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    Removed,
    NotFound,
    /// The workspace still tracks in-flight work and `force` was not given.
    Refused(WorkspaceStatus),
}

impl CleanupOutcome {
    pub fn removed(self) -> bool {
        matches!(self, CleanupOutcome::Removed)
    }
}

/// Manages job workspaces: per-job directories holding submit scripts, job
/// inputs/outputs and a metadata record.
///
/// Metadata files are read-modify-written without locking. Two processes
/// sharing one base path can race on `update`; the last write wins. Callers
/// needing stronger guarantees have to serialize access themselves.
pub struct WorkspaceManager {
    base_path: PathBuf,
    cluster_name: String,
}

impl WorkspaceManager {
    /// Creates a manager over the given base path. When `base_path` is not
    /// provided, the `AURIGA_WORKSPACE_DIR` environment variable is used,
    /// then `$HOME/auriga-jobs`.
    pub fn new(base_path: Option<PathBuf>, cluster_name: &str) -> Self {
        let base_path = base_path
            .or_else(|| std::env::var(AURIGA_WORKSPACE_DIR).ok().map(PathBuf::from))
            .unwrap_or_else(|| {
                let mut home = dirs::home_dir().unwrap_or_else(std::env::temp_dir);
                home.push(DEFAULT_WORKSPACE_DIRNAME);
                home
            });
        Self {
            base_path: absolute_path(base_path),
            cluster_name: cluster_name.to_string(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Creates a new workspace directory with an initial metadata record.
    ///
    /// The identifier is a random 48-bit token; together with the timestamped
    /// directory name this makes collisions between concurrent creates
    /// negligible without any central allocator.
    pub fn create(
        &self,
        job_name: &str,
        metadata: Option<BTreeMap<String, serde_json::Value>>,
    ) -> crate::Result<JobWorkspace> {
        let created_at = Utc::now();
        let workspace_id = generate_workspace_id();
        let dirname = workspace_dirname(job_name, &created_at, &workspace_id);
        let path = self.base_path.join(dirname);

        std::fs::create_dir_all(&self.base_path)?;
        std::fs::create_dir(&path)?;
        log::info!("Created workspace {workspace_id} at {}", path.display());

        let workspace = JobWorkspace {
            workspace_id,
            path,
            job_name: job_name.to_string(),
            created_at,
            cluster: self.cluster_name.clone(),
            status: WorkspaceStatus::Active,
            job_id: None,
            script_path: None,
            metadata: metadata.unwrap_or_default(),
        };
        store_metadata(&workspace)?;
        Ok(workspace)
    }

    /// Finds a workspace by id. Returns `None` when the workspace directory
    /// or its metadata record is missing; partial state is never fabricated.
    pub fn get(&self, workspace_id: &str) -> Option<JobWorkspace> {
        self.iter_workspaces()
            .find(|workspace| workspace.workspace_id == workspace_id)
    }

    /// Merges the given fields into the persisted record. Returns `None` when
    /// the workspace does not exist; a missing workspace is never created.
    pub fn update(
        &self,
        workspace_id: &str,
        update: WorkspaceUpdate,
    ) -> crate::Result<Option<JobWorkspace>> {
        let Some(mut workspace) = self.get(workspace_id) else {
            return Ok(None);
        };

        if let Some(status) = update.status {
            workspace.status = status;
        }
        if let Some(job_id) = update.job_id {
            workspace.job_id = Some(job_id);
        }
        if let Some(script_path) = update.script_path {
            workspace.script_path = Some(script_path);
        }
        if let Some(metadata) = update.metadata {
            workspace.metadata.extend(metadata);
        }

        store_metadata(&workspace)?;
        Ok(Some(workspace))
    }

    /// Lists workspaces, newest first (ties broken by id to keep the order
    /// stable), optionally filtered by exact status, truncated to `limit`.
    pub fn list(&self, status: Option<WorkspaceStatus>, limit: usize) -> Vec<JobWorkspace> {
        let mut workspaces: Vec<JobWorkspace> = self
            .iter_workspaces()
            .filter(|workspace| status.is_none_or(|s| workspace.status == s))
            .collect();
        workspaces.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.workspace_id.cmp(&b.workspace_id))
        });
        workspaces.truncate(limit);
        workspaces
    }

    /// Removes a workspace directory and its contents.
    ///
    /// A workspace that still tracks in-flight work (`active` or `submitted`)
    /// is only removed when `force` is set.
    pub fn cleanup(&self, workspace_id: &str, force: bool) -> crate::Result<CleanupOutcome> {
        let Some(workspace) = self.get(workspace_id) else {
            log::warn!("Workspace {workspace_id} not found");
            return Ok(CleanupOutcome::NotFound);
        };

        if !force && !workspace.status.is_terminal() {
            log::warn!(
                "Workspace {workspace_id} has status '{}', refusing to remove it without force",
                workspace.status
            );
            return Ok(CleanupOutcome::Refused(workspace.status));
        }

        if workspace.path.exists() {
            std::fs::remove_dir_all(&workspace.path)?;
            log::info!("Removed workspace {}", workspace.path.display());
        }
        Ok(CleanupOutcome::Removed)
    }

    /// Removes terminal workspaces older than the given number of days.
    /// Returns the number of workspaces removed.
    pub fn cleanup_old(&self, days: u32) -> crate::Result<usize> {
        if days == 0 {
            return Ok(0);
        }
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
        let mut removed = 0;
        for workspace in self.iter_workspaces() {
            if workspace.status.is_terminal() && workspace.created_at < cutoff {
                if self.cleanup(&workspace.workspace_id, true)?.removed() {
                    removed += 1;
                }
            }
        }
        log::info!("Cleaned up {removed} old workspaces");
        Ok(removed)
    }

    /// Resolves the path of a script file inside the given workspace.
    pub fn script_path(&self, workspace_id: &str, script_name: &str) -> crate::Result<PathBuf> {
        match self.get(workspace_id) {
            Some(workspace) => Ok(workspace.path.join(script_name)),
            None => not_found(format!("Workspace {workspace_id} not found")),
        }
    }

    /// Persists changes made to an already loaded record.
    pub fn store(&self, workspace: &JobWorkspace) -> crate::Result<()> {
        store_metadata(workspace)
    }

    fn iter_workspaces(&self) -> impl Iterator<Item = JobWorkspace> + '_ {
        std::fs::read_dir(&self.base_path)
            .into_iter()
            .flatten()
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| load_metadata(&entry.path()))
    }
}

fn generate_workspace_id() -> String {
    let mut token = [0u8; 6];
    rand::rng().fill_bytes(&mut token);
    hex::encode(token)
}

fn workspace_dirname(job_name: &str, created_at: &DateTime<Utc>, workspace_id: &str) -> String {
    format!(
        "{}_{}-{}",
        sanitize_dir_name(job_name),
        created_at.format("%Y%m%d_%H%M%S"),
        workspace_id
    )
}

fn load_metadata(workspace_path: &Path) -> Option<JobWorkspace> {
    let metadata_file = workspace_path.join(WORKSPACE_METADATA_FILE);
    if !metadata_file.is_file() {
        return None;
    }
    let file = std::fs::File::open(&metadata_file).ok()?;
    match serde_json::from_reader(file) {
        Ok(workspace) => Some(workspace),
        Err(error) => {
            log::warn!(
                "Failed to load workspace metadata from {}: {error}",
                metadata_file.display()
            );
            None
        }
    }
}

fn store_metadata(workspace: &JobWorkspace) -> crate::Result<()> {
    let metadata_file = workspace.path.join(WORKSPACE_METADATA_FILE);
    let file = std::fs::File::create(metadata_file)?;
    serde_json::to_writer_pretty(file, workspace)?;
    Ok(())
}
