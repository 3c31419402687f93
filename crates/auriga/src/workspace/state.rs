use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Life of a workspace: `active -> submitted -> {completed, failed}`.
///
/// The terminal transitions are always caller-driven; nothing in this crate
/// polls the scheduler for job completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceStatus {
    Active,
    Submitted,
    Completed,
    Failed,
}

impl WorkspaceStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkspaceStatus::Completed | WorkspaceStatus::Failed)
    }
}

impl std::fmt::Display for WorkspaceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let status = match self {
            WorkspaceStatus::Active => "active",
            WorkspaceStatus::Submitted => "submitted",
            WorkspaceStatus::Completed => "completed",
            WorkspaceStatus::Failed => "failed",
        };
        f.write_str(status)
    }
}

/// Persisted record of one job workspace.
///
/// Stored as a JSON metadata file inside the workspace directory so that it
/// survives process restarts. A directory without a readable metadata file is
/// considered foreign and is never touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobWorkspace {
    pub workspace_id: String,
    pub path: PathBuf,
    pub job_name: String,
    pub created_at: DateTime<Utc>,
    /// Name of the cluster this workspace was created for.
    pub cluster: String,
    pub status: WorkspaceStatus,
    /// Scheduler-assigned job id, filled in on submission.
    #[serde(default)]
    pub job_id: Option<String>,
    /// Path of the generated submit script, if any.
    #[serde(default)]
    pub script_path: Option<PathBuf>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}
