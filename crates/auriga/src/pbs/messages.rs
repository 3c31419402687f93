use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Attributes attached to a job submission, handed to the scheduler client.
#[derive(Debug, Clone, Default)]
pub struct JobAttributes {
    pub job_name: Option<String>,
    pub account: String,
    /// PBS resource list entries (`select`, `walltime`, `filesystems`, ...).
    pub resources: BTreeMap<String, String>,
}

/// One scheduler job with its flattened attribute map
/// (e.g. `job_state`, `queue`, `Resource_List.select`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: String,
    pub attrs: BTreeMap<String, String>,
}

/// One scheduler queue with its flattened attribute map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    pub name: String,
    pub attrs: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub queue: String,
    pub cluster: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobInfo>,
    pub total: usize,
    /// Number of jobs per scheduler state code.
    pub summary: BTreeMap<String, usize>,
    pub cluster: String,
}

#[derive(Debug, Serialize)]
pub struct JobActionResponse {
    pub job_id: String,
    pub action: String,
}

#[derive(Debug, Serialize)]
pub struct QueueDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started: Option<String>,
    pub total_jobs: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_walltime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_nodes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueueInfoResponse {
    pub queues: BTreeMap<String, QueueDetails>,
    pub cluster: String,
}
