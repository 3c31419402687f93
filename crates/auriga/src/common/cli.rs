use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};

use crate::common::env::{AURIGA_CLUSTER, AURIGA_CONFIG_DIR, PBS_ACCOUNT};
use crate::workspace::WorkspaceStatus;

#[derive(Parser)]
#[command(
    name = "auriga",
    about = "PBS job submission front end for HPC clusters",
    version = crate::AURIGA_VERSION
)]
pub struct RootOptions {
    #[clap(flatten)]
    pub common: CommonOpts,

    #[command(subcommand)]
    pub subcmd: SubCommand,
}

#[derive(Parser)]
pub struct CommonOpts {
    /// Cluster to operate on, overrides the configured default
    #[arg(long, global = true, env = AURIGA_CLUSTER)]
    pub cluster: Option<String>,

    /// Configuration directory holding auriga.yaml and clusters/
    #[arg(long, global = true, env = AURIGA_CONFIG_DIR, value_hint = ValueHint::DirPath)]
    pub config_dir: Option<PathBuf>,

    /// Base directory for job workspaces
    #[arg(long, global = true, value_hint = ValueHint::DirPath)]
    pub workspace_dir: Option<PathBuf>,

    /// Use the in-memory mock scheduler instead of the PBS commands
    #[arg(long, global = true)]
    pub mock: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum SubCommand {
    /// Submit a job script to the scheduler
    Submit(SubmitOpts),
    /// Inspect and control scheduler jobs
    Job {
        #[command(subcommand)]
        subcmd: JobCommand,
    },
    /// Show scheduler queues
    Queue {
        #[command(subcommand)]
        subcmd: QueueCommand,
    },
    /// Show available clusters
    Cluster {
        #[command(subcommand)]
        subcmd: ClusterCommand,
    },
    /// Manage job workspaces
    Workspace {
        #[command(subcommand)]
        subcmd: WorkspaceCommand,
    },
    /// Generate a submit script into a workspace
    Script(ScriptOpts),
    /// Show registered applications
    App {
        #[command(subcommand)]
        subcmd: AppCommand,
    },
}

#[derive(Subcommand)]
pub enum AppCommand {
    /// List applications usable on the active cluster
    List,
}

#[derive(Parser)]
pub struct SubmitOpts {
    /// Path of the script to submit; may be omitted when the workspace
    /// already has a generated script
    #[arg(value_hint = ValueHint::FilePath)]
    pub script: Option<PathBuf>,

    /// Workspace to link the job to
    #[arg(long)]
    pub workspace: Option<String>,

    /// Target queue, defaults to the cluster's default queue
    #[arg(short, long)]
    pub queue: Option<String>,

    /// Job name shown by the scheduler
    #[arg(short = 'N', long)]
    pub name: Option<String>,

    /// Account/project to charge
    #[arg(short = 'A', long, env = PBS_ACCOUNT, default_value = "")]
    pub account: String,

    /// Number of nodes
    #[arg(short, long)]
    pub nodes: Option<u32>,

    /// Walltime in HH:MM:SS
    #[arg(short, long)]
    pub walltime: Option<String>,

    /// Colon-separated filesystem labels, e.g. home:scratch
    #[arg(long)]
    pub filesystems: Option<String>,

    /// Additional resources as KEY=VALUE, repeatable
    #[arg(short = 'l', long = "resource", value_parser = parse_key_value)]
    pub resources: Vec<(String, String)>,
}

#[derive(Subcommand)]
pub enum JobCommand {
    /// Show the status of one job
    Status { job_id: String },
    /// List jobs, optionally filtered
    List {
        /// Scheduler state code (Q, R, H, ...)
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        queue: Option<String>,
    },
    /// Hold a queued job
    Hold { job_id: String },
    /// Release a held job
    Release { job_id: String },
    /// Delete a job
    Delete {
        job_id: String,
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum QueueCommand {
    /// Show queue details
    Info {
        /// Show a single queue instead of all of them
        queue: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ClusterCommand {
    /// List discovered clusters
    List,
    /// Show the definition of a cluster
    Info {
        /// Defaults to the active cluster
        name: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum WorkspaceCommand {
    /// Create a new workspace
    Create {
        job_name: String,
        /// Number of nodes recorded for later submission
        #[arg(long)]
        nodes: Option<u32>,
    },
    /// List workspaces
    List {
        #[arg(long, value_enum)]
        status: Option<WorkspaceStatus>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show one workspace
    Info { workspace_id: String },
    /// List the files inside a workspace
    Files { workspace_id: String },
    /// Print a file from a workspace
    Read {
        workspace_id: String,
        /// Path relative to the workspace directory
        path: String,
        /// Refuse files larger than this many bytes
        #[arg(long, default_value_t = crate::workspace::DEFAULT_MAX_READ_BYTES)]
        max_bytes: u64,
    },
    /// Remove a workspace directory
    Cleanup {
        workspace_id: Option<String>,
        /// Remove even non-terminal workspaces
        #[arg(long)]
        force: bool,
        /// Remove all terminal workspaces older than this many days
        #[arg(long, conflicts_with = "workspace_id")]
        older_than_days: Option<u32>,
    },
    /// Mark a workspace completed or failed
    Finish {
        workspace_id: String,
        #[arg(long, value_enum)]
        status: WorkspaceStatus,
    },
}

#[derive(Parser)]
pub struct ScriptOpts {
    /// Application to generate the script with
    pub app: String,

    /// Workspace the script is written into
    #[arg(long)]
    pub workspace: String,

    #[arg(short = 'N', long)]
    pub name: Option<String>,

    #[arg(short = 'A', long, env = PBS_ACCOUNT, default_value = "")]
    pub account: String,

    #[arg(short, long)]
    pub queue: Option<String>,

    #[arg(short, long)]
    pub walltime: Option<String>,

    #[arg(short, long, default_value_t = 1)]
    pub nodes: u32,

    #[arg(long, default_value_t = 1)]
    pub ranks_per_node: u32,

    /// Executable to run (required by the generic application)
    #[arg(long)]
    pub executable: Option<String>,

    /// Arguments passed to the executable
    #[arg(last = true)]
    pub args: Vec<String>,
}

fn parse_key_value(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, val)) if !key.is_empty() => Ok((key.to_string(), val.to_string())),
        _ => Err(format!("'{value}' is not in KEY=VALUE format")),
    }
}
