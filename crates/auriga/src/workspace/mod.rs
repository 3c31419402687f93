mod files;
mod manager;
mod state;

pub use files::{FileContent, FileInfo, DEFAULT_MAX_READ_BYTES};
pub use manager::{CleanupOutcome, WorkspaceManager, WorkspaceUpdate, WORKSPACE_METADATA_FILE};
pub use state::{JobWorkspace, WorkspaceStatus};
