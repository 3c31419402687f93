use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cluster::ClusterStore;
use crate::common::env::{AURIGA_CLUSTER, AURIGA_CONFIG_DIR};

const SERVER_CONFIG_FILE: &str = "auriga.yaml";
const DEFAULT_CONFIG_DIR: &str = "config";

/// Main server configuration, read from `<config_dir>/auriga.yaml`.
///
/// The file is optional; every field has a default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Cluster used when no explicit override is given.
    pub default_cluster: Option<String>,
    /// Default log level, overridden by `--verbose` and `RUST_LOG`.
    pub log_level: Option<String>,
    pub workspace: WorkspaceConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Base directory for job workspaces.
    pub base_path: Option<PathBuf>,
}

impl ServerConfig {
    pub fn load(config_dir: &Path) -> crate::Result<ServerConfig> {
        let path = config_dir.join(SERVER_CONFIG_FILE);
        if !path.is_file() {
            return Ok(ServerConfig::default());
        }
        let text = std::fs::read_to_string(&path)?;
        if text.trim().is_empty() {
            return Ok(ServerConfig::default());
        }
        serde_yaml::from_str(&text).map_err(|e| {
            crate::Error::ConfigurationError(format!(
                "Cannot parse server configuration {}: {e}",
                path.display()
            ))
        })
    }
}

/// Resolves the configuration directory: explicit argument, then the
/// `AURIGA_CONFIG_DIR` environment variable, then `./config`.
pub fn resolve_config_dir(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var(AURIGA_CONFIG_DIR).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR))
}

/// Determines the active cluster name.
///
/// Precedence, in strict order:
/// 1. the explicit override (CLI argument or `AURIGA_CLUSTER`),
/// 2. `default_cluster` from the server configuration,
/// 3. a substring match of the local hostname against discovered names,
/// 4. the lexicographically first discovered name.
pub fn resolve_cluster(
    override_name: Option<&str>,
    config: &ServerConfig,
    store: &ClusterStore,
) -> crate::Result<String> {
    if let Some(name) = override_name {
        return Ok(name.to_string());
    }
    if let Some(name) = &config.default_cluster {
        return Ok(name.clone());
    }

    let available = store.discover();
    let hostname = gethostname::gethostname().to_string_lossy().to_lowercase();
    if let Some(name) = match_hostname(&hostname, &available) {
        log::debug!("Detected cluster '{name}' from hostname '{hostname}'");
        return Ok(name);
    }

    match available.into_iter().next() {
        Some(name) => Ok(name),
        None => Err(crate::Error::NoClusterAvailable(format!(
            "{} (set {} or create cluster definition files)",
            store.clusters_dir().display(),
            AURIGA_CLUSTER
        ))),
    }
}

/// Returns the first cluster whose name occurs in the hostname.
fn match_hostname(hostname: &str, clusters: &[String]) -> Option<String> {
    clusters
        .iter()
        .find(|name| hostname.contains(name.to_lowercase().as_str()))
        .cloned()
}
