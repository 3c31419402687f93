use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::cluster::ClusterDefinition;
use crate::common::error::{config_error, not_found};

/// Definition files starting with this prefix are reserved for local
/// experiments and are never picked up by discovery.
pub const LOCAL_DEFINITION_PREFIX: &str = "local";

const CLUSTERS_SUBDIR: &str = "clusters";
const APPLICATIONS_SUBDIR: &str = "applications";

/// Loads and caches cluster definitions from `<config_dir>/clusters/*.yaml`.
///
/// The filename stem is the cluster identity. Definitions are parsed at first
/// reference and kept for the life of the process.
pub struct ClusterStore {
    config_dir: PathBuf,
    clusters_dir: PathBuf,
    cache: RefCell<BTreeMap<String, Rc<ClusterDefinition>>>,
}

impl ClusterStore {
    pub fn new(config_dir: &Path) -> Self {
        Self {
            config_dir: config_dir.to_path_buf(),
            clusters_dir: config_dir.join(CLUSTERS_SUBDIR),
            cache: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn clusters_dir(&self) -> &Path {
        &self.clusters_dir
    }

    /// Maps the name of each discovered cluster to its definition file.
    pub fn discover_files(&self) -> BTreeMap<String, PathBuf> {
        let mut clusters = BTreeMap::new();
        let Ok(entries) = std::fs::read_dir(&self.clusters_dir) else {
            return clusters;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.starts_with(LOCAL_DEFINITION_PREFIX) {
                continue;
            }
            clusters.insert(stem.to_string(), path);
        }
        clusters
    }

    /// Names of all available clusters, sorted.
    pub fn discover(&self) -> Vec<String> {
        self.discover_files().into_keys().collect()
    }

    /// Loads a cluster definition by name, caching the result.
    pub fn load(&self, name: &str) -> crate::Result<Rc<ClusterDefinition>> {
        if let Some(definition) = self.cache.borrow().get(name) {
            return Ok(definition.clone());
        }

        let files = self.discover_files();
        let Some(path) = files.get(name) else {
            return not_found(format!(
                "Cluster '{}' not found. Available clusters: {}",
                name,
                files.keys().cloned().collect::<Vec<_>>().join(", ")
            ));
        };

        let definition = load_definition_file(path)?;
        let definition = Rc::new(definition);
        self.cache
            .borrow_mut()
            .insert(name.to_string(), definition.clone());
        Ok(definition)
    }

    /// Loads per-application settings for the given cluster.
    ///
    /// Looks for `<config_dir>/applications/<app>/<cluster>.yaml` first and
    /// falls back to `default.yaml`; returns an empty mapping when neither
    /// file exists.
    pub fn app_settings(
        &self,
        app: &str,
        cluster: &str,
    ) -> crate::Result<BTreeMap<String, serde_json::Value>> {
        let app_dir = self.config_dir.join(APPLICATIONS_SUBDIR).join(app);
        for candidate in [
            app_dir.join(format!("{cluster}.yaml")),
            app_dir.join("default.yaml"),
        ] {
            if candidate.is_file() {
                let text = std::fs::read_to_string(&candidate)?;
                if text.trim().is_empty() {
                    return Ok(BTreeMap::new());
                }
                return serde_yaml::from_str(&text).map_err(|e| {
                    crate::Error::ConfigurationError(format!(
                        "Cannot parse application settings {}: {e}",
                        candidate.display()
                    ))
                });
            }
        }
        Ok(BTreeMap::new())
    }
}

fn load_definition_file(path: &Path) -> crate::Result<ClusterDefinition> {
    let text = std::fs::read_to_string(path)?;
    if text.trim().is_empty() {
        return config_error(format!("Cluster definition {} is empty", path.display()));
    }
    let definition: ClusterDefinition = serde_yaml::from_str(&text).map_err(|e| {
        crate::Error::ConfigurationError(format!(
            "Cannot parse cluster definition {}: {e}",
            path.display()
        ))
    })?;
    definition.finalize()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempfile::TempDir;

    use super::ClusterStore;

    fn write_cluster(config_dir: &Path, name: &str) {
        let clusters = config_dir.join("clusters");
        std::fs::create_dir_all(&clusters).unwrap();
        std::fs::write(
            clusters.join(format!("{name}.yaml")),
            format!(
                "name: {name}\npbs_server: {name}-pbs-01\nhardware:\n  total_nodes: 64\n  cores_per_node: 32\n"
            ),
        )
        .unwrap();
    }

    #[test]
    fn discover_skips_local_definitions() {
        let dir = TempDir::with_prefix("auriga").unwrap();
        write_cluster(dir.path(), "aurora");
        write_cluster(dir.path(), "polaris");
        write_cluster(dir.path(), "local-test");

        let store = ClusterStore::new(dir.path());
        assert_eq!(store.discover(), vec!["aurora", "polaris"]);
    }

    #[test]
    fn discover_is_empty_without_config_dir() {
        let dir = TempDir::with_prefix("auriga").unwrap();
        let store = ClusterStore::new(&dir.path().join("missing"));
        assert!(store.discover().is_empty());
    }

    #[test]
    fn load_unknown_cluster_lists_available() {
        let dir = TempDir::with_prefix("auriga").unwrap();
        write_cluster(dir.path(), "aurora");

        let store = ClusterStore::new(dir.path());
        let error = store.load("sunspot").unwrap_err();
        let message = error.to_string();
        assert!(message.contains("'sunspot' not found"));
        assert!(message.contains("aurora"));
    }

    #[test]
    fn load_is_cached() {
        let dir = TempDir::with_prefix("auriga").unwrap();
        write_cluster(dir.path(), "aurora");

        let store = ClusterStore::new(dir.path());
        let first = store.load("aurora").unwrap();

        // Removing the file does not invalidate an already loaded definition
        std::fs::remove_file(dir.path().join("clusters/aurora.yaml")).unwrap();
        let second = store.load("aurora").unwrap();
        assert!(std::rc::Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn malformed_definition_is_a_configuration_error() {
        let dir = TempDir::with_prefix("auriga").unwrap();
        let clusters = dir.path().join("clusters");
        std::fs::create_dir_all(&clusters).unwrap();
        std::fs::write(clusters.join("broken.yaml"), "name: broken\n").unwrap();

        let store = ClusterStore::new(dir.path());
        assert!(matches!(
            store.load("broken"),
            Err(crate::Error::ConfigurationError(_))
        ));
    }

    #[test]
    fn app_settings_prefer_cluster_specific_file() {
        let dir = TempDir::with_prefix("auriga").unwrap();
        let app_dir = dir.path().join("applications/hello_world");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(app_dir.join("default.yaml"), "mpi_command: mpiexec\n").unwrap();
        std::fs::write(app_dir.join("aurora.yaml"), "mpi_command: mpirun\n").unwrap();

        let store = ClusterStore::new(dir.path());
        let settings = store.app_settings("hello_world", "aurora").unwrap();
        assert_eq!(settings["mpi_command"], "mpirun");

        let settings = store.app_settings("hello_world", "polaris").unwrap();
        assert_eq!(settings["mpi_command"], "mpiexec");

        assert!(store.app_settings("warpx", "aurora").unwrap().is_empty());
    }
}
