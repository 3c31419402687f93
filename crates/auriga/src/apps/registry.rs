use std::collections::BTreeMap;

use crate::apps::generic::Generic;
use crate::apps::hello_world::HelloWorld;
use crate::apps::warpx::WarpX;
use crate::apps::{AppSettings, Application};
use crate::cluster::{ClusterDefinition, ClusterStore};

/// Explicit registry of the applications this build knows about.
///
/// New applications are added by implementing [`Application`] and registering
/// the instance in [`Registry::builtin`].
pub struct Registry {
    applications: Vec<Box<dyn Application>>,
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            applications: Vec::new(),
        }
    }

    /// The registry with all built-in applications.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(HelloWorld));
        registry.register(Box::new(Generic));
        registry.register(Box::new(WarpX));
        registry
    }

    pub fn register(&mut self, application: Box<dyn Application>) {
        if self.get(application.name()).is_some() {
            log::warn!(
                "Application '{}' registered twice, replacing the earlier entry",
                application.name()
            );
            self.applications
                .retain(|existing| existing.name() != application.name());
        }
        self.applications.push(application);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.applications.iter().map(|app| app.name()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Application> {
        self.applications
            .iter()
            .find(|app| app.name() == name)
            .map(|app| app.as_ref())
    }

    /// Applications usable on the given cluster, each paired with its
    /// settings from the configuration directory.
    ///
    /// Unsupported applications are skipped with a log line; an unreadable
    /// settings file skips only the affected application.
    pub fn available_for(
        &self,
        cluster: &ClusterDefinition,
        store: &ClusterStore,
    ) -> BTreeMap<&'static str, AppSettings> {
        let mut available = BTreeMap::new();
        for application in &self.applications {
            if !application.supports_cluster(cluster) {
                log::debug!(
                    "Application '{}' does not support cluster '{}'",
                    application.name(),
                    cluster.name
                );
                continue;
            }
            match store.app_settings(application.name(), &cluster.name) {
                Ok(settings) => {
                    available.insert(application.name(), settings);
                }
                Err(error) => {
                    log::warn!(
                        "Skipping application '{}': cannot load its settings: {error}",
                        application.name()
                    );
                }
            }
        }
        available
    }
}
