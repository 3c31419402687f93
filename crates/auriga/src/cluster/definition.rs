use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::common::error::config_error;

/// Hardware description of one cluster, as written in its definition file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Hardware {
    pub total_nodes: u32,
    pub cores_per_node: u32,
    pub gpus_per_node: u32,
    pub gpu_type: String,
    /// Memory per node in GiB.
    pub memory_per_node: u32,
    pub memory_type: String,
    pub cpu_model: String,
    pub interconnect: String,
}

/// A single scheduling queue of a cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueDefinition {
    /// Injected from the queue mapping key when the definition is loaded.
    #[serde(skip_deserializing)]
    pub name: String,
    pub max_walltime: String,
    pub max_nodes: u32,
    pub node_types: Vec<String>,
    pub filesystems: Vec<String>,
    pub description: String,
    pub default_place: String,
    pub priority: i32,
}

impl Default for QueueDefinition {
    fn default() -> Self {
        Self {
            name: String::new(),
            max_walltime: "01:00:00".to_string(),
            max_nodes: 1,
            node_types: Vec::new(),
            filesystems: Vec::new(),
            description: String::new(),
            default_place: "scatter".to_string(),
            priority: 0,
        }
    }
}

/// Definition of one HPC cluster, parsed from a YAML file in the cluster
/// configuration directory. Immutable after load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterDefinition {
    pub name: String,
    pub display_name: String,
    pub facility: String,
    pub pbs_server: String,
    pub hardware: Hardware,
    pub queues: BTreeMap<String, QueueDefinition>,
    /// Filesystem label -> mount path.
    pub filesystems: BTreeMap<String, String>,
    pub default_filesystems: Vec<String>,
    pub recommended_modules: Vec<String>,
    pub custom_settings: BTreeMap<String, serde_json::Value>,
}

impl ClusterDefinition {
    /// Checks the invariants that the definition file format cannot express
    /// and fills in derived fields (queue names, display name fallback).
    pub(super) fn finalize(mut self) -> crate::Result<Self> {
        if self.name.is_empty() {
            return config_error("Cluster definition is missing `name`".to_string());
        }
        if self.pbs_server.is_empty() {
            return config_error(format!(
                "Cluster '{}' is missing `pbs_server`",
                self.name
            ));
        }
        if self.hardware.total_nodes == 0 || self.hardware.cores_per_node == 0 {
            return config_error(format!(
                "Cluster '{}' must specify non-zero `hardware.total_nodes` and \
                 `hardware.cores_per_node`",
                self.name
            ));
        }
        if self.display_name.is_empty() {
            self.display_name = self.name.clone();
        }

        for (name, queue) in self.queues.iter_mut() {
            queue.name = name.clone();
        }
        for queue in self.queues.values() {
            for label in &queue.filesystems {
                if !self.filesystems.contains_key(label) {
                    return config_error(format!(
                        "Queue '{}' of cluster '{}' references unknown filesystem '{}'. \
                         Known filesystems: {}",
                        queue.name,
                        self.name,
                        label,
                        self.filesystems.keys().cloned().collect::<Vec<_>>().join(", ")
                    ));
                }
            }
        }
        Ok(self)
    }

    pub fn queue(&self, name: &str) -> Option<&QueueDefinition> {
        self.queues.get(name)
    }

    /// The queue named `debug` if it exists, otherwise the first queue.
    pub fn default_queue(&self) -> Option<&QueueDefinition> {
        self.queues
            .get("debug")
            .or_else(|| self.queues.values().next())
    }

    pub fn queue_names(&self) -> Vec<&str> {
        self.queues.keys().map(|name| name.as_str()).collect()
    }

    pub fn filesystem_path(&self, label: &str) -> Option<&str> {
        self.filesystems.get(label).map(|path| path.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::ClusterDefinition;

    fn parse(yaml: &str) -> crate::Result<ClusterDefinition> {
        let definition: ClusterDefinition = serde_yaml::from_str(yaml).unwrap();
        definition.finalize()
    }

    const MINIMAL: &str = r#"
name: borealis
pbs_server: borealis-pbs-01
hardware:
  total_nodes: 128
  cores_per_node: 64
"#;

    #[test]
    fn minimal_definition_is_valid() {
        let definition = parse(MINIMAL).unwrap();
        assert_eq!(definition.name, "borealis");
        assert_eq!(definition.display_name, "borealis");
        assert_eq!(definition.hardware.cores_per_node, 64);
        assert!(definition.default_queue().is_none());
    }

    #[test]
    fn queue_names_are_injected() {
        let definition = parse(&format!(
            "{MINIMAL}
queues:
  debug:
    max_walltime: \"01:00:00\"
    max_nodes: 8
  prod:
    max_walltime: \"24:00:00\"
    max_nodes: 128
"
        ))
        .unwrap();
        assert_eq!(definition.queue("prod").unwrap().name, "prod");
        assert_eq!(definition.default_queue().unwrap().name, "debug");
    }

    #[test]
    fn first_queue_is_default_without_debug() {
        let definition = parse(&format!(
            "{MINIMAL}
queues:
  workq:
    max_nodes: 16
"
        ))
        .unwrap();
        assert_eq!(definition.default_queue().unwrap().name, "workq");
    }

    #[test]
    fn missing_pbs_server_is_rejected() {
        let error = parse("name: foo\nhardware:\n  total_nodes: 1\n  cores_per_node: 1\n")
            .unwrap_err();
        assert!(error.to_string().contains("pbs_server"));
    }

    #[test]
    fn zero_node_count_is_rejected() {
        assert!(parse("name: foo\npbs_server: bar\n").is_err());
    }

    #[test]
    fn queue_filesystems_must_exist() {
        let error = parse(&format!(
            "{MINIMAL}
filesystems:
  home: /home
queues:
  debug:
    max_nodes: 8
    filesystems: [home, flare]
"
        ))
        .unwrap_err();
        let message = error.to_string();
        assert!(message.contains("unknown filesystem 'flare'"));
        assert!(message.contains("home"));
    }
}
