pub mod generic;
pub mod hello_world;
pub mod registry;
pub mod warpx;

use std::collections::BTreeMap;
use std::fmt::Write;
use std::rc::Rc;

use crate::cluster::ClusterDefinition;
use crate::common::error::not_found;
use crate::workspace::{WorkspaceManager, WorkspaceUpdate};

pub use registry::Registry;

/// Per-application settings loaded from the configuration directory,
/// free-form YAML mappings.
pub type AppSettings = BTreeMap<String, serde_json::Value>;

/// What the caller asks a script generator for.
#[derive(Debug, Clone)]
pub struct ScriptSpec {
    pub job_name: String,
    pub account: String,
    pub queue: String,
    pub walltime: String,
    pub nodes: u32,
    pub ranks_per_node: u32,
    /// Executable to run; only some applications require it.
    pub executable: Option<String>,
    pub args: Vec<String>,
}

/// One application that knows how to render a PBS submit script for itself.
///
/// Applications are registered explicitly in [`Registry::builtin`]; there is
/// no directory scanning or dynamic loading.
pub trait Application {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Whether this application can run on the given cluster. Defaults to
    /// running everywhere.
    fn supports_cluster(&self, _cluster: &ClusterDefinition) -> bool {
        true
    }

    fn generate_script(
        &self,
        cluster: &ClusterDefinition,
        spec: &ScriptSpec,
        settings: &AppSettings,
    ) -> crate::Result<String>;
}

/// Renders the shared `#PBS` directive block that every generated script
/// starts with.
pub fn pbs_header(cluster: &ClusterDefinition, spec: &ScriptSpec) -> String {
    let mut header = String::from("#!/bin/bash\n");
    let _ = writeln!(header, "#PBS -N {}", spec.job_name);
    let _ = writeln!(header, "#PBS -q {}", spec.queue);
    let _ = writeln!(header, "#PBS -A {}", spec.account);
    let _ = writeln!(header, "#PBS -l select={}", spec.nodes);
    let _ = writeln!(header, "#PBS -l walltime={}", spec.walltime);
    if let Some(queue) = cluster.queue(&spec.queue) {
        if !queue.filesystems.is_empty() {
            let _ = writeln!(header, "#PBS -l filesystems={}", queue.filesystems.join(":"));
        }
        let _ = writeln!(header, "#PBS -l place={}", queue.default_place);
    }
    header.push_str("#PBS -j oe\n");
    header.push_str("\ncd \"$PBS_O_WORKDIR\"\n");
    header
}

/// Renders `module load` lines from the `modules` settings key, falling back
/// to the cluster's recommended modules.
pub fn module_lines(cluster: &ClusterDefinition, settings: &AppSettings) -> String {
    let modules: Vec<String> = settings
        .get("modules")
        .and_then(|value| value.as_array())
        .map(|values| {
            values
                .iter()
                .filter_map(|value| value.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_else(|| cluster.recommended_modules.clone());
    modules
        .iter()
        .fold(String::new(), |mut out, module| {
            let _ = writeln!(out, "module load {module}");
            out
        })
}

/// Generates a script with the named application and stores it as `submit.sh`
/// inside the given workspace. Returns the script path.
pub fn generate_into_workspace(
    registry: &Registry,
    cluster: &ClusterDefinition,
    workspaces: &Rc<WorkspaceManager>,
    workspace_id: &str,
    app_name: &str,
    spec: &ScriptSpec,
    settings: &AppSettings,
) -> crate::Result<std::path::PathBuf> {
    let Some(application) = registry.get(app_name) else {
        return not_found(format!(
            "Unknown application '{}'. Registered applications: {}",
            app_name,
            registry.names().join(", ")
        ));
    };

    let script = application.generate_script(cluster, spec, settings)?;
    let script_path = workspaces.script_path(workspace_id, "submit.sh")?;
    std::fs::write(&script_path, script)?;
    log::info!(
        "Generated {} script at {}",
        application.name(),
        script_path.display()
    );

    workspaces.update(
        workspace_id,
        WorkspaceUpdate {
            script_path: Some(script_path.clone()),
            ..Default::default()
        },
    )?;
    Ok(script_path)
}
