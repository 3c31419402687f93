use std::fmt::Write;

use crate::apps::{module_lines, pbs_header, AppSettings, Application, ScriptSpec};
use crate::cluster::ClusterDefinition;
use crate::common::error::validation_error;

/// Runs an arbitrary executable under MPI. The escape hatch for software that
/// has no dedicated application entry.
pub struct Generic;

impl Application for Generic {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn description(&self) -> &'static str {
        "Run an arbitrary executable with MPI"
    }

    fn generate_script(
        &self,
        cluster: &ClusterDefinition,
        spec: &ScriptSpec,
        settings: &AppSettings,
    ) -> crate::Result<String> {
        let Some(executable) = &spec.executable else {
            return validation_error(
                "The generic application requires an executable to run".to_string(),
            );
        };
        let mpi_command = settings
            .get("mpi_command")
            .and_then(|value| value.as_str())
            .unwrap_or("mpiexec");
        let total_ranks = spec.nodes * spec.ranks_per_node;

        let mut script = pbs_header(cluster, spec);
        script.push('\n');
        script.push_str(&module_lines(cluster, settings));
        let _ = write!(
            script,
            "\n{mpi_command} -n {total_ranks} --ppn {} {executable}",
            spec.ranks_per_node
        );
        for arg in &spec.args {
            let _ = write!(script, " {arg}");
        }
        script.push('\n');
        Ok(script)
    }
}
