use std::fmt::Write;

use crate::apps::{module_lines, pbs_header, AppSettings, Application, ScriptSpec};
use crate::cluster::ClusterDefinition;

/// Minimal MPI smoke test: prints a greeting from every rank. Useful for
/// verifying that submission, queueing and MPI startup work on a cluster
/// before running anything real.
pub struct HelloWorld;

impl Application for HelloWorld {
    fn name(&self) -> &'static str {
        "hello_world"
    }

    fn description(&self) -> &'static str {
        "MPI hello world for validating cluster access and job startup"
    }

    fn generate_script(
        &self,
        cluster: &ClusterDefinition,
        spec: &ScriptSpec,
        settings: &AppSettings,
    ) -> crate::Result<String> {
        let mpi_command = settings
            .get("mpi_command")
            .and_then(|value| value.as_str())
            .unwrap_or("mpiexec");
        let total_ranks = spec.nodes * spec.ranks_per_node;

        let mut script = pbs_header(cluster, spec);
        script.push('\n');
        script.push_str(&module_lines(cluster, settings));
        let _ = writeln!(script, "\necho \"Job $PBS_JOBID on $(hostname)\"");
        let _ = writeln!(
            script,
            "{mpi_command} -n {total_ranks} --ppn {} bash -c \
             'echo \"Hello from rank $PMI_RANK on $(hostname)\"'",
            spec.ranks_per_node
        );
        Ok(script)
    }
}

#[cfg(test)]
mod tests {
    use super::HelloWorld;
    use crate::apps::test_support::{test_cluster, test_spec};
    use crate::apps::Application;

    #[test]
    fn script_uses_rank_counts_from_spec() {
        let script = HelloWorld
            .generate_script(&test_cluster(), &test_spec(), &Default::default())
            .unwrap();
        assert!(script.contains("#PBS -N hello"));
        assert!(script.contains("module load cray-mpich"));
        assert!(script.contains("mpiexec -n 8 --ppn 4"));
    }

    #[test]
    fn mpi_command_is_configurable() {
        let mut settings = crate::apps::AppSettings::new();
        settings.insert("mpi_command".to_string(), serde_json::json!("srun"));
        let script = HelloWorld
            .generate_script(&test_cluster(), &test_spec(), &settings)
            .unwrap();
        assert!(script.contains("srun -n 8"));
    }
}
