use std::fmt::Write;

use crate::apps::{module_lines, pbs_header, AppSettings, Application, ScriptSpec};
use crate::cluster::ClusterDefinition;
use crate::common::error::validation_error;

/// Clusters with a known WarpX software stack.
const SUPPORTED_CLUSTERS: &[&str] = &["aurora", "polaris", "sunspot"];

/// WarpX particle-in-cell runs via the Python PICMI driver workflow: the
/// caller stages a driver script into the workspace, this plugin renders a
/// job script that executes it under MPI with the configured environment.
pub struct WarpX;

impl Application for WarpX {
    fn name(&self) -> &'static str {
        "warpx"
    }

    fn description(&self) -> &'static str {
        "WarpX PIC code, Python PICMI driver workflow"
    }

    fn supports_cluster(&self, cluster: &ClusterDefinition) -> bool {
        SUPPORTED_CLUSTERS.contains(&cluster.name.as_str())
    }

    fn generate_script(
        &self,
        cluster: &ClusterDefinition,
        spec: &ScriptSpec,
        settings: &AppSettings,
    ) -> crate::Result<String> {
        let Some(driver) = &spec.executable else {
            return validation_error(
                "warpx requires the PICMI driver script as the executable".to_string(),
            );
        };
        let mpi_command = setting_str(settings, "mpi_command").unwrap_or("mpiexec");
        let threads_per_rank = settings
            .get("threads_per_rank")
            .and_then(|value| value.as_u64())
            .unwrap_or(1);
        let total_ranks = spec.nodes * spec.ranks_per_node;

        let mut script = pbs_header(cluster, spec);
        script.push('\n');
        if let Some(profile) = setting_str(settings, "profile_source") {
            let _ = writeln!(script, "source {profile}");
        }
        script.push_str(&module_lines(cluster, settings));
        if let Some(venv) = setting_str(settings, "venv_activate") {
            let _ = writeln!(script, "source {venv}");
        }
        if let Some(environment) = settings.get("environment").and_then(|v| v.as_object()) {
            for (name, value) in environment {
                if let Some(value) = value.as_str() {
                    let _ = writeln!(script, "export {name}={value}");
                }
            }
        }
        let _ = writeln!(script, "export OMP_NUM_THREADS={threads_per_rank}");

        let _ = write!(
            script,
            "\n{mpi_command} -n {total_ranks} --ppn {}",
            spec.ranks_per_node
        );
        if let Some(flags) = settings.get("mpi_flags").and_then(|v| v.as_array()) {
            for flag in flags.iter().filter_map(|flag| flag.as_str()) {
                let _ = write!(script, " {flag}");
            }
        }
        let _ = write!(script, " {driver}");
        for arg in &spec.args {
            let _ = write!(script, " {arg}");
        }
        script.push('\n');
        Ok(script)
    }
}

fn setting_str<'a>(settings: &'a AppSettings, key: &str) -> Option<&'a str> {
    settings.get(key).and_then(|value| value.as_str())
}

#[cfg(test)]
mod tests {
    use super::WarpX;
    use crate::apps::test_support::{test_cluster, test_spec};
    use crate::apps::{AppSettings, Application};
    use crate::common::error::AurigaError;

    fn warpx_spec() -> crate::apps::ScriptSpec {
        let mut spec = test_spec();
        spec.executable = Some("./picmi_case.py".to_string());
        spec.args = vec!["--dim".to_string(), "3".to_string()];
        spec
    }

    #[test]
    fn only_known_clusters_are_supported() {
        let mut cluster = test_cluster();
        assert!(!WarpX.supports_cluster(&cluster));
        cluster.name = "aurora".to_string();
        assert!(WarpX.supports_cluster(&cluster));
    }

    #[test]
    fn missing_driver_is_rejected() {
        let error = WarpX
            .generate_script(&test_cluster(), &test_spec(), &Default::default())
            .unwrap_err();
        assert!(matches!(error, AurigaError::ValidationError(_)));
    }

    #[test]
    fn driver_and_args_appear_in_the_mpi_line() {
        let script = WarpX
            .generate_script(&test_cluster(), &warpx_spec(), &Default::default())
            .unwrap();
        assert!(script.contains("mpiexec -n 8 --ppn 4 ./picmi_case.py --dim 3"));
        assert!(script.contains("export OMP_NUM_THREADS=1"));
    }

    #[test]
    fn environment_and_mpi_settings_are_honored() {
        let mut settings = AppSettings::new();
        settings.insert("mpi_command".to_string(), serde_json::json!("mpirun"));
        settings.insert("mpi_flags".to_string(), serde_json::json!(["-genvall"]));
        settings.insert("threads_per_rank".to_string(), serde_json::json!(8));
        settings.insert(
            "environment".to_string(),
            serde_json::json!({"FI_CXI_DEFAULT_CQ_SIZE": "131072"}),
        );
        settings.insert(
            "venv_activate".to_string(),
            serde_json::json!("/soft/warpx/venv/bin/activate"),
        );

        let script = WarpX
            .generate_script(&test_cluster(), &warpx_spec(), &settings)
            .unwrap();
        assert!(script.contains("source /soft/warpx/venv/bin/activate"));
        assert!(script.contains("export FI_CXI_DEFAULT_CQ_SIZE=131072"));
        assert!(script.contains("export OMP_NUM_THREADS=8"));
        assert!(script.contains("mpirun -n 8 --ppn 4 -genvall ./picmi_case.py --dim 3"));
    }
}
