use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use anyhow::Context;

use crate::pbs::messages::{JobAttributes, JobInfo, QueueStatus};

/// The shape of the external scheduler, as this crate consumes it.
///
/// The real implementation drives the PBS command-line tools; the mock keeps
/// jobs in memory. Both are obtained through a [`SchedulerConnector`] and are
/// dropped (disconnected) when the operation that acquired them returns.
pub trait SchedulerClient {
    fn submit(
        &mut self,
        script_path: &Path,
        queue: &str,
        attrs: &JobAttributes,
    ) -> anyhow::Result<String>;

    /// Stats a single job, or all known jobs when `job_id` is `None`.
    fn stat_jobs(&mut self, job_id: Option<&str>) -> anyhow::Result<Vec<JobInfo>>;

    fn stat_queues(&mut self, queue: Option<&str>) -> anyhow::Result<Vec<QueueStatus>>;

    fn delete_job(&mut self, job_id: &str, force: bool) -> anyhow::Result<()>;

    fn hold_job(&mut self, job_id: &str) -> anyhow::Result<()>;

    fn release_job(&mut self, job_id: &str) -> anyhow::Result<()>;
}

/// Produces connected scheduler clients, one per operation.
pub trait SchedulerConnector {
    fn connect(&self) -> anyhow::Result<Box<dyn SchedulerClient>>;
}

/// Connector for the real PBS installation of a cluster's login node.
pub struct PbsConnector {
    server: String,
}

impl PbsConnector {
    pub fn new(server: &str) -> Self {
        Self {
            server: server.to_string(),
        }
    }
}

impl SchedulerConnector for PbsConnector {
    fn connect(&self) -> anyhow::Result<Box<dyn SchedulerClient>> {
        log::debug!("Connecting PBS command client for server {}", self.server);
        Ok(Box::new(PbsCommandClient {
            server: self.server.clone(),
        }))
    }
}

/// Scheduler client backed by the PBS command-line tools (`qsub`, `qstat`,
/// `qdel`, `qhold`, `qrls`), which talk to the server configured on the
/// login node this process runs on.
pub struct PbsCommandClient {
    server: String,
}

impl SchedulerClient for PbsCommandClient {
    fn submit(
        &mut self,
        script_path: &Path,
        queue: &str,
        attrs: &JobAttributes,
    ) -> anyhow::Result<String> {
        let mut command = Command::new("qsub");
        command.arg("-q").arg(queue);
        if let Some(job_name) = &attrs.job_name {
            command.arg("-N").arg(job_name);
        }
        if !attrs.account.is_empty() {
            command.arg("-A").arg(&attrs.account);
        }
        for (resource, value) in &attrs.resources {
            command.arg("-l").arg(format!("{resource}={value}"));
        }
        command.arg(script_path);

        let output = run_command(command, "qsub")
            .with_context(|| format!("Submission to {} failed", self.server))?;
        let job_id = output.trim().to_string();
        if job_id.is_empty() {
            anyhow::bail!("qsub did not print a job id");
        }
        Ok(job_id)
    }

    fn stat_jobs(&mut self, job_id: Option<&str>) -> anyhow::Result<Vec<JobInfo>> {
        let mut command = Command::new("qstat");
        // -x also displays finished jobs
        command.args(["-f", "-F", "json", "-x"]);
        if let Some(job_id) = job_id {
            command.arg(job_id);
        }

        let output = run_command(command, "qstat")?;
        let data: serde_json::Value =
            serde_json::from_str(&output).context("Cannot parse qstat JSON output")?;

        let mut jobs = Vec::new();
        if let Some(map) = data["Jobs"].as_object() {
            for (id, value) in map {
                jobs.push(JobInfo {
                    id: id.clone(),
                    attrs: flatten_attrs(value),
                });
            }
        }
        Ok(jobs)
    }

    fn stat_queues(&mut self, queue: Option<&str>) -> anyhow::Result<Vec<QueueStatus>> {
        let mut command = Command::new("qstat");
        command.args(["-Q", "-f", "-F", "json"]);
        if let Some(queue) = queue {
            command.arg(queue);
        }

        let output = run_command(command, "qstat")?;
        let data: serde_json::Value =
            serde_json::from_str(&output).context("Cannot parse qstat JSON output")?;

        let mut queues = Vec::new();
        if let Some(map) = data["Queue"].as_object() {
            for (name, value) in map {
                queues.push(QueueStatus {
                    name: name.clone(),
                    attrs: flatten_attrs(value),
                });
            }
        }
        Ok(queues)
    }

    fn delete_job(&mut self, job_id: &str, force: bool) -> anyhow::Result<()> {
        let mut command = Command::new("qdel");
        if force {
            command.args(["-W", "force"]);
        }
        command.arg(job_id);
        run_command(command, "qdel").map(|_| ())
    }

    fn hold_job(&mut self, job_id: &str) -> anyhow::Result<()> {
        let mut command = Command::new("qhold");
        command.arg(job_id);
        run_command(command, "qhold").map(|_| ())
    }

    fn release_job(&mut self, job_id: &str) -> anyhow::Result<()> {
        let mut command = Command::new("qrls");
        command.arg(job_id);
        run_command(command, "qrls").map(|_| ())
    }
}

fn run_command(mut command: Command, program: &str) -> anyhow::Result<String> {
    log::debug!("Running PBS command {command:?}");
    let output = command
        .output()
        .with_context(|| format!("{program} start failed"))?;
    if !output.status.success() {
        anyhow::bail!(
            "{program} exited with {}\nStderr: {}\nStdout: {}",
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr).trim(),
            String::from_utf8_lossy(&output.stdout).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Flattens the nested attribute objects of `qstat -F json` into dotted keys,
/// e.g. `Resource_List.walltime`.
pub(crate) fn flatten_attrs(value: &serde_json::Value) -> BTreeMap<String, String> {
    fn walk(prefix: &str, value: &serde_json::Value, out: &mut BTreeMap<String, String>) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, nested) in map {
                    let key = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{prefix}.{key}")
                    };
                    walk(&key, nested, out);
                }
            }
            serde_json::Value::Null => {}
            serde_json::Value::String(text) => {
                out.insert(prefix.to_string(), text.clone());
            }
            other => {
                out.insert(prefix.to_string(), other.to_string());
            }
        }
    }

    let mut out = BTreeMap::new();
    walk("", value, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::flatten_attrs;

    #[test]
    fn flatten_qstat_job_attributes() {
        let value = serde_json::json!({
            "Job_Name": "hello",
            "job_state": "Q",
            "Resource_List": {
                "select": "4",
                "walltime": "01:00:00"
            },
            "Exit_status": 0,
            "comment": null
        });
        let attrs = flatten_attrs(&value);
        assert_eq!(attrs["Job_Name"], "hello");
        assert_eq!(attrs["Resource_List.select"], "4");
        assert_eq!(attrs["Resource_List.walltime"], "01:00:00");
        assert_eq!(attrs["Exit_status"], "0");
        assert!(!attrs.contains_key("comment"));
    }
}
