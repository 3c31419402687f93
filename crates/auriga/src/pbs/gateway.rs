use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;

use crate::cluster::ClusterDefinition;
use crate::common::env::PBS_ACCOUNT;
use crate::common::error::{not_found, validation_error, AurigaError};
use crate::common::timeutils::{format_hms_duration, parse_hms_time};
use crate::pbs::client::SchedulerConnector;
use crate::pbs::messages::{
    JobActionResponse, JobAttributes, JobInfo, JobListResponse, QueueDetails, QueueInfoResponse,
    SubmitResponse,
};
use crate::workspace::{WorkspaceManager, WorkspaceStatus, WorkspaceUpdate};

/// What the caller asks to submit. Everything except the account is optional;
/// missing fields are filled in from the workspace record and the cluster's
/// queue definitions.
#[derive(Debug, Default)]
pub struct SubmitSpec {
    /// Explicit script path. May be omitted when `workspace_id` points at a
    /// workspace with a generated script.
    pub script_path: Option<PathBuf>,
    pub workspace_id: Option<String>,
    pub queue: Option<String>,
    pub job_name: Option<String>,
    pub account: String,
    pub nodes: Option<u32>,
    pub walltime: Option<String>,
    /// Colon-separated PBS filesystem labels, e.g. `home:scratch`.
    pub filesystems: Option<String>,
    /// Additional `-l` resources passed through verbatim.
    pub extra_resources: BTreeMap<String, String>,
}

/// Front door to the scheduler of the active cluster.
///
/// Every request is validated against the cluster definition before a client
/// is connected, so requests that cannot possibly be accepted never reach the
/// PBS server. A fresh client is connected per operation and dropped when the
/// operation returns.
pub struct Gateway {
    cluster: Rc<ClusterDefinition>,
    connector: Box<dyn SchedulerConnector>,
    workspaces: Rc<WorkspaceManager>,
}

impl Gateway {
    pub fn new(
        cluster: Rc<ClusterDefinition>,
        connector: Box<dyn SchedulerConnector>,
        workspaces: Rc<WorkspaceManager>,
    ) -> Self {
        Self {
            cluster,
            connector,
            workspaces,
        }
    }

    pub fn cluster(&self) -> &ClusterDefinition {
        &self.cluster
    }

    /// Validates and submits a job, linking it to its workspace if one was
    /// given.
    pub fn submit(&self, spec: SubmitSpec) -> crate::Result<SubmitResponse> {
        let workspace = match &spec.workspace_id {
            Some(workspace_id) => match self.workspaces.get(workspace_id) {
                Some(workspace) => Some(workspace),
                None => return not_found(format!("Workspace {workspace_id} not found")),
            },
            None => None,
        };

        let script_path = match spec
            .script_path
            .clone()
            .or_else(|| workspace.as_ref().and_then(|w| w.script_path.clone()))
        {
            Some(path) => path,
            None => {
                return validation_error(
                    "No submit script: pass a script path or a workspace with a generated script"
                        .to_string(),
                );
            }
        };
        if !script_path.is_file() {
            return validation_error(format!(
                "Submit script {} does not exist",
                script_path.display()
            ));
        }

        if spec.account.is_empty() {
            return validation_error(format!(
                "No account/project given. Pass one explicitly or set {PBS_ACCOUNT}"
            ));
        }

        let queue = self.resolve_queue(spec.queue.as_deref())?;

        let nodes = match spec.nodes {
            Some(nodes) => nodes,
            None => match workspace.as_ref().and_then(|w| w.metadata.get("num_nodes")) {
                Some(value) => match value.as_u64().and_then(|n| u32::try_from(n).ok()) {
                    Some(nodes) => nodes,
                    None => {
                        return validation_error(format!(
                            "Workspace metadata num_nodes '{value}' is not a valid node count"
                        ));
                    }
                },
                None => 1,
            },
        };
        if nodes == 0 {
            return validation_error("Node count must be at least 1".to_string());
        }
        if nodes > queue.max_nodes {
            return validation_error(format!(
                "Queue '{}' allows at most {} nodes, {} requested",
                queue.name, queue.max_nodes, nodes
            ));
        }

        let walltime = spec
            .walltime
            .clone()
            .unwrap_or_else(|| queue.max_walltime.clone());
        let requested = parse_hms_time(&walltime)?;
        let queue_max = parse_hms_time(&queue.max_walltime)?;
        if requested > queue_max {
            return validation_error(format!(
                "Walltime {walltime} exceeds the maximum {} of queue '{}'",
                queue.max_walltime, queue.name
            ));
        }

        let filesystems = match &spec.filesystems {
            Some(filesystems) => {
                self.validate_filesystems(filesystems)?;
                Some(filesystems.clone())
            }
            None if !queue.filesystems.is_empty() => Some(queue.filesystems.join(":")),
            None => None,
        };

        let mut resources = BTreeMap::new();
        resources.insert("select".to_string(), nodes.to_string());
        resources.insert("place".to_string(), queue.default_place.clone());
        // canonical zero-padded form, independent of how the caller wrote it
        resources.insert("walltime".to_string(), format_hms_duration(&requested));
        if let Some(filesystems) = filesystems {
            resources.insert("filesystems".to_string(), filesystems);
        }
        resources.extend(spec.extra_resources.clone());

        let attrs = JobAttributes {
            job_name: spec
                .job_name
                .clone()
                .or_else(|| workspace.as_ref().map(|w| w.job_name.clone())),
            account: spec.account.clone(),
            resources,
        };

        let queue_name = queue.name.clone();
        let mut client = self.connect()?;
        let job_id = client
            .submit(&script_path, &queue_name, &attrs)
            .map_err(|error| self.scheduler_error(error))?;
        log::info!("Submitted job {job_id} to queue {queue_name}");

        let mut workspace_path = None;
        if let Some(workspace) = &workspace {
            let update = WorkspaceUpdate {
                status: Some(WorkspaceStatus::Submitted),
                job_id: Some(job_id.clone()),
                ..Default::default()
            };
            match self.workspaces.update(&workspace.workspace_id, update) {
                Ok(_) => workspace_path = Some(workspace.path.clone()),
                // the job is already running; report it even if the record
                // could not be written
                Err(error) => log::error!(
                    "Job {job_id} submitted but workspace {} could not be updated: {error}",
                    workspace.workspace_id
                ),
            }
        }

        Ok(SubmitResponse {
            job_id,
            queue: queue_name,
            cluster: self.cluster.name.clone(),
            workspace_id: spec.workspace_id,
            workspace_path,
        })
    }

    pub fn job_status(&self, job_id: &str) -> crate::Result<JobInfo> {
        validate_job_id(job_id)?;
        let mut client = self.connect()?;
        let jobs = client
            .stat_jobs(Some(job_id))
            .map_err(|error| self.scheduler_error(error))?;
        match jobs.into_iter().next() {
            Some(job) => Ok(job),
            None => not_found(format!("Job {job_id} not found")),
        }
    }

    /// Lists jobs known to the scheduler, optionally filtered by state code
    /// (`Q`, `R`, ...) and queue.
    pub fn list_jobs(
        &self,
        state: Option<&str>,
        queue: Option<&str>,
    ) -> crate::Result<JobListResponse> {
        let mut client = self.connect()?;
        let jobs: Vec<JobInfo> = client
            .stat_jobs(None)
            .map_err(|error| self.scheduler_error(error))?
            .into_iter()
            .filter(|job| {
                state.is_none_or(|state| job.attrs.get("job_state").is_some_and(|s| s == state))
            })
            .filter(|job| {
                queue.is_none_or(|queue| job.attrs.get("queue").is_some_and(|q| q == queue))
            })
            .collect();

        let mut summary: BTreeMap<String, usize> = BTreeMap::new();
        for job in &jobs {
            if let Some(state) = job.attrs.get("job_state") {
                *summary.entry(state.clone()).or_default() += 1;
            }
        }
        Ok(JobListResponse {
            total: jobs.len(),
            jobs,
            summary,
            cluster: self.cluster.name.clone(),
        })
    }

    pub fn hold_job(&self, job_id: &str) -> crate::Result<JobActionResponse> {
        self.job_action(job_id, "hold", |client| client.hold_job(job_id))
    }

    pub fn release_job(&self, job_id: &str) -> crate::Result<JobActionResponse> {
        self.job_action(job_id, "release", |client| client.release_job(job_id))
    }

    pub fn delete_job(&self, job_id: &str, force: bool) -> crate::Result<JobActionResponse> {
        self.job_action(job_id, "delete", |client| client.delete_job(job_id, force))
    }

    pub fn queue_info(&self, queue: Option<&str>) -> crate::Result<QueueInfoResponse> {
        let mut client = self.connect()?;
        let statuses = client
            .stat_queues(queue)
            .map_err(|error| self.scheduler_error(error))?;

        let mut queues = BTreeMap::new();
        for status in statuses {
            let attr = |key: &str| status.attrs.get(key).cloned();
            queues.insert(
                status.name.clone(),
                QueueDetails {
                    enabled: attr("enabled"),
                    started: attr("started"),
                    total_jobs: attr("total_jobs").unwrap_or_else(|| "0".to_string()),
                    max_walltime: attr("resources_max.walltime"),
                    max_nodes: attr("resources_max.nodect"),
                },
            );
        }
        if let Some(queue) = queue {
            if queues.is_empty() {
                return not_found(format!("Queue {queue} not found"));
            }
        }
        Ok(QueueInfoResponse {
            queues,
            cluster: self.cluster.name.clone(),
        })
    }

    fn job_action(
        &self,
        job_id: &str,
        action: &str,
        run: impl FnOnce(&mut dyn crate::pbs::SchedulerClient) -> anyhow::Result<()>,
    ) -> crate::Result<JobActionResponse> {
        validate_job_id(job_id)?;
        let mut client = self.connect()?;
        run(client.as_mut()).map_err(|error| self.scheduler_error(error))?;
        log::info!("Job {job_id}: {action}");
        Ok(JobActionResponse {
            job_id: job_id.to_string(),
            action: action.to_string(),
        })
    }

    fn connect(&self) -> crate::Result<Box<dyn crate::pbs::SchedulerClient>> {
        self.connector
            .connect()
            .map_err(|error| self.scheduler_error(error))
    }

    fn scheduler_error(&self, error: anyhow::Error) -> AurigaError {
        AurigaError::SchedulerConnectionError {
            server: self.cluster.pbs_server.clone(),
            cluster: self.cluster.display_name.clone(),
            message: format!("{error:#}"),
        }
    }

    fn resolve_queue(&self, requested: Option<&str>) -> crate::Result<&crate::cluster::QueueDefinition> {
        let name = match requested {
            Some(name) => name.to_string(),
            None => match self.cluster.default_queue() {
                Some(queue) => queue.name.clone(),
                None => "workq".to_string(),
            },
        };
        match self.cluster.queue(&name) {
            Some(queue) => Ok(queue),
            None => validation_error(format!(
                "Unknown queue '{}' on cluster '{}'. Available queues: {}",
                name,
                self.cluster.name,
                self.cluster.queue_names().join(", ")
            )),
        }
    }

    fn validate_filesystems(&self, filesystems: &str) -> crate::Result<()> {
        for label in filesystems.split(':') {
            if label.is_empty()
                || !label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return validation_error(format!(
                    "Invalid filesystems specification '{filesystems}'. Expected \
                     colon-separated labels, e.g. home:scratch"
                ));
            }
            if self.cluster.filesystem_path(label).is_none() {
                return validation_error(format!(
                    "Unknown filesystem '{}' on cluster '{}'. Known filesystems: {}",
                    label,
                    self.cluster.name,
                    self.cluster
                        .filesystems
                        .keys()
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
        }
        Ok(())
    }
}

fn validate_job_id(job_id: &str) -> crate::Result<()> {
    let sequence = job_id.split('.').next().unwrap_or("");
    if sequence.is_empty() || !sequence.chars().all(|c| c.is_ascii_digit()) {
        return validation_error(format!(
            "Invalid job id '{job_id}'. Expected <number> or <number>.<server>"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::rc::Rc;

    use tempfile::TempDir;

    use super::{validate_job_id, Gateway, SubmitSpec};
    use crate::cluster::{ClusterDefinition, QueueDefinition};
    use crate::common::error::AurigaError;
    use crate::pbs::client::{SchedulerClient, SchedulerConnector};
    use crate::pbs::messages::{JobAttributes, JobInfo, QueueStatus};
    use crate::workspace::{WorkspaceManager, WorkspaceStatus, WorkspaceUpdate};

    #[derive(Default)]
    struct Counters {
        submits: usize,
        connects: usize,
        last_attrs: Option<JobAttributes>,
    }

    struct CountingConnector {
        counters: Rc<RefCell<Counters>>,
    }

    struct CountingClient {
        counters: Rc<RefCell<Counters>>,
    }

    impl SchedulerConnector for CountingConnector {
        fn connect(&self) -> anyhow::Result<Box<dyn SchedulerClient>> {
            self.counters.borrow_mut().connects += 1;
            Ok(Box::new(CountingClient {
                counters: self.counters.clone(),
            }))
        }
    }

    impl SchedulerClient for CountingClient {
        fn submit(
            &mut self,
            _script_path: &Path,
            _queue: &str,
            attrs: &JobAttributes,
        ) -> anyhow::Result<String> {
            let mut counters = self.counters.borrow_mut();
            counters.submits += 1;
            counters.last_attrs = Some(attrs.clone());
            Ok("4242.pbs.test".to_string())
        }

        fn stat_jobs(&mut self, _job_id: Option<&str>) -> anyhow::Result<Vec<JobInfo>> {
            Ok(Vec::new())
        }

        fn stat_queues(&mut self, _queue: Option<&str>) -> anyhow::Result<Vec<QueueStatus>> {
            Ok(Vec::new())
        }

        fn delete_job(&mut self, _job_id: &str, _force: bool) -> anyhow::Result<()> {
            Ok(())
        }

        fn hold_job(&mut self, _job_id: &str) -> anyhow::Result<()> {
            Ok(())
        }

        fn release_job(&mut self, _job_id: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn test_cluster() -> ClusterDefinition {
        let mut cluster = ClusterDefinition {
            name: "testcluster".to_string(),
            display_name: "Test Cluster".to_string(),
            pbs_server: "pbs.test".to_string(),
            ..Default::default()
        };
        cluster
            .filesystems
            .insert("home".to_string(), "/home".to_string());
        cluster.queues.insert(
            "workq".to_string(),
            QueueDefinition {
                name: "workq".to_string(),
                max_walltime: "24:00:00".to_string(),
                max_nodes: 8,
                ..Default::default()
            },
        );
        cluster
    }

    struct Fixture {
        gateway: Gateway,
        workspaces: Rc<WorkspaceManager>,
        counters: Rc<RefCell<Counters>>,
        _dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::with_prefix("auriga").unwrap();
        let counters = Rc::new(RefCell::new(Counters::default()));
        let workspaces = Rc::new(WorkspaceManager::new(
            Some(dir.path().to_path_buf()),
            "testcluster",
        ));
        let gateway = Gateway::new(
            Rc::new(test_cluster()),
            Box::new(CountingConnector {
                counters: counters.clone(),
            }),
            workspaces.clone(),
        );
        Fixture {
            gateway,
            workspaces,
            counters,
            _dir: dir,
        }
    }

    fn script_in(workspaces: &WorkspaceManager, workspace_id: &str) -> std::path::PathBuf {
        let path = workspaces.get(workspace_id).unwrap().path.join("submit.sh");
        std::fs::write(&path, "#!/bin/bash\n").unwrap();
        workspaces
            .update(
                workspace_id,
                WorkspaceUpdate {
                    script_path: Some(path.clone()),
                    ..Default::default()
                },
            )
            .unwrap();
        path
    }

    fn valid_spec(workspace_id: &str) -> SubmitSpec {
        SubmitSpec {
            workspace_id: Some(workspace_id.to_string()),
            account: "OPEN-1-1".to_string(),
            walltime: Some("01:00:00".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn invalid_walltime_fails_before_connecting() {
        let f = fixture();
        let workspace = f.workspaces.create("job1", None).unwrap();
        script_in(&f.workspaces, &workspace.workspace_id);

        let mut spec = valid_spec(&workspace.workspace_id);
        spec.walltime = Some("25:99:99".to_string());
        let error = f.gateway.submit(spec).unwrap_err();
        assert!(matches!(error, AurigaError::ValidationError(_)));
        assert_eq!(f.counters.borrow().connects, 0);
        assert_eq!(f.counters.borrow().submits, 0);
    }

    #[test]
    fn unknown_queue_lists_available_queues() {
        let f = fixture();
        let workspace = f.workspaces.create("job1", None).unwrap();
        script_in(&f.workspaces, &workspace.workspace_id);

        let mut spec = valid_spec(&workspace.workspace_id);
        spec.queue = Some("gpuq".to_string());
        let error = f.gateway.submit(spec).unwrap_err();
        assert!(error.to_string().contains("workq"));
        assert_eq!(f.counters.borrow().submits, 0);
    }

    #[test]
    fn missing_account_mentions_environment_variable() {
        let f = fixture();
        let workspace = f.workspaces.create("job1", None).unwrap();
        script_in(&f.workspaces, &workspace.workspace_id);

        let mut spec = valid_spec(&workspace.workspace_id);
        spec.account = String::new();
        let error = f.gateway.submit(spec).unwrap_err();
        assert!(error.to_string().contains("PBS_ACCOUNT"));
    }

    #[test]
    fn node_count_is_capped_by_queue() {
        let f = fixture();
        let workspace = f.workspaces.create("job1", None).unwrap();
        script_in(&f.workspaces, &workspace.workspace_id);

        let mut spec = valid_spec(&workspace.workspace_id);
        spec.nodes = Some(16);
        let error = f.gateway.submit(spec).unwrap_err();
        assert!(error.to_string().contains("at most 8"));
    }

    #[test]
    fn unknown_filesystem_is_rejected() {
        let f = fixture();
        let workspace = f.workspaces.create("job1", None).unwrap();
        script_in(&f.workspaces, &workspace.workspace_id);

        let mut spec = valid_spec(&workspace.workspace_id);
        spec.filesystems = Some("home:flare".to_string());
        let error = f.gateway.submit(spec).unwrap_err();
        assert!(error.to_string().contains("flare"));
    }

    #[test]
    fn submit_links_workspace_to_job() {
        let f = fixture();
        let workspace = f.workspaces.create("job1", None).unwrap();
        script_in(&f.workspaces, &workspace.workspace_id);

        let response = f.gateway.submit(valid_spec(&workspace.workspace_id)).unwrap();
        assert_eq!(response.job_id, "4242.pbs.test");
        assert_eq!(response.queue, "workq");
        assert_eq!(f.counters.borrow().submits, 1);

        let workspace = f.workspaces.get(&workspace.workspace_id).unwrap();
        assert_eq!(workspace.status, WorkspaceStatus::Submitted);
        assert_eq!(workspace.job_id.as_deref(), Some("4242.pbs.test"));
    }

    #[test]
    fn missing_workspace_is_not_found() {
        let f = fixture();
        let error = f.gateway.submit(valid_spec("deadbeef0000")).unwrap_err();
        assert!(matches!(error, AurigaError::NotFoundError(_)));
    }

    #[test]
    fn workspace_nodes_metadata_is_used() {
        let f = fixture();
        let mut metadata = BTreeMap::new();
        metadata.insert("num_nodes".to_string(), serde_json::json!(16));
        let workspace = f.workspaces.create("job1", Some(metadata)).unwrap();
        script_in(&f.workspaces, &workspace.workspace_id);

        // 16 nodes from the workspace exceed workq's maximum of 8
        let error = f.gateway.submit(valid_spec(&workspace.workspace_id)).unwrap_err();
        assert!(matches!(error, AurigaError::ValidationError(_)));
    }

    #[test]
    fn wrapped_node_count_metadata_is_rejected() {
        let f = fixture();
        let mut metadata = BTreeMap::new();
        // Would pass the max_nodes check if truncated to u32
        metadata.insert(
            "num_nodes".to_string(),
            serde_json::json!(u64::from(u32::MAX) + 2),
        );
        let workspace = f.workspaces.create("job1", Some(metadata)).unwrap();
        script_in(&f.workspaces, &workspace.workspace_id);

        let error = f.gateway.submit(valid_spec(&workspace.workspace_id)).unwrap_err();
        assert!(matches!(error, AurigaError::ValidationError(_)));
        assert_eq!(f.counters.borrow().submits, 0);
    }

    #[test]
    fn walltime_reaches_the_scheduler_in_canonical_form() {
        let f = fixture();
        let workspace = f.workspaces.create("job1", None).unwrap();
        script_in(&f.workspaces, &workspace.workspace_id);

        let mut spec = valid_spec(&workspace.workspace_id);
        spec.walltime = Some("010:05:02".to_string());
        f.gateway.submit(spec).unwrap();

        let counters = f.counters.borrow();
        let attrs = counters.last_attrs.as_ref().unwrap();
        assert_eq!(attrs.resources["walltime"], "10:05:02");
    }

    #[test]
    fn job_id_shape_is_validated() {
        assert!(validate_job_id("123").is_ok());
        assert!(validate_job_id("123.pbs.test").is_ok());
        assert!(validate_job_id("abc.pbs.test").is_err());
        assert!(validate_job_id("").is_err());
        assert!(validate_job_id(".pbs.test").is_err());
    }
}
