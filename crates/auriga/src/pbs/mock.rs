use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use chrono::Utc;

use crate::cluster::ClusterDefinition;
use crate::pbs::client::{SchedulerClient, SchedulerConnector};
use crate::pbs::messages::{JobAttributes, JobInfo, QueueStatus};

/// In-memory stand-in for a PBS installation.
///
/// Behaves like the real connector from the gateway's point of view: jobs get
/// ids in the `<number>.<server>` format, appear in stats, and react to hold,
/// release and delete. State is shared between all clients handed out by one
/// connector, so jobs submitted in one operation are visible in the next.
pub struct MockConnector {
    server: String,
    queues: Vec<QueueStatus>,
    state: Rc<RefCell<MockState>>,
}

struct MockState {
    jobs: BTreeMap<String, JobInfo>,
    job_counter: u64,
}

impl MockConnector {
    pub fn new(cluster: &ClusterDefinition) -> Self {
        let queues = cluster
            .queues
            .values()
            .map(|queue| {
                let mut attrs = BTreeMap::new();
                attrs.insert("queue_type".to_string(), "Execution".to_string());
                attrs.insert("enabled".to_string(), "True".to_string());
                attrs.insert("started".to_string(), "True".to_string());
                attrs.insert("total_jobs".to_string(), "0".to_string());
                attrs.insert(
                    "resources_max.walltime".to_string(),
                    queue.max_walltime.clone(),
                );
                attrs.insert(
                    "resources_max.nodect".to_string(),
                    queue.max_nodes.to_string(),
                );
                QueueStatus {
                    name: queue.name.clone(),
                    attrs,
                }
            })
            .collect();
        Self {
            server: cluster.pbs_server.clone(),
            queues,
            state: Rc::new(RefCell::new(MockState {
                jobs: BTreeMap::new(),
                job_counter: 1000,
            })),
        }
    }
}

impl SchedulerConnector for MockConnector {
    fn connect(&self) -> anyhow::Result<Box<dyn SchedulerClient>> {
        Ok(Box::new(MockClient {
            server: self.server.clone(),
            queues: self.queues.clone(),
            state: self.state.clone(),
        }))
    }
}

struct MockClient {
    server: String,
    queues: Vec<QueueStatus>,
    state: Rc<RefCell<MockState>>,
}

impl SchedulerClient for MockClient {
    fn submit(
        &mut self,
        script_path: &Path,
        queue: &str,
        attrs: &JobAttributes,
    ) -> anyhow::Result<String> {
        let mut state = self.state.borrow_mut();
        state.job_counter += 1;
        let job_id = format!("{}.{}", state.job_counter, self.server);

        let mut job_attrs = BTreeMap::new();
        job_attrs.insert(
            "Job_Name".to_string(),
            attrs
                .job_name
                .clone()
                .unwrap_or_else(|| "mock-job".to_string()),
        );
        job_attrs.insert("job_state".to_string(), "Q".to_string());
        job_attrs.insert("queue".to_string(), queue.to_string());
        job_attrs.insert("ctime".to_string(), Utc::now().to_rfc3339());
        job_attrs.insert("Job_Owner".to_string(), "mockuser@localhost".to_string());
        job_attrs.insert("Account_Name".to_string(), attrs.account.clone());
        job_attrs.insert(
            "Submit_arguments".to_string(),
            script_path.display().to_string(),
        );
        for (resource, value) in &attrs.resources {
            job_attrs.insert(format!("Resource_List.{resource}"), value.clone());
        }

        log::debug!("Mock submit assigned job id {job_id}");
        state.jobs.insert(
            job_id.clone(),
            JobInfo {
                id: job_id.clone(),
                attrs: job_attrs,
            },
        );
        Ok(job_id)
    }

    fn stat_jobs(&mut self, job_id: Option<&str>) -> anyhow::Result<Vec<JobInfo>> {
        let state = self.state.borrow();
        match job_id {
            Some(job_id) => Ok(state.jobs.get(job_id).cloned().into_iter().collect()),
            None => Ok(state.jobs.values().cloned().collect()),
        }
    }

    fn stat_queues(&mut self, queue: Option<&str>) -> anyhow::Result<Vec<QueueStatus>> {
        Ok(self
            .queues
            .iter()
            .filter(|status| queue.is_none_or(|name| status.name == name))
            .cloned()
            .collect())
    }

    fn delete_job(&mut self, job_id: &str, _force: bool) -> anyhow::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.jobs.remove(job_id).is_none() {
            anyhow::bail!("qdel: Unknown Job Id {job_id}");
        }
        Ok(())
    }

    fn hold_job(&mut self, job_id: &str) -> anyhow::Result<()> {
        self.set_state(job_id, "H", "qhold")
    }

    fn release_job(&mut self, job_id: &str) -> anyhow::Result<()> {
        self.set_state(job_id, "Q", "qrls")
    }
}

impl MockClient {
    fn set_state(&mut self, job_id: &str, state_code: &str, program: &str) -> anyhow::Result<()> {
        let mut state = self.state.borrow_mut();
        match state.jobs.get_mut(job_id) {
            Some(job) => {
                job.attrs
                    .insert("job_state".to_string(), state_code.to_string());
                Ok(())
            }
            None => anyhow::bail!("{program}: Unknown Job Id {job_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::MockConnector;
    use crate::cluster::ClusterDefinition;
    use crate::pbs::SchedulerConnector;
    use crate::pbs::messages::JobAttributes;

    fn test_cluster() -> ClusterDefinition {
        let mut cluster = ClusterDefinition {
            name: "testcluster".to_string(),
            pbs_server: "pbs.test".to_string(),
            ..Default::default()
        };
        cluster.queues.insert(
            "workq".to_string(),
            crate::cluster::QueueDefinition {
                name: "workq".to_string(),
                max_walltime: "24:00:00".to_string(),
                max_nodes: 10,
                ..Default::default()
            },
        );
        cluster
    }

    #[test]
    fn jobs_persist_across_connects() {
        let connector = MockConnector::new(&test_cluster());
        let attrs = JobAttributes {
            job_name: Some("hello".to_string()),
            account: "OPEN-1-1".to_string(),
            resources: Default::default(),
        };

        let job_id = {
            let mut client = connector.connect().unwrap();
            client
                .submit(Path::new("/tmp/submit.sh"), "workq", &attrs)
                .unwrap()
        };
        assert_eq!(job_id, "1001.pbs.test");

        let mut client = connector.connect().unwrap();
        let jobs = client.stat_jobs(Some(&job_id)).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].attrs["job_state"], "Q");
        assert_eq!(jobs[0].attrs["queue"], "workq");
    }

    #[test]
    fn hold_release_delete_cycle() {
        let connector = MockConnector::new(&test_cluster());
        let mut client = connector.connect().unwrap();
        let job_id = client
            .submit(Path::new("/tmp/submit.sh"), "workq", &JobAttributes::default())
            .unwrap();

        client.hold_job(&job_id).unwrap();
        assert_eq!(
            client.stat_jobs(Some(&job_id)).unwrap()[0].attrs["job_state"],
            "H"
        );

        client.release_job(&job_id).unwrap();
        assert_eq!(
            client.stat_jobs(Some(&job_id)).unwrap()[0].attrs["job_state"],
            "Q"
        );

        client.delete_job(&job_id, false).unwrap();
        assert!(client.stat_jobs(Some(&job_id)).unwrap().is_empty());
        assert!(client.delete_job(&job_id, false).is_err());
    }

    #[test]
    fn queue_stats_reflect_cluster_definition() {
        let connector = MockConnector::new(&test_cluster());
        let mut client = connector.connect().unwrap();
        let queues = client.stat_queues(None).unwrap();
        assert_eq!(queues.len(), 1);
        assert_eq!(queues[0].name, "workq");
        assert_eq!(queues[0].attrs["resources_max.walltime"], "24:00:00");
        assert!(client.stat_queues(Some("missing")).unwrap().is_empty());
    }
}
