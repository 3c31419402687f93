use std::path::PathBuf;
use std::rc::Rc;

use crate::apps::Registry;
use crate::cluster::{ClusterDefinition, ClusterStore};
use crate::pbs::{Gateway, MockConnector, PbsConnector};
use crate::server::config::{resolve_cluster, resolve_config_dir, ServerConfig};
use crate::workspace::WorkspaceManager;

/// Startup overrides, usually taken straight from the command line.
#[derive(Debug, Default)]
pub struct ContextOptions {
    pub cluster: Option<String>,
    pub config_dir: Option<PathBuf>,
    pub workspace_dir: Option<PathBuf>,
    pub mock: bool,
}

/// Everything a request handler needs, wired up once at startup.
///
/// All collaborators are held here explicitly; no global state anywhere, so
/// tests can assemble a context against temporary directories.
pub struct ServerContext {
    pub config_dir: PathBuf,
    pub server_config: ServerConfig,
    pub store: ClusterStore,
    pub cluster: Rc<ClusterDefinition>,
    pub workspaces: Rc<WorkspaceManager>,
    pub registry: Registry,
    pub gateway: Gateway,
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("config_dir", &self.config_dir)
            .field("server_config", &self.server_config)
            .field("cluster", &self.cluster)
            .finish_non_exhaustive()
    }
}

impl ServerContext {
    pub fn initialize(options: ContextOptions) -> crate::Result<ServerContext> {
        let config_dir = resolve_config_dir(options.config_dir);
        let server_config = ServerConfig::load(&config_dir)?;
        let store = ClusterStore::new(&config_dir);

        let cluster_name = resolve_cluster(options.cluster.as_deref(), &server_config, &store)?;
        let cluster = store.load(&cluster_name)?;
        log::info!(
            "Active cluster: {} (available: {})",
            cluster.name,
            store.discover().join(", ")
        );

        let workspace_dir = options
            .workspace_dir
            .or_else(|| server_config.workspace.base_path.clone());
        let workspaces = Rc::new(WorkspaceManager::new(workspace_dir, &cluster.name));

        let mock = options.mock || crate::pbs::is_mock_mode();
        let connector: Box<dyn crate::pbs::SchedulerConnector> = if mock {
            log::warn!("Mock PBS mode enabled, no jobs will reach a real scheduler");
            Box::new(MockConnector::new(&cluster))
        } else {
            Box::new(PbsConnector::new(&cluster.pbs_server))
        };
        let gateway = Gateway::new(cluster.clone(), connector, workspaces.clone());

        Ok(ServerContext {
            config_dir,
            server_config,
            store,
            cluster,
            workspaces,
            registry: Registry::builtin(),
            gateway,
        })
    }
}
