use std::collections::BTreeMap;

use anyhow::bail;
use clap::Parser;
use serde::Serialize;

use auriga::apps::{generate_into_workspace, ScriptSpec};
use auriga::common::cli::{
    AppCommand, ClusterCommand, JobCommand, QueueCommand, RootOptions, ScriptOpts, SubCommand,
    SubmitOpts, WorkspaceCommand,
};
use auriga::common::env::PBS_ACCOUNT;
use auriga::common::setup::setup_logging;
use auriga::pbs::SubmitSpec;
use auriga::server::bootstrap::{ContextOptions, ServerContext};
use auriga::server::config::{resolve_config_dir, ServerConfig};
use auriga::workspace::{CleanupOutcome, WorkspaceUpdate};

fn main() {
    let options = RootOptions::parse();

    // Logging must come up before the context does, so configuration errors
    // during startup are reported through it. Config load errors here are
    // ignored; initialization will report them properly.
    let config_dir = resolve_config_dir(options.common.config_dir.clone());
    let config_log_level = ServerConfig::load(&config_dir)
        .unwrap_or_default()
        .log_level;
    setup_logging(options.common.verbose, config_log_level.as_deref());

    if let Err(error) = run(options) {
        eprintln!("Error: {error:?}");
        std::process::exit(1);
    }
}

fn run(options: RootOptions) -> anyhow::Result<()> {
    let context = ServerContext::initialize(ContextOptions {
        cluster: options.common.cluster,
        config_dir: options.common.config_dir,
        workspace_dir: options.common.workspace_dir,
        mock: options.common.mock,
    })?;

    match options.subcmd {
        SubCommand::Submit(opts) => submit(&context, opts),
        SubCommand::Job { subcmd } => job(&context, subcmd),
        SubCommand::Queue {
            subcmd: QueueCommand::Info { queue },
        } => print_json(&context.gateway.queue_info(queue.as_deref())?),
        SubCommand::Cluster { subcmd } => cluster(&context, subcmd),
        SubCommand::Workspace { subcmd } => workspace(&context, subcmd),
        SubCommand::Script(opts) => script(&context, opts),
        SubCommand::App {
            subcmd: AppCommand::List,
        } => applications(&context),
    }
}

fn applications(context: &ServerContext) -> anyhow::Result<()> {
    #[derive(Serialize)]
    struct AppEntry {
        name: &'static str,
        description: &'static str,
        has_settings: bool,
    }
    let available = context
        .registry
        .available_for(&context.cluster, &context.store);
    let entries: Vec<AppEntry> = available
        .into_iter()
        .filter_map(|(name, settings)| {
            context.registry.get(name).map(|app| AppEntry {
                name,
                description: app.description(),
                has_settings: !settings.is_empty(),
            })
        })
        .collect();
    print_json(&entries)
}

fn submit(context: &ServerContext, opts: SubmitOpts) -> anyhow::Result<()> {
    let response = context.gateway.submit(SubmitSpec {
        script_path: opts.script,
        workspace_id: opts.workspace,
        queue: opts.queue,
        job_name: opts.name,
        account: opts.account,
        nodes: opts.nodes,
        walltime: opts.walltime,
        filesystems: opts.filesystems,
        extra_resources: opts.resources.into_iter().collect(),
    })?;
    print_json(&response)
}

fn job(context: &ServerContext, subcmd: JobCommand) -> anyhow::Result<()> {
    match subcmd {
        JobCommand::Status { job_id } => print_json(&context.gateway.job_status(&job_id)?),
        JobCommand::List { state, queue } => {
            print_json(&context.gateway.list_jobs(state.as_deref(), queue.as_deref())?)
        }
        JobCommand::Hold { job_id } => print_json(&context.gateway.hold_job(&job_id)?),
        JobCommand::Release { job_id } => print_json(&context.gateway.release_job(&job_id)?),
        JobCommand::Delete { job_id, force } => {
            print_json(&context.gateway.delete_job(&job_id, force)?)
        }
    }
}

fn cluster(context: &ServerContext, subcmd: ClusterCommand) -> anyhow::Result<()> {
    match subcmd {
        ClusterCommand::List => {
            #[derive(Serialize)]
            struct ClusterList {
                active: String,
                available: Vec<String>,
            }
            print_json(&ClusterList {
                active: context.cluster.name.clone(),
                available: context.store.discover(),
            })
        }
        ClusterCommand::Info { name } => {
            let definition = match name {
                Some(name) => context.store.load(&name)?,
                None => context.cluster.clone(),
            };
            print_json(definition.as_ref())
        }
    }
}

fn workspace(context: &ServerContext, subcmd: WorkspaceCommand) -> anyhow::Result<()> {
    match subcmd {
        WorkspaceCommand::Create { job_name, nodes } => {
            let mut metadata = BTreeMap::new();
            if let Some(nodes) = nodes {
                metadata.insert("num_nodes".to_string(), serde_json::json!(nodes));
            }
            print_json(&context.workspaces.create(&job_name, Some(metadata))?)
        }
        WorkspaceCommand::List { status, limit } => {
            print_json(&context.workspaces.list(status, limit))
        }
        WorkspaceCommand::Info { workspace_id } => match context.workspaces.get(&workspace_id) {
            Some(workspace) => print_json(&workspace),
            None => bail!("Workspace {workspace_id} not found"),
        },
        WorkspaceCommand::Files { workspace_id } => {
            print_json(&context.workspaces.list_files(&workspace_id)?)
        }
        WorkspaceCommand::Read {
            workspace_id,
            path,
            max_bytes,
        } => {
            let file = context.workspaces.read_file(&workspace_id, &path, max_bytes)?;
            print!("{}", file.content);
            Ok(())
        }
        WorkspaceCommand::Cleanup {
            workspace_id,
            force,
            older_than_days,
        } => {
            if let Some(days) = older_than_days {
                let removed = context.workspaces.cleanup_old(days)?;
                println!("Removed {removed} workspaces older than {days} days");
                return Ok(());
            }
            let Some(workspace_id) = workspace_id else {
                bail!("Pass a workspace id or --older-than-days");
            };
            match context.workspaces.cleanup(&workspace_id, force)? {
                CleanupOutcome::Removed => println!("Removed workspace {workspace_id}"),
                CleanupOutcome::NotFound => bail!("Workspace {workspace_id} not found"),
                CleanupOutcome::Refused(status) => bail!(
                    "Workspace {workspace_id} is {status}; pass --force to remove it anyway"
                ),
            }
            Ok(())
        }
        WorkspaceCommand::Finish {
            workspace_id,
            status,
        } => {
            if !status.is_terminal() {
                bail!("finish accepts only terminal statuses (completed, failed)");
            }
            let updated = context.workspaces.update(
                &workspace_id,
                WorkspaceUpdate {
                    status: Some(status),
                    ..Default::default()
                },
            )?;
            match updated {
                Some(workspace) => print_json(&workspace),
                None => bail!("Workspace {workspace_id} not found"),
            }
        }
    }
}

fn script(context: &ServerContext, opts: ScriptOpts) -> anyhow::Result<()> {
    if opts.account.is_empty() {
        bail!("No account/project given. Pass one explicitly or set {PBS_ACCOUNT}");
    }
    let Some(workspace) = context.workspaces.get(&opts.workspace) else {
        bail!("Workspace {} not found", opts.workspace);
    };

    let queue = match &opts.queue {
        Some(queue) => queue.clone(),
        None => match context.cluster.default_queue() {
            Some(queue) => queue.name.clone(),
            None => "workq".to_string(),
        },
    };
    let walltime = opts.walltime.clone().unwrap_or_else(|| {
        context
            .cluster
            .queue(&queue)
            .map(|q| q.max_walltime.clone())
            .unwrap_or_else(|| "01:00:00".to_string())
    });

    let spec = ScriptSpec {
        job_name: opts.name.unwrap_or(workspace.job_name),
        account: opts.account,
        queue,
        walltime,
        nodes: opts.nodes,
        ranks_per_node: opts.ranks_per_node,
        executable: opts.executable,
        args: opts.args,
    };
    let settings = context.store.app_settings(&opts.app, &context.cluster.name)?;
    let script_path = generate_into_workspace(
        &context.registry,
        &context.cluster,
        &context.workspaces,
        &workspace.workspace_id,
        &opts.app,
        &spec,
        &settings,
    )?;
    println!("{}", script_path.display());
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
