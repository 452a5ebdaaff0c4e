use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error};

use stagehand::changes::{resolve_filtered, ChangeSet, PropagationMode};
use stagehand::cli::{Cli, Commands};
use stagehand::config::RunConfig;
use stagehand::exec::{CancellationSource, Executor};
use stagehand::providers::{
    load_task_file, ChangeProvider, GitChangeProvider, ManifestProvider, StaticChangeProvider,
    YamlManifestProvider,
};
use stagehand::report;
use stagehand::subprocess::SubprocessManager;
use stagehand::task::{match_steps, plan};
use stagehand::workspace::WorkspaceGraph;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(cli.verbose >= 2)
        .init();

    debug!("stagehand started with verbosity level: {}", cli.verbose);

    match dispatch(cli).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Fatal error: {:#}", e);
            eprintln!("Error: {e:#}");
            std::process::exit(2);
        }
    }
}

async fn dispatch(cli: Cli) -> Result<i32> {
    let graph = load_graph(&cli.root, &cli.manifest).await?;

    match cli.command {
        Commands::Run {
            event,
            tasks,
            base_ref,
            changed_files,
            max_parallel,
            production_only,
            json,
        } => {
            run_event(
                &cli.root,
                graph,
                &event,
                &tasks,
                &base_ref,
                changed_files,
                max_parallel,
                production_only,
                json,
            )
            .await
        }
        Commands::Affected {
            base_ref,
            changed_files,
            mode,
        } => {
            let mode = parse_mode(&mode)?;
            let changes = load_changes(&cli.root, &base_ref, changed_files).await?;
            let affected = resolve_filtered(&changes, &graph, mode, true);
            for name in &affected {
                println!("{name}");
            }
            Ok(0)
        }
        Commands::Graph => {
            for workspace in graph.registry().iter() {
                if workspace.dependencies.is_empty() && workspace.dev_dependencies.is_empty() {
                    println!("{} ({})", workspace.name, workspace.path);
                } else {
                    let mut deps = workspace.dependencies.clone();
                    deps.extend(
                        workspace
                            .dev_dependencies
                            .iter()
                            .map(|d| format!("{d} (dev)")),
                    );
                    println!("{} ({}) -> {}", workspace.name, workspace.path, deps.join(", "));
                }
            }
            Ok(0)
        }
    }
}

async fn load_graph(root: &PathBuf, manifest: &PathBuf) -> Result<WorkspaceGraph> {
    let manifest_path = if manifest.is_absolute() {
        manifest.clone()
    } else {
        root.join(manifest)
    };
    let provider = YamlManifestProvider::new(manifest_path);
    let workspaces = provider.load().await?;
    WorkspaceGraph::from_manifests(workspaces).map_err(Into::into)
}

async fn load_changes(
    root: &PathBuf,
    base_ref: &str,
    changed_files: Vec<String>,
) -> Result<ChangeSet> {
    let files = if changed_files.is_empty() {
        GitChangeProvider::new(SubprocessManager::production(), root.clone(), base_ref)
            .changed_files()
            .await?
    } else {
        StaticChangeProvider::new(changed_files).changed_files().await?
    };
    Ok(ChangeSet::new(files))
}

#[allow(clippy::too_many_arguments)]
async fn run_event(
    root: &PathBuf,
    graph: WorkspaceGraph,
    event: &str,
    tasks: &PathBuf,
    base_ref: &str,
    changed_files: Vec<String>,
    max_parallel: Option<usize>,
    production_only: bool,
    json: bool,
) -> Result<i32> {
    let tasks_path = if tasks.is_absolute() {
        tasks.clone()
    } else {
        root.join(tasks)
    };
    let mut declarations = load_task_file(&tasks_path)?;
    let declaration = declarations
        .remove(event)
        .ok_or_else(|| anyhow!("no tasks declared for lifecycle event '{event}'"))?;

    let mut config = RunConfig::new(root.clone()).with_include_dev(!production_only);
    if let Some(max_parallel) = max_parallel {
        config = config.with_max_parallel(max_parallel);
    }

    let changes = load_changes(root, base_ref, changed_files).await?;
    let affected = resolve_filtered(
        &changes,
        &graph,
        PropagationMode::Dependents,
        config.include_dev,
    );

    debug!(
        "{} changed files resolved to {} affected workspaces",
        changes.len(),
        affected.len()
    );

    let matched = match_steps(&declaration, &affected, &changes, &graph, &config)?;

    let plan = plan(&declaration, matched, &graph, &config)
        .with_context(|| format!("failed to plan lifecycle event '{event}'"))?;

    let executor = Executor::new(SubprocessManager::production().runner(), config);

    let source = CancellationSource::new();
    let token = source.token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            source.cancel();
        }
    });

    let result = executor.execute_with_cancellation(&plan, token).await;

    if json {
        println!("{}", report::render_json(&result)?);
    } else {
        print!("{}", report::render(&result));
    }

    Ok(result.exit_code())
}

fn parse_mode(mode: &str) -> Result<PropagationMode> {
    match mode {
        "dependents" => Ok(PropagationMode::Dependents),
        "dependencies" => Ok(PropagationMode::Dependencies),
        "none" => Ok(PropagationMode::None),
        other => Err(anyhow!(
            "unknown propagation mode '{other}' (expected dependents, dependencies, or none)"
        )),
    }
}
