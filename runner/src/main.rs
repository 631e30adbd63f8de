//! Headless graph runner
//!
//! Loads a persisted graph, steps it at a fixed interval and prints (or
//! writes) the graph as it stands afterwards.
//!
//! ```text
//! graph-runner <graph.json> [--config runner.json] [--steps N]
//!              [--interval-ms N] [--output out.json] [--save-config]
//! ```

mod config;
mod constants;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use config::{ConfigError, RunnerConfig};
use constants::paths::CONFIG_FILE;
use graph_engine::{validate_graph, Graph, GraphError, Runtime};
use serde_json::Value;
use tokio::fs;

/// Load a persisted graph, step it and print the result
#[derive(Debug, Clone, PartialEq, Parser)]
#[command(name = "graph-runner", version, about, long_about = None)]
struct Args {
    /// Persisted graph JSON file
    graph: PathBuf,

    /// Runner config file; missing means defaults
    #[arg(long, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Steps to run, overriding the config
    #[arg(long)]
    steps: Option<usize>,

    /// Milliseconds between steps, overriding the config
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Write the graph here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the effective config back to the config file
    #[arg(long, default_value_t = false)]
    save_config: bool,
}

/// Runner errors
#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to read graph {path:?}: {source}")]
    ReadGraph { path: PathBuf, source: std::io::Error },
    #[error("Failed to parse graph: {0}")]
    ParseGraph(serde_json::Error),
    #[error("Failed to serialize graph: {0}")]
    SerializeGraph(serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

async fn load_graph(path: &Path, runtime: Arc<Runtime>) -> Result<Graph, RunError> {
    let contents = fs::read_to_string(path).await.map_err(|source| RunError::ReadGraph {
        path: path.to_path_buf(),
        source,
    })?;
    let data: Value = serde_json::from_str(&contents).map_err(RunError::ParseGraph)?;

    let mut graph = Graph::new(runtime);
    if graph.configure(&data, false)? {
        log::warn!("Graph {:?} loaded with recovered errors", path);
    }
    for problem in validate_graph(&graph) {
        log::warn!("{}", problem);
    }
    log::info!(
        "Loaded graph {:?}: {} nodes, {} links",
        path,
        graph.node_count(),
        graph.link_count()
    );
    Ok(graph)
}

/// Load, step and serialize a graph
async fn run(args: &Args) -> Result<Value, RunError> {
    let mut config = RunnerConfig::load(&args.config).await?;
    if let Some(steps) = args.steps {
        config.step.steps = steps;
    }
    if let Some(interval_ms) = args.interval_ms {
        config.step.interval_ms = interval_ms;
    }
    if args.save_config {
        config.save(&args.config).await?;
    }

    let runtime = Runtime::with_registry(config.runtime.clone(), graph_nodes::registry());
    let mut graph = load_graph(&args.graph, runtime).await?;

    let mut ticker = tokio::time::interval(Duration::from_millis(config.step.interval_ms.max(1)));
    for _ in 0..config.step.steps {
        tokio::select! {
            _ = ticker.tick() => graph.run_step(1, config.step.node_limit)?,
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted after {} steps", graph.iteration());
                break;
            }
        }
    }
    log::info!("Ran {} steps", graph.iteration());

    Ok(graph.serialize())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();

    let result = match run(&args).await {
        Ok(data) => write_output(&args, &data).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn write_output(args: &Args, data: &Value) -> Result<(), RunError> {
    let text = serde_json::to_string_pretty(data).map_err(RunError::SerializeGraph)?;
    match &args.output {
        Some(path) => {
            fs::write(path, text).await?;
            log::info!("Graph written to {:?}", path);
        }
        None => println!("{}", text),
    }
    Ok(())
}
