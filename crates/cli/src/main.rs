//! `skillflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`     — start the scheduler and the HTTP API.
//! - `run`       — run one workflow now and print its result.
//! - `validate`  — check every workflow in the configuration.
//! - `next-runs` — preview the firing times of a cron expression.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::{AppConfig, FileSource};
use engine::{validate_workflow, SkillExecutor};
use scheduler::{next_runs, validate_schedule, WorkflowService};

#[derive(Parser)]
#[command(
    name = "skillflow",
    about = "Scheduled skill workflows over pluggable capabilities",
    version
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, global = true, env = "SKILLFLOW_CONFIG", default_value = "skillflow.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the scheduler and the REST API server.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
    },
    /// Run a workflow once, bypassing its schedule.
    Run {
        /// Workflow id.
        id: String,
        /// Input value as `name=value`; repeatable.
        #[arg(long = "input", value_name = "NAME=VALUE")]
        input: Vec<String>,
        /// All inputs as one JSON object.
        #[arg(long, conflicts_with = "input")]
        inputs: Option<String>,
    },
    /// Validate the workflows and schedules in the configuration.
    Validate,
    /// Print the next firing times of a cron expression.
    NextRuns {
        expr: String,
        /// IANA timezone; defaults to Asia/Shanghai.
        #[arg(long)]
        tz: Option<String>,
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind } => serve(&cli.config, &bind).await,
        Command::Run { id, input, inputs } => run(&cli.config, &id, &input, inputs.as_deref()).await,
        Command::Validate => validate(&cli.config),
        Command::NextRuns { expr, tz, count } => {
            for time in next_runs(&expr, tz.as_deref(), count)? {
                println!("{}", time.to_rfc3339());
            }
            Ok(())
        }
    }
}

fn build_service(path: &std::path::Path) -> Result<Arc<WorkflowService>> {
    let config = AppConfig::load(path)?;
    let executor = SkillExecutor::new(Arc::new(config.build_registry()), config.executor_config());
    let source = Arc::new(FileSource::new(path));
    Ok(Arc::new(WorkflowService::new(source, executor, config.service_settings()?)))
}

async fn serve(path: &std::path::Path, bind: &str) -> Result<()> {
    let service = build_service(path)?;
    let scheduled = service.start()?;
    info!(
        "loaded {} workflows, {} scheduled",
        service.workflows().len(),
        scheduled
    );

    let app = api::router(api::AppState::new(Arc::clone(&service)));
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("cannot bind {bind}"))?;
    info!("Starting API server on {bind}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    service.shutdown();
    info!("server stopped");
    Ok(())
}

async fn run(path: &std::path::Path, id: &str, pairs: &[String], json: Option<&str>) -> Result<()> {
    let service = build_service(path)?;
    service.start()?;
    // Only the one manual run should execute.
    service.shutdown();

    let inputs = match json {
        Some(raw) => Some(serde_json::from_str::<Map<String, Value>>(raw).context("--inputs must be a JSON object")?),
        None if pairs.is_empty() => None,
        None => Some(parse_pairs(pairs)?),
    };

    let result = service.run_now(id, inputs).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

/// `name=value` pairs; values that parse as JSON keep their type.
fn parse_pairs(pairs: &[String]) -> Result<Map<String, Value>> {
    pairs
        .iter()
        .map(|pair| {
            let Some((name, raw)) = pair.split_once('=') else {
                bail!("input '{pair}' is not in NAME=VALUE form");
            };
            let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()));
            Ok((name.trim().to_owned(), value))
        })
        .collect()
}

fn validate(path: &std::path::Path) -> Result<()> {
    let config = AppConfig::load(path)?;
    config.service_settings()?;

    let mut failures = 0;
    for workflow in &config.workflows {
        let outcome = validate_workflow(workflow)
            .map_err(|e| e.to_string())
            .and_then(|warnings| {
                validate_schedule(workflow).map_err(|e| e.to_string())?;
                Ok(warnings)
            });
        match outcome {
            Ok(warnings) => {
                println!("ok      {}", workflow.id);
                for warning in warnings {
                    println!("  warn  {warning}");
                }
            }
            Err(e) => {
                failures += 1;
                eprintln!("invalid {}: {e}", workflow.id);
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} workflows failed validation", config.workflows.len());
    }
    println!("{} workflows valid", config.workflows.len());
    Ok(())
}
