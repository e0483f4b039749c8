// src/lib.rs

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod pipeline;
pub mod plan;
pub mod planner;
pub mod prompt;
pub mod stage;
pub mod status;

use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::aggregate::{CommandSynthesizer, Synthesizer};
use crate::cli::CliArgs;
use crate::config::{default_config_path, load_and_validate, ConfigFile};
use crate::pipeline::{accept_plan, Pipeline, Request};
use crate::plan::Plan;
use crate::planner::{CommandPlanner, FilePlanner, Planner};
use crate::stage::ProcessorRegistry;
use crate::status::{StatusEvent, StatusStream};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the request (from `--query` or stdin)
/// - planner / processor registry / synthesizer
/// - a printer task that writes the status stream to stdout
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;

    let request = Request::new(read_query(&args).await?);
    let processors = ProcessorRegistry::from_config(&cfg, &request)?;
    let planner = select_planner(&args, &cfg)?;

    if args.dry_run {
        let text = planner.plan(&request).await?;
        let plan = accept_plan(&text, &processors)?;
        print_dry_run(&plan);
        return Ok(());
    }

    let synthesizer: Arc<dyn Synthesizer> = Arc::new(CommandSynthesizer::from_config(&cfg));
    let pipeline = Pipeline::new(planner, processors, synthesizer);

    let (mut stream, rx) = StatusStream::with_channel();
    let printer = spawn_printer(rx);

    let result = pipeline.run(&request, &mut stream).await;

    // Closing the stream lets the printer drain and exit.
    drop(stream);
    if let Err(e) = printer.await {
        warn!(error = %e, "status printer task failed");
    }

    let artifact = result?;
    info!(bytes = artifact.text.len(), "artifact delivered");
    Ok(())
}

fn select_planner(args: &CliArgs, cfg: &ConfigFile) -> Result<Arc<dyn Planner>> {
    if let Some(path) = &args.plan {
        return Ok(Arc::new(FilePlanner::new(path.clone())));
    }

    match &cfg.planner {
        Some(planner) => {
            let timeout = cfg.effective_timeout(planner.timeout.as_deref());
            Ok(Arc::new(CommandPlanner::from_config(planner, timeout)))
        }
        None => bail!("no [planner] section in the config and no --plan given"),
    }
}

async fn read_query(args: &CliArgs) -> Result<String> {
    if let Some(query) = &args.query {
        return Ok(query.clone());
    }

    if std::io::stdin().is_terminal() {
        bail!("no request given: pass --query or pipe it on stdin");
    }

    let mut query = String::new();
    tokio::io::stdin()
        .read_to_string(&mut query)
        .await
        .context("reading request from stdin")?;

    let query = query.trim().to_string();
    if query.is_empty() {
        bail!("request read from stdin is empty");
    }
    Ok(query)
}

/// Write each status event to stdout as one protocol line.
///
/// If stdout goes away the receiver is dropped, which detaches it from the
/// stream without affecting the run.
fn spawn_printer(mut rx: mpsc::UnboundedReceiver<StatusEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(event) = rx.recv().await {
            let line = format!("{event}\n");
            if let Err(e) = stdout.write_all(line.as_bytes()).await {
                warn!(error = %e, "stdout closed; no longer printing status");
                return;
            }
            if let Err(e) = stdout.flush().await {
                warn!(error = %e, "stdout closed; no longer printing status");
                return;
            }
        }
    })
}

/// Simple dry-run output: print the rounds the plan would run in.
fn print_dry_run(plan: &Plan) {
    println!("gatedag dry-run");
    println!("  tasks = {}", plan.len());
    let mut roots: Vec<&str> = plan.graph().roots().collect();
    roots.sort_by_key(|id| plan.position(id));
    println!("  roots = {roots:?}");
    println!();

    for (i, level) in plan.levels().into_iter().enumerate() {
        println!("round {}:", i + 1);
        for task in level {
            println!("  - {} [{}]", task.id, task.kind);
            println!("      description: {:?}", task.description);
            if !task.dependencies.is_empty() {
                println!("      after: {:?}", task.dependencies);
            }
            let feeds = plan.graph().dependents_of(&task.id);
            if !feeds.is_empty() {
                println!("      feeds: {feeds:?}");
            }
        }
    }

    debug!("dry-run complete (no execution)");
}
