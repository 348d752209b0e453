mod api;
mod demo;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// Internal imports
use crate::api::{RunRequest, RunResponse, ToolDef};
use agentic_core::coding::{run_coding_task, CODING_SYSTEM_PROMPT};
use agentic_core::llm::say_hello;
use agentic_core::report::{
    persist_coding_output, persist_coding_summary, persist_summary, persist_workflow, CodingSummary, DemoSummary,
};
use agentic_core::tools::builtin_registry;
use agentic_core::{Brain, CompletionService, Dispatcher, Sandbox, Settings, WorkflowResult};

#[derive(Parser)]
#[command(name = "agentic-gateway", about = "Run tool-calling agent workflows")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (default)
    Serve {
        #[arg(long, default_value = "0.0.0.0:3000")]
        addr: String,
    },
    /// Run a single workflow and exit
    Run {
        #[arg(long, default_value = "Ad-hoc Workflow")]
        name: String,
        #[arg(long)]
        task: String,
    },
    /// Run the built-in demo workflows and write a summary report
    Demo,
    /// Run the tool-free coding tasks and write a summary report
    Coding,
}

// 1. Application State
// The dispatcher is shared; every run still owns its own transcript.
#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
    output_dir: Arc<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 2. Logging Setup
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env().context("Failed to load configuration")?;

    // 3. Brain, Registry and Sandbox
    info!("Connecting to {:?} backend...", settings.llm.backend);
    let brain = Arc::new(Brain::new(settings.llm.clone()));
    match say_hello(&*brain).await {
        Ok(msg) => info!("Brain Status ({}): {}", brain.model(), msg),
        Err(e) => error!("Brain ({}) is configured but unresponsive: {}", brain.model(), e),
    }

    let dispatcher = Arc::new(build_dispatcher(&settings, brain.clone())?);
    info!("Loaded {} tools available for the Brain.", dispatcher.registry().len());

    match cli.command.unwrap_or(Command::Serve {
        addr: "0.0.0.0:3000".to_string(),
    }) {
        Command::Serve { addr } => serve(dispatcher, settings.output_dir, &addr).await,
        Command::Run { name, task } => {
            let (result, _) = run_and_persist(&dispatcher, &settings.output_dir, &name, &task).await;
            if let Some(answer) = result.answer() {
                println!("{answer}");
            }
            Ok(())
        }
        Command::Demo => run_demo(&dispatcher, &settings).await,
        Command::Coding => run_coding_demo(&*brain, &settings).await,
    }
}

fn build_dispatcher(settings: &Settings, brain: Arc<Brain>) -> Result<Dispatcher> {
    info!("Initializing Wasmtime sandbox...");
    let sandbox = Arc::new(Sandbox::new(settings.sandbox.clone()).context("Failed to initialize sandbox")?);

    let registry = Arc::new(builtin_registry(&settings.tools, sandbox)?);
    Ok(Dispatcher::new(brain, registry, settings.dispatch.clone()))
}

/// Runs one workflow and always writes its artifact, including partial
/// transcripts of failed runs.
async fn run_and_persist(
    dispatcher: &Dispatcher,
    output_dir: &Path,
    name: &str,
    task: &str,
) -> (WorkflowResult, Option<PathBuf>) {
    info!("Executing: {}", name);
    let result = dispatcher.run(name, task).await;

    if result.success {
        info!(
            "{} completed in {:.2}s ({} iterations)",
            name, result.elapsed_secs, result.iterations
        );
    } else {
        error!(
            "{} failed: {}",
            name,
            result.error.as_deref().unwrap_or("Unknown error")
        );
    }

    let artifact = match persist_workflow(output_dir, &result) {
        Ok(path) => Some(path),
        Err(e) => {
            error!("Could not save workflow result: {:#}", e);
            None
        }
    };
    (result, artifact)
}

async fn serve(dispatcher: Arc<Dispatcher>, output_dir: PathBuf, addr: &str) -> Result<()> {
    let state = AppState {
        dispatcher,
        output_dir: Arc::new(output_dir),
    };

    // 4. Define Routes
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/tools", get(list_tools))
        .route("/run", post(submit_run))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // 5. Start Server
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Gateway listening on {}...", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_demo(dispatcher: &Dispatcher, settings: &Settings) -> Result<()> {
    info!("Running {} demo workflows", demo::WORKFLOWS.len());
    let started = Instant::now();

    let mut results = Vec::with_capacity(demo::WORKFLOWS.len());
    for workflow in &demo::WORKFLOWS {
        let (result, _) = run_and_persist(dispatcher, &settings.output_dir, workflow.name, workflow.task).await;
        results.push(result);
    }

    let summary = DemoSummary::from_results(results, started.elapsed());
    info!(
        "Successful workflows: {}/{} in {:.2}s",
        summary.successful_workflows, summary.total_workflows, summary.total_time
    );
    for result in &summary.results {
        let status = if result.success { "ok" } else { "FAILED" };
        info!(
            "[{}] {}: {:.2}s ({} iterations)",
            status, result.workflow, result.elapsed_secs, result.iterations
        );
    }

    persist_summary(&settings.report_dir, &summary)?;
    Ok(())
}

async fn run_coding_demo(service: &dyn CompletionService, settings: &Settings) -> Result<()> {
    info!("Running {} coding tasks", demo::CODING_TASKS.len());
    let started = Instant::now();

    let mut results = Vec::with_capacity(demo::CODING_TASKS.len());
    for task in &demo::CODING_TASKS {
        let result = run_coding_task(service, CODING_SYSTEM_PROMPT, task.name, task.task).await;
        if let Err(e) = persist_coding_output(&settings.output_dir, &result) {
            error!("Could not save coding output: {:#}", e);
        }
        results.push(result);
    }

    let summary = CodingSummary::from_results(results, started.elapsed());
    info!(
        "Successful tasks: {}/{} in {:.2}s (average {:.2}s)",
        summary.successful_tests, summary.total_tests, summary.total_time, summary.average_time
    );
    for result in &summary.results {
        let status = if result.success { "ok" } else { "FAILED" };
        info!("[{}] {}: {:.2}s", status, result.task, result.execution_time);
    }

    persist_coding_summary(&settings.report_dir, &summary)?;
    Ok(())
}

// --- HANDLERS ---

async fn health_check() -> &'static str {
    "Agentic Gateway: Operational"
}

async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolDef>> {
    Json(
        state
            .dispatcher
            .registry()
            .declarations()
            .into_iter()
            .map(ToolDef::from)
            .collect(),
    )
}

// The Orchestrator Handler
async fn submit_run(State(state): State<AppState>, Json(payload): Json<RunRequest>) -> Json<RunResponse> {
    let name = payload.workflow.unwrap_or_else(|| "API Workflow".to_string());
    info!("Run requested: {} ({} chars)", name, payload.task.len());

    let (result, artifact) = run_and_persist(&state.dispatcher, &state.output_dir, &name, &payload.task).await;
    Json(RunResponse {
        artifact: artifact.map(|p| p.display().to_string()),
        result,
    })
}
