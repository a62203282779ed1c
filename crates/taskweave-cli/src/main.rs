//! Taskweave command line: load a TOML config, submit one task, print
//! the outcome. Demonstration surface for the execution core; there is
//! no HTTP server here.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use taskweave_core::{event_channel, EventSink, TaskStatus, TaskweaveError, TaskweaveResult};
use taskweave_executor::{ExecutorConfig, ResilientExecutor};
use taskweave_orchestrator::{
    CollaborationPipeline, MemoryPersistence, PipelineConfig, Router, RouterConfig, SubmitRequest,
    SupervisorConfig, TaskSupervisor,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taskweave", about = "Taskweave — resilient task execution core")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "taskweave.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit one task and wait for its result
    Run {
        /// Task content
        content: String,
        /// Declared task type
        #[arg(long, default_value = "general")]
        task_type: String,
        /// Run through the collaboration pipeline instead of one executor
        #[arg(long)]
        collaborative: bool,
    },
    /// List configured executors and their capabilities
    Executors,
}

#[derive(Deserialize)]
struct TaskweaveConfig {
    #[serde(default)]
    executors: Vec<ExecutorConfig>,
    router: RouterConfig,
    #[serde(default)]
    pipeline: PipelineConfig,
    #[serde(default)]
    supervisor: SupervisorConfig,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> TaskweaveResult<()> {
    let cli = Cli::parse();
    let raw = std::fs::read_to_string(&cli.config).map_err(|e| {
        TaskweaveError::Config(format!("cannot read {}: {e}", cli.config.display()))
    })?;
    let config: TaskweaveConfig =
        toml::from_str(&raw).map_err(|e| TaskweaveError::Config(e.to_string()))?;

    match cli.command {
        Commands::Executors => {
            for exec in &config.executors {
                println!(
                    "{:<16} types: [{}]  keywords: [{}]",
                    exec.id,
                    exec.task_types.join(", "),
                    exec.keywords.join(", ")
                );
            }
            Ok(())
        }
        Commands::Run {
            content,
            task_type,
            collaborative,
        } => submit_and_wait(config, content, task_type, collaborative).await,
    }
}

async fn submit_and_wait(
    config: TaskweaveConfig,
    content: String,
    task_type: String,
    collaborative: bool,
) -> TaskweaveResult<()> {
    if config.executors.is_empty() {
        return Err(TaskweaveError::Config(
            "no executors configured".to_string(),
        ));
    }

    // Lifecycle events go to the debug log.
    let (tx, mut rx) = event_channel(256);
    let events = EventSink::new(tx);
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            debug!(?event, "lifecycle event");
        }
    });

    let executors: Vec<Arc<ResilientExecutor>> = config
        .executors
        .into_iter()
        .map(|c| Arc::new(ResilientExecutor::from_config(c, events.clone())))
        .collect();

    let router = Router::new(executors.clone(), config.router);
    let pipeline = CollaborationPipeline::new(executors.clone(), config.pipeline);
    let supervisor = TaskSupervisor::new(
        executors,
        router,
        pipeline,
        Arc::new(MemoryPersistence::new()),
        config.supervisor,
        events,
    );

    let mut request = SubmitRequest::new(task_type, content.clone());
    if collaborative {
        request = request.collaborative();
    }

    let admission = supervisor.submit(request).await?;
    if let Some(executor) = &admission.assigned_executor {
        // Display-only estimate; not a scheduling guarantee.
        let estimate = supervisor.router().estimate_duration_ms(executor, &content);
        info!(
            task_id = %admission.id,
            executor = %executor,
            estimated_ms = estimate.unwrap_or_default(),
            "submitted"
        );
    }

    let status = supervisor
        .wait_for_terminal(admission.id)
        .await
        .ok_or_else(|| TaskweaveError::Supervisor("task disappeared".into()))?;
    let view = supervisor
        .status(admission.id)
        .await
        .ok_or_else(|| TaskweaveError::Supervisor("task disappeared".into()))?;

    supervisor.shutdown().await;

    match status {
        TaskStatus::Completed => {
            println!("{}", view.result.unwrap_or_default());
            info!(
                tokens = view.usage.total_tokens,
                cache_hit = view.cache_hit,
                "done"
            );
            Ok(())
        }
        TaskStatus::Failed => Err(TaskweaveError::Supervisor(
            view.error.unwrap_or_else(|| "task failed".to_string()),
        )),
        other => Err(TaskweaveError::Supervisor(format!(
            "task ended {other} without a result"
        ))),
    }
}
