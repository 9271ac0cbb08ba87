//! CLI commands and runtime wiring.
//!
//! All construction happens here, explicitly: stores, vector client,
//! scorer, worker, search manager, maintenance, and the tool server are
//! built and handed to each other through constructors. No singletons.

use crate::config::EngramConfig;
use crate::llm::SubprocessDistiller;
use crate::maintenance::{MaintenanceConfig, MaintenanceService};
use crate::models::EventBus;
use crate::scoring::{Scorer, ScoreRecalculator};
use crate::search::{SearchConfig, SearchManager};
use crate::server::{ToolServer, ToolServerDeps};
use crate::storage::SqliteStore;
use crate::vector::{HttpVectorClient, InMemoryVectorClient, VectorClient};
use crate::worker::{
    DistillationWorker, SessionTurn, ToolExecution, VectorSyncPool, WorkerConfig,
};
use crate::{Error, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Engram: project-aware long-term memory for AI coding assistants.
#[derive(Debug, Parser)]
#[command(name = "engram", version, about)]
pub struct Cli {
    /// Data directory override (default: platform data dir).
    #[arg(long, global = true, env = "ENGRAM_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Emit JSON logs.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the tool protocol (stdio by default).
    Serve {
        /// Serve HTTP + SSE instead of stdio.
        #[arg(long)]
        http: bool,
        /// HTTP listen port.
        #[arg(long, default_value_t = 8765)]
        port: u16,
    },
    /// Ingest one hook event from stdin.
    Hook {
        #[command(subcommand)]
        event: HookEvent,
    },
    /// Run one maintenance pass and exit.
    Maintain,
    /// Print store statistics as JSON.
    Stats {
        /// Restrict counts to one project.
        #[arg(long)]
        project: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum HookEvent {
    /// A completed tool execution (stdin: JSON payload).
    PostToolUse,
    /// A completed session turn (stdin: JSON payload).
    Stop,
}

/// Everything a running process holds.
struct Runtime {
    config: EngramConfig,
    store: Arc<SqliteStore>,
    vector: Arc<dyn VectorClient>,
    scorer: Arc<Scorer>,
    pool: VectorSyncPool,
    worker: Arc<DistillationWorker>,
    search: Arc<SearchManager>,
    maintenance: Arc<MaintenanceService>,
}

async fn build_runtime(config: EngramConfig) -> Result<Runtime> {
    let store = Arc::new(SqliteStore::open(&config.db_path)?);
    let vector: Arc<dyn VectorClient> = match config.settings.vector_storage.as_str() {
        "memory" => Arc::new(InMemoryVectorClient::new()),
        _ => Arc::new(
            HttpVectorClient::connect(config.settings.worker_port, config.settings.model.clone())
                .await?,
        ),
    };
    let events = EventBus::default();
    let scorer = Arc::new(Scorer::default());
    let pool = VectorSyncPool::spawn(Arc::clone(&vector));

    let distiller = Arc::new(SubprocessDistiller::new(
        config.distiller_binary.clone(),
        config.settings.model.clone(),
    ));
    let worker = Arc::new(DistillationWorker::new(
        store.clone(),
        store.clone(),
        store.clone(),
        distiller,
        pool.handle(),
        events.clone(),
        WorkerConfig::default(),
    ));

    let search_config = SearchConfig {
        candidate_factor: config.settings.rerank.candidate_factor,
        rrf_k: config.settings.rerank.rrf_k,
        ..SearchConfig::default()
    };
    let search = Arc::new(SearchManager::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::clone(&vector),
        search_config,
    ));

    let maintenance = Arc::new(MaintenanceService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::clone(&vector),
        events.clone(),
        MaintenanceConfig {
            interval_hours: config.settings.maintenance.interval_hours,
            retention_days: config.settings.maintenance.retention_days,
            cleanup_superseded: config.settings.maintenance.cleanup_superseded,
            ..MaintenanceConfig::default()
        },
    ));

    Ok(Runtime {
        config,
        store,
        vector,
        scorer,
        pool,
        worker,
        search,
        maintenance,
    })
}

/// Parses arguments and runs the selected command.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    crate::observability::init_logging(cli.json_logs);
    let _ = dotenvy::dotenv();

    let config = match &cli.data_dir {
        Some(dir) => EngramConfig::load_from_dir(dir)?,
        None => EngramConfig::load_default()?,
    };

    match cli.command {
        Command::Serve { http, port } => serve(config, http, port).await,
        Command::Hook { event } => hook(config, event).await,
        Command::Maintain => maintain(config).await,
        Command::Stats { project } => stats(config, project.as_deref()),
    }
}

async fn serve(config: EngramConfig, http: bool, port: u16) -> Result<()> {
    let runtime = build_runtime(config).await?;
    let shutdown = CancellationToken::new();

    let server = Arc::new(ToolServer::new(ToolServerDeps {
        observations: runtime.store.clone(),
        summaries: runtime.store.clone(),
        prompts: runtime.store.clone(),
        relations: runtime.store.clone(),
        patterns: runtime.store.clone(),
        search: Arc::clone(&runtime.search),
        scorer: Arc::clone(&runtime.scorer),
        vector: Arc::clone(&runtime.vector),
        maintenance: Some(Arc::clone(&runtime.maintenance)),
        worker: Some(Arc::clone(&runtime.worker)),
        settings: runtime.config.settings.clone(),
    }));

    let mut background = runtime.search.spawn_background(&shutdown);
    let recalculator =
        ScoreRecalculator::new(runtime.store.clone(), Arc::clone(&runtime.scorer));
    background.push(tokio::spawn(recalculator.run(shutdown.clone())));
    background.push(tokio::spawn(
        Arc::clone(&runtime.maintenance).run(shutdown.clone()),
    ));

    let transport = {
        let server = Arc::clone(&server);
        let token = shutdown.clone();
        if http {
            let addr: SocketAddr = ([127, 0, 0, 1], port).into();
            tokio::spawn(async move { crate::server::http::run(server, addr, token).await })
        } else {
            tokio::spawn(async move { crate::server::stdio::run(server, token).await })
        }
    };

    tokio::select! {
        result = transport => {
            match result {
                Ok(Ok(())) => info!("transport closed"),
                Ok(Err(e)) => return Err(Error::Fatal(format!("transport failed: {e}"))),
                Err(e) => return Err(Error::Fatal(format!("transport panicked: {e}"))),
            }
        },
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
    }

    shutdown.cancel();
    for task in background {
        let _ = task.await;
    }
    drop(server);
    let Runtime { pool, worker, .. } = runtime;
    drop(worker);
    pool.shutdown().await;
    Ok(())
}

#[derive(Debug, serde::Deserialize)]
struct ToolUsePayload {
    tool_name: String,
    #[serde(default)]
    tool_input: serde_json::Value,
    #[serde(default)]
    tool_response: serde_json::Value,
    #[serde(default)]
    project: String,
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    prompt_number: i64,
    #[serde(default)]
    cwd: Option<PathBuf>,
}

#[derive(Debug, serde::Deserialize)]
struct StopPayload {
    #[serde(default)]
    project: String,
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    prompt_number: i64,
    #[serde(default)]
    user_prompt: String,
    #[serde(default)]
    assistant_response: String,
}

fn read_stdin() -> Result<String> {
    use std::io::Read;
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .map_err(|e| Error::BadRequest(format!("reading stdin: {e}")))?;
    Ok(buffer)
}

async fn hook(config: EngramConfig, event: HookEvent) -> Result<()> {
    // Hook handlers inside the distiller subprocess must not re-enter.
    if std::env::var(crate::llm::DISABLE_HOOKS_ENV).is_ok() {
        return Ok(());
    }
    let payload = read_stdin()?;
    let runtime = build_runtime(config).await?;

    let outcome = match event {
        HookEvent::PostToolUse => {
            let payload: ToolUsePayload = serde_json::from_str(&payload)
                .map_err(|e| Error::BadRequest(format!("invalid hook payload: {e}")))?;
            let output = match &payload.tool_response {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let exec = ToolExecution {
                tool_name: payload.tool_name,
                input: payload.tool_input,
                output,
                project: payload.project,
                sdk_session_id: payload.session_id,
                prompt_number: payload.prompt_number,
                cwd: payload.cwd.unwrap_or_else(std::env::temp_dir),
            };
            runtime.worker.process_tool_execution(&exec).await?
        },
        HookEvent::Stop => {
            let payload: StopPayload = serde_json::from_str(&payload)
                .map_err(|e| Error::BadRequest(format!("invalid hook payload: {e}")))?;
            let turn = SessionTurn {
                project: payload.project,
                sdk_session_id: payload.session_id,
                prompt_number: payload.prompt_number,
                user_prompt: payload.user_prompt,
                assistant_response: payload.assistant_response,
            };
            runtime.worker.process_summary(&turn).await?
        },
    };

    println!(
        "{}",
        serde_json::to_string(&serde_json::json!({ "outcome": outcome_label(&outcome) }))
            .unwrap_or_default()
    );

    let Runtime { pool, worker, .. } = runtime;
    drop(worker);
    pool.shutdown().await;
    Ok(())
}

fn outcome_label(outcome: &crate::worker::IngestOutcome) -> serde_json::Value {
    match outcome {
        crate::worker::IngestOutcome::Stored { ids } => {
            serde_json::json!({ "stored": ids })
        },
        crate::worker::IngestOutcome::Skipped(reason) => {
            serde_json::json!({ "skipped": reason })
        },
    }
}

async fn maintain(config: EngramConfig) -> Result<()> {
    let runtime = build_runtime(config).await?;
    runtime.maintenance.tick().await;
    println!(
        "{}",
        serde_json::to_string_pretty(&runtime.maintenance.stats()).unwrap_or_default()
    );
    let Runtime { pool, worker, .. } = runtime;
    drop(worker);
    pool.shutdown().await;
    Ok(())
}

fn stats(config: EngramConfig, project: Option<&str>) -> Result<()> {
    use crate::storage::{ObservationStore, PromptStore, SummaryStore};
    let store = SqliteStore::open(&config.db_path)?;
    let report = serde_json::json!({
        "observations": ObservationStore::count(&store, project)?,
        "session_summaries": SummaryStore::count(&store, project)?,
        "user_prompts": PromptStore::count(&store, project)?,
        "db_path": config.db_path,
    });
    println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
    Ok(())
}
