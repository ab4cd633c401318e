use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::signal;
use tokio::time::{Duration, timeout};
use tracing_subscriber::EnvFilter;

use spindle_core::impls::InMemoryObjectStore;
use spindle_core::runtime::{FunctionRegistry, Runtime, TaskHandler};
use spindle_core::{
    Connection, FunctionId, ObjectId, SchedulerConfig, SchedulerServer, SpindleError, TaskArg,
    TaskSpec,
};

/// spindle - task scheduler over a Unix socket
#[derive(Parser)]
#[command(name = "spindle", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler until Ctrl+C
    Serve {
        /// Socket path (overrides the config file)
        #[arg(short, long)]
        socket: Option<PathBuf>,

        /// JSON config file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Submit one task (two object references plus an inline payload) to a
    /// running scheduler, fetch it back and run it
    SubmitDemo {
        /// Socket path (overrides the config file)
        #[arg(short, long)]
        socket: Option<PathBuf>,

        /// JSON config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Name passed to the demo handler
        #[arg(long, default_value = "spindle")]
        name: String,
    },
}

const HELLO: FunctionId = FunctionId::from_bytes(*b"spindle-demo-hello\0\0");

#[derive(Debug, Deserialize)]
struct HelloPayload {
    name: String,
}

struct HelloHandler;

#[async_trait]
impl TaskHandler for HelloHandler {
    async fn handle(&self, task: &TaskSpec) -> Result<(), SpindleError> {
        let payload = task
            .args()
            .iter()
            .find_map(TaskArg::as_value)
            .ok_or_else(|| SpindleError::Handler("expected an inline argument".into()))?;
        let p: HelloPayload = serde_json::from_slice(payload)
            .map_err(|e| SpindleError::Handler(format!("json decode: {e}")))?;

        tracing::info!(
            task = %task.task_id(),
            refs = task.object_refs().count(),
            "Hello, {}!",
            p.name
        );
        Ok(())
    }
}

fn load_config(
    socket: Option<PathBuf>,
    config: Option<PathBuf>,
) -> Result<SchedulerConfig, SpindleError> {
    let mut cfg = match config {
        Some(path) => SchedulerConfig::from_json_file(&path)?,
        None => SchedulerConfig::default(),
    };
    if let Some(socket) = socket {
        cfg = cfg.with_socket_path(socket);
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { socket, config } => cmd_serve(load_config(socket, config)?).await?,
        Commands::SubmitDemo {
            socket,
            config,
            name,
        } => cmd_submit_demo(load_config(socket, config)?, name).await?,
    }
    Ok(())
}

async fn cmd_serve(config: SchedulerConfig) -> Result<(), SpindleError> {
    // オブジェクトの実体はクライアント側にあるので、参照された id を受け入れる
    let store = Arc::new(InMemoryObjectStore::admitting());
    let server = SchedulerServer::bind(config, store)?;
    let handle = server.handle();

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };
    server.serve(shutdown).await?;

    let stats = handle.stats().await;
    tracing::info!(
        submitted = stats.submitted,
        dispatched = stats.dispatched,
        completed = stats.completed,
        queued = stats.queued,
        "scheduler stopped"
    );
    Ok(())
}

async fn cmd_submit_demo(config: SchedulerConfig, name: String) -> Result<(), SpindleError> {
    let objects = [ObjectId::from_bytes([1; 20]), ObjectId::from_bytes([2; 20])];
    let store = Arc::new(InMemoryObjectStore::with_objects(objects));
    let path = &config.socket_path;

    let mut registry = FunctionRegistry::new();
    registry.register(HELLO, Arc::new(HelloHandler))?;
    let runtime = Runtime::new(Arc::new(registry));

    let mut client = Connection::connect(path, store.clone())
        .await?
        .with_max_frame_size(config.max_frame_size);
    let mut worker = Connection::connect(path, store)
        .await?
        .with_max_frame_size(config.max_frame_size);

    let payload = serde_json::to_vec(&serde_json::json!({ "name": name }))
        .map_err(|e| SpindleError::Handler(e.to_string()))?;
    let args = vec![
        TaskArg::ObjectRef(objects[0]),
        TaskArg::value(payload),
        TaskArg::ObjectRef(objects[1]),
    ];
    let task = client.build_task(HELLO, args, 2)?;
    client.submit(&task).await?;
    tracing::info!(task = %task.task_id(), "submitted");

    // 他のタスクが先に積まれていると別のものが返ることがある
    let received = timeout(Duration::from_secs(10), worker.get_task())
        .await
        .map_err(|_| SpindleError::Handler("timed out waiting for the task".into()))??;
    tracing::info!(
        task = %received.task_id(),
        same = received == task,
        returns = ?received.return_ids(),
        "received"
    );

    let result = runtime.execute(&received).await;
    worker.task_done(received.task_id()).await?;

    client.disconnect().await?;
    worker.disconnect().await?;
    result
}
