use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use labeling_core::{Config, ConversationStore, EventBus, FileStore, LabelStore};
use labeling_observability::{init_process_logging, ProcessKind};
use labeling_providers::ProviderRegistry;
use labeling_queue::QueueClient;
use labeling_server::{serve, AppState, RunRegistry};

mod worker;

#[derive(Parser, Debug)]
#[command(name = "labeling-engine")]
#[command(about = "Time-series labeling platform: API server and parse workers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs the REST/WebSocket API server.
    Serve {
        #[arg(long, alias = "host", default_value = "127.0.0.1")]
        hostname: String,
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
    /// Runs one parse worker, claiming tasks from the shared queue until killed.
    Worker {
        /// Overrides WORKER_NAME for this process; useful when starting
        /// several workers from the same environment.
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env().context("loading configuration from environment")?;

    let process_kind = match &cli.command {
        Command::Serve { .. } => ProcessKind::Server,
        Command::Worker { name } => {
            if let Some(name) = name {
                config.worker_name = name.clone();
            }
            ProcessKind::Worker
        }
    };

    let logs_dir = labeling_observability::canonical_logs_dir_from_root(&config.data_dir);
    let (_guard, log_info) = init_process_logging(process_kind, &logs_dir, 14)?;
    info!(logs_dir = %log_info.logs_dir, process = %log_info.process, "logging initialized");

    match cli.command {
        Command::Serve { hostname, port } => {
            let addr: SocketAddr = format!("{hostname}:{port}")
                .parse()
                .context("invalid hostname or port")?;
            let state = build_state(&config).await?;
            info!(%addr, "starting labeling-engine serve");
            serve(addr, state).await?;
        }
        Command::Worker { .. } => {
            let queue = connect_queue(&config).await?;
            let files = FileStore::new(store_dir(&config)).await?;
            worker::run(config, queue, files).await?;
        }
    }

    Ok(())
}

fn store_dir(config: &Config) -> std::path::PathBuf {
    config.data_dir.join(".store")
}

async fn connect_queue(config: &Config) -> anyhow::Result<QueueClient> {
    let url = format!("redis://{}:{}", config.queue_host, config.queue_port);
    QueueClient::connect(&url)
        .await
        .with_context(|| format!("connecting to queue at {url}"))
}

async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let store_dir = store_dir(config);
    let files = Arc::new(FileStore::new(&store_dir).await?);
    let labels = Arc::new(LabelStore::new(&store_dir).await?);
    let conversations = Arc::new(ConversationStore::new());
    let queue = connect_queue(config).await?;
    let providers = ProviderRegistry::from_config(config);

    Ok(AppState {
        config: Arc::new(config.clone()),
        files,
        labels,
        conversations,
        queue: Arc::new(queue),
        providers,
        events: EventBus::new(),
        runs: RunRegistry::new(),
    })
}
