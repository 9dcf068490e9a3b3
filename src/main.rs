use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use dsort_cluster::client::client::SortClient;
use dsort_cluster::config::{
    FailurePolicy, MissingShardsAction, PadWidth, ServerConfig, SortConfig,
};
use dsort_cluster::dsort::coordinator::SortCoordinator;
use dsort_cluster::dsort::types::{
    AlgorithmKind, OutputShardSize, SortAlgorithm, SortSpec, SortState, SortUuid,
};
use dsort_cluster::membership::service::ClusterMap;
use dsort_cluster::membership::types::NodeId;
use dsort_cluster::server::router;
use dsort_cluster::storage::local::LocalObjectStore;
use dsort_cluster::storage::memory::MemoryObjectStore;
use dsort_cluster::storage::store::ObjectStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dsort-cluster", version, about = "Distributed sort over tar shards")]
struct Cli {
    /// Base URL of a running service (client subcommands)
    #[arg(long, global = true, env = "DSORT_URL", default_value = "http://127.0.0.1:8080")]
    url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the service with its storage targets in this process
    Serve(ServeArgs),
    /// Start a sort and print its uuid
    Start(StartArgs),
    /// Print per-node metrics of a sort
    Show { uuid: String },
    /// Abort a sort
    Stop { uuid: String },
    /// Poll until a sort finishes or aborts
    Wait {
        uuid: String,
        #[arg(long, default_value_t = 500)]
        poll_ms: u64,
        #[arg(long, default_value_t = 3600)]
        timeout_secs: u64,
    },
    /// Forget an ended sort
    Rm { uuid: String },
    /// List known sorts
    Ls,
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, env = "DSORT_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,
    /// Number of storage targets hosted by this process
    #[arg(long, env = "DSORT_TARGETS", default_value_t = 3)]
    targets: usize,
    #[arg(long, env = "DSORT_DATA_DIR", default_value = "dsort-data")]
    data_dir: PathBuf,
    /// Keep objects in memory instead of under --data-dir
    #[arg(long)]
    memory: bool,
    #[arg(long, default_value_t = 60)]
    barrier_timeout_secs: u64,
    #[arg(long, default_value_t = 30)]
    transfer_timeout_secs: u64,
    #[arg(long, default_value_t = 1024)]
    transfer_buffer: usize,
    #[arg(long, value_enum, default_value_t = FailurePolicy::AbortCluster)]
    failure_policy: FailurePolicy,
    #[arg(long, value_enum, default_value_t = PadWidth::Widest)]
    pad_width: PadWidth,
    #[arg(long, value_enum, default_value_t = MissingShardsAction::Warn)]
    missing_shards: MissingShardsAction,
    #[arg(long, default_value_t = 1_000_000)]
    max_input_shards: u64,
    /// Targets to keep out of sort plans, e.g. `--offline t2`
    #[arg(long, value_delimiter = ',')]
    offline: Vec<String>,
}

impl ServeArgs {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            bind: self.bind,
            targets: self.targets,
            offline: self.offline.into_iter().map(NodeId).collect(),
            data_dir: (!self.memory).then_some(self.data_dir),
            sort: SortConfig {
                barrier_timeout: Duration::from_secs(self.barrier_timeout_secs),
                transfer_timeout: Duration::from_secs(self.transfer_timeout_secs),
                transfer_buffer: self.transfer_buffer,
                failure_policy: self.failure_policy,
                pad_width: self.pad_width,
                missing_shards: self.missing_shards,
                max_input_shards: self.max_input_shards,
            },
        }
    }
}

#[derive(Args)]
struct StartArgs {
    #[arg(long)]
    bucket: String,
    #[arg(long)]
    input_format: String,
    #[arg(long)]
    output_format: String,
    /// Bytes, optionally with a unit: 1024, 10KiB, 1MB
    #[arg(long, default_value = "1MiB")]
    output_shard_size: String,
    #[arg(long, default_value = ".tar")]
    extension: String,
    #[arg(long)]
    output_bucket: Option<String>,
    #[arg(long, default_value = "")]
    description: String,
    /// alphanumeric, shuffle or none
    #[arg(long, default_value = "alphanumeric")]
    algorithm: String,
    #[arg(long)]
    decreasing: bool,
    #[arg(long)]
    seed: Option<u64>,
}

impl StartArgs {
    fn into_spec(self) -> anyhow::Result<SortSpec> {
        let kind = match self.algorithm.as_str() {
            "alphanumeric" => AlgorithmKind::Alphanumeric,
            "shuffle" => AlgorithmKind::Shuffle,
            "none" => AlgorithmKind::None,
            other => anyhow::bail!("unknown algorithm '{}'", other),
        };
        Ok(SortSpec {
            bucket: self.bucket,
            provider: "ais".to_string(),
            extension: self.extension,
            output_shard_size: OutputShardSize::Text(self.output_shard_size),
            input_format: self.input_format,
            output_format: self.output_format,
            output_bucket: self.output_bucket,
            description: self.description,
            algorithm: SortAlgorithm {
                kind,
                decreasing: self.decreasing,
                seed: self.seed,
            },
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("DSORT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let client = SortClient::new(&cli.url);

    match cli.command {
        Command::Serve(args) => serve(args.into_config()).await?,
        Command::Start(args) => {
            let uuid = client.start_sort(&args.into_spec()?).await?;
            println!("{}", uuid);
        }
        Command::Show { uuid } => {
            let metrics = client.get_sort_metrics(&SortUuid(uuid)).await?;
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }
        Command::Stop { uuid } => {
            client.abort_sort(&SortUuid(uuid.clone())).await?;
            println!("abort requested for {}", uuid);
        }
        Command::Wait {
            uuid,
            poll_ms,
            timeout_secs,
        } => {
            let uuid = SortUuid(uuid);
            let metrics = client
                .wait_for_sort(
                    &uuid,
                    Duration::from_millis(poll_ms),
                    Duration::from_secs(timeout_secs),
                )
                .await?;
            if metrics.any_aborted() {
                anyhow::bail!("sort {} aborted", uuid);
            }
            println!("sort {} finished on {} nodes", uuid, metrics.len());
        }
        Command::Rm { uuid } => {
            client.remove_sort(&SortUuid(uuid.clone())).await?;
            println!("removed {}", uuid);
        }
        Command::Ls => {
            for job in client.list_sorts().await? {
                let state = match &job.state {
                    SortState::Failed { reason } => format!("failed ({})", reason),
                    other => format!("{:?}", other).to_lowercase(),
                };
                println!(
                    "{}  {:<10}  {}  {}",
                    job.uuid, state, job.created_at, job.description
                );
            }
        }
    }

    Ok(())
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    tracing::info!("Starting sort service on {}", config.bind);

    // 1. Storage:
    let store: Arc<dyn ObjectStore> = match &config.data_dir {
        Some(dir) => Arc::new(
            LocalObjectStore::open(dir)
                .await
                .with_context(|| format!("opening {}", dir.display()))?,
        ),
        None => {
            tracing::warn!("Objects are kept in memory and lost on shutdown");
            Arc::new(MemoryObjectStore::new())
        }
    };

    // 2. Cluster map of local targets:
    let cluster = ClusterMap::with_targets(config.targets);
    for id in &config.offline {
        if !cluster.mark_dead(id) {
            anyhow::bail!("--offline {}: no such target", id);
        }
    }
    tracing::info!(
        "Hosting {} storage targets ({} alive)",
        config.targets,
        cluster.get_alive_members().len()
    );

    // 3. Coordinator and HTTP router:
    let coordinator = SortCoordinator::new(cluster.clone(), store.clone(), config.sort.clone());
    let app = router(coordinator.clone(), store);

    // 4. Spawn stats reporter:
    let stats = coordinator.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            let sorts = stats.list_sorts();
            let running = sorts
                .iter()
                .filter(|job| job.state == SortState::Running)
                .count();
            tracing::info!(
                "Cluster stats: {} alive targets, {} sorts ({} running)",
                cluster.get_alive_members().len(),
                sorts.len(),
                running
            );
        }
    });

    // 5. Start HTTP server:
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!("HTTP server listening on {}", listener.local_addr()?);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
