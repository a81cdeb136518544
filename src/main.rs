//! ShopSync - Replicated Product Catalog
//!
//! Serves the catalog API from a primary store and keeps secondary stores
//! in sync by mirroring or queued replication.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shopsync::api::HttpServer;
use shopsync::config::{ReplicationMode, ShopSyncConfig, PRIMARY_STORE};
use shopsync::coordinator::PrimaryCoordinator;
use shopsync::discovery::Registry;
use shopsync::error::Result;
use shopsync::replication::{AsyncReplicator, ReplicationStrategy, SyncMirrorer};
use shopsync::store::{DocumentStore, JsonFileBackend, SharedStore};

/// ShopSync - Replicated Product Catalog
#[derive(Parser)]
#[command(name = "shopsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "shopsync.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the catalog server
    Start {
        /// Override the replication mode from the configuration file
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },

    /// Run only the discovery registry
    Registry {
        /// Address to listen on
        #[arg(short, long, default_value = "0.0.0.0:3001")]
        listen: String,

        /// Catalog server address handed to clients
        #[arg(short, long, default_value = "localhost:3000")]
        advertise: String,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "shopsync.toml")]
        output: PathBuf,

        /// Node ID
        #[arg(long, default_value = "catalog-1")]
        node_id: String,
    },

    /// Validate configuration file
    Validate,

    /// Show node information
    Info,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ModeArg {
    Sync,
    Async,
}

impl From<ModeArg> for ReplicationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Sync => ReplicationMode::Sync,
            ModeArg::Async => ReplicationMode::Async,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli.log_level);

    match cli.command {
        Commands::Start { mode } => run_start(cli.config, mode.map(Into::into)).await,
        Commands::Registry { listen, advertise } => run_registry(listen, advertise).await,
        Commands::Init { output, node_id } => run_init(output, node_id),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Open a store backed by its JSON snapshot under the data directory
fn open_store(config: &ShopSyncConfig, name: &str) -> Result<SharedStore> {
    let path = config.snapshot_path(name);
    let store = match DocumentStore::open(name, Box::new(JsonFileBackend::new(path.clone()))) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to open {} store from {:?}: {}", name, path, e);
            return Err(e);
        }
    };

    let counts = store.counts();
    tracing::info!(
        "Opened {} store: {} products, {} orders, {} carts",
        name,
        counts.products,
        counts.orders,
        counts.carts
    );
    Ok(store.into_shared())
}

/// Start the catalog server
async fn run_start(config_path: PathBuf, mode_override: Option<ReplicationMode>) -> Result<()> {
    tracing::info!("Starting ShopSync node...");

    // Load configuration
    let mut config = match ShopSyncConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            tracing::error!("Please check that the config file exists and is valid TOML");
            return Err(e);
        }
    };
    if let Some(mode) = mode_override {
        config.replication.mode = mode;
    }
    tracing::info!(
        "Loaded configuration for node: {} ({} replication)",
        config.node.id,
        config.replication.mode
    );

    // Ensure directories exist
    if let Err(e) = std::fs::create_dir_all(config.data_dir()) {
        tracing::error!("Failed to create data directory {:?}: {}", config.data_dir(), e);
        return Err(e.into());
    }

    // Open stores
    let primary = open_store(&config, PRIMARY_STORE)?;
    let mut secondaries = Vec::with_capacity(config.replication.secondaries.len());
    for name in &config.replication.secondaries {
        secondaries.push(open_store(&config, name)?);
    }

    // Replication strategy
    let mut replicator = None;
    let strategy: Arc<dyn ReplicationStrategy> = match config.replication.mode {
        ReplicationMode::Sync => Arc::new(SyncMirrorer::new(secondaries)),
        ReplicationMode::Async => {
            let async_replicator = Arc::new(AsyncReplicator::new(secondaries, config.drain_interval()).await);
            replicator = Some(Arc::clone(&async_replicator));
            async_replicator
        }
    };

    let worker_handles = match &replicator {
        Some(r) => r.spawn_workers(),
        None => Vec::new(),
    };

    let coordinator = Arc::new(PrimaryCoordinator::new(primary, strategy));
    let http_server = HttpServer::new(config.api.clone(), config.node.id.clone(), Arc::clone(&coordinator));
    let registry = Registry::from_config(&config.discovery);
    let api_enabled = config.api.enabled;
    let discovery_enabled = config.discovery.enabled;

    let api = async {
        if api_enabled {
            http_server.start().await
        } else {
            tracing::info!("HTTP API disabled");
            std::future::pending().await
        }
    };
    let discovery = async {
        if discovery_enabled {
            registry.serve().await
        } else {
            std::future::pending().await
        }
    };

    tokio::select! {
        result = api => {
            if let Err(e) = result {
                tracing::error!("HTTP server error: {}", e);
            }
        }
        result = discovery => {
            if let Err(e) = result {
                tracing::error!("Discovery registry error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    // Let queued changes reach the secondaries before exiting
    if let Some(r) = &replicator {
        r.stop_workers();
    }
    for handle in worker_handles {
        if let Err(e) = handle.await {
            tracing::error!("Replication worker panicked: {}", e);
        }
    }

    if let Err(e) = coordinator.flush().await {
        tracing::error!("Failed to write primary snapshot on shutdown: {}", e);
    }

    tracing::info!("ShopSync node stopped");
    Ok(())
}

/// Run the discovery registry on its own
async fn run_registry(listen: String, advertise: String) -> Result<()> {
    let registry = Registry::new(listen, advertise);

    tokio::select! {
        result = registry.serve() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
            Ok(())
        }
    }
}

/// Initialize configuration file
fn run_init(output: PathBuf, node_id: String) -> Result<()> {
    let config_content = format!(r#"# ShopSync Configuration
# Generated configuration file

[node]
id = "{node_id}"
data_dir = "./data"

[replication]
# "sync" mirrors every write before answering; "async" queues it
mode = "async"
secondaries = ["secondary"]
drain_interval_ms = 5000

[api]
enabled = true
bind_address = "0.0.0.0:3000"
cors_enabled = true

[discovery]
enabled = false
bind_address = "0.0.0.0:3001"
advertise_address = "localhost:3000"

[logging]
level = "info"
format = "pretty"
"#);

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit the file to choose a replication mode and secondaries.");
    println!("Then start with: shopsync --config {} start", output.display());

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match ShopSyncConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Node ID: {}", config.node.id);
            println!("  Mode: {}", config.replication.mode);
            println!("  Secondaries: {}", config.replication.secondaries.join(", "));
            println!("  API: {}", config.api.bind_address);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show node information
fn run_info(config_path: PathBuf) -> Result<()> {
    let config = ShopSyncConfig::from_file(&config_path)?;

    println!("ShopSync Node Information");
    println!("=========================");
    println!();
    println!("Node ID:          {}", config.node.id);
    println!("Data Directory:   {}", config.data_dir().display());
    println!("Primary Snapshot: {}", config.snapshot_path(PRIMARY_STORE).display());
    println!();
    println!("Replication:");
    println!("  Mode:           {}", config.replication.mode);
    for name in &config.replication.secondaries {
        println!("  Secondary:      {} ({})", name, config.snapshot_path(name).display());
    }
    if config.replication.mode == ReplicationMode::Async {
        println!("  Drain Interval: {} ms", config.replication.drain_interval_ms);
    }
    println!();
    println!("API:");
    println!("  Enabled:        {}", config.api.enabled);
    println!("  Bind Address:   {}", config.api.bind_address);
    println!();
    println!("Discovery:");
    println!("  Enabled:        {}", config.discovery.enabled);
    println!("  Bind Address:   {}", config.discovery.bind_address);
    println!("  Advertise:      {}", config.discovery.advertise_address);
    println!();
    println!("Logging:");
    println!("  Level:          {}", config.logging.level);
    println!("  Format:         {}", config.logging.format);

    Ok(())
}
