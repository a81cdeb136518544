//! ShopCtl - Command line tool for inspecting a ShopSync node
//!
//! Usage:
//!   shopctl products         - List catalog products
//!   shopctl product <id>     - Show one product
//!   shopctl status           - Show replication status
//!   shopctl discover         - Ask the registry which server to use

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Deserialize;

/// ShopSync Control Tool
#[derive(Parser)]
#[command(name = "shopctl")]
#[command(about = "Inspect ShopSync catalog nodes", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "shopsync.toml")]
    config: PathBuf,

    /// API endpoint to connect to (overrides config)
    #[arg(short, long)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List products, optionally filtered
    Products {
        /// Only this category (case-insensitive)
        #[arg(long)]
        category: Option<String>,
        /// Only products with this stock flag
        #[arg(long)]
        in_stock: Option<bool>,
    },
    /// Show a single product
    Product {
        id: u64,
    },
    /// Show replication status of the node
    Status,
    /// Resolve the catalog server through the discovery registry
    Discover {
        /// Registry address (host:port)
        #[arg(short, long, default_value = "127.0.0.1:3001")]
        registry: String,
    },
}

// ============ API Response Types ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Product {
    id: u64,
    name: String,
    #[serde(default)]
    price: f64,
    #[serde(default)]
    category: String,
    #[serde(default)]
    in_stock: bool,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    node_id: String,
    #[serde(default)]
    mode: String,
    #[serde(default)]
    uptime_seconds: u64,
    #[serde(default)]
    last_sequence: u64,
    primary: Counts,
    #[serde(default)]
    replicas: Vec<ReplicaStatus>,
}

#[derive(Debug, Default, Deserialize)]
struct Counts {
    #[serde(default)]
    products: usize,
    #[serde(default)]
    orders: usize,
    #[serde(default)]
    carts: usize,
}

#[derive(Debug, Deserialize)]
struct ReplicaStatus {
    name: String,
    #[serde(default)]
    counts: Counts,
    #[serde(default)]
    pending: usize,
    #[serde(default)]
    worker: Option<WorkerStats>,
}

#[derive(Debug, Deserialize)]
struct WorkerStats {
    #[serde(default)]
    cycles: u64,
    #[serde(default)]
    last_applied_seq: u64,
    #[serde(default)]
    persist_failures: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Deserialize)]
struct ServerLocation {
    server: String,
}

// ============ Config ============

#[derive(Debug, Deserialize)]
struct Config {
    #[serde(default)]
    api: ApiConfig,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfig {
    #[serde(default = "default_api_bind")]
    bind_address: String,
}

fn default_api_bind() -> String {
    "0.0.0.0:3000".to_string()
}

/// Endpoint from the config's API bind address, wildcard mapped to loopback
fn endpoint_from_config(path: &Path) -> String {
    let bind = std::fs::read_to_string(path)
        .ok()
        .and_then(|content| toml::from_str::<Config>(&content).ok())
        .map(|config| config.api.bind_address)
        .unwrap_or_else(default_api_bind);

    match bind.strip_prefix("0.0.0.0:") {
        Some(port) => format!("http://127.0.0.1:{}", port),
        None => format!("http://{}", bind),
    }
}

// ============ Main ============

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let endpoint = cli
        .endpoint
        .clone()
        .unwrap_or_else(|| endpoint_from_config(&cli.config));

    let result = match &cli.command {
        Commands::Products { category, in_stock } => list_products(&endpoint, category.as_deref(), *in_stock).await,
        Commands::Product { id } => show_product(&endpoint, *id).await,
        Commands::Status => show_status(&endpoint).await,
        Commands::Discover { registry } => discover(registry).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

// ============ Commands ============

/// Turn a non-success response into an error carrying the server's message
async fn check(response: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match response.json::<ErrorResponse>().await {
        Ok(body) => bail!("API error ({}): {}", status, body.error),
        Err(_) => bail!("API error: {}", status),
    }
}

async fn list_products(endpoint: &str, category: Option<&str>, in_stock: Option<bool>) -> anyhow::Result<()> {
    let mut query: Vec<(&str, String)> = Vec::new();
    if let Some(category) = category {
        query.push(("category", category.to_string()));
    }
    if let Some(in_stock) = in_stock {
        query.push(("inStock", in_stock.to_string()));
    }

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/products", endpoint))
        .query(&query)
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", endpoint))?;
    let products: Vec<Product> = check(response).await?.json().await?;

    println!();
    println!("{:<6} {:<30} {:<15} {:>10} {:<8}", "ID", "NAME", "CATEGORY", "PRICE", "STOCK");
    println!("{}", "-".repeat(73));
    for p in &products {
        let stock = if p.in_stock {
            "\x1b[32myes\x1b[0m"
        } else {
            "\x1b[31mno\x1b[0m"
        };
        println!("{:<6} {:<30} {:<15} {:>10.2} {}", p.id, p.name, p.category, p.price, stock);
    }
    println!();
    println!("{} products", products.len());

    Ok(())
}

async fn show_product(endpoint: &str, id: u64) -> anyhow::Result<()> {
    let response = reqwest::get(format!("{}/products/{}", endpoint, id))
        .await
        .with_context(|| format!("Failed to reach {}", endpoint))?;
    let product: serde_json::Value = check(response).await?.json().await?;
    println!("{}", serde_json::to_string_pretty(&product)?);
    Ok(())
}

async fn show_status(endpoint: &str) -> anyhow::Result<()> {
    let response = reqwest::get(format!("{}/status", endpoint))
        .await
        .with_context(|| format!("Failed to reach {}", endpoint))?;
    let status: StatusResponse = check(response).await?.json().await?;

    println!();
    println!("ShopSync Node Status (shopctl v{})", env!("CARGO_PKG_VERSION"));
    println!("=====================================");
    println!();
    println!("Node:       {}", status.node_id);
    println!("Mode:       {}", status.mode);
    println!("Uptime:     {}s", status.uptime_seconds);
    println!("Last Seq:   {}", status.last_sequence);
    println!(
        "Primary:    {} products, {} orders, {} carts",
        status.primary.products, status.primary.orders, status.primary.carts
    );
    println!();

    println!("{:<15} {:>9} {:>7} {:>6} {:>8} {:>9}", "SECONDARY", "PRODUCTS", "ORDERS", "CARTS", "PENDING", "LAST SEQ");
    println!("{}", "-".repeat(59));
    for replica in &status.replicas {
        let last_seq = replica
            .worker
            .as_ref()
            .map(|w| w.last_applied_seq.to_string())
            .unwrap_or_else(|| "-".to_string());
        let pending = format!("{:>8}", replica.pending);
        let pending = if replica.pending > 0 {
            format!("\x1b[33m{}\x1b[0m", pending)
        } else {
            pending
        };
        println!(
            "{:<15} {:>9} {:>7} {:>6} {} {:>9}",
            replica.name,
            replica.counts.products,
            replica.counts.orders,
            replica.counts.carts,
            pending,
            last_seq
        );
        if let Some(worker) = &replica.worker {
            if worker.persist_failures > 0 {
                println!(
                    "  \x1b[31m{} persist failures over {} cycles\x1b[0m",
                    worker.persist_failures, worker.cycles
                );
            }
        }
    }
    println!();

    Ok(())
}

async fn discover(registry: &str) -> anyhow::Result<()> {
    let registry = if registry.starts_with("http") {
        registry.to_string()
    } else {
        format!("http://{}", registry)
    };

    let response = reqwest::get(format!("{}/getServer", registry))
        .await
        .with_context(|| format!("Failed to reach registry {}", registry))?;
    let location: ServerLocation = check(response).await?.json().await?;
    println!("{}", location.server);
    Ok(())
}
