//! Boardmap - board product code to build target resolution
//!
//! Command line front end over the resolution engine: look up a single
//! product code, list known targets, or regenerate the offline
//! snapshot from the online registry.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use boardmap_core::{Mode, OfflineStore, Resolver, Snapshot, TargetRecord};
use boardmap_registry::RegistryClient;

use config::Config;

#[derive(Parser, Debug)]
#[command(name = "boardmap")]
#[command(about = "Resolve board product codes to build targets")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "boardmap.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a single product code
    Lookup {
        /// Product code reported by the board
        product_code: String,

        /// Database mode (offline, online, auto)
        #[arg(short, long)]
        mode: Option<Mode>,

        /// Print the resolution as JSON
        #[arg(long)]
        json: bool,
    },
    /// List known targets from the snapshot or the registry
    List {
        /// Database mode (offline or online; auto lists offline)
        #[arg(short, long)]
        mode: Option<Mode>,

        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },
    /// Regenerate the offline snapshot from the online registry
    Sync {
        /// Where to write the snapshot document
        #[arg(short, long, default_value = "crates/boardmap-core/data/targets.json")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = config::load_config(&args.config)?;

    match args.command {
        Command::Lookup {
            product_code,
            mode,
            json,
        } => lookup(&config, &product_code, mode, json).await,
        Command::List { mode, json } => list(&config, mode, json).await,
        Command::Sync { out } => sync(&config, &out).await,
    }
}

fn offline_store(config: &Config) -> OfflineStore {
    match &config.snapshot.path {
        Some(path) => OfflineStore::open(Path::new(path)),
        None => OfflineStore::embedded(),
    }
}

fn registry_client(config: &Config) -> Result<RegistryClient> {
    RegistryClient::with_url(&config.registry.url, config.auth_token(), config.timeout())
        .context("failed to create registry client")
}

async fn lookup(config: &Config, product_code: &str, mode: Option<Mode>, json: bool) -> Result<()> {
    let mode = mode.unwrap_or(config.resolve.mode);
    let resolver = Resolver::new(
        Arc::new(offline_store(config)),
        Arc::new(registry_client(config)?),
    );

    let resolution = resolver
        .resolve(product_code, mode)
        .await
        .with_context(|| format!("failed to resolve product code {product_code:?}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&resolution)?);
    } else {
        print_record(&resolution.record);
        println!("  Source: {}", resolution.source);
    }
    Ok(())
}

async fn list(config: &Config, mode: Option<Mode>, json: bool) -> Result<()> {
    let mode = mode.unwrap_or(config.resolve.mode);

    let mut records = match mode {
        Mode::Online => {
            let client = registry_client(config)?;
            info!(url = %config.registry.url, "listing targets from the online registry");
            client
                .fetch_all()
                .await
                .context("failed to fetch the target registry")?
        }
        // The snapshot is the cheap full listing; auto behaves as
        // offline here.
        Mode::Offline | Mode::Auto => {
            let store = offline_store(config);
            let snapshot = store.snapshot().map_err(|e| anyhow::Error::new(e.clone()))?;
            snapshot.records().cloned().collect()
        }
    };
    records.sort_by_key(TargetRecord::key);

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    println!("{} known targets:", records.len());
    for record in &records {
        match &record.board_name {
            Some(name) => println!("  - {}  {} ({})", record.product_code, record.build_target, name),
            None => println!("  - {}  {}", record.product_code, record.build_target),
        }
    }
    Ok(())
}

async fn sync(config: &Config, out: &Path) -> Result<()> {
    let client = registry_client(config)?;
    info!(url = %config.registry.url, "fetching the full target registry");

    let records = client
        .fetch_all()
        .await
        .context("failed to fetch the target registry")?;

    let snapshot = Snapshot::from_records(records).context("registry listing is not snapshotable")?;
    let content = snapshot
        .to_json_pretty()
        .context("failed to serialize snapshot")?;

    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(out, content)
        .with_context(|| format!("failed to write snapshot to {}", out.display()))?;

    println!("Wrote {} targets to {}", snapshot.len(), out.display());
    Ok(())
}

fn print_record(record: &TargetRecord) {
    println!("{}:", record.product_code);
    println!("  Build target: {}", record.build_target);
    if let Some(name) = &record.board_name {
        println!("  Board: {}", name);
    }
    for (key, value) in &record.attributes {
        println!("  {}: {}", key, value);
    }
}
