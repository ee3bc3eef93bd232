//! Store LRU - command line access to persistent caches
//!
//! Opens one named cache over the file storage and runs a single operation
//! on it. Values are JSON; anything that does not parse is stored as a string.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use store_lru::{spawn_prune_task, CacheOptions, CacheRegistry, Config, Put};

#[derive(Parser)]
#[command(name = "store_lru")]
#[command(about = "Inspect and edit persistent LRU caches", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Cache id
    #[arg(short, long, default_value = "default", global = true)]
    cache: String,

    /// Maximum number of entries
    #[arg(long, global = true)]
    capacity: Option<usize>,

    /// Maximum total size in serialized characters
    #[arg(long, global = true)]
    max_length: Option<usize>,

    /// Entries older than this many milliseconds are dropped
    #[arg(long, global = true)]
    max_age_ms: Option<u64>,

    /// Storage file (overrides STORE_LRU_STORAGE_PATH)
    #[arg(short, long, global = true)]
    storage: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a value
    Put {
        key: String,
        /// JSON value, or a plain string
        value: String,
    },

    /// Print a value
    Get { key: String },

    /// Remove one entry
    Remove { key: String },

    /// Remove every entry
    Clear,

    /// List keys, most recently used first
    Keys,

    /// Drop entries older than the max age
    Prune,

    /// Show configuration and occupancy
    Info,

    /// Delete the cache and all of its records
    Destroy,

    /// Keep the cache open and prune it every STORE_LRU_PRUNE_INTERVAL
    /// seconds until interrupted
    Watch,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Defaults to "store_lru=info", can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "store_lru=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(path) = cli.storage {
        config.storage_path = path;
    }
    info!(
        "Configuration loaded: namespace={}, storage={}, quota={}, prune_interval={}s",
        config.namespace,
        config.storage_path.display(),
        config.storage_quota,
        config.prune_interval
    );

    let registry = CacheRegistry::from_config(&config).context("Failed to open storage")?;

    let mut options = CacheOptions::<Value>::new();
    if let Some(capacity) = cli.capacity {
        options = options.capacity(capacity);
    }
    if let Some(max_length) = cli.max_length {
        options = options.max_length(max_length);
    }
    if let Some(max_age_ms) = cli.max_age_ms {
        options = options.max_age(Duration::from_millis(max_age_ms));
    }
    let cache = registry
        .create(&cli.cache, options)
        .with_context(|| format!("Failed to open cache '{}'", cli.cache))?;

    let mut missed = false;
    match cli.command {
        Commands::Put { key, value } => {
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            match cache.put(&key, value)? {
                Put::Stored(_) => info!("Stored '{}'", key),
                Put::Volatile(_) => warn!("Storage is full, '{}' was not persisted", key),
                Put::Rejected => warn!("'{}' is larger than the cache bound", key),
            }
        }

        Commands::Get { key } => match cache.get_value(&key) {
            Some(value) => println!("{}", value),
            None => {
                warn!("'{}' not found", key);
                missed = true;
            }
        },

        Commands::Remove { key } => {
            if !cache.remove(&key) {
                warn!("'{}' not found", key);
            }
        }

        Commands::Clear => cache.remove_all(),

        Commands::Keys => {
            for key in cache.keys() {
                println!("{}", key);
            }
        }

        Commands::Prune => {
            let removed = cache.prune();
            info!("Pruned {} stale entries", removed);
        }

        Commands::Info => {
            println!("{}", serde_json::to_string_pretty(&cache.info())?);
        }

        Commands::Destroy => {
            cache.destroy();
            info!("Cache '{}' destroyed", cli.cache);
            return Ok(());
        }

        Commands::Watch => {
            let prune_handle = spawn_prune_task(cache.clone(), config.prune_every());
            info!("Watching '{}', press Ctrl+C to stop", cli.cache);
            shutdown_signal(prune_handle).await?;
        }
    }

    cache.close();
    if missed {
        std::process::exit(1);
    }
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM, then stops the prune task.
async fn shutdown_signal(prune_handle: JoinHandle<()>) -> Result<()> {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;
    #[cfg(unix)]
    let terminate = sigterm.recv();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    tokio::select! {
        result = ctrl_c => {
            result.context("Failed to install Ctrl+C handler")?;
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    prune_handle.abort();
    warn!("Prune task aborted");
    Ok(())
}
