//! worldstats - country indicator time series over HTTP
//!
//! Usage:
//!     worldstats [--config <path>]
//!
//! See --help for more options.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use worldstats::api::{ApiServer, StaticFiles};
use worldstats::config::{load_config, validate_config, Config};
use worldstats::metrics::{MetricsCollector, MetricsServer};
use worldstats::store::{open_store, DatasetWatcher, MeasurementStore, UnavailableStore};
use worldstats::util::{init_logging, ShutdownSignal};
use worldstats::AppState;

/// Serves population, GDP and life expectancy time series as JSON.
#[derive(Parser, Debug)]
#[command(name = "worldstats")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file; built-in defaults apply when omitted
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Override the API listen port
    #[arg(long, env = "PORT", value_name = "PORT")]
    port: Option<u16>,

    /// Override the store: an http(s) PostgREST URL or a dataset path
    #[arg(long, env = "STORE_URI", value_name = "URI")]
    store_uri: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path).with_context(|| {
            format!("failed to load configuration from '{}'", path.display())
        })?,
        None => Config::default(),
    };

    // Environment and CLI overrides, then validate the merged result
    if let Some(port) = cli.port {
        config.apply_port(port);
    }
    if let Some(uri) = cli.store_uri.as_deref() {
        config.store.apply_uri(uri);
    }
    if let Some(level) = &cli.log_level {
        config.global.log_level = level.clone();
    }
    validate_config(&config)
        .map_err(|e| anyhow!(e))
        .context("invalid configuration")?;

    init_logging(&config.global.log_level, &config.global.log_format)
        .context("failed to initialize logging")?;

    if cli.validate {
        info!("Configuration is valid");
        println!("Configuration is valid.");
        println!("  Listen: {}", config.server.listen);
        println!("  Store: {:?}", config.store.kind);
        if let Some(dir) = &config.server.static_dir {
            println!("  Static files: {}", dir.display());
        }
        if config.global.metrics.enabled {
            println!(
                "  Metrics: {}{}",
                config.global.metrics.address, config.global.metrics.path
            );
        }
        return Ok(());
    }

    info!(
        config_path = ?cli.config,
        listen = %config.server.listen,
        store = ?config.store.kind,
        "worldstats starting"
    );

    run(config)
}

/// Build the runtime and run until shutdown.
fn run(config: Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async { run_async(config).await })
}

async fn run_async(config: Config) -> Result<()> {
    let shutdown = ShutdownSignal::new();
    let metrics = MetricsCollector::new();
    let mut handles = Vec::new();

    // Open the store; without one the API keeps answering with 500s
    let (store, reloadable) = match open_store(&config.store).await {
        Ok(opened) => {
            metrics.set_store_up(true);
            (opened.store, opened.reloadable)
        }
        Err(e) if config.store.required => {
            return Err(anyhow!(e)).context("failed to open measurement store");
        }
        Err(e) => {
            error!(error = %e, "failed to open measurement store, running degraded");
            metrics.set_store_up(false);
            let store: Arc<dyn MeasurementStore> = Arc::new(UnavailableStore::new(e.to_string()));
            (store, None)
        }
    };

    if let Some(memory) = &reloadable {
        metrics.set_dataset_records(memory.len());

        if config.store.watch {
            match memory.source() {
                Some(path) => {
                    let watcher = DatasetWatcher::new(
                        path.to_path_buf(),
                        Arc::clone(memory),
                        metrics.clone(),
                    );
                    let rx = shutdown.subscribe();
                    handles.push(tokio::spawn(async move { watcher.run(rx).await }));
                }
                None => warn!("store.watch is set but the dataset has no source path"),
            }
        }
    }

    if config.global.metrics.enabled {
        let server = MetricsServer::new(
            config.global.metrics.address,
            config.global.metrics.path.clone(),
            metrics.clone(),
        );
        let rx = shutdown.subscribe();
        handles.push(tokio::spawn(async move { server.run(rx).await }));
    }

    let static_files = config.server.static_dir.clone().map(StaticFiles::new);
    let state = AppState::new(store, config.server.query_timeout, static_files, metrics);

    let server = ApiServer::bind(config.server.listen, state)
        .await
        .with_context(|| format!("failed to bind API server on {}", config.server.listen))?;
    let rx = shutdown.subscribe();
    handles.push(tokio::spawn(async move { server.run(rx).await }));

    info!("worldstats is running");
    info!("press Ctrl+C to stop");

    shutdown.trigger_on_signal().await;

    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "task did not shut down cleanly");
        }
    }

    info!("worldstats shut down complete");
    Ok(())
}
