//! `arbor`: serves the demo route tree.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use arbor_runtime::cache::{ModuleCache, ModuleRegistry, ModuleWatcher};
use arbor_runtime::config::{load_config, override_bind, RuntimeConfig};
use arbor_runtime::cookies::CookieSigner;
use arbor_runtime::demo;
use arbor_runtime::dispatch::{spawn_invalidation_task, Dispatcher};
use arbor_runtime::http::HttpServer;
use arbor_runtime::lifecycle::{shutdown_signal, Shutdown};
use arbor_runtime::observability::{logging, metrics};
use arbor_runtime::routing::StaticSource;

#[derive(Debug, Parser)]
#[command(name = "arbor", version, about = "File-convention HTTP dispatch runtime")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RuntimeConfig::default(),
    };
    let config = override_bind(config, cli.bind)?;

    logging::init_logging(&config.observability)?;

    tracing::info!("arbor v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        module_load_ms = config.timeouts.module_load_ms,
        watch = config.watch.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let signer = Arc::new(CookieSigner::from_config(&config.cookies)?);

    let root = std::path::absolute(&config.watch.root)?;
    let registry = ModuleRegistry::new();
    demo::register_modules(&registry, &root);
    let table = demo::route_table(&root)?;

    let modules = Arc::new(
        ModuleCache::new(Arc::new(registry))
            .with_load_timeout(Duration::from_millis(config.timeouts.module_load_ms)),
    );
    let dispatcher = Arc::new(Dispatcher::new(
        modules,
        Arc::new(StaticSource::new(table)),
        signer,
    ));

    let shutdown = Shutdown::new();

    // Keep the watcher handle alive for the lifetime of the server.
    let _watcher = if config.watch.enabled {
        let (watcher, events) = ModuleWatcher::new(
            &root,
            Duration::from_millis(config.watch.poll_interval_ms),
        );
        let handle = watcher.run()?;
        spawn_invalidation_task(Arc::clone(&dispatcher), events, shutdown.subscribe());
        Some(handle)
    } else {
        None
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config, dispatcher);
    let server_shutdown = shutdown.subscribe();
    let serve = tokio::spawn(server.run(listener, server_shutdown));

    shutdown_signal().await;
    shutdown.trigger();
    serve.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
