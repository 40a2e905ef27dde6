//! d2cc daemon
//!
//! Listens on a local Unix socket, rebuilds the compile requests that `d2cc`
//! wrappers stream to it and hands each committed request to an executor.

#![forbid(unsafe_code)]

mod connection;
mod events;
mod executor;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use connection::ConnectionContext;
use d2cc_common::config::{LoadedConfig, load_config, load_config_from};
use events::EventBus;
use executor::LoggingExecutor;

#[derive(Parser)]
#[command(name = "d2ccd")]
#[command(author, version, about = "d2cc daemon - receives compile requests from d2cc wrappers")]
struct Cli {
    /// Path to Unix socket (overrides config and D2CC_SOCKET)
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Path to config file (defaults to D2CC_CONFIG or the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum concurrent client channels
    #[arg(long)]
    max_connections: Option<usize>,

    /// Write session events to stdout as JSON lines
    #[arg(long)]
    events: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("D2CC_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load(cli: &Cli) -> Result<LoadedConfig> {
    let loaded = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    };
    let loaded = loaded.map_err(|e| {
        let code = e.code();
        anyhow::Error::new(e).context(code.code_string())
    })?;
    for err in &loaded.env_errors {
        warn!("{}", err);
    }
    Ok(loaded)
}

/// Copy every event to stdout until the bus closes.
async fn print_events(mut rx: broadcast::Receiver<String>) {
    let mut stdout = tokio::io::stdout();
    loop {
        match rx.recv().await {
            Ok(line) => {
                if stdout.write_all(line.as_bytes()).await.is_err()
                    || stdout.write_all(b"\n").await.is_err()
                    || stdout.flush().await.is_err()
                {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("event output lagged, {} events dropped", n);
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Resolves on SIGINT or SIGTERM. The SIGTERM handler is installed on call.
fn shutdown_signal() -> impl std::future::Future<Output = ()> {
    use tokio::signal::unix::{SignalKind, signal};

    let term = signal(SignalKind::terminate());
    async move {
        match term {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let loaded = load(&cli)?;
    let mut config = loaded.config;
    if let Some(socket) = cli.socket.clone() {
        config.general.socket_path = socket;
    }
    if let Some(max) = cli.max_connections {
        config.daemon.max_connections = max;
    }
    if let Some(path) = &loaded.path {
        info!("Loaded config from {:?}", path);
    }

    info!("Starting d2cc daemon...");
    let shutdown = shutdown_signal();

    let socket = config.general.socket_path.clone();
    let listener = server::bind(&socket)?;
    info!("Listening on {:?}", socket);

    let events = EventBus::default();
    if cli.events {
        tokio::spawn(print_events(events.subscribe()));
    }

    let ctx = ConnectionContext {
        events,
        executor: Arc::new(LoggingExecutor),
        max_request_bytes: config.daemon.max_request_bytes,
    };

    let served = server::serve(
        listener,
        ctx,
        config.daemon.max_connections,
        shutdown,
    )
    .await;

    std::fs::remove_file(&socket)
        .with_context(|| format!("failed to remove socket {}", socket.display()))?;
    served
}
