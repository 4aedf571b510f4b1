//! nodeline -- line-oriented TCP node registry server.
//!
//! Crash-only design: every startup is a recovery.  The registry file is
//! loaded before the listener binds, and a corrupt file aborts startup.
//! SIGTERM/SIGINT stop accepting connections and wait, with a timeout, for
//! open connections to finish their current line.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use nodeline::config::{Config, LoggingConfig};
use nodeline::registry::NodeRegistry;

/// Command-line arguments for the nodeline server.
#[derive(Parser, Debug)]
#[command(name = "nodeline", version, about = "Line-oriented TCP node registry")]
struct Cli {
    /// Path to the YAML configuration file.  Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => nodeline::config::load_config(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    init_tracing(&config.logging);
    match &cli.config {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("No configuration file given; using defaults"),
    }

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics {
        let metrics_addr: SocketAddr = format!(
            "{}:{}",
            config.observability.metrics_host, config.observability.metrics_port
        )
        .parse()
        .context("invalid metrics listen address")?;
        nodeline::metrics::init_metrics(metrics_addr)?;
        info!("Prometheus metrics listening on {}", metrics_addr);
    }

    // Crash-only startup: loading the registry IS recovery.
    let registry_path = PathBuf::from(&config.registry.path);
    if let Some(parent) = registry_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let registry = NodeRegistry::open(&registry_path)
        .with_context(|| format!("failed to open node registry {}", registry_path.display()))?;
    info!("Node registry initialized at {}", registry_path.display());

    let state = Arc::new(nodeline::AppState {
        config,
        registry: Arc::new(registry),
    });

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("nodeline listening on {}", listener.local_addr()?);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    nodeline::server::serve(listener, state, shutdown).await?;

    info!("nodeline shut down");
    Ok(())
}

/// Initialize the global tracing subscriber.  `RUST_LOG` takes precedence
/// over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
