//! Serve command - run the gateway
//!
//! Loads configuration, connects to the broker, declares the exchanges and
//! queues the gateway publishes to and consumes from, then accepts clients
//! until SIGINT/SIGTERM.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tokio::signal;
use tracing::{info, warn};

use analyzer_config::Config;
use analyzer_gateway::{Gateway, Listener, connect_broker};

use crate::init_logging;

/// Config file used when `--config` is not given and it exists
const DEFAULT_CONFIG: &str = "configs/gateway.toml";

/// Serve command arguments
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Run the serve command
pub async fn run(args: ServeArgs, log_level: Option<String>) -> Result<()> {
    let (config, source) = load_config(args.config.as_deref())?;
    init_logging(&config.log, log_level.as_deref())?;

    let source = source
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "defaults".into());
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %source,
        "analyzer gateway starting"
    );

    let broker = connect_broker(&config.broker)
        .await
        .with_context(|| format!("failed to connect to broker at {}", config.broker.url))?;

    let server = config.server.clone();
    let mut gateway = Gateway::new(config, broker).context("failed to build gateway")?;
    gateway
        .declare_topology()
        .await
        .context("failed to declare broker topology")?;

    let listener = Listener::bind(&server.host, server.port, server.backlog)
        .await
        .with_context(|| format!("failed to bind {}:{}", server.host, server.port))?;

    let shutdown = listener.shutdown_token();
    tokio::spawn(async move {
        wait_for_shutdown().await;
        info!("shutdown signal received, finishing current connection");
        shutdown.cancel();
    });

    let served = gateway.run(&listener).await;
    listener.close();
    if let Err(e) = gateway.close().await {
        warn!(error = %e, "failed to close broker connection");
    }
    served.context("gateway stopped")?;

    info!("analyzer gateway stopped");
    Ok(())
}

/// Load the given file, or the default file when present, or defaults
fn load_config(path: Option<&Path>) -> Result<(Config, Option<PathBuf>)> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None if Path::new(DEFAULT_CONFIG).exists() => PathBuf::from(DEFAULT_CONFIG),
        None => return Ok((Config::default(), None)),
    };
    let config = Config::from_file(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    Ok((config, Some(path)))
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
