//! Analyzer - CSV ingest gateway for the movie analysis pipeline
//!
//! # Usage
//!
//! ```bash
//! # Run the gateway
//! analyzer serve --config configs/gateway.toml
//!
//! # Upload a data directory and collect results
//! analyzer send --addr 127.0.0.1:9090 --data-dir data --output results
//! ```

mod cmd;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

use analyzer_config::{LogConfig, LogFormat, LogOutput};

/// Analyzer - CSV ingest gateway
#[derive(Parser, Debug)]
#[command(name = "analyzer")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the gateway server
    Serve(cmd::serve::ServeArgs),

    /// Upload CSV files to a gateway and write the query results
    Send(cmd::send::SendArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => cmd::serve::run(args, cli.log_level).await,
        Command::Send(args) => {
            init_logging(&LogConfig::default(), cli.log_level.as_deref())?;
            cmd::send::run(args).await
        }
    }
}

/// Initialize the tracing subscriber for logging
pub(crate) fn init_logging(config: &LogConfig, level: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_new(config.directive(level))
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match (config.format, config.output) {
        (LogFormat::Console, LogOutput::Stdout) => fmt::layer().with_target(true).boxed(),
        (LogFormat::Console, LogOutput::Stderr) => fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        (LogFormat::Json, LogOutput::Stdout) => fmt::layer().json().boxed(),
        (LogFormat::Json, LogOutput::Stderr) => {
            fmt::layer().json().with_writer(std::io::stderr).boxed()
        }
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    Ok(())
}
