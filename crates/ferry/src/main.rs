//! Ferry - Change-record pipelines
//!
//! # Usage
//!
//! ```bash
//! # Validate a configuration file and print the effective settings
//! ferry check --config configs/ferry.toml
//!
//! # Run both pipelines against in-memory collaborators
//! ferry simulate --records 50000 --duplicates 20
//! ferry --log-level debug simulate --config configs/ferry.toml
//! ```

mod cmd;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ferry_config::{Config, LogFormat};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Ferry - Change-record pipelines
#[derive(Parser, Debug)]
#[command(name = "ferry")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level or filter directive (trace, debug, info, warn, error).
    /// Overrides the config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load and validate a configuration file
    Check(cmd::check::CheckArgs),

    /// Run both pipelines against in-memory collaborators
    Simulate(cmd::simulate::SimulateArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Check(args) => {
            // Check prints to stdout, warnings only
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), LogFormat::Console)?;
            cmd::check::run(args)
        }
        Command::Simulate(args) => {
            let config = cmd::load_config(args.config.as_deref())?;
            let (level, format) = resolve_logging(cli.log_level.as_deref(), &config);
            init_logging(&level, format)?;

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(config.global.worker_threads)
                .enable_all()
                .build()
                .context("failed to build tokio runtime")?;
            runtime.block_on(cmd::simulate::run(args, config))
        }
    }
}

/// Resolve log level and format: CLI flag > config file > default "info"
fn resolve_logging(cli_level: Option<&str>, config: &Config) -> (String, LogFormat) {
    let level = cli_level
        .map(str::to_string)
        .unwrap_or_else(|| config.log.level.as_str().to_string());
    (level, config.log.format)
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    match format {
        LogFormat::Console => tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_current_span(false))
            .with(filter)
            .init(),
    }

    Ok(())
}
