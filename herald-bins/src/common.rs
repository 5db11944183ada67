//! Common utilities for the binary
//!
//! CLI parsing, logging setup and configuration commands.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use herald_core::engine::EngineMetrics;
use herald_core::utils::init_logger;
use herald_core::AlertingConfig;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "herald.json";

#[derive(Parser, Debug)]
#[command(name = "herald", author, version, about = "Event-driven alerting engine")]
pub struct Cli {
    /// Log level (overridden by RUST_LOG)
    #[arg(short, long, global = true, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the engine until Ctrl+C
    Run(RunArgs),
    /// Parse and validate a configuration file
    CheckConfig {
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Write the default configuration
    InitConfig {
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Configuration file, created with defaults when missing
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Serve Prometheus metrics and /health on this address
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,

    /// Accept WebSocket subscribers on this address
    #[arg(long)]
    pub ws_addr: Option<SocketAddr>,

    /// Name of the configured websocket channel to serve
    #[arg(long, default_value = "websocket")]
    pub ws_channel: String,

    /// Drive the monitors with a synthetic market and strategy feed
    #[arg(long)]
    pub demo: bool,
}

pub fn init_logging(cli: &Cli) -> Result<()> {
    init_logger(&cli.log_level, cli.json_logs)
}

/// Load and validate `path`, returning a one-line summary
pub fn check_config(path: &Path) -> Result<String> {
    let config = AlertingConfig::load(path)
        .with_context(|| format!("Invalid configuration {}", path.display()))?;
    Ok(format!(
        "{}: {} channel(s), {} rule(s), engine {}",
        path.display(),
        config.channels.len(),
        config.rules.len(),
        if config.enabled { "enabled" } else { "disabled" }
    ))
}

pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    AlertingConfig::default()
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Default configuration written");
    Ok(())
}

/// Print final statistics
pub fn print_stats(metrics: &EngineMetrics) {
    info!("=== Final Statistics ===");
    info!("Rules: {} ({} active)", metrics.total_rules, metrics.active_rules);
    info!("Events processed: {}", metrics.events_processed);
    info!("Events dropped: {}", metrics.dropped_events);
    info!("Alerts created: {}", metrics.total_alerts);
    info!("Alerts processed: {}", metrics.processed_alerts);
    info!("Failed deliveries: {}", metrics.failed_alerts);

    if metrics.events_processed > 0 {
        info!("Avg evaluation time: {:?}", metrics.avg_processing_time());
    }
    for (channel, count) in &metrics.alerts_by_channel {
        info!("Delivered via {}: {}", channel, count);
    }
}
