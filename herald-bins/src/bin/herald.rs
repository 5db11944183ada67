//! Herald alerting engine
//!
//! ```text
//! herald init-config --config herald.json
//! herald check-config --config herald.json
//! herald run --config herald.json --metrics-addr 127.0.0.1:9090 --ws-addr 127.0.0.1:9091 --demo
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use herald_bins::common::{check_config, init_config, init_logging, print_stats, Cli, Command, RunArgs};
use herald_bins::{demo, ws};
use herald_core::monitoring::{HealthProbe, MetricsServer, MetricsServerConfig};
use herald_core::AlertManager;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    match cli.command {
        Command::Run(args) => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .thread_name("herald")
                .build()
                .context("Failed to build tokio runtime")?;
            runtime.block_on(run(args))
        }
        Command::CheckConfig { config } => {
            let summary = check_config(&config)?;
            println!("{}", summary);
            Ok(())
        }
        Command::InitConfig { config, force } => init_config(&config, force),
    }
}

async fn run(args: RunArgs) -> Result<()> {
    info!("=== Herald: alerting engine ===");
    info!("Config: {}", args.config.display());

    let manager = AlertManager::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    manager.start()?;

    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("Received Ctrl+C, initiating graceful shutdown...");
        cancel_ctrlc.cancel();
    })?;

    let mut tasks: JoinSet<(&'static str, Result<()>)> = JoinSet::new();

    if let Some(listen_addr) = args.metrics_addr {
        let engine = Arc::clone(manager.engine());
        let probe: HealthProbe = Arc::new(move || {
            serde_json::json!({
                "status": engine.state().to_string(),
                "metrics": engine.metrics(),
            })
        });
        let server = MetricsServer::new(
            MetricsServerConfig {
                listen_addr,
                ..Default::default()
            },
            manager.engine().prometheus().clone(),
        )
        .with_health_probe(probe);
        let cancel = cancel.clone();
        tasks.spawn(async move { ("metrics server", server.serve(cancel).await) });
    }

    if let Some(ws_addr) = args.ws_addr {
        match manager.websocket(&args.ws_channel) {
            Some(channel) => {
                let cancel = cancel.clone();
                tasks.spawn(async move { ("websocket server", ws::serve(ws_addr, channel, cancel).await) });
            }
            None => warn!(
                channel = %args.ws_channel,
                "--ws-addr given but no websocket channel with that name is configured"
            ),
        }
    }

    if args.demo {
        let engine = Arc::clone(manager.engine());
        let channels = manager.config().channels.iter().map(|c| c.name.clone()).collect();
        let cancel = cancel.clone();
        tasks.spawn(async move { ("demo feed", demo::run(engine, channels, cancel).await) });
    }

    info!("Running. Press Ctrl+C to stop.");

    // A background task ending early also shuts everything down
    tokio::select! {
        _ = cancel.cancelled() => {}
        Some(joined) = tasks.join_next() => {
            report(joined);
            cancel.cancel();
        }
    }

    while let Some(joined) = tasks.join_next().await {
        report(joined);
    }

    manager.shutdown().await?;
    print_stats(&manager.engine().metrics());
    Ok(())
}

fn report(joined: std::result::Result<(&'static str, Result<()>), tokio::task::JoinError>) {
    match joined {
        Ok((task, Ok(()))) => info!(task, "Task finished"),
        Ok((task, Err(e))) => error!(task, error = %format!("{:#}", e), "Task failed"),
        Err(e) => error!(error = %e, "Task panicked"),
    }
}
