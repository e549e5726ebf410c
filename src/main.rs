use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use bubble_arena::app;
use bubble_arena::config::SimConfig;
use bubble_arena::metrics::{self, Metrics};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging (RUST_LOG overrides the default level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Bubble Arena v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = SimConfig::load_or_default();
    config.validate()?;
    info!(
        "Configuration loaded: {}x{} arena, mode={}, tick={}ms, speed={}",
        config.arena.width,
        config.arena.height,
        config.round.mode.as_str(),
        config.round.tick_ms,
        config.round.speed_multiplier
    );

    let metrics = Arc::new(Metrics::new());

    if let Some(port) = config.runner.metrics_port {
        let metrics_clone = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics::start_metrics_server(metrics_clone, port).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    tokio::select! {
        result = app::run(config, metrics.clone()) => {
            let summary = result?;
            info!(
                "Round over: {:?} after {} ticks ({} ms simulated), winners: {:?}",
                summary.outcome, summary.ticks, summary.time_ms, summary.winners
            );
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    info!("Simulator stopped");
    Ok(())
}
