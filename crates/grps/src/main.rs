#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use grps::config::{Args, ServerConfig};
use grps::metrics::{start_metrics_server, HealthState};
use grps::server::ServerState;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config: ServerConfig = args.into();

    // Validate configuration before binding anything
    if let Err(e) = config.validate() {
        anyhow::bail!("configuration error: {}", e);
    }

    let metrics_addr = config.metrics_addr;
    let state = ServerState::bind(config).await?;
    info!("bound to {}", state.local_addr()?);

    let health_state = HealthState::new();

    tokio::spawn({
        let health_state = health_state.clone();
        async move {
            if let Err(e) = start_metrics_server(metrics_addr, health_state).await {
                warn!("metrics server error: {}", e);
            }
        }
    });

    tokio::select! {
        result = grps::run(state) => {
            if let Err(e) = result {
                tracing::error!("relay error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    Ok(())
}
