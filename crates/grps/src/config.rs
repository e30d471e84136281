use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// CLI arguments for the relay server.
#[derive(Parser, Debug, Clone)]
#[command(name = "grps")]
#[command(about = "GRP preauthenticating UDP relay")]
#[command(version)]
pub struct Args {
    /// Socket address to listen on for game traffic.
    #[arg(long, default_value = "0.0.0.0:7777", env = "GRPS_LISTEN")]
    pub listen: SocketAddr,
    /// Socket address of the backend game server.
    #[arg(long, default_value = "127.0.0.1:7778", env = "GRPS_BACKEND")]
    pub backend: SocketAddr,
    /// Socket address for the metrics endpoint.
    #[arg(long, default_value = "127.0.0.1:9090", env = "GRPS_METRICS")]
    pub metrics_addr: SocketAddr,
    /// Seconds a peer may stay silent before the idle sweep evicts it.
    #[arg(long, default_value = "90", env = "GRPS_MAX_IDLE_TIME")]
    pub max_idle_time: u64,
    /// Seconds between idle-sweep ticks.
    #[arg(long, default_value = "1", env = "GRPS_SWEEP_INTERVAL")]
    pub sweep_interval: u64,
    /// Enforce the handshake challenge exchange.
    #[arg(long, env = "GRPS_USE_CHALLENGE")]
    pub use_challenge: bool,
}

/// Runtime configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to listen on for game traffic.
    pub listen: SocketAddr,
    /// Socket address of the backend game server.
    pub backend: SocketAddr,
    /// Socket address for the metrics endpoint.
    pub metrics_addr: SocketAddr,
    /// Seconds a peer may stay silent before the idle sweep evicts it.
    pub max_idle_time: u64,
    /// Seconds between idle-sweep ticks.
    pub sweep_interval: u64,
    /// Enforce the handshake challenge exchange.
    pub use_challenge: bool,
}

impl ServerConfig {
    /// Validates the configuration values are within acceptable bounds.
    /// Returns Ok(()) if valid, Err with description otherwise.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_idle_time == 0 {
            return Err("max_idle_time must be greater than 0".to_string());
        }
        if self.max_idle_time > 86_400 {
            return Err(
                "max_idle_time exceeds reasonable limit (86400 seconds / 1 day)".to_string(),
            );
        }

        if self.sweep_interval == 0 {
            return Err("sweep_interval must be greater than 0".to_string());
        }
        if self.sweep_interval > 3600 {
            return Err("sweep_interval exceeds reasonable limit (3600 seconds)".to_string());
        }

        if self.listen == self.backend {
            return Err("backend must differ from the listen address".to_string());
        }
        Ok(())
    }

    /// Peer idle timeout as a [`Duration`].
    #[must_use]
    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_time)
    }

    /// Sweep tick interval as a [`Duration`].
    #[must_use]
    pub fn sweep(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            listen: args.listen,
            backend: args.backend,
            metrics_addr: args.metrics_addr,
            max_idle_time: args.max_idle_time,
            sweep_interval: args.sweep_interval,
            use_challenge: args.use_challenge,
        }
    }
}
