use axum::{http::StatusCode, response::Json, routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Body served on `/health` and `/ready`.
#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    ready: bool,
}

/// Shared readiness flag, flipped off while the relay drains.
#[derive(Clone, Default)]
pub struct HealthState {
    ready: Arc<AtomicBool>,
}

impl HealthState {
    /// Create a new health state, ready by default.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Mark the relay as ready (or not) to take traffic.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// Check if the relay is ready to take traffic.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

/// Serves `/metrics`, `/health`, and `/ready` on `addr`.
///
/// # Errors
///
/// Returns an error if the Prometheus recorder cannot be installed or the
/// HTTP listener fails to bind.
pub async fn start_metrics_server(
    addr: SocketAddr,
    health_state: HealthState,
) -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    let render = move || {
        let handle = handle.clone();
        async move { handle.render() }
    };
    let app = Router::new()
        .route("/metrics", get(render))
        .route("/health", get(health_handler))
        .route("/ready", get(move || ready_handler(health_state.clone())));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("metrics server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Liveness: 200 whenever the process is up.
async fn health_handler() -> (StatusCode, Json<StatusResponse>) {
    (
        StatusCode::OK,
        Json(StatusResponse {
            status: "healthy",
            ready: true,
        }),
    )
}

/// Readiness: 200 while taking traffic, 503 while draining.
async fn ready_handler(state: HealthState) -> (StatusCode, Json<StatusResponse>) {
    if state.is_ready() {
        (
            StatusCode::OK,
            Json(StatusResponse {
                status: "ready",
                ready: true,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(StatusResponse {
                status: "draining",
                ready: false,
            }),
        )
    }
}

/// Peer count gauges.
pub mod gauges {
    /// Increment the active peers gauge.
    pub fn inc_peers_active() {
        metrics::gauge!("grp_peers_active").increment(1.0);
    }

    /// Decrement the active peers gauge.
    pub fn dec_peers_active() {
        metrics::gauge!("grp_peers_active").decrement(1.0);
    }
}

/// Event counters.
pub mod counters {
    /// Record a preauth decision with the given status label.
    pub fn preauth_total(status: &'static str) {
        metrics::counter!("grp_preauth_total", "status" => status).increment(1);
    }

    /// Record a datagram relayed in the given direction.
    pub fn datagrams_relayed_total(direction: &'static str) {
        metrics::counter!("grp_datagrams_relayed_total", "direction" => direction).increment(1);
    }

    /// Increment the dropped-datagrams counter with the given reason label.
    pub fn datagrams_dropped_total(reason: &'static str) {
        metrics::counter!("grp_datagrams_dropped_total", "reason" => reason).increment(1);
    }

    /// Record bytes relayed in the given direction.
    pub fn payload_bytes_total(direction: &'static str, bytes: u64) {
        metrics::counter!("grp_payload_bytes_total", "direction" => direction).increment(bytes);
    }
}

/// Latency histograms.
pub mod histograms {
    /// Record a datagram processing latency observation in seconds.
    pub fn relay_latency_seconds(value: f64) {
        metrics::histogram!("grp_relay_latency_seconds").record(value);
    }
}
