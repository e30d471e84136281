use crate::config::ServerConfig;
use crate::error::RelayError;
use crate::metrics::{counters, gauges, histograms};
use crate::peer::PeerRelay;
use crate::preauth::ChallengeRegistry;
use dashmap::DashMap;
use grp_common::{PacketPool, ReaderPool};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// Largest datagram the relay will move in either direction.
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Shared state for the relay server.
pub struct ServerState {
    /// Runtime server configuration.
    pub config: ServerConfig,
    /// The single inbound socket peers talk to.
    pub socket: Arc<UdpSocket>,
    /// Active peer relays keyed by remote `ip:port`.
    pub peers: DashMap<SocketAddr, Arc<PeerRelay>>,
    /// Free-list of packet frames for the datagram hot path.
    pub packet_pool: PacketPool,
    /// Free-list of handshake payload readers.
    pub reader_pool: ReaderPool,
    /// Issued handshake challenge ids awaiting completion.
    pub challenges: ChallengeRegistry,
}

impl ServerState {
    /// Validates the configuration, binds the inbound socket, and assembles
    /// fresh state around it.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is invalid or the socket
    /// cannot be bound.
    pub async fn bind(config: ServerConfig) -> Result<Arc<Self>, RelayError> {
        config.validate().map_err(RelayError::Config)?;
        let socket = UdpSocket::bind(config.listen).await?;
        Ok(Arc::new(Self {
            config,
            socket: Arc::new(socket),
            peers: DashMap::new(),
            packet_pool: PacketPool::default(),
            reader_pool: ReaderPool::default(),
            challenges: ChallengeRegistry::default(),
        }))
    }

    /// The address the inbound socket actually bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.socket.local_addr()?)
    }
}

/// # Errors
///
/// Returns an error if the receive loop encounters a fatal I/O failure.
pub async fn run(state: Arc<ServerState>) -> Result<(), RelayError> {
    let (shutdown_tx, _) = tokio::sync::watch::channel(());
    run_with_shutdown(state, shutdown_tx).await
}

/// Run the relay loop with an externally-controlled shutdown signal.
///
/// Inbound datagrams and the idle-sweep timer are serviced from this single
/// loop, so no two datagrams are ever processed concurrently and the pools
/// see strictly sequential access. When the `shutdown_tx` sender signals or
/// is dropped, the loop stops and the peer registry is torn down.
///
/// # Errors
///
/// Returns an error if the receive loop encounters a fatal I/O failure.
pub async fn run_with_shutdown(
    state: Arc<ServerState>,
    shutdown_tx: tokio::sync::watch::Sender<()>,
) -> Result<(), RelayError> {
    let local_addr = state.local_addr()?;
    info!(
        "relay listening on {} for backend {}",
        local_addr, state.config.backend
    );
    let mut shutdown_rx = shutdown_tx.subscribe();
    let mut sweep = tokio::time::interval(state.config.sweep());
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            result = state.socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, peer_addr)) => {
                        let start = Instant::now();
                        dispatch(&state, &buf[..len], peer_addr).await;
                        histograms::relay_latency_seconds(start.elapsed().as_secs_f64());
                    }
                    Err(e) => {
                        // ICMP-induced per-datagram errors are routine on UDP
                        // sockets and never fatal.
                        warn!("failed to receive datagram: {}", e);
                    }
                }
            }
            _ = sweep.tick() => {
                sweep_idle_peers(&state, Instant::now());
            }
            _ = shutdown_rx.changed() => {
                info!("shutdown signal received, dropping {} peers", state.peers.len());
                break;
            }
        }
    }

    state.peers.clear();
    info!("relay shut down gracefully");
    Ok(())
}

/// Looks up or lazily creates the peer relay for `peer_addr` and hands it
/// the datagram.
async fn dispatch(state: &Arc<ServerState>, datagram: &[u8], peer_addr: SocketAddr) {
    let relay = match state.peers.get(&peer_addr) {
        Some(entry) => Arc::clone(entry.value()),
        None => {
            match PeerRelay::connect(peer_addr, state.config.backend, Arc::clone(&state.socket))
                .await
            {
                Ok(relay) => {
                    let relay = Arc::new(relay);
                    debug!(peer = %peer_addr, "new peer relay");
                    state.peers.insert(peer_addr, Arc::clone(&relay));
                    gauges::inc_peers_active();
                    relay
                }
                Err(e) => {
                    warn!(peer = %peer_addr, "failed to open backend socket: {}", e);
                    counters::datagrams_dropped_total("no_backend_socket");
                    return;
                }
            }
        }
    };

    relay.handle_datagram(state, datagram).await;
}

/// Evicts every relay idle past the configured timeout and expires stale
/// challenge entries.
///
/// Eviction removes only the registry entry; dropping the relay aborts its
/// backend reply task, and the relay owns no listening resource beyond that.
pub fn sweep_idle_peers(state: &ServerState, now: Instant) {
    let max_idle = state.config.max_idle();
    let expired: Vec<SocketAddr> = state
        .peers
        .iter()
        .filter(|entry| entry.value().is_idle(now, max_idle))
        .map(|entry| *entry.key())
        .collect();

    for peer_addr in expired {
        if state.peers.remove(&peer_addr).is_some() {
            gauges::dec_peers_active();
            debug!(peer = %peer_addr, "evicted idle peer");
        }
    }

    state.challenges.evict_expired(now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn test_state() -> Arc<ServerState> {
        let config = ServerConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            backend: "127.0.0.1:1".parse().unwrap(),
            metrics_addr: "127.0.0.1:9090".parse().unwrap(),
            max_idle_time: 90,
            sweep_interval: 1,
            use_challenge: false,
        };
        ServerState::bind(config).await.unwrap()
    }

    async fn insert_peer(state: &Arc<ServerState>, peer_addr: SocketAddr) {
        let relay = PeerRelay::connect(peer_addr, state.config.backend, Arc::clone(&state.socket))
            .await
            .unwrap();
        state.peers.insert(peer_addr, Arc::new(relay));
    }

    #[tokio::test]
    async fn bind_rejects_invalid_config() {
        let config = ServerConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            backend: "127.0.0.1:1".parse().unwrap(),
            metrics_addr: "127.0.0.1:9090".parse().unwrap(),
            max_idle_time: 0,
            sweep_interval: 1,
            use_challenge: false,
        };
        assert!(matches!(
            ServerState::bind(config).await,
            Err(RelayError::Config(_))
        ));
    }

    #[tokio::test]
    async fn sweep_keeps_peer_inside_idle_window() {
        let state = test_state().await;
        let peer_addr: SocketAddr = "127.0.0.1:50001".parse().unwrap();
        insert_peer(&state, peer_addr).await;

        let now = Instant::now();
        sweep_idle_peers(&state, now + state.config.max_idle());
        assert!(state.peers.contains_key(&peer_addr));
    }

    #[tokio::test]
    async fn sweep_evicts_peer_past_idle_window() {
        let state = test_state().await;
        let peer_addr: SocketAddr = "127.0.0.1:50002".parse().unwrap();
        insert_peer(&state, peer_addr).await;

        let now = Instant::now();
        sweep_idle_peers(
            &state,
            now + state.config.max_idle() + Duration::from_secs(1),
        );
        assert!(!state.peers.contains_key(&peer_addr));
    }

    #[tokio::test]
    async fn sweep_only_evicts_idle_peers() {
        let state = test_state().await;
        let idle_addr: SocketAddr = "127.0.0.1:50003".parse().unwrap();
        let live_addr: SocketAddr = "127.0.0.1:50004".parse().unwrap();
        insert_peer(&state, idle_addr).await;
        insert_peer(&state, live_addr).await;

        let now = Instant::now();
        let sweep_at = now + state.config.max_idle() + Duration::from_secs(1);
        if let Some(live) = state.peers.get(&live_addr) {
            live.touch(sweep_at);
        }

        sweep_idle_peers(&state, sweep_at);
        assert!(!state.peers.contains_key(&idle_addr));
        assert!(state.peers.contains_key(&live_addr));
    }

    #[tokio::test]
    async fn sweep_expires_challenge_entries() {
        let state = test_state().await;
        let peer_addr: SocketAddr = "127.0.0.1:50005".parse().unwrap();
        let issued = Instant::now();
        assert!(state.challenges.issue(peer_addr, issued, || 9).is_some());

        sweep_idle_peers(&state, issued + Duration::from_secs(121));
        assert!(state.challenges.is_empty());
    }
}
