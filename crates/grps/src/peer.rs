use crate::metrics::counters;
use crate::request;
use crate::server::{ServerState, MAX_DATAGRAM_SIZE};
use grp_common::PacketProperty;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

/// Per-remote-address relay.
///
/// Owns a dedicated socket towards the backend (distinct from the registry's
/// single inbound socket) so backend replies can be attributed to this peer,
/// and a task that pipes those replies straight back out. Created lazily on
/// the first datagram from a new address; destroyed by the idle sweep.
pub struct PeerRelay {
    addr: SocketAddr,
    backend: Arc<UdpSocket>,
    last_seen: Mutex<Instant>,
    reply_task: JoinHandle<()>,
}

impl PeerRelay {
    /// Binds a backend socket for this peer and starts the reply task that
    /// forwards every backend datagram byte-for-byte to the peer through the
    /// shared inbound socket.
    pub async fn connect(
        peer_addr: SocketAddr,
        backend_addr: SocketAddr,
        inbound: Arc<UdpSocket>,
    ) -> std::io::Result<Self> {
        let bind_addr: SocketAddr = if backend_addr.is_ipv4() {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let backend = UdpSocket::bind(bind_addr).await?;
        backend.connect(backend_addr).await?;
        let backend = Arc::new(backend);

        let reply_socket = Arc::clone(&backend);
        let reply_task = tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            loop {
                match reply_socket.recv(&mut buf).await {
                    Ok(len) => match inbound.send_to(&buf[..len], peer_addr).await {
                        Ok(sent) => {
                            counters::datagrams_relayed_total("to_peer");
                            counters::payload_bytes_total("to_peer", sent as u64);
                        }
                        Err(e) => {
                            counters::datagrams_dropped_total("peer_send");
                            tracing::debug!(peer = %peer_addr, "failed to relay backend reply: {}", e);
                        }
                    },
                    Err(e) => {
                        tracing::debug!(peer = %peer_addr, "backend socket error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            addr: peer_addr,
            backend,
            last_seen: Mutex::new(Instant::now()),
            reply_task,
        })
    }

    /// The remote peer's address.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Classifies one inbound datagram from the peer and routes it.
    ///
    /// Unverifiable datagrams are dropped silently; ConnectRequests go
    /// through preauthentication; everything else is forwarded opaquely.
    /// The rented packet frame is released on every path.
    pub async fn handle_datagram(&self, state: &Arc<ServerState>, datagram: &[u8]) {
        let packet = state.packet_pool.rent_from(datagram);
        if !packet.verify() {
            tracing::debug!(peer = %self.addr, len = datagram.len(), "dropping unverifiable datagram");
            counters::datagrams_dropped_total("unverified");
            state.packet_pool.release(packet);
            return;
        }

        match packet.property() {
            Some(PacketProperty::ConnectRequest) => {
                request::process(state, self, datagram, &packet).await;
            }
            Some(PacketProperty::Ping) => {
                // A ping is a liveness signal regardless of what the backend
                // answers to it.
                self.touch(Instant::now());
                self.forward_to_backend(datagram).await;
            }
            _ => {
                self.forward_to_backend(datagram).await;
            }
        }

        state.packet_pool.release(packet);
    }

    /// Forwards bytes to the backend unchanged. Send failures are logged and
    /// dropped, never retried.
    pub async fn forward_to_backend(&self, datagram: &[u8]) {
        match self.backend.send(datagram).await {
            Ok(sent) => {
                counters::datagrams_relayed_total("to_backend");
                counters::payload_bytes_total("to_backend", sent as u64);
            }
            Err(e) => {
                counters::datagrams_dropped_total("backend_send");
                tracing::debug!(peer = %self.addr, "failed to forward to backend: {}", e);
            }
        }
    }

    /// Records a liveness signal at `now`.
    pub fn touch(&self, now: Instant) {
        if let Ok(mut last_seen) = self.last_seen.lock() {
            *last_seen = now;
        }
    }

    /// Whether this peer has been silent longer than `max_idle` as of `now`.
    #[must_use]
    pub fn is_idle(&self, now: Instant, max_idle: Duration) -> bool {
        match self.last_seen.lock() {
            Ok(last_seen) => now.saturating_duration_since(*last_seen) > max_idle,
            Err(_) => false,
        }
    }
}

impl Drop for PeerRelay {
    fn drop(&mut self) {
        self.reply_task.abort();
    }
}
