//! Shared harness for relay integration tests: a real relay in front of a
//! fake backend socket, plus wire-format builders for handshake datagrams.

use grp_common::PacketProperty;
use grps::config::ServerConfig;
use grps::server::ServerState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

/// How long tests wait for a datagram that must arrive.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// How long tests listen for a datagram that must not arrive.
pub const SILENCE_WINDOW: Duration = Duration::from_millis(300);

/// Binds a fake backend, starts a relay in front of it, and returns the
/// relay's address, the backend socket, and the live server state.
pub async fn start_relay(
    max_idle_time: u64,
    use_challenge: bool,
) -> (SocketAddr, UdpSocket, Arc<ServerState>) {
    let backend = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let backend_addr = backend.local_addr().unwrap();

    let config = ServerConfig {
        listen: "127.0.0.1:0".parse().unwrap(),
        backend: backend_addr,
        metrics_addr: "127.0.0.1:0".parse().unwrap(),
        max_idle_time,
        sweep_interval: 1,
        use_challenge,
    };

    let state = ServerState::bind(config).await.unwrap();
    let relay_addr = state.local_addr().unwrap();

    tokio::spawn({
        let state = Arc::clone(&state);
        async move {
            let _ = grps::run(state).await;
        }
    });

    (relay_addr, backend, state)
}

/// Receives one datagram or panics after [`RECV_TIMEOUT`].
pub async fn recv_datagram(socket: &UdpSocket) -> (Vec<u8>, SocketAddr) {
    let mut buf = vec![0u8; 2048];
    let (len, from) = tokio::time::timeout(RECV_TIMEOUT, socket.recv_from(&mut buf))
        .await
        .expect("timed out waiting for datagram")
        .expect("socket recv failed");
    buf.truncate(len);
    (buf, from)
}

/// Asserts nothing arrives on `socket` within [`SILENCE_WINDOW`].
pub async fn expect_silence(socket: &UdpSocket) {
    let mut buf = vec![0u8; 2048];
    let result = tokio::time::timeout(SILENCE_WINDOW, socket.recv_from(&mut buf)).await;
    assert!(result.is_err(), "expected silence, got a datagram");
}

pub fn push_blob(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as i32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

pub fn push_string(buf: &mut Vec<u8>, text: &str) {
    push_blob(buf, text.as_bytes());
}

/// A fully well-formed full-walk handshake payload for the given user.
pub fn preauth_payload(challenge_id: i32, challenge_blob: &[u8], user_id: &str) -> Vec<u8> {
    let mut buf = vec![0u8];
    buf.extend_from_slice(&[4, 1, 2]); // version major/minor/revision
    buf.push(0); // no backward revision
    buf.extend_from_slice(&challenge_id.to_le_bytes());
    push_blob(&mut buf, challenge_blob);
    push_string(&mut buf, user_id);
    buf.extend_from_slice(&1_893_456_000i64.to_le_bytes()); // expiration
    buf.push(0); // trailing flags byte
    push_string(&mut buf, "XX"); // country region
    push_blob(&mut buf, &[0xbb; 16]); // signature region
    buf
}

/// Builds a ConnectRequest datagram: header byte, protocol id, connection
/// time, address-size discriminator, embedded address block, payload.
pub fn connect_request(
    connection_number: u8,
    connection_time: u64,
    addr_size: u8,
    payload: &[u8],
) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.push(((connection_number & 0x03) << 5) | PacketProperty::ConnectRequest as u8);
    buf.extend_from_slice(&11i32.to_le_bytes()); // protocol id
    buf.extend_from_slice(&connection_time.to_le_bytes());
    buf.push(addr_size);
    buf.extend(std::iter::repeat(0u8).take(addr_size as usize));
    buf.extend_from_slice(payload);
    buf
}
