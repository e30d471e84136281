use crate::metrics::counters;
use crate::peer::PeerRelay;
use crate::preauth::{preauthenticate, PreauthOutcome};
use crate::server::ServerState;
use grp_common::packet::encode_disconnect;
use grp_common::types::connect_request;
use grp_common::{Packet, RejectionReason};
use std::sync::Arc;

/// Bridges a verified ConnectRequest packet to the preauth engine and
/// realizes the outcome on the wire: accepted requests reach the backend as
/// the original untouched bytes, rejected ones are answered with a
/// synthesized Disconnect, and anything structurally foreign is dropped
/// without a response.
pub async fn process(
    state: &Arc<ServerState>,
    peer: &PeerRelay,
    datagram: &[u8],
    packet: &Packet,
) {
    let Some(payload) = extract_payload(packet) else {
        // Routine malformed/foreign traffic; a response would only feed
        // scanners.
        counters::datagrams_dropped_total("malformed_request");
        return;
    };

    let mut reader = state.reader_pool.rent_from(payload);
    let outcome = preauthenticate(
        &mut reader,
        peer.addr(),
        &state.challenges,
        state.config.use_challenge,
    );
    state.reader_pool.release(reader);

    match outcome {
        PreauthOutcome::Accept => accept(peer, datagram).await,
        PreauthOutcome::Reject(reason) => reject(state, peer, packet, reason).await,
    }
}

/// Slices the opaque handshake payload out of a ConnectRequest.
///
/// Requires a connection number within protocol range and an address-size
/// discriminator of 16 or 28 at its fixed offset; anything else means the
/// datagram is not a handshake this relay should answer.
fn extract_payload(packet: &Packet) -> Option<&[u8]> {
    if packet.connection_number() >= connect_request::MAX_CONNECTION_NUMBER {
        return None;
    }
    let data = packet.as_bytes();
    let addr_size = *data.get(connect_request::ADDR_SIZE_OFFSET)?;
    if addr_size != connect_request::ADDR_SIZE_V4 && addr_size != connect_request::ADDR_SIZE_V6 {
        return None;
    }
    let start = connect_request::PAYLOAD_BASE_OFFSET + addr_size as usize;
    Some(data.get(start..).unwrap_or(&[]))
}

async fn accept(peer: &PeerRelay, datagram: &[u8]) {
    tracing::info!(peer = %peer.addr(), "connection request accepted");
    counters::preauth_total("accepted");
    // The backend runs the same handshake validation itself, so it must see
    // the original bytes, never a re-encoding.
    peer.forward_to_backend(datagram).await;
}

async fn reject(
    state: &Arc<ServerState>,
    peer: &PeerRelay,
    request: &Packet,
    reason: RejectionReason,
) {
    tracing::info!(peer = %peer.addr(), ?reason, "connection request rejected");
    counters::preauth_total("rejected");

    let frame = encode_disconnect(
        request.connection_number(),
        request.connection_time().unwrap_or(0),
        reason,
    );
    let response = state.packet_pool.rent_from(&frame);
    if let Err(e) = state.socket.send_to(response.as_bytes(), peer.addr()).await {
        tracing::debug!(peer = %peer.addr(), "failed to send disconnect: {}", e);
    }
    state.packet_pool.release(response);
}
