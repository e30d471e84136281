//! GRP packet framing and validation.
//!
//! Every datagram starts with a single bit-packed header byte:
//! `(fragmented << 7) | (connection_number << 5) | property`. The property
//! ordinal selects a fixed minimum header size; a datagram shorter than that
//! minimum is rejected before anything else looks at it.

use crate::types::RejectionReason;

/// Extra bytes reserved for fragment id/count/total when the fragmented bit
/// is set. The relay length-checks them but never interprets them.
pub const FRAGMENT_HEADER_SIZE: usize = 6;

/// Byte offset of the 8-byte little-endian connection time carried by
/// handshake-family packets.
pub const CONNECTION_TIME_OFFSET: usize = 5;

/// Size of a synthesized Disconnect frame: header byte, 8-byte connection
/// time, reason code, one trailing source byte.
pub const DISCONNECT_SIZE: usize = 11;

/// Packet type discriminant carried in the low 5 bits of the header byte.
///
/// Ordinals are wire-visible and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketProperty {
    /// Fire-and-forget payload.
    Unreliable = 0,
    /// Reliable/sequenced channel payload.
    Channeled = 1,
    /// Channel acknowledgement.
    Ack = 2,
    /// Keepalive request.
    Ping = 3,
    /// Keepalive response.
    Pong = 4,
    /// Connection handshake request — the only type the relay opens up.
    ConnectRequest = 5,
    /// Connection handshake acceptance.
    ConnectAccept = 6,
    /// Connection teardown, also used for handshake rejection.
    Disconnect = 7,
    /// Out-of-session message.
    UnconnectedMessage = 8,
    /// Path MTU probe.
    MtuCheck = 9,
    /// Path MTU probe acknowledgement.
    MtuOk = 10,
    /// LAN broadcast.
    Broadcast = 11,
    /// Several logical packets coalesced into one datagram.
    Merged = 12,
    /// Graceful shutdown acknowledgement.
    ShutdownOk = 13,
    /// Response to traffic for an unknown session.
    PeerNotFound = 14,
    /// Protocol version mismatch notification.
    InvalidProtocol = 15,
    /// NAT punch-through message.
    NatMessage = 16,
    /// Empty placeholder packet.
    Empty = 17,
}

impl PacketProperty {
    /// Number of known packet types.
    pub const COUNT: u8 = 18;

    /// Decodes a property ordinal, returning `None` for unknown values.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unreliable),
            1 => Some(Self::Channeled),
            2 => Some(Self::Ack),
            3 => Some(Self::Ping),
            4 => Some(Self::Pong),
            5 => Some(Self::ConnectRequest),
            6 => Some(Self::ConnectAccept),
            7 => Some(Self::Disconnect),
            8 => Some(Self::UnconnectedMessage),
            9 => Some(Self::MtuCheck),
            10 => Some(Self::MtuOk),
            11 => Some(Self::Broadcast),
            12 => Some(Self::Merged),
            13 => Some(Self::ShutdownOk),
            14 => Some(Self::PeerNotFound),
            15 => Some(Self::InvalidProtocol),
            16 => Some(Self::NatMessage),
            17 => Some(Self::Empty),
            _ => None,
        }
    }

    /// Minimum number of bytes a datagram of this type must carry.
    ///
    /// The match is deliberately exhaustive with no wildcard arm: adding a
    /// packet type without sizing it is a build error, not a runtime surprise.
    #[must_use]
    pub const fn header_size(self) -> usize {
        match self {
            Self::Channeled | Self::Ack => 4,
            Self::Ping => 3,
            Self::ConnectRequest | Self::Disconnect => 11,
            Self::ConnectAccept => 14,
            Self::Pong => 9,
            Self::Unreliable
            | Self::UnconnectedMessage
            | Self::MtuCheck
            | Self::MtuOk
            | Self::Broadcast
            | Self::Merged
            | Self::ShutdownOk
            | Self::PeerNotFound
            | Self::InvalidProtocol
            | Self::NatMessage
            | Self::Empty => 1,
        }
    }
}

/// A view over one datagram's bytes.
///
/// The packet always owns a defensive copy of its source; it never aliases
/// caller memory. Instances are meant to be rented from a
/// [`crate::pool::Pool`], used for exactly one datagram, and released.
#[derive(Debug, Default)]
pub struct Packet {
    data: Vec<u8>,
}

impl Packet {
    /// Creates an empty packet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a packet holding a copy of `source`.
    #[must_use]
    pub fn from_source(source: &[u8]) -> Self {
        let mut packet = Self::new();
        packet.set_source(source);
        packet
    }

    /// Replaces the packet contents with a copy of `source`.
    pub fn set_source(&mut self, source: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(source);
    }

    /// Resets to zero length for pool reuse. The backing allocation is kept.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// The packet bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Number of bytes in the packet.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the packet holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw property ordinal: low 5 bits of the header byte (0 when empty).
    #[must_use]
    pub fn property_bits(&self) -> u8 {
        self.data.first().copied().unwrap_or(0) & 0x1f
    }

    /// Decoded packet type, `None` when the ordinal is unknown.
    #[must_use]
    pub fn property(&self) -> Option<PacketProperty> {
        PacketProperty::from_u8(self.property_bits())
    }

    /// Overwrites the property bits, preserving bits 5–7.
    pub fn set_property(&mut self, property: PacketProperty) {
        if let Some(byte) = self.data.first_mut() {
            *byte = (*byte & 0xe0) | property as u8;
        }
    }

    /// Logical sub-connection number: bits 5–6 of the header byte (0–3).
    #[must_use]
    pub fn connection_number(&self) -> u8 {
        (self.data.first().copied().unwrap_or(0) & 0x60) >> 5
    }

    /// Overwrites the connection number bits, preserving the rest.
    pub fn set_connection_number(&mut self, value: u8) {
        if let Some(byte) = self.data.first_mut() {
            *byte = (*byte & 0x9f) | ((value & 0x03) << 5);
        }
    }

    /// Fragmented flag: high bit of the header byte.
    #[must_use]
    pub fn fragmented(&self) -> bool {
        self.data.first().copied().unwrap_or(0) & 0x80 != 0
    }

    /// Connection time: 8-byte little-endian value at offset 5.
    ///
    /// Meaningful only for handshake-family packets; `None` when the buffer
    /// is too short to carry the field.
    #[must_use]
    pub fn connection_time(&self) -> Option<u64> {
        let bytes = self
            .data
            .get(CONNECTION_TIME_OFFSET..CONNECTION_TIME_OFFSET + 8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Some(u64::from_le_bytes(buf))
    }

    /// Classifies the datagram against the per-type minimum header size.
    ///
    /// Returns `false` for unknown property ordinals, datagrams shorter than
    /// the type's header, and fragmented datagrams missing the 6-byte
    /// fragment header. Pure boolean — never panics on any input.
    #[must_use]
    pub fn verify(&self) -> bool {
        let Some(property) = self.property() else {
            return false;
        };
        let header_size = property.header_size();
        if self.data.len() < header_size {
            return false;
        }
        !self.fragmented() || self.data.len() >= header_size + FRAGMENT_HEADER_SIZE
    }
}

/// Encodes a Disconnect frame answering a rejected connection request.
///
/// Layout: header byte with the request's connection number, the request's
/// connection time at bytes 1–8 (little-endian), the rejection reason code at
/// byte 9, and a single zero source byte padding the frame to the Disconnect
/// minimum size.
#[must_use]
pub fn encode_disconnect(
    connection_number: u8,
    connection_time: u64,
    reason: RejectionReason,
) -> [u8; DISCONNECT_SIZE] {
    let mut frame = [0u8; DISCONNECT_SIZE];
    frame[0] = ((connection_number & 0x03) << 5) | PacketProperty::Disconnect as u8;
    frame[1..9].copy_from_slice(&connection_time.to_le_bytes());
    frame[9] = reason.as_u8();
    frame
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn verify_law(header in any::<u8>(), len in 0usize..64) {
            let mut source = vec![0u8; len];
            if let Some(first) = source.first_mut() {
                *first = header;
            }
            let packet = Packet::from_source(&source);

            let expected = match PacketProperty::from_u8(header & 0x1f) {
                None => false,
                Some(property) => {
                    let fragmented = header & 0x80 != 0;
                    let header_size = property.header_size();
                    len >= header_size
                        && (!fragmented || len >= header_size + FRAGMENT_HEADER_SIZE)
                }
            };
            // Empty buffers never carry a header byte at all.
            let expected = expected && len > 0;
            prop_assert_eq!(packet.verify(), expected);
        }

        #[test]
        fn header_accessors_never_panic(source in prop::collection::vec(any::<u8>(), 0..32)) {
            let packet = Packet::from_source(&source);
            let _ = packet.verify();
            let _ = packet.property();
            let _ = packet.connection_number();
            let _ = packet.fragmented();
            let _ = packet.connection_time();
            prop_assert!(packet.connection_number() < 4);
        }

        #[test]
        fn setters_preserve_sibling_bits(header in any::<u8>(), value in 0u8..4) {
            let mut packet = Packet::from_source(&[header]);
            packet.set_connection_number(value);
            prop_assert_eq!(packet.property_bits(), header & 0x1f);
            prop_assert_eq!(packet.fragmented(), header & 0x80 != 0);
            prop_assert_eq!(packet.connection_number(), value);
        }
    }
}
