//! Protocol type definitions and constants shared across the GRP stack.

/// Reason code carried in byte 9 of a Disconnect frame answering a rejected
/// connection request.
///
/// The enumeration is closed and wire-visible; ordinals must not be
/// reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RejectionReason {
    /// No specific reason given.
    NotSpecified = 0,
    /// The backend has no free player slots.
    ServerFull = 1,
    /// The handshake token was missing or malformed.
    InvalidToken = 2,
    /// The client protocol version block was incomplete or unsupported.
    VersionMismatch = 3,
    /// An internal error occurred while validating the handshake.
    Error = 4,
    /// The user identifier was missing or empty.
    AuthenticationRequired = 5,
    /// The user is banned from this server.
    Banned = 6,
    /// The server runs a whitelist and the user is not on it.
    NotWhitelisted = 7,
    /// The user is banned network-wide.
    GloballyBanned = 8,
    /// The user's region is blocked.
    Geoblocked = 9,
    /// Server-defined custom reason.
    Custom = 10,
    /// The authentication token has expired.
    ExpiredAuth = 11,
    /// Too many handshake attempts.
    RateLimit = 12,
    /// A challenge must be answered before connecting.
    Challenge = 13,
    /// The submitted challenge key was not recognized.
    InvalidChallengeKey = 14,
    /// The challenge block was missing or malformed.
    InvalidChallenge = 15,
    /// The client should connect to a different server.
    Redirect = 16,
    /// The client should retry after a delay.
    Delay = 17,
    /// Verification session accepted.
    VerificationAccepted = 18,
    /// Verification session rejected.
    VerificationRejected = 19,
    /// The central authentication authority rejected the user.
    CentralServerAuthRejected = 20,
}

impl RejectionReason {
    /// The wire code for this reason.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a wire code, returning `None` for unknown values.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::NotSpecified),
            1 => Some(Self::ServerFull),
            2 => Some(Self::InvalidToken),
            3 => Some(Self::VersionMismatch),
            4 => Some(Self::Error),
            5 => Some(Self::AuthenticationRequired),
            6 => Some(Self::Banned),
            7 => Some(Self::NotWhitelisted),
            8 => Some(Self::GloballyBanned),
            9 => Some(Self::Geoblocked),
            10 => Some(Self::Custom),
            11 => Some(Self::ExpiredAuth),
            12 => Some(Self::RateLimit),
            13 => Some(Self::Challenge),
            14 => Some(Self::InvalidChallengeKey),
            15 => Some(Self::InvalidChallenge),
            16 => Some(Self::Redirect),
            17 => Some(Self::Delay),
            18 => Some(Self::VerificationAccepted),
            19 => Some(Self::VerificationRejected),
            20 => Some(Self::CentralServerAuthRejected),
            _ => None,
        }
    }
}

/// Wire layout constants for the ConnectRequest packet.
pub mod connect_request {
    /// Offset of the embedded-address-size discriminator byte.
    pub const ADDR_SIZE_OFFSET: usize = 13;
    /// Discriminator for an IPv4-style embedded source address block.
    pub const ADDR_SIZE_V4: u8 = 16;
    /// Discriminator for an IPv6-style embedded source address block.
    pub const ADDR_SIZE_V6: u8 = 28;
    /// The handshake payload starts after the fixed preamble and the
    /// embedded address block.
    pub const PAYLOAD_BASE_OFFSET: usize = 14;
    /// Number of logical sub-connections multiplexed over one peer address.
    pub const MAX_CONNECTION_NUMBER: u8 = 4;
}
