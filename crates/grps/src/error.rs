use thiserror::Error;

/// Errors that can occur during relay server operation.
///
/// Wire-level parsing never produces one of these: unverifiable or foreign
/// datagrams are dropped silently and handshake-field failures are answered
/// with a Disconnect frame. Only the transport and bootstrap paths error.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Underlying socket I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The server configuration failed validation.
    #[error("configuration error: {0}")]
    Config(String),
}
