//! Client error types.

use thiserror::Error;
use tunguska_protocol::{BlazeError, ProtocolError};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// An application error carried in a response packet.
    #[error("backend error: {0}")]
    Blaze(#[from] BlazeError),

    /// A JSON-RPC error object returned by the gateway.
    #[error("gateway error {code}: {message}")]
    Gateway { code: i64, message: String },

    /// The request never produced a response (DNS, TCP, TLS or HTTP
    /// transport failure). Distinct from [`ClientError::Gateway`] so
    /// callers can retry without treating it as a server verdict.
    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("connect timeout")]
    Timeout,

    #[error("login already in progress")]
    LoginInProgress,

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),

    /// The auth code provider could not produce a code.
    #[error("auth code retrieval failed: {0}")]
    AuthCode(String),
}

impl ClientError {
    /// Returns whether this error is transient and worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::Network(_)
                | ClientError::ConnectionClosed
                | ClientError::Timeout
        )
    }
}
