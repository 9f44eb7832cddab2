use std::time::Duration;

use tokio_tungstenite::tungstenite;

use crate::session::SessionId;

/// A connection manager already owns this session id.
#[derive(Debug, Clone, thiserror::Error)]
#[error("session {0} already has a connection manager")]
pub struct SessionInUse(pub SessionId);

/// Why a request could not be sent.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("not connected to the assistant service")]
    NotConnected,

    #[error("a request is already awaiting its reply")]
    AlreadyInFlight,

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Failures while building or parsing frames.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Failures of the underlying transport. These never reach the UI as errors;
/// the manager turns them into state transitions and reconnect attempts.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("assistant service is unavailable")]
    Unavailable,

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("handshake timed out after {0:?}")]
    TimedOut(Duration),
}

impl TransportError {
    pub fn from_tungstenite(err: tungstenite::Error) -> Self {
        let is_connect = match &err {
            tungstenite::Error::Io(io_err) => matches!(
                io_err.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        };
        if is_connect {
            Self::Unavailable
        } else {
            Self::Handshake(err.to_string())
        }
    }
}
