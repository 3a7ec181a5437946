use std::io;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection attempt timed out")]
    Timeout,
    #[error("connection refused: {0}")]
    Refused(String),
    #[error("authentication rejected by server")]
    AuthFailed,
    #[error("session replaced by another connection")]
    Replaced,
    #[error("no session token available")]
    MissingCredential,
}

impl ConnectionError {
    /// Whether the reconnection policy may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Refused(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("outbound queue is full")]
    CapacityExceeded,
    #[error("send failed: {0}")]
    SendFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("unknown message kind: {0}")]
    UnknownKind(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("socket io error: {0}")]
    Io(#[from] io::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("websocket handshake failed: {0}")]
    Handshake(String),
    #[error("socket is not open")]
    NotOpen,
}
