use crate::error::TransportError;

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_ABNORMAL: u16 = 1006;
pub const CLOSE_AUTH_FAILED: u16 = 4001;
pub const CLOSE_REPLACED: u16 = 4002;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Connecting,
    Open,
    Closed,
}

impl SocketState {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Opened,
    Frame(String),
    Closed { code: u16 },
    Error(String),
}

/// A full-duplex text-frame socket polled from the owner's loop.
///
/// `close` is initiated locally and does not produce a `Closed` event; only
/// remote or transport-level termination is reported through `poll`.
pub trait Socket {
    fn state(&self) -> SocketState;
    fn send(&mut self, frame: &str) -> Result<(), TransportError>;
    fn close(&mut self, code: u16);
    fn poll(&mut self) -> Vec<SocketEvent>;
}

pub trait Connector {
    type Socket: Socket;

    fn open(&mut self, endpoint: &str) -> Result<Self::Socket, TransportError>;
}
