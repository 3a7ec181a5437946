use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::protocol::ServerMessage;
use super::transport::{Connector, Socket, SocketEvent, SocketState};
use crate::error::TransportError;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct Channel {
    state: SocketState,
    endpoint: String,
    inbound: VecDeque<SocketEvent>,
    sent: Vec<String>,
    failing_sends: usize,
    local_close: Option<u16>,
}

/// The server side of an in-process socket: scripts what the client will
/// observe and records what it sent.
#[derive(Debug, Clone)]
pub struct MemoryRemote {
    channel: Arc<Mutex<Channel>>,
}

impl MemoryRemote {
    pub fn endpoint(&self) -> String {
        locked(&self.channel).endpoint.clone()
    }

    pub fn accept(&self) {
        locked(&self.channel).inbound.push_back(SocketEvent::Opened);
    }

    pub fn push_frame(&self, frame: impl Into<String>) {
        locked(&self.channel)
            .inbound
            .push_back(SocketEvent::Frame(frame.into()));
    }

    pub fn push_message(&self, message: &ServerMessage) {
        match serde_json::to_string(message) {
            Ok(frame) => self.push_frame(frame),
            Err(e) => log::error!("failed to encode scripted message: {}", e),
        }
    }

    pub fn close(&self, code: u16) {
        locked(&self.channel)
            .inbound
            .push_back(SocketEvent::Closed { code });
    }

    pub fn error(&self, message: impl Into<String>) {
        locked(&self.channel)
            .inbound
            .push_back(SocketEvent::Error(message.into()));
    }

    /// Makes the next `count` sends from the client fail.
    pub fn fail_sends(&self, count: usize) {
        locked(&self.channel).failing_sends = count;
    }

    pub fn sent(&self) -> Vec<String> {
        locked(&self.channel).sent.clone()
    }

    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut locked(&self.channel).sent)
    }

    pub fn state(&self) -> SocketState {
        locked(&self.channel).state
    }

    /// Close code the client used, if it closed the socket itself.
    pub fn local_close(&self) -> Option<u16> {
        locked(&self.channel).local_close
    }
}

#[derive(Debug)]
pub struct MemorySocket {
    channel: Arc<Mutex<Channel>>,
}

impl Socket for MemorySocket {
    fn state(&self) -> SocketState {
        locked(&self.channel).state
    }

    fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        let mut channel = locked(&self.channel);
        if channel.state != SocketState::Open {
            return Err(TransportError::NotOpen);
        }
        if channel.failing_sends > 0 {
            channel.failing_sends -= 1;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted send failure").into());
        }
        channel.sent.push(frame.to_string());
        Ok(())
    }

    fn close(&mut self, code: u16) {
        let mut channel = locked(&self.channel);
        if channel.state == SocketState::Closed {
            return;
        }
        channel.state = SocketState::Closed;
        channel.local_close = Some(code);
        channel.inbound.clear();
    }

    fn poll(&mut self) -> Vec<SocketEvent> {
        let mut channel = locked(&self.channel);
        if channel.state == SocketState::Closed {
            return Vec::new();
        }

        let mut events = Vec::new();
        while let Some(event) = channel.inbound.pop_front() {
            match event {
                SocketEvent::Opened => channel.state = SocketState::Open,
                SocketEvent::Closed { .. } | SocketEvent::Error(_) => {
                    channel.state = SocketState::Closed;
                    events.push(event);
                    channel.inbound.clear();
                    break;
                }
                SocketEvent::Frame(_) => {}
            }
            events.push(event);
        }
        events
    }
}

#[derive(Debug, Default)]
struct Registry {
    remotes: Vec<MemoryRemote>,
    refusals: usize,
}

/// In-process connector. Clones share one registry, so a test keeps a clone
/// to reach every socket the controller opens.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    registry: Arc<Mutex<Registry>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sockets opened so far.
    pub fn opened(&self) -> usize {
        locked(&self.registry).remotes.len()
    }

    pub fn remote(&self, index: usize) -> Option<MemoryRemote> {
        locked(&self.registry).remotes.get(index).cloned()
    }

    pub fn last_remote(&self) -> Option<MemoryRemote> {
        locked(&self.registry).remotes.last().cloned()
    }

    /// Makes the next `count` open calls fail as refused.
    pub fn refuse(&self, count: usize) {
        locked(&self.registry).refusals = count;
    }
}

impl Connector for MemoryConnector {
    type Socket = MemorySocket;

    fn open(&mut self, endpoint: &str) -> Result<MemorySocket, TransportError> {
        let mut registry = locked(&self.registry);
        if registry.refusals > 0 {
            registry.refusals -= 1;
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "scripted refusal").into());
        }

        let channel = Arc::new(Mutex::new(Channel {
            state: SocketState::Connecting,
            endpoint: endpoint.to_string(),
            inbound: VecDeque::new(),
            sent: Vec::new(),
            failing_sends: 0,
            local_close: None,
        }));
        registry.remotes.push(MemoryRemote {
            channel: Arc::clone(&channel),
        });

        Ok(MemorySocket { channel })
    }
}
