use std::borrow::Cow;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use tungstenite::client::IntoClientRequest;
use tungstenite::handshake::client::Request;
use tungstenite::protocol::CloseFrame;
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::{Message, WebSocket};

use super::transport::{CLOSE_ABNORMAL, CLOSE_NORMAL, Connector, Socket, SocketEvent, SocketState};
use crate::error::TransportError;

const DEFAULT_WS_PORT: u16 = 80;
const MIN_TIMEOUT: Duration = Duration::from_millis(1);

type Handshake = Result<WebSocket<TcpStream>, TransportError>;

/// Opens WebSocket sessions without blocking the caller. The TCP connect and
/// the HTTP upgrade run on a short-lived thread; the socket reports
/// `Opened` from `poll` once they complete.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout: connect_timeout.max(MIN_TIMEOUT),
        }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl Connector for WsConnector {
    type Socket = WsSocket;

    fn open(&mut self, endpoint: &str) -> Result<WsSocket, TransportError> {
        let url = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("ws://{}", endpoint)
        };
        let request = url.as_str().into_client_request()?;

        let (tx, rx) = mpsc::channel();
        let timeout = self.connect_timeout;
        thread::Builder::new()
            .name(String::from("ws-connect"))
            .spawn(move || {
                if tx.send(establish(request, timeout)).is_err() {
                    log::debug!("Connection attempt abandoned before the handshake finished");
                }
            })?;

        log::debug!("Opening WebSocket to {}", url);
        Ok(WsSocket {
            link: Link::Pending(rx),
            state: SocketState::Connecting,
        })
    }
}

fn establish(request: Request, timeout: Duration) -> Handshake {
    let uri = request.uri();
    let host = uri
        .host()
        .ok_or_else(|| TransportError::Handshake(format!("no host in {}", uri)))?;
    let port = uri.port_u16().unwrap_or(DEFAULT_WS_PORT);

    let mut last_error = None;
    let mut connected = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                connected = Some(stream);
                break;
            }
            Err(e) => last_error = Some(e),
        }
    }
    let stream = match connected {
        Some(stream) => stream,
        None => {
            return Err(last_error
                .unwrap_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::AddrNotAvailable,
                        format!("no address for {}", host),
                    )
                })
                .into());
        }
    };

    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;

    let (socket, _response) = tungstenite::client::client(request, stream)
        .map_err(|e| TransportError::Handshake(e.to_string()))?;

    let stream = socket.get_ref();
    stream.set_read_timeout(None)?;
    stream.set_write_timeout(None)?;
    stream.set_nonblocking(true)?;
    Ok(socket)
}

fn would_block(error: &tungstenite::Error) -> bool {
    matches!(error, tungstenite::Error::Io(e) if e.kind() == io::ErrorKind::WouldBlock)
}

enum Link {
    Pending(Receiver<Handshake>),
    Live(WebSocket<TcpStream>),
    Done,
}

pub struct WsSocket {
    link: Link,
    state: SocketState,
}

impl WsSocket {
    fn finish(&mut self) {
        self.link = Link::Done;
        self.state = SocketState::Closed;
    }

    fn poll_handshake(&mut self, events: &mut Vec<SocketEvent>) {
        let received = match &self.link {
            Link::Pending(rx) => rx.try_recv(),
            _ => return,
        };

        match received {
            Ok(Ok(socket)) => {
                self.link = Link::Live(socket);
                self.state = SocketState::Open;
                events.push(SocketEvent::Opened);
            }
            Ok(Err(e)) => {
                self.finish();
                events.push(SocketEvent::Error(e.to_string()));
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                self.finish();
                events.push(SocketEvent::Error(String::from(
                    "handshake thread exited without a result",
                )));
            }
        }
    }
}

impl Socket for WsSocket {
    fn state(&self) -> SocketState {
        self.state
    }

    fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        let Link::Live(socket) = &mut self.link else {
            return Err(TransportError::NotOpen);
        };

        match socket.send(Message::Text(frame.to_string())) {
            Ok(()) => Ok(()),
            // Buffered by tungstenite, written out on the next poll.
            Err(e) if would_block(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self, code: u16) {
        if let Link::Live(mut socket) = std::mem::replace(&mut self.link, Link::Done) {
            let frame = CloseFrame {
                code: CloseCode::from(code),
                reason: Cow::Borrowed(""),
            };
            if let Err(e) = socket.close(Some(frame)) {
                if !would_block(&e) {
                    log::debug!("Close frame not sent: {}", e);
                }
            }
            let _ = socket.flush();
        }
        self.state = SocketState::Closed;
    }

    fn poll(&mut self) -> Vec<SocketEvent> {
        let mut events = Vec::new();
        self.poll_handshake(&mut events);

        let Link::Live(socket) = &mut self.link else {
            return events;
        };

        let mut closed = match socket.flush() {
            Err(e) if !would_block(&e) => {
                log::debug!("WebSocket flush failed: {}", e);
                Some(CLOSE_ABNORMAL)
            }
            _ => None,
        };

        while closed.is_none() {
            match socket.read() {
                Ok(Message::Text(text)) => events.push(SocketEvent::Frame(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => events.push(SocketEvent::Frame(text)),
                    Err(_) => log::warn!("Dropping binary frame that is not UTF-8"),
                },
                Ok(Message::Close(frame)) => {
                    let _ = socket.flush();
                    // A close without a status code counts as a normal one.
                    closed = Some(frame.map_or(CLOSE_NORMAL, |f| u16::from(f.code)));
                }
                Ok(_) => {}
                Err(e) if would_block(&e) => break,
                Err(e) => {
                    log::debug!("WebSocket read failed: {}", e);
                    closed = Some(CLOSE_ABNORMAL);
                }
            }
        }

        if let Some(code) = closed {
            self.finish();
            events.push(SocketEvent::Closed { code });
        }
        events
    }
}
