pub mod clock;
pub mod config;
pub mod entity;
pub mod error;
pub mod event;
pub mod lock;
pub mod net;
pub mod outbound;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DedupConfig, InterpolationConfig, QueueConfig, ReconnectConfig, SyncConfig};
pub use entity::{DEFAULT_ANIMATION, RemoteAvatar, RemoteEntityStore};
pub use error::{ConnectionError, ProtocolError, QueueError, TransportError};
pub use event::{ChatMessage, SyncEvent};
pub use lock::{ConnectionLock, ConnectionLockGuard};
pub use net::{
    AvatarId, CLOSE_ABNORMAL, CLOSE_AUTH_FAILED, CLOSE_NORMAL, CLOSE_REPLACED, ClientMessage,
    Connector, MemoryConnector, MemoryRemote, MemorySocket, PlayerInfo, ServerMessage, Socket,
    SocketEvent, SocketState, SyncStats, WsConnector, WsSocket, decode_server_frame,
    encode_client_frame,
};
pub use outbound::{DuplicateGuard, FlushReport, OutboundQueue, Priority, QueuedMessage, TtlCache};
pub use session::{
    ConnectOutcome, ConnectionController, ConnectionState, Credentials, InboundRouter,
    ReconnectionPolicy, RetryDecision,
};
