mod memory;
mod protocol;
mod stats;
mod transport;
mod ws;

pub use memory::{MemoryConnector, MemoryRemote, MemorySocket};
pub use protocol::{
    AvatarId, ClientMessage, PlayerInfo, SERVER_KINDS, ServerMessage, decode_server_frame,
    encode_client_frame,
};
pub use stats::SyncStats;
pub use transport::{
    CLOSE_ABNORMAL, CLOSE_AUTH_FAILED, CLOSE_NORMAL, CLOSE_REPLACED, Connector, Socket,
    SocketEvent, SocketState,
};
pub use ws::{WsConnector, WsSocket};
