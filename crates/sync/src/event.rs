use crate::net::AvatarId;
use crate::session::ConnectionState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub sender: String,
    pub content: String,
    pub received_at_ms: u64,
}

/// Notifications for the UI layer, drained from the controller each frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    StatusChanged(ConnectionState),
    IdentityAssigned { id: AvatarId },
    AvatarJoined { id: AvatarId, display_name: String },
    AvatarLeft { id: AvatarId, display_name: Option<String> },
    Chat(ChatMessage),
    OnlineCount(u32),
}
