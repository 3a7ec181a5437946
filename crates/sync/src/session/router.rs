use glam::Vec2;
use rand::Rng;
use rand::distr::Alphanumeric;

use crate::entity::RemoteEntityStore;
use crate::error::ProtocolError;
use crate::event::{ChatMessage, SyncEvent};
use crate::net::{AvatarId, PlayerInfo, ServerMessage, decode_server_frame};

const MESSAGE_ID_SUFFIX_LEN: usize = 6;

/// Decodes server frames and applies them to the entity store.
#[derive(Debug, Default)]
pub struct InboundRouter {
    local_id: Option<AvatarId>,
}

impl InboundRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local_id(&self) -> Option<&str> {
        self.local_id.as_deref()
    }

    pub fn reset(&mut self) {
        self.local_id = None;
    }

    pub fn route(
        &mut self,
        frame: &str,
        store: &mut RemoteEntityStore,
        now_ms: u64,
    ) -> Result<Vec<SyncEvent>, ProtocolError> {
        let message = decode_server_frame(frame)?;
        Ok(self.dispatch(message, store, now_ms))
    }

    pub fn dispatch(
        &mut self,
        message: ServerMessage,
        store: &mut RemoteEntityStore,
        now_ms: u64,
    ) -> Vec<SyncEvent> {
        let mut events = Vec::new();

        match message {
            ServerMessage::Connect { id } => {
                log::info!("Assigned avatar id {}", id);
                if let Some(avatar) = store.remove(&id) {
                    log::debug!("Dropped local avatar {} from remote store", avatar.id);
                }
                self.local_id = Some(id.clone());
                events.push(SyncEvent::IdentityAssigned { id });
            }
            ServerMessage::Players { list } => {
                let remote: Vec<&PlayerInfo> =
                    list.iter().filter(|p| !self.is_local(&p.id)).collect();
                let keep: Vec<&str> = remote.iter().map(|p| p.id.as_str()).collect();

                for avatar in store.retain_ids(&keep) {
                    events.push(SyncEvent::AvatarLeft {
                        id: avatar.id,
                        display_name: Some(avatar.display_name),
                    });
                }

                for player in remote {
                    if store.upsert(player, now_ms) {
                        events.push(SyncEvent::AvatarJoined {
                            id: player.id.clone(),
                            display_name: player.username.clone(),
                        });
                    }
                }
                log::debug!("Roster snapshot: {} remote avatars", store.len());
            }
            ServerMessage::PlayerJoined { player } => {
                if !self.is_local(&player.id) && store.upsert(&player, now_ms) {
                    events.push(SyncEvent::AvatarJoined {
                        id: player.id,
                        display_name: player.username,
                    });
                }
            }
            ServerMessage::PlayerUpdate { player } => {
                if self.is_local(&player.id) {
                    return events;
                }
                let position = Vec2::new(player.x, player.y);
                if !store.update_target(&player.id, position, player.animation.as_deref(), now_ms)
                {
                    log::debug!("Update for unknown avatar {}, treating as join", player.id);
                    store.upsert(&player, now_ms);
                    events.push(SyncEvent::AvatarJoined {
                        id: player.id,
                        display_name: player.username,
                    });
                }
            }
            ServerMessage::PlayerDisconnect { id, username } => {
                let removed = store.remove(&id);
                if removed.is_some() || username.is_some() {
                    let display_name = username.or(removed.map(|a| a.display_name));
                    events.push(SyncEvent::AvatarLeft { id, display_name });
                }
            }
            ServerMessage::Chat {
                id,
                username,
                message,
            } => {
                if username.trim().is_empty() || message.trim().is_empty() {
                    log::warn!("Ignoring chat message without sender or content");
                    return events;
                }
                let id = id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| synthesize_message_id(now_ms));
                events.push(SyncEvent::Chat(ChatMessage {
                    id,
                    sender: username,
                    content: message,
                    received_at_ms: now_ms,
                }));
            }
            ServerMessage::OnlineUsersCount { count } => {
                events.push(SyncEvent::OnlineCount(count));
            }
        }

        events
    }

    fn is_local(&self, id: &str) -> bool {
        self.local_id.as_deref() == Some(id)
    }
}

/// Message id built from the arrival time and a random suffix.
pub fn synthesize_message_id(now_ms: u64) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(MESSAGE_ID_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{}-{}", now_ms, suffix)
}
