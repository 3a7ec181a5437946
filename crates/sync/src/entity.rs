use std::collections::HashMap;

use glam::Vec2;

use crate::config::InterpolationConfig;
use crate::net::{AvatarId, PlayerInfo};

pub const DEFAULT_ANIMATION: &str = "idle";

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAvatar {
    pub id: AvatarId,
    pub display_name: String,
    pub skin: Option<String>,
    pub current_position: Vec2,
    pub target_position: Vec2,
    pub animation: String,
    pub last_update_ms: u64,
}

impl RemoteAvatar {
    fn from_info(info: &PlayerInfo, now_ms: u64) -> Self {
        let position = Vec2::new(info.x, info.y);
        Self {
            id: info.id.clone(),
            display_name: info.username.clone(),
            skin: info.skin.clone(),
            current_position: position,
            target_position: position,
            animation: info
                .animation
                .clone()
                .unwrap_or_else(|| String::from(DEFAULT_ANIMATION)),
            last_update_ms: now_ms,
        }
    }

    pub fn distance_to_target(&self) -> f32 {
        self.current_position.distance(self.target_position)
    }
}

/// Remote avatars and their eased render positions.
///
/// Position is smoothed towards the latest server target on every `tick`;
/// animation is discrete and switches as soon as an update arrives. The ease
/// factor is applied per tick regardless of frame time.
#[derive(Debug)]
pub struct RemoteEntityStore {
    avatars: HashMap<AvatarId, RemoteAvatar>,
    ease_factor: f32,
}

impl RemoteEntityStore {
    pub fn new(config: &InterpolationConfig) -> Self {
        Self {
            avatars: HashMap::new(),
            ease_factor: config.ease_factor.clamp(0.0, 1.0),
        }
    }

    /// Inserts an avatar from a join or snapshot. A known avatar keeps its
    /// rendered position and only takes the new target. Returns `true` when
    /// the avatar was created.
    pub fn upsert(&mut self, info: &PlayerInfo, now_ms: u64) -> bool {
        match self.avatars.get_mut(&info.id) {
            Some(avatar) => {
                avatar.target_position = Vec2::new(info.x, info.y);
                if !info.username.is_empty() {
                    avatar.display_name = info.username.clone();
                }
                if info.skin.is_some() {
                    avatar.skin = info.skin.clone();
                }
                if let Some(animation) = &info.animation {
                    avatar.animation = animation.clone();
                }
                avatar.last_update_ms = now_ms;
                false
            }
            None => {
                self.avatars
                    .insert(info.id.clone(), RemoteAvatar::from_info(info, now_ms));
                true
            }
        }
    }

    /// Moves an avatar's target. Returns `false` for an unknown id.
    pub fn update_target(
        &mut self,
        id: &str,
        position: Vec2,
        animation: Option<&str>,
        now_ms: u64,
    ) -> bool {
        let Some(avatar) = self.avatars.get_mut(id) else {
            return false;
        };

        avatar.target_position = position;
        if let Some(animation) = animation {
            if avatar.animation != animation {
                avatar.animation = animation.to_string();
            }
        }
        avatar.last_update_ms = now_ms;
        true
    }

    pub fn tick(&mut self) {
        let f = self.ease_factor;
        for avatar in self.avatars.values_mut() {
            avatar.current_position = avatar.current_position.lerp(avatar.target_position, f);
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<RemoteAvatar> {
        self.avatars.remove(id)
    }

    /// Drops every avatar whose id is not in `keep`, returning the removed ones.
    pub fn retain_ids(&mut self, keep: &[&str]) -> Vec<RemoteAvatar> {
        let stale: Vec<AvatarId> = self
            .avatars
            .keys()
            .filter(|id| !keep.contains(&id.as_str()))
            .cloned()
            .collect();

        stale
            .iter()
            .filter_map(|id| self.avatars.remove(id))
            .collect()
    }

    pub fn clear(&mut self) {
        self.avatars.clear();
    }

    pub fn get(&self, id: &str) -> Option<&RemoteAvatar> {
        self.avatars.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.avatars.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteAvatar> {
        self.avatars.values()
    }

    pub fn len(&self) -> usize {
        self.avatars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.avatars.is_empty()
    }

    pub fn ease_factor(&self) -> f32 {
        self.ease_factor
    }
}
