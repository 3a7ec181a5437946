use std::collections::HashMap;
use std::hash::Hash;

use glam::Vec2;

use crate::config::DedupConfig;

pub const CONNECT_PURPOSE: &str = "connect";

/// Keys remembered for a fixed time-to-live, measured on the caller's clock.
#[derive(Debug, Clone)]
pub struct TtlCache<K> {
    entries: HashMap<K, u64>,
    ttl_ms: u64,
}

impl<K: Eq + Hash> TtlCache<K> {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            entries: HashMap::new(),
            ttl_ms,
        }
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    pub fn insert(&mut self, key: K, now_ms: u64) {
        self.entries.insert(key, now_ms);
    }

    pub fn contains_fresh(&self, key: &K, now_ms: u64) -> bool {
        self.entries
            .get(key)
            .is_some_and(|&at| now_ms.saturating_sub(at) < self.ttl_ms)
    }

    /// Inserts `key` unless a fresh entry exists. Returns whether it was
    /// inserted.
    pub fn insert_if_absent(&mut self, key: K, now_ms: u64) -> bool {
        if self.contains_fresh(&key, now_ms) {
            return false;
        }
        self.insert(key, now_ms);
        true
    }

    pub fn remove(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn prune(&mut self, now_ms: u64) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl_ms;
        self.entries
            .retain(|_, &mut at| now_ms.saturating_sub(at) < ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone)]
struct SentPosition {
    position: Vec2,
    animation: String,
    at_ms: u64,
}

/// Lets a position sample through only when it moved far enough from the
/// last sent one or changed animation, and not faster than the update
/// interval.
#[derive(Debug, Clone)]
pub struct PositionFilter {
    threshold: f32,
    min_interval_ms: u64,
    last_sent: Option<SentPosition>,
}

impl PositionFilter {
    pub fn new(threshold: f32, min_interval_ms: u64) -> Self {
        Self {
            threshold,
            min_interval_ms,
            last_sent: None,
        }
    }

    /// Checks a sample against the last one recorded with [`mark_sent`].
    ///
    /// [`mark_sent`]: PositionFilter::mark_sent
    pub fn should_send(&self, position: Vec2, animation: &str, now_ms: u64) -> bool {
        let Some(last) = &self.last_sent else {
            return true;
        };
        if now_ms.saturating_sub(last.at_ms) < self.min_interval_ms {
            return false;
        }
        let moved = last.position.distance(position) > self.threshold;
        moved || last.animation != animation
    }

    pub fn mark_sent(&mut self, position: Vec2, animation: &str, now_ms: u64) {
        self.last_sent = Some(SentPosition {
            position,
            animation: animation.to_string(),
            at_ms: now_ms,
        });
    }

    pub fn reset(&mut self) {
        self.last_sent = None;
    }
}

/// Client-side suppression of accidental duplicate actions.
#[derive(Debug, Clone)]
pub struct DuplicateGuard {
    position: PositionFilter,
    chat: TtlCache<String>,
    connection: TtlCache<String>,
}

impl DuplicateGuard {
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            position: PositionFilter::new(config.movement_threshold, config.min_update_interval_ms),
            chat: TtlCache::new(config.chat_ttl_ms),
            connection: TtlCache::new(config.connection_ttl_ms),
        }
    }

    pub fn should_send_position(&self, position: Vec2, animation: &str, now_ms: u64) -> bool {
        self.position.should_send(position, animation, now_ms)
    }

    /// Records a sample that made it into the outbound queue.
    pub fn mark_position_sent(&mut self, position: Vec2, animation: &str, now_ms: u64) {
        self.position.mark_sent(position, animation, now_ms);
    }

    pub fn should_send_chat(&mut self, content: &str, now_ms: u64) -> bool {
        let allowed = self.chat.insert_if_absent(content.to_string(), now_ms);
        if !allowed {
            log::debug!("Suppressed duplicate chat message");
        }
        allowed
    }

    /// Drops the record for a chat line that was never queued.
    pub fn forget_chat(&mut self, content: &str) {
        self.chat.remove(&content.to_string());
    }

    /// Records a connection marker for `purpose`, or reports that a fresh one
    /// already exists.
    pub fn try_mark_connection(&mut self, purpose: &str, now_ms: u64) -> bool {
        let allowed = self.connection.insert_if_absent(purpose.to_string(), now_ms);
        if !allowed {
            log::debug!("Suppressed duplicate {} attempt", purpose);
        }
        allowed
    }

    pub fn clear_connection_marker(&mut self, purpose: &str) {
        self.connection.remove(&purpose.to_string());
    }

    /// Forgets the last sent position so the next sample goes out.
    pub fn reset_position(&mut self) {
        self.position.reset();
    }

    pub fn prune(&mut self, now_ms: u64) -> usize {
        self.chat.prune(now_ms) + self.connection.prune(now_ms)
    }

    pub fn tracked_chat(&self) -> usize {
        self.chat.len()
    }
}
