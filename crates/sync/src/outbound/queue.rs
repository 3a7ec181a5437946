use std::collections::VecDeque;

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::net::ClientMessage;

/// Declaration order is flush order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    High,
    Normal,
    Low,
}

#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub id: u64,
    pub kind: &'static str,
    pub payload: ClientMessage,
    pub priority: Priority,
    pub enqueued_at_ms: u64,
    pub attempts: u32,
    pub max_attempts: u32,
}

/// Ids selected by [`OutboundQueue::begin_flush`], in send order.
#[derive(Debug)]
pub struct FlushBatch {
    ids: Vec<u64>,
}

impl FlushBatch {
    pub fn ids(&self) -> &[u64] {
        &self.ids
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub delivered: usize,
    pub failed: usize,
    pub dropped: usize,
}

pub struct OutboundQueue {
    entries: VecDeque<QueuedMessage>,
    capacity: usize,
    batch_size: usize,
    default_max_attempts: u32,
    next_id: u64,
    processing: bool,
    evicted: u64,
    dropped: u64,
}

impl OutboundQueue {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            entries: VecDeque::with_capacity(config.capacity),
            capacity: config.capacity.max(1),
            batch_size: config.batch_size.max(1),
            default_max_attempts: config.default_max_attempts.max(1),
            next_id: 1,
            processing: false,
            evicted: 0,
            dropped: 0,
        }
    }

    pub fn enqueue(
        &mut self,
        payload: ClientMessage,
        priority: Priority,
        now_ms: u64,
    ) -> Result<u64, QueueError> {
        self.enqueue_with_attempts(payload, priority, self.default_max_attempts, now_ms)
    }

    /// Appends a message. At capacity the oldest `Low` entry makes room; when
    /// there is none the insert is refused, whatever its priority.
    pub fn enqueue_with_attempts(
        &mut self,
        payload: ClientMessage,
        priority: Priority,
        max_attempts: u32,
        now_ms: u64,
    ) -> Result<u64, QueueError> {
        if self.entries.len() >= self.capacity && !self.evict_oldest_low() {
            log::warn!(
                "Outbound queue full ({} entries), refusing {:?} {}",
                self.entries.len(),
                priority,
                payload.kind()
            );
            return Err(QueueError::CapacityExceeded);
        }

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        self.entries.push_back(QueuedMessage {
            id,
            kind: payload.kind(),
            payload,
            priority,
            enqueued_at_ms: now_ms,
            attempts: 0,
            max_attempts: max_attempts.max(1),
        });

        Ok(id)
    }

    /// Selects the next batch and marks the queue busy. Returns `None` while a
    /// previous batch is still outstanding or when there is nothing to send.
    pub fn begin_flush(&mut self) -> Option<FlushBatch> {
        if self.processing || self.entries.is_empty() {
            return None;
        }

        let mut order: Vec<&QueuedMessage> = self.entries.iter().collect();
        order.sort_by_key(|m| (m.priority, m.enqueued_at_ms, m.id));

        self.processing = true;
        Some(FlushBatch {
            ids: order.iter().take(self.batch_size).map(|m| m.id).collect(),
        })
    }

    /// Settles a batch: delivered entries leave the queue, failed ones are
    /// retried on the next flush until they run out of attempts.
    pub fn finish_flush(
        &mut self,
        batch: FlushBatch,
        failed_ids: &[u64],
    ) -> FlushReport {
        let mut report = FlushReport::default();

        for id in batch.ids {
            let Some(idx) = self.entries.iter().position(|m| m.id == id) else {
                continue;
            };

            if !failed_ids.contains(&id) {
                self.entries.remove(idx);
                report.delivered += 1;
                continue;
            }

            report.failed += 1;
            let entry = &mut self.entries[idx];
            entry.attempts += 1;
            if entry.attempts >= entry.max_attempts {
                log::warn!(
                    "Dropping {} message {} after {} attempts",
                    entry.kind,
                    entry.id,
                    entry.attempts
                );
                self.entries.remove(idx);
                self.dropped += 1;
                report.dropped += 1;
            }
        }

        self.processing = false;
        report
    }

    /// Sends one batch through `send`.
    pub fn flush<F>(&mut self, mut send: F) -> FlushReport
    where
        F: FnMut(&QueuedMessage) -> Result<(), QueueError>,
    {
        let Some(batch) = self.begin_flush() else {
            return FlushReport::default();
        };

        let mut failed = Vec::new();
        for id in batch.ids() {
            let Some(message) = self.get(*id) else {
                continue;
            };
            if let Err(e) = send(message) {
                log::debug!("Send of {} message {} failed: {}", message.kind, id, e);
                failed.push(*id);
            }
        }

        self.finish_flush(batch, &failed)
    }

    pub fn get(&self, id: u64) -> Option<&QueuedMessage> {
        self.entries.iter().find(|m| m.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedMessage> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn evicted_count(&self) -> u64 {
        self.evicted
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.processing = false;
    }

    fn evict_oldest_low(&mut self) -> bool {
        let Some(idx) = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, m)| m.priority == Priority::Low)
            .min_by_key(|(_, m)| (m.enqueued_at_ms, m.id))
            .map(|(idx, _)| idx)
        else {
            return false;
        };

        if let Some(evicted) = self.entries.remove(idx) {
            log::debug!("Evicted low priority {} message {}", evicted.kind, evicted.id);
            self.evicted += 1;
        }
        true
    }
}
