#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub send_failures: u64,
    pub messages_dropped: u64,
    pub messages_evicted: u64,
    pub malformed_frames: u64,
    pub unknown_frames: u64,
    pub connections_opened: u64,
    pub reconnect_attempts: u64,
}
