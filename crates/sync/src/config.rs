use serde::Deserialize;

pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:3001";
pub const DEFAULT_CHAT_TTL_MS: u64 = 2_000;
pub const DEFAULT_CONNECTION_TTL_MS: u64 = 5_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub endpoint: String,
    pub connect_timeout_ms: u64,
    pub reconnect: ReconnectConfig,
    pub queue: QueueConfig,
    pub dedup: DedupConfig,
    pub interpolation: InterpolationConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from(DEFAULT_ENDPOINT),
            connect_timeout_ms: 10_000,
            reconnect: ReconnectConfig::default(),
            queue: QueueConfig::default(),
            dedup: DedupConfig::default(),
            interpolation: InterpolationConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Parses a JSON config. Missing fields fall back to defaults.
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            max_attempts: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
    pub flush_interval_ms: u64,
    pub batch_size: usize,
    pub default_max_attempts: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            flush_interval_ms: 100,
            batch_size: 10,
            default_max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub movement_threshold: f32,
    pub min_update_interval_ms: u64,
    pub chat_ttl_ms: u64,
    pub connection_ttl_ms: u64,
    pub prune_interval_ms: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            movement_threshold: 1.0,
            min_update_interval_ms: 50,
            chat_ttl_ms: DEFAULT_CHAT_TTL_MS,
            connection_ttl_ms: DEFAULT_CONNECTION_TTL_MS,
            prune_interval_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InterpolationConfig {
    /// Fraction of the remaining distance closed on every tick.
    pub ease_factor: f32,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self { ease_factor: 0.2 }
    }
}
