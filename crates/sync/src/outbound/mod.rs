mod dedup;
mod queue;

pub use dedup::{CONNECT_PURPOSE, DuplicateGuard, PositionFilter, TtlCache};
pub use queue::{FlushBatch, FlushReport, OutboundQueue, Priority, QueuedMessage};
