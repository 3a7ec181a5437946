mod controller;
mod reconnect;
mod router;

pub use controller::{ConnectOutcome, ConnectionController, ConnectionState, Credentials};
pub use reconnect::{JITTER_MAX, JITTER_MIN, ReconnectionPolicy, RetryDecision};
pub use router::InboundRouter;
