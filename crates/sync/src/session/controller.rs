use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec2;

use super::reconnect::{ReconnectionPolicy, RetryDecision};
use super::router::{InboundRouter, synthesize_message_id};
use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::entity::{RemoteAvatar, RemoteEntityStore};
use crate::error::{ConnectionError, ProtocolError, QueueError};
use crate::event::SyncEvent;
use crate::lock::{ConnectionLock, ConnectionLockGuard};
use crate::net::{
    CLOSE_ABNORMAL, CLOSE_AUTH_FAILED, CLOSE_NORMAL, CLOSE_REPLACED, ClientMessage, Connector,
    Socket, SocketEvent, SocketState, SyncStats, encode_client_frame,
};
use crate::outbound::{CONNECT_PURPOSE, DuplicateGuard, OutboundQueue, Priority};

static NEXT_CONTROLLER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Reconnecting,
    Failed,
}

impl ConnectionState {
    /// Text for the transient status indicator, if one should be shown.
    pub fn status_text(&self) -> Option<&'static str> {
        match self {
            Self::Connecting | Self::Authenticating => Some("Connecting…"),
            Self::Reconnecting => Some("Reconnecting…"),
            Self::Failed => Some("Could not connect. Please try again."),
            Self::Disconnected | Self::Connected => None,
        }
    }

    fn is_in_flight(&self) -> bool {
        matches!(self, Self::Connecting | Self::Authenticating)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub session_token: Option<String>,
    pub display_name: String,
    pub skin: String,
}

impl Credentials {
    pub fn new(
        session_token: impl Into<String>,
        display_name: impl Into<String>,
        skin: impl Into<String>,
    ) -> Self {
        Self {
            session_token: Some(session_token.into()),
            display_name: display_name.into(),
            skin: skin.into(),
        }
    }

    fn token(&self) -> Option<&str> {
        self.session_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Started,
    AlreadyActive,
    Suppressed,
    LockBusy,
}

/// Owns the session: one socket at a time, authentication, outbound flow
/// control, inbound routing and the remote avatar store.
///
/// Nothing happens in the background. The owner calls [`update`] once per
/// frame to drain socket events and fire due timers, and [`tick`] once per
/// render tick to advance interpolation.
///
/// [`update`]: ConnectionController::update
/// [`tick`]: ConnectionController::tick
pub struct ConnectionController<C: Connector, K: Clock = SystemClock> {
    id: u64,
    config: SyncConfig,
    connector: C,
    clock: K,
    lock: ConnectionLock,
    lock_guard: Option<ConnectionLockGuard>,
    socket: Option<C::Socket>,
    state: ConnectionState,
    credentials: Option<Credentials>,
    intentional: bool,
    attempt_started_ms: Option<u64>,
    reconnect: ReconnectionPolicy,
    reconnect_at_ms: Option<u64>,
    flush_at_ms: Option<u64>,
    prune_at_ms: Option<u64>,
    queue: OutboundQueue,
    guard: DuplicateGuard,
    router: InboundRouter,
    entities: RemoteEntityStore,
    events: VecDeque<SyncEvent>,
    online_count: Option<u32>,
    last_error: Option<ConnectionError>,
    stats: SyncStats,
}

impl<C: Connector> ConnectionController<C, SystemClock> {
    pub fn new(config: SyncConfig, connector: C) -> Self {
        Self::with_parts(config, connector, SystemClock::new(), ConnectionLock::process())
    }
}

impl<C: Connector, K: Clock> ConnectionController<C, K> {
    pub fn with_parts(config: SyncConfig, connector: C, clock: K, lock: ConnectionLock) -> Self {
        Self {
            id: NEXT_CONTROLLER_ID.fetch_add(1, Ordering::Relaxed),
            reconnect: ReconnectionPolicy::new(config.reconnect.clone()),
            queue: OutboundQueue::new(&config.queue),
            guard: DuplicateGuard::new(&config.dedup),
            entities: RemoteEntityStore::new(&config.interpolation),
            router: InboundRouter::new(),
            connector,
            clock,
            lock,
            lock_guard: None,
            socket: None,
            state: ConnectionState::Disconnected,
            credentials: None,
            intentional: false,
            attempt_started_ms: None,
            reconnect_at_ms: None,
            flush_at_ms: None,
            prune_at_ms: None,
            events: VecDeque::new(),
            online_count: None,
            last_error: None,
            stats: SyncStats::default(),
            config,
        }
    }

    /// Starts a session with `credentials`.
    ///
    /// The reconnect attempt counter is only reset by a completed handshake.
    /// After the budget is spent and the state is `Failed`, a plain `connect`
    /// makes a single attempt; use [`retry`] to start a fresh backoff
    /// sequence instead.
    ///
    /// [`retry`]: ConnectionController::retry
    pub fn connect(&mut self, credentials: Credentials) -> Result<ConnectOutcome, ConnectionError> {
        if credentials.token().is_none() {
            log::warn!("Refusing to connect without a session token");
            return Err(ConnectionError::MissingCredential);
        }

        if self.has_live_attempt() {
            log::debug!("Connect ignored, session already {:?}", self.state);
            return Ok(ConnectOutcome::AlreadyActive);
        }

        let now = self.clock.now_ms();
        if !self.guard.try_mark_connection(CONNECT_PURPOSE, now) {
            return Ok(ConnectOutcome::Suppressed);
        }

        self.intentional = false;
        self.last_error = None;
        self.credentials = Some(credentials);
        self.reconnect_at_ms = None;

        let outcome = self.begin_attempt(now);
        if outcome == ConnectOutcome::LockBusy {
            self.guard.clear_connection_marker(CONNECT_PURPOSE);
        }
        Ok(outcome)
    }

    /// Resets the reconnect budget and connects again. Meant for a user
    /// pressing "try again" after the session ended in `Failed`.
    pub fn retry(&mut self, credentials: Credentials) -> Result<ConnectOutcome, ConnectionError> {
        if !self.has_live_attempt() {
            self.reconnect.reset();
        }
        self.connect(credentials)
    }

    pub fn disconnect(&mut self) {
        self.intentional = true;

        if let Some(mut socket) = self.socket.take() {
            if socket.state().is_live() {
                socket.close(CLOSE_NORMAL);
            }
        }

        self.lock_guard = None;
        self.attempt_started_ms = None;
        self.reconnect_at_ms = None;
        self.flush_at_ms = None;
        self.prune_at_ms = None;

        self.entities.clear();
        self.queue.clear();
        self.router.reset();
        self.guard.reset_position();
        self.online_count = None;

        self.set_state(ConnectionState::Disconnected);
    }

    /// Runs one pass of the event loop: socket events first, then timers.
    pub fn update(&mut self) {
        let now = self.clock.now_ms();

        self.poll_socket(now);
        self.check_connect_timeout(now);
        self.fire_reconnect_timer(now);
        self.fire_flush_timer(now);
        self.fire_prune_timer(now);
    }

    /// Advances remote avatar interpolation by one render tick.
    pub fn tick(&mut self) {
        self.entities.tick();
    }

    /// Queues the local avatar's position unless it is too close to the last
    /// one sent. Returns the queued message id.
    pub fn publish_position(&mut self, position: Vec2, animation: &str) -> Option<u64> {
        if !self.has_session() {
            return None;
        }

        let now = self.clock.now_ms();
        if !self.guard.should_send_position(position, animation, now) {
            return None;
        }

        let message = ClientMessage::Update {
            x: position.x,
            y: position.y,
            animation: animation.to_string(),
        };
        match self.enqueue(message, Priority::Low, now) {
            Ok(id) => {
                self.guard.mark_position_sent(position, animation, now);
                Some(id)
            }
            Err(e) => {
                log::debug!("Position update not queued: {}", e);
                None
            }
        }
    }

    /// Queues a chat line. Returns the message id, or `None` when the line is
    /// empty or repeats one sent within the dedup window.
    pub fn send_chat(&mut self, text: &str) -> Result<Option<String>, QueueError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        if !self.has_session() {
            return Err(QueueError::SendFailed(String::from("no active session")));
        }

        let now = self.clock.now_ms();
        if !self.guard.should_send_chat(text, now) {
            return Ok(None);
        }

        let id = synthesize_message_id(now);
        let message = ClientMessage::Chat {
            message: text.to_string(),
            id: id.clone(),
        };
        if let Err(e) = self.enqueue(message, Priority::High, now) {
            self.guard.forget_chat(text);
            return Err(e);
        }
        Ok(Some(id))
    }

    pub fn drain_events(&mut self) -> Vec<SyncEvent> {
        self.events.drain(..).collect()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn status_text(&self) -> Option<&'static str> {
        self.state.status_text()
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn controller_id(&self) -> u64 {
        self.id
    }

    pub fn local_id(&self) -> Option<&str> {
        self.router.local_id()
    }

    pub fn online_count(&self) -> Option<u32> {
        self.online_count
    }

    pub fn last_error(&self) -> Option<&ConnectionError> {
        self.last_error.as_ref()
    }

    pub fn entities(&self) -> impl Iterator<Item = &RemoteAvatar> {
        self.entities.iter()
    }

    pub fn entity(&self, id: &str) -> Option<&RemoteAvatar> {
        self.entities.get(id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect.attempts()
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_at_ms.is_some()
    }

    pub fn flush_pending(&self) -> bool {
        self.flush_at_ms.is_some()
    }

    pub fn prune_pending(&self) -> bool {
        self.prune_at_ms.is_some()
    }

    pub fn holds_lock(&self) -> bool {
        self.lock_guard.is_some()
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            messages_evicted: self.queue.evicted_count(),
            messages_dropped: self.queue.dropped_count(),
            ..self.stats.clone()
        }
    }

    fn has_live_attempt(&self) -> bool {
        self.state.is_in_flight()
            || self.state == ConnectionState::Connected
            || self.socket.as_ref().is_some_and(|s| s.state().is_live())
    }

    fn has_session(&self) -> bool {
        !self.intentional
            && self.credentials.is_some()
            && !matches!(
                self.state,
                ConnectionState::Disconnected | ConnectionState::Failed
            )
    }

    fn socket_open(&self) -> bool {
        self.socket
            .as_ref()
            .is_some_and(|s| s.state() == SocketState::Open)
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        log::info!("Connection {:?} -> {:?}", self.state, state);
        self.state = state;
        self.events.push_back(SyncEvent::StatusChanged(state));
    }

    fn begin_attempt(&mut self, now: u64) -> ConnectOutcome {
        let Some(guard) = self.lock.try_acquire(self.id) else {
            log::info!(
                "Connection lock held by controller {:?}, not connecting",
                self.lock.holder()
            );
            return ConnectOutcome::LockBusy;
        };

        self.lock_guard = Some(guard);
        self.attempt_started_ms = Some(now);
        self.set_state(ConnectionState::Connecting);
        log::info!("Connecting to {}", self.config.endpoint);

        match self.connector.open(&self.config.endpoint) {
            Ok(socket) => self.socket = Some(socket),
            Err(e) => self.fail_attempt(ConnectionError::Refused(e.to_string()), now),
        }
        ConnectOutcome::Started
    }

    fn poll_socket(&mut self, now: u64) {
        let Some(socket) = self.socket.as_mut() else {
            return;
        };

        for event in socket.poll() {
            match event {
                SocketEvent::Opened => self.handle_opened(now),
                SocketEvent::Frame(frame) => self.handle_frame(&frame, now),
                SocketEvent::Closed { code } => {
                    self.handle_closed(code, now);
                    break;
                }
                SocketEvent::Error(message) => {
                    log::warn!("Socket error: {}", message);
                    self.handle_closed(CLOSE_ABNORMAL, now);
                    break;
                }
            }
            if self.socket.is_none() {
                break;
            }
        }
    }

    fn handle_opened(&mut self, now: u64) {
        if self.state != ConnectionState::Connecting {
            return;
        }
        self.set_state(ConnectionState::Authenticating);

        let Some(credentials) = &self.credentials else {
            self.fail_attempt(ConnectionError::MissingCredential, now);
            return;
        };
        let message = ClientMessage::Authenticate {
            token: credentials.token().unwrap_or_default().to_string(),
            display_name: credentials.display_name.clone(),
            skin: credentials.skin.clone(),
        };

        match self.send_now(&message) {
            Ok(()) => {
                log::debug!("Authenticate frame sent");
                self.arm_flush(now);
            }
            Err(e) => self.fail_attempt(ConnectionError::Refused(e.to_string()), now),
        }
    }

    fn handle_frame(&mut self, frame: &str, now: u64) {
        self.stats.frames_received += 1;

        let events = match self.router.route(frame, &mut self.entities, now) {
            Ok(events) => events,
            Err(e @ ProtocolError::UnknownKind(_)) => {
                self.stats.unknown_frames += 1;
                log::debug!("Ignoring frame: {}", e);
                return;
            }
            Err(e @ ProtocolError::MalformedFrame(_)) => {
                self.stats.malformed_frames += 1;
                log::warn!("Ignoring frame: {}", e);
                return;
            }
        };

        for event in events {
            match &event {
                SyncEvent::IdentityAssigned { .. } => self.handle_authenticated(now),
                SyncEvent::OnlineCount(count) => self.online_count = Some(*count),
                _ => {}
            }
            self.events.push_back(event);
        }
    }

    fn handle_authenticated(&mut self, now: u64) {
        if self.state != ConnectionState::Authenticating {
            return;
        }

        self.reconnect.reset();
        self.attempt_started_ms = None;
        self.lock_guard = None;
        self.guard.reset_position();
        self.stats.connections_opened += 1;
        self.set_state(ConnectionState::Connected);
        self.arm_flush(now);
    }

    fn handle_closed(&mut self, code: u16, now: u64) {
        self.socket = None;
        self.lock_guard = None;
        self.attempt_started_ms = None;
        self.flush_at_ms = None;

        if self.intentional {
            log::info!("Socket closed with code {} after disconnect", code);
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        match code {
            CLOSE_AUTH_FAILED => {
                log::warn!("Authentication rejected, a fresh session token is required");
                if let Some(credentials) = self.credentials.as_mut() {
                    credentials.session_token = None;
                }
                self.end_session(ConnectionError::AuthFailed, ConnectionState::Failed);
            }
            CLOSE_REPLACED => {
                log::warn!("Session replaced by another connection");
                self.end_session(ConnectionError::Replaced, ConnectionState::Disconnected);
            }
            _ => {
                log::warn!("Connection lost (code {})", code);
                self.schedule_reconnect(now);
            }
        }
    }

    fn end_session(&mut self, error: ConnectionError, state: ConnectionState) {
        self.last_error = Some(error);
        self.reconnect_at_ms = None;
        self.entities.clear();
        self.router.reset();
        self.set_state(state);
    }

    fn fail_attempt(&mut self, error: ConnectionError, now: u64) {
        log::warn!("Connection attempt failed: {}", error);

        if let Some(mut socket) = self.socket.take() {
            if socket.state().is_live() {
                socket.close(CLOSE_NORMAL);
            }
        }
        self.lock_guard = None;
        self.attempt_started_ms = None;
        self.flush_at_ms = None;

        let retryable = error.is_retryable();
        self.last_error = Some(error);
        if retryable {
            self.schedule_reconnect(now);
        } else {
            self.set_state(ConnectionState::Failed);
        }
    }

    fn schedule_reconnect(&mut self, now: u64) {
        self.stats.reconnect_attempts += 1;

        match self.reconnect.schedule_retry(now) {
            RetryDecision::Retry { attempt, delay_ms } => {
                log::info!(
                    "Reconnect attempt {}/{} in {} ms",
                    attempt,
                    self.reconnect.max_attempts(),
                    delay_ms
                );
                self.reconnect_at_ms = Some(now + delay_ms);
                self.set_state(ConnectionState::Reconnecting);
            }
            RetryDecision::Exhausted { attempts } => {
                log::warn!("Giving up after {} reconnect attempts", attempts);
                self.reconnect_at_ms = None;
                self.set_state(ConnectionState::Failed);
            }
        }
    }

    fn check_connect_timeout(&mut self, now: u64) {
        let Some(started) = self.attempt_started_ms else {
            return;
        };
        if self.state.is_in_flight()
            && now.saturating_sub(started) >= self.config.connect_timeout_ms
        {
            self.fail_attempt(ConnectionError::Timeout, now);
        }
    }

    fn fire_reconnect_timer(&mut self, now: u64) {
        match self.reconnect_at_ms {
            Some(at) if now >= at => self.reconnect_at_ms = None,
            _ => return,
        }

        if self.intentional || self.has_live_attempt() {
            log::debug!("Reconnect timer fired while {:?}, skipping", self.state);
            return;
        }

        if self.credentials.as_ref().and_then(Credentials::token).is_none() {
            self.set_state(ConnectionState::Failed);
            return;
        }

        if self.begin_attempt(now) == ConnectOutcome::LockBusy {
            self.schedule_reconnect(now);
        }
    }

    fn fire_flush_timer(&mut self, now: u64) {
        match self.flush_at_ms {
            Some(at) if now >= at => self.flush_at_ms = None,
            _ => return,
        }

        if !self.socket_open() {
            return;
        }

        self.flush_queue();
        self.arm_flush(now);
    }

    fn fire_prune_timer(&mut self, now: u64) {
        if !self.has_session() {
            self.prune_at_ms = None;
            return;
        }
        match self.prune_at_ms {
            Some(at) if now < at => return,
            Some(_) => {
                let pruned = self.guard.prune(now);
                if pruned > 0 {
                    log::debug!("Pruned {} dedup records", pruned);
                }
            }
            None => {}
        }
        self.prune_at_ms = Some(now + self.config.dedup.prune_interval_ms);
    }

    fn flush_queue(&mut self) {
        let Some(socket) = self.socket.as_mut() else {
            return;
        };

        let report = self.queue.flush(|message| {
            let frame = encode_client_frame(&message.payload)
                .map_err(|e| QueueError::SendFailed(e.to_string()))?;
            socket
                .send(&frame)
                .map_err(|e| QueueError::SendFailed(e.to_string()))
        });

        self.stats.frames_sent += report.delivered as u64;
        self.stats.send_failures += report.failed as u64;
    }

    fn arm_flush(&mut self, now: u64) {
        if self.flush_at_ms.is_none() && !self.queue.is_empty() && self.socket_open() {
            self.flush_at_ms = Some(now + self.config.queue.flush_interval_ms);
        }
    }

    fn enqueue(
        &mut self,
        message: ClientMessage,
        priority: Priority,
        now: u64,
    ) -> Result<u64, QueueError> {
        let id = self.queue.enqueue(message, priority, now)?;
        self.arm_flush(now);
        Ok(id)
    }

    fn send_now(&mut self, message: &ClientMessage) -> Result<(), QueueError> {
        let socket = self
            .socket
            .as_mut()
            .ok_or_else(|| QueueError::SendFailed(String::from("no socket")))?;
        let frame =
            encode_client_frame(message).map_err(|e| QueueError::SendFailed(e.to_string()))?;

        match socket.send(&frame) {
            Ok(()) => {
                self.stats.frames_sent += 1;
                Ok(())
            }
            Err(e) => {
                self.stats.send_failures += 1;
                Err(QueueError::SendFailed(e.to_string()))
            }
        }
    }
}

impl<C: Connector, K: Clock> Drop for ConnectionController<C, K> {
    fn drop(&mut self) {
        if self.socket.is_some() {
            self.disconnect();
        }
    }
}
