use glam::Vec2;
use serde_json::Value;

use plaza::{
    CLOSE_ABNORMAL, CLOSE_AUTH_FAILED, CLOSE_NORMAL, CLOSE_REPLACED, ConnectOutcome,
    ConnectionController, ConnectionError, ConnectionLock, ConnectionState, Credentials,
    ManualClock, MemoryConnector, MemoryRemote, QueueError, SyncConfig, SyncEvent,
};

type Controller = ConnectionController<MemoryConnector, ManualClock>;

struct Harness {
    controller: Controller,
    connector: MemoryConnector,
    clock: ManualClock,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(SyncConfig::default(), ConnectionLock::new())
    }

    fn with_config(config: SyncConfig, lock: ConnectionLock) -> Self {
        let connector = MemoryConnector::new();
        let clock = ManualClock::new(0);
        let controller =
            ConnectionController::with_parts(config, connector.clone(), clock.clone(), lock);
        Self {
            controller,
            connector,
            clock,
        }
    }

    fn remote(&self) -> MemoryRemote {
        self.connector.last_remote().expect("no socket opened")
    }

    /// Accepts the latest socket and assigns the local identity.
    fn handshake(&mut self) -> MemoryRemote {
        let remote = self.remote();
        remote.accept();
        remote.push_frame(r#"{"kind":"connect","id":"me"}"#);
        self.controller.update();
        assert_eq!(self.controller.state(), ConnectionState::Connected);
        remote.take_sent();
        remote
    }

    fn connected() -> (Self, MemoryRemote) {
        let mut harness = Self::new();
        harness.controller.connect(credentials()).unwrap();
        let remote = harness.handshake();
        (harness, remote)
    }

    fn advance(&mut self, ms: u64) {
        self.clock.advance(ms);
        self.controller.update();
    }
}

fn credentials() -> Credentials {
    Credentials::new("session-token", "Ada", "blue")
}

fn kinds(frames: &[String]) -> Vec<String> {
    frames
        .iter()
        .map(|f| {
            let value: Value = serde_json::from_str(f).unwrap();
            value["kind"].as_str().unwrap().to_string()
        })
        .collect()
}

#[test]
fn double_connect_in_same_tick_opens_one_socket() {
    let mut harness = Harness::new();

    assert_eq!(
        harness.controller.connect(credentials()),
        Ok(ConnectOutcome::Started)
    );
    assert_eq!(
        harness.controller.connect(credentials()),
        Ok(ConnectOutcome::AlreadyActive)
    );

    assert_eq!(harness.connector.opened(), 1);
    assert_eq!(harness.controller.state(), ConnectionState::Connecting);
}

#[test]
fn connect_while_connected_is_noop() {
    let (mut harness, _remote) = Harness::connected();
    harness.clock.advance(10_000);

    assert_eq!(
        harness.controller.connect(credentials()),
        Ok(ConnectOutcome::AlreadyActive)
    );
    assert_eq!(harness.connector.opened(), 1);
}

#[test]
fn missing_token_aborts_before_opening() {
    let mut harness = Harness::new();

    let mut creds = credentials();
    creds.session_token = None;
    assert_eq!(
        harness.controller.connect(creds),
        Err(ConnectionError::MissingCredential)
    );

    let blank = Credentials::new("   ", "Ada", "blue");
    assert_eq!(
        harness.controller.connect(blank),
        Err(ConnectionError::MissingCredential)
    );

    assert_eq!(harness.connector.opened(), 0);
    assert_eq!(harness.controller.state(), ConnectionState::Disconnected);
}

#[test]
fn shared_lock_admits_one_attempt() {
    let lock = ConnectionLock::new();
    let mut first = Harness::with_config(SyncConfig::default(), lock.clone());
    let mut second = Harness::with_config(SyncConfig::default(), lock.clone());

    assert_eq!(
        first.controller.connect(credentials()),
        Ok(ConnectOutcome::Started)
    );
    assert_eq!(
        second.controller.connect(credentials()),
        Ok(ConnectOutcome::LockBusy)
    );
    assert_eq!(second.connector.opened(), 0);
    assert_eq!(lock.holder(), Some(first.controller.controller_id()));

    first.handshake();
    assert!(!lock.is_held());

    assert_eq!(
        second.controller.connect(credentials()),
        Ok(ConnectOutcome::Started)
    );
}

#[test]
fn lock_released_when_open_is_refused() {
    let lock = ConnectionLock::new();
    let mut harness = Harness::with_config(SyncConfig::default(), lock.clone());
    harness.connector.refuse(1);

    assert_eq!(
        harness.controller.connect(credentials()),
        Ok(ConnectOutcome::Started)
    );
    assert!(!lock.is_held());
    assert_eq!(harness.controller.state(), ConnectionState::Reconnecting);
    assert!(matches!(
        harness.controller.last_error(),
        Some(ConnectionError::Refused(_))
    ));
}

#[test]
fn rapid_reconnect_calls_are_suppressed() {
    let (mut harness, remote) = Harness::connected();

    harness.controller.disconnect();
    assert_eq!(remote.local_close(), Some(CLOSE_NORMAL));

    assert_eq!(
        harness.controller.connect(credentials()),
        Ok(ConnectOutcome::Suppressed)
    );
    assert_eq!(harness.connector.opened(), 1);

    harness.clock.advance(5_000);
    assert_eq!(
        harness.controller.connect(credentials()),
        Ok(ConnectOutcome::Started)
    );
    assert_eq!(harness.connector.opened(), 2);
}

#[test]
fn intentional_disconnect_schedules_no_retry() {
    let (mut harness, remote) = Harness::connected();

    harness.controller.disconnect();
    remote.close(CLOSE_NORMAL);

    for _ in 0..10 {
        harness.advance(10_000);
    }

    assert_eq!(harness.controller.state(), ConnectionState::Disconnected);
    assert!(!harness.controller.reconnect_pending());
    assert_eq!(harness.connector.opened(), 1);
}

#[test]
fn disconnect_tears_everything_down() {
    let (mut harness, remote) = Harness::connected();
    remote.push_frame(
        r#"{"kind":"players","list":[{"id":"p2","username":"Bo","x":1,"y":1}]}"#,
    );
    harness.controller.update();
    harness
        .controller
        .publish_position(Vec2::new(5.0, 5.0), "walk");
    assert_eq!(harness.controller.entity_count(), 1);
    assert!(harness.controller.flush_pending());

    harness.controller.disconnect();

    assert_eq!(harness.controller.entity_count(), 0);
    assert_eq!(harness.controller.queued(), 0);
    assert!(!harness.controller.flush_pending());
    assert!(!harness.controller.reconnect_pending());
    assert!(!harness.controller.prune_pending());
    assert!(!harness.controller.holds_lock());
    assert_eq!(harness.controller.local_id(), None);

    harness.advance(1_000);
    assert!(remote.sent().is_empty());
    assert!(!harness.controller.prune_pending());
}

#[test]
fn unexpected_close_reconnects_with_backoff() {
    let (mut harness, remote) = Harness::connected();

    remote.close(CLOSE_ABNORMAL);
    harness.controller.update();
    assert_eq!(harness.controller.state(), ConnectionState::Reconnecting);
    assert_eq!(harness.controller.reconnect_attempts(), 1);

    harness.advance(799);
    assert_eq!(harness.connector.opened(), 1);

    harness.advance(1_200 - 799);
    assert_eq!(harness.connector.opened(), 2);
    assert_eq!(harness.controller.state(), ConnectionState::Connecting);

    harness.handshake();
    assert_eq!(harness.controller.reconnect_attempts(), 0);
}

#[test]
fn normal_close_from_server_without_disconnect_reconnects() {
    let (mut harness, remote) = Harness::connected();

    remote.close(CLOSE_NORMAL);
    harness.controller.update();

    assert_eq!(harness.controller.state(), ConnectionState::Reconnecting);
    assert!(harness.controller.reconnect_pending());
}

#[test]
fn socket_error_reconnects() {
    let (mut harness, remote) = Harness::connected();

    remote.error("connection reset");
    harness.controller.update();

    assert_eq!(harness.controller.state(), ConnectionState::Reconnecting);
}

#[test]
fn attempt_budget_ends_in_failed() {
    let mut config = SyncConfig::default();
    config.reconnect.max_attempts = 2;
    let mut harness = Harness::with_config(config, ConnectionLock::new());
    harness.connector.refuse(10);

    harness.controller.connect(credentials()).unwrap();
    assert_eq!(harness.controller.state(), ConnectionState::Reconnecting);

    for _ in 0..4 {
        harness.advance(60_000);
    }

    assert_eq!(harness.controller.state(), ConnectionState::Failed);
    assert!(!harness.controller.reconnect_pending());
    let events = harness.controller.drain_events();
    assert_eq!(
        events.last(),
        Some(&SyncEvent::StatusChanged(ConnectionState::Failed))
    );
}

#[test]
fn manual_retry_after_failure_restores_backoff() {
    let mut config = SyncConfig::default();
    config.reconnect.max_attempts = 1;
    let mut harness = Harness::with_config(config, ConnectionLock::new());
    harness.connector.refuse(10);

    harness.controller.connect(credentials()).unwrap();
    harness.advance(60_000);
    assert_eq!(harness.controller.state(), ConnectionState::Failed);

    // A plain connect keeps the spent budget: one attempt, then Failed again.
    harness.clock.advance(6_000);
    harness.controller.connect(credentials()).unwrap();
    assert_eq!(harness.controller.state(), ConnectionState::Failed);

    harness.clock.advance(6_000);
    assert_eq!(
        harness.controller.retry(credentials()),
        Ok(ConnectOutcome::Started)
    );
    assert_eq!(harness.controller.state(), ConnectionState::Reconnecting);
    assert_eq!(harness.controller.reconnect_attempts(), 1);
    assert!(harness.controller.reconnect_pending());
}

#[test]
fn retry_timer_skips_when_connected_another_way() {
    let mut config = SyncConfig::default();
    config.reconnect.base_delay_ms = 20_000;
    let mut harness = Harness::with_config(config, ConnectionLock::new());

    harness.controller.connect(credentials()).unwrap();
    harness.handshake();
    harness.remote().close(CLOSE_ABNORMAL);
    harness.controller.update();
    assert!(harness.controller.reconnect_pending());

    harness.clock.advance(6_000);
    assert_eq!(
        harness.controller.connect(credentials()),
        Ok(ConnectOutcome::Started)
    );
    harness.handshake();
    assert_eq!(harness.connector.opened(), 2);

    harness.advance(30_000);
    assert_eq!(harness.connector.opened(), 2);
    assert_eq!(harness.controller.state(), ConnectionState::Connected);
}

#[test]
fn auth_failure_is_terminal_until_new_credentials() {
    let mut harness = Harness::new();
    harness.controller.connect(credentials()).unwrap();

    let remote = harness.remote();
    remote.accept();
    harness.controller.update();
    assert_eq!(harness.controller.state(), ConnectionState::Authenticating);

    remote.close(CLOSE_AUTH_FAILED);
    harness.controller.update();

    assert_eq!(harness.controller.state(), ConnectionState::Failed);
    assert_eq!(
        harness.controller.last_error(),
        Some(&ConnectionError::AuthFailed)
    );
    assert!(!harness.controller.reconnect_pending());

    harness.advance(120_000);
    assert_eq!(harness.connector.opened(), 1);

    assert_eq!(
        harness.controller.connect(Credentials::new("fresh", "Ada", "blue")),
        Ok(ConnectOutcome::Started)
    );
    assert_eq!(harness.connector.opened(), 2);
}

#[test]
fn replaced_session_is_not_retried() {
    let (mut harness, remote) = Harness::connected();

    remote.close(CLOSE_REPLACED);
    harness.controller.update();
    harness.advance(120_000);

    assert_eq!(harness.controller.state(), ConnectionState::Disconnected);
    assert_eq!(
        harness.controller.last_error(),
        Some(&ConnectionError::Replaced)
    );
    assert_eq!(harness.connector.opened(), 1);
}

#[test]
fn duplicate_chat_sends_one_frame() {
    let (mut harness, remote) = Harness::connected();

    let first = harness.controller.send_chat("hello there").unwrap();
    harness.clock.advance(1_500);
    let second = harness.controller.send_chat("hello there").unwrap();
    assert!(first.is_some());
    assert!(second.is_none());

    harness.advance(100);
    let sent = remote.take_sent();
    assert_eq!(kinds(&sent), vec!["chat"]);

    let value: Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(value["message"], "hello there");
    assert_eq!(value["id"].as_str(), first.as_deref());

    harness.clock.advance(2_000);
    assert!(harness.controller.send_chat("hello there").unwrap().is_some());
}

#[test]
fn chat_without_session_is_refused() {
    let mut harness = Harness::new();
    assert!(matches!(
        harness.controller.send_chat("anyone?"),
        Err(QueueError::SendFailed(_))
    ));
    assert_eq!(harness.controller.send_chat("   "), Ok(None));
}

#[test]
fn queued_message_is_delivered_once() {
    let (mut harness, remote) = Harness::connected();

    harness.controller.send_chat("just once").unwrap();
    assert_eq!(harness.controller.queued(), 1);

    harness.advance(100);
    harness.advance(100);
    harness.advance(100);

    assert_eq!(kinds(&remote.sent()), vec!["chat"]);
    assert_eq!(harness.controller.queued(), 0);
    assert!(!harness.controller.flush_pending());
}

#[test]
fn failed_send_is_retried_next_flush() {
    let (mut harness, remote) = Harness::connected();

    harness.controller.send_chat("retry me").unwrap();
    remote.fail_sends(1);

    harness.advance(100);
    assert!(remote.sent().is_empty());
    assert_eq!(harness.controller.queued(), 1);

    harness.advance(100);
    assert_eq!(kinds(&remote.sent()), vec!["chat"]);
    assert_eq!(harness.controller.stats().send_failures, 1);
}

#[test]
fn messages_wait_for_open_socket() {
    let mut harness = Harness::new();
    harness.controller.connect(credentials()).unwrap();

    harness.controller.send_chat("early bird").unwrap();
    assert!(!harness.controller.flush_pending());
    harness.advance(500);

    let remote = harness.remote();
    assert!(remote.sent().is_empty());

    remote.accept();
    harness.controller.update();
    harness.advance(100);

    assert_eq!(kinds(&remote.sent()), vec!["authenticate", "chat"]);
}

#[test]
fn sub_threshold_samples_enqueue_once() {
    let (mut harness, remote) = Harness::connected();

    let mut queued = 0;
    for i in 0..5 {
        let position = Vec2::new(10.0 + i as f32 * 0.1, 10.0);
        if harness
            .controller
            .publish_position(position, "walk")
            .is_some()
        {
            queued += 1;
        }
        harness.clock.advance(60);
    }
    assert_eq!(queued, 1);

    harness.advance(100);
    let sent = remote.take_sent();
    assert_eq!(kinds(&sent), vec!["update"]);
    let value: Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(value["x"].as_f64(), Some(10.0));
    assert_eq!(value["animation"], "walk");
}

#[test]
fn refused_position_is_offered_again() {
    let mut config = SyncConfig::default();
    config.queue.capacity = 1;
    let mut harness = Harness::with_config(config, ConnectionLock::new());
    harness.controller.connect(credentials()).unwrap();
    let remote = harness.handshake();

    harness.controller.send_chat("hi").unwrap();
    let resting = Vec2::new(50.0, 50.0);
    assert_eq!(harness.controller.publish_position(resting, "idle"), None);

    harness.advance(100);
    assert!(harness.controller.publish_position(resting, "idle").is_some());
    assert_eq!(harness.controller.publish_position(resting, "idle"), None);

    harness.advance(100);
    let sent = remote.take_sent();
    assert_eq!(kinds(&sent), vec!["chat", "update"]);
    let value: Value = serde_json::from_str(&sent[1]).unwrap();
    assert_eq!(value["x"].as_f64(), Some(50.0));
}

#[test]
fn chat_is_flushed_before_position() {
    let (mut harness, remote) = Harness::connected();

    harness.controller.publish_position(Vec2::new(1.0, 2.0), "idle");
    harness.controller.send_chat("priority").unwrap();
    harness.advance(100);

    assert_eq!(kinds(&remote.sent()), vec!["chat", "update"]);
}

#[test]
fn update_for_unknown_player_creates_entity() {
    let (mut harness, remote) = Harness::connected();

    remote.push_frame(
        r#"{"kind":"playerUpdate","player":{"id":"p7","username":"Sev","x":8,"y":3,"animation":"run"}}"#,
    );
    harness.controller.update();

    let avatar = harness.controller.entity("p7").expect("defensive join");
    assert_eq!(avatar.target_position, Vec2::new(8.0, 3.0));
    assert!(harness.controller.drain_events().contains(&SyncEvent::AvatarJoined {
        id: "p7".into(),
        display_name: "Sev".into(),
    }));
}

#[test]
fn remote_avatars_ease_towards_target() {
    let (mut harness, remote) = Harness::connected();

    remote.push_frame(r#"{"kind":"playerJoined","player":{"id":"p2","username":"Bo","x":0,"y":0}}"#);
    remote.push_frame(r#"{"kind":"playerUpdate","player":{"id":"p2","x":100,"y":0}}"#);
    harness.controller.update();

    harness.controller.tick();
    let first = harness.controller.entity("p2").unwrap().current_position.x;
    assert!((first - 20.0).abs() < 1e-4);

    for _ in 0..60 {
        harness.controller.tick();
    }
    let settled = harness.controller.entity("p2").unwrap().current_position.x;
    assert!((settled - 100.0).abs() < 0.01);

    remote.push_frame(r#"{"kind":"playerDisconnect","id":"p2","username":"Bo"}"#);
    harness.controller.update();
    assert!(harness.controller.entity("p2").is_none());
}

#[test]
fn bad_frames_are_counted_and_ignored() {
    let (mut harness, remote) = Harness::connected();

    remote.push_frame("{{{ not json");
    remote.push_frame(r#"{"kind":"stockTicker","symbol":"ACME"}"#);
    remote.push_frame(r#"{"kind":"onlineUsersCount","count":4}"#);
    harness.controller.update();

    let stats = harness.controller.stats();
    assert_eq!(stats.malformed_frames, 1);
    assert_eq!(stats.unknown_frames, 1);
    assert_eq!(harness.controller.online_count(), Some(4));
    assert_eq!(harness.controller.state(), ConnectionState::Connected);
}

#[test]
fn status_events_follow_state_machine() {
    let (mut harness, _remote) = Harness::connected();

    let states: Vec<ConnectionState> = harness
        .controller
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            SyncEvent::StatusChanged(state) => Some(state),
            _ => None,
        })
        .collect();

    assert_eq!(
        states,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Authenticating,
            ConnectionState::Connected,
        ]
    );
}
