//! Push-connection state machine.
//!
//! [`ConnectionManager`] holds no sockets and no timers. It consumes
//! [`ConnectionEvent`]s and returns the [`Directive`]s the caller must carry
//! out, which keeps the reconnect and dispatch policy testable without a
//! transport. The async binding lives in `driver`.

use crate::feed::wire::get_latest_request;
use crate::feed::{decode_push_message, FeedStore, PushMessage};
use crate::util::preview;
use std::time::Duration;

/// Fixed delay between a lost connection and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Longest slice of a rejected payload written to the log.
const LOG_PREVIEW_CHARS: usize = 200;

// ============================================================================
// State, Events and Directives
// ============================================================================

/// Lifecycle state of the push connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Handshake completed.
    Opened,
    /// A text frame arrived.
    Message(String),
    /// The transport reported an error. A `Closed` normally follows.
    Error(String),
    /// The connection ended, for any reason.
    Closed,
    /// The attempt could not be initiated or the handshake failed.
    ConnectFailed(String),
    /// The pending reconnect timer fired.
    ReconnectDue,
}

/// Side effects requested by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Open a new connection to the configured endpoint.
    Connect,
    /// Send a text frame on the open connection.
    Send(String),
    /// Arm the single reconnect timer.
    ScheduleReconnect(Duration),
    /// Disarm the reconnect timer.
    CancelReconnect,
    /// Close the connection (or abandon the in-flight attempt).
    Close,
}

/// Read-only copy of the machine's observable state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub error: Option<String>,
    /// Attempts made since the last successful open.
    pub reconnect_attempts: u32,
    pub reconnect_pending: bool,
    pub stopped: bool,
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Owns the connection state and applies inbound messages to the feed.
#[derive(Debug)]
pub struct ConnectionManager {
    state: ConnectionState,
    last_error: Option<String>,
    reconnect_delay: Duration,
    reconnect_pending: bool,
    reconnect_attempts: u32,
    /// A socket exists or an attempt is in flight.
    transport_live: bool,
    stopped: bool,
    store: FeedStore,
}

impl ConnectionManager {
    pub fn new(store: FeedStore, reconnect_delay: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            last_error: None,
            reconnect_delay,
            reconnect_pending: false,
            reconnect_attempts: 0,
            transport_live: false,
            stopped: false,
            store,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            state: self.state,
            error: self.last_error.clone(),
            reconnect_attempts: self.reconnect_attempts,
            reconnect_pending: self.reconnect_pending,
            stopped: self.stopped,
        }
    }

    /// Begins the first connection attempt.
    ///
    /// Only valid from the initial `Disconnected` state; later calls are
    /// ignored, as is any call after [`stop`](Self::stop).
    pub fn start(&mut self) -> Vec<Directive> {
        if self.stopped {
            tracing::warn!("start() called after stop(), ignoring");
            return Vec::new();
        }
        if self.state != ConnectionState::Disconnected || self.transport_live {
            tracing::debug!(state = %self.state, "start() called while already running");
            return Vec::new();
        }
        self.begin_attempt()
    }

    /// Applies one event and returns the resulting side effects.
    pub fn handle(&mut self, event: ConnectionEvent) -> Vec<Directive> {
        if self.stopped {
            tracing::debug!(?event, "Ignoring event after stop");
            return Vec::new();
        }

        match event {
            ConnectionEvent::Opened => self.on_open(),
            ConnectionEvent::Message(raw) => {
                self.on_message(&raw);
                Vec::new()
            }
            ConnectionEvent::Error(message) => {
                tracing::warn!(error = %message, "WebSocket error");
                self.state = ConnectionState::Error;
                self.last_error = Some(format!("WebSocket connection error: {}", message));
                Vec::new()
            }
            ConnectionEvent::Closed => {
                tracing::info!("WebSocket disconnected");
                self.state = ConnectionState::Disconnected;
                self.transport_live = false;
                self.schedule_reconnect()
            }
            ConnectionEvent::ConnectFailed(message) => {
                tracing::warn!(error = %message, "Failed to connect WebSocket");
                self.state = ConnectionState::Error;
                self.last_error = Some(format!("Failed to connect to WebSocket: {}", message));
                self.transport_live = false;
                self.schedule_reconnect()
            }
            ConnectionEvent::ReconnectDue => {
                self.reconnect_pending = false;
                match self.state {
                    ConnectionState::Disconnected | ConnectionState::Error
                        if !self.transport_live =>
                    {
                        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
                        tracing::info!(attempt = self.reconnect_attempts, "Reconnecting");
                        self.begin_attempt()
                    }
                    state => {
                        tracing::debug!(%state, "Reconnect timer fired with live transport, ignoring");
                        Vec::new()
                    }
                }
            }
        }
    }

    /// Records an error observed outside the push channel (e.g. the
    /// snapshot fetch) without changing state. Cleared by the next open.
    pub fn note_error(&mut self, message: impl Into<String>) {
        if !self.stopped {
            self.last_error = Some(message.into());
        }
    }

    /// Tears down: cancels the pending timer and closes the transport.
    ///
    /// Idempotent. After this, every event is ignored and no reconnect is
    /// ever scheduled.
    pub fn stop(&mut self) -> Vec<Directive> {
        if self.stopped {
            return Vec::new();
        }
        self.stopped = true;

        let mut directives = Vec::with_capacity(2);
        if self.reconnect_pending {
            self.reconnect_pending = false;
            directives.push(Directive::CancelReconnect);
        }
        if self.transport_live {
            self.transport_live = false;
            directives.push(Directive::Close);
        }
        self.state = ConnectionState::Disconnected;
        tracing::info!("Connection manager stopped");
        directives
    }

    fn begin_attempt(&mut self) -> Vec<Directive> {
        self.state = ConnectionState::Connecting;
        self.transport_live = true;
        vec![Directive::Connect]
    }

    fn on_open(&mut self) -> Vec<Directive> {
        if self.state != ConnectionState::Connecting {
            tracing::debug!(state = %self.state, "Unexpected open event, ignoring");
            return Vec::new();
        }
        tracing::info!("WebSocket connected");
        self.state = ConnectionState::Connected;
        self.last_error = None;
        self.reconnect_attempts = 0;
        vec![Directive::Send(get_latest_request())]
    }

    fn schedule_reconnect(&mut self) -> Vec<Directive> {
        if self.reconnect_pending {
            tracing::debug!("Reconnect already scheduled");
            return Vec::new();
        }
        self.reconnect_pending = true;
        tracing::info!(
            delay_ms = self.reconnect_delay.as_millis() as u64,
            "Scheduling reconnect"
        );
        vec![Directive::ScheduleReconnect(self.reconnect_delay)]
    }

    fn on_message(&mut self, raw: &str) {
        if self.state != ConnectionState::Connected {
            tracing::debug!(state = %self.state, "Message outside connected state, ignoring");
            return;
        }

        match decode_push_message(raw) {
            Ok(PushMessage::NewsUpdate(article)) => {
                self.store.ingest(article);
            }
            Ok(PushMessage::LatestNews(batch)) => {
                if batch.skipped > 0 {
                    tracing::warn!(
                        skipped = batch.skipped,
                        "Malformed articles skipped in latest_news"
                    );
                }
                self.store.replace(batch.articles);
            }
            Ok(PushMessage::ServerError(message)) => {
                tracing::warn!(
                    server_message = message.as_deref().unwrap_or("<none>"),
                    "Server reported an error"
                );
            }
            Ok(PushMessage::Ignored(kind)) => {
                tracing::debug!(kind = kind.as_deref().unwrap_or("<none>"), "Ignoring message type");
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    preview = %preview(raw, LOG_PREVIEW_CHARS),
                    "Discarding malformed push message"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DELAY: Duration = DEFAULT_RECONNECT_DELAY;

    fn manager() -> (ConnectionManager, FeedStore) {
        let store = FeedStore::new();
        (ConnectionManager::new(store.clone(), DELAY), store)
    }

    fn connected() -> (ConnectionManager, FeedStore) {
        let (mut m, store) = manager();
        m.start();
        m.handle(ConnectionEvent::Opened);
        (m, store)
    }

    #[test]
    fn test_initial_state_disconnected() {
        let (m, _) = manager();
        assert_eq!(m.snapshot(), ConnectionSnapshot::default());
    }

    #[test]
    fn test_start_requests_connect() {
        let (mut m, _) = manager();
        assert_eq!(m.start(), vec![Directive::Connect]);
        assert_eq!(m.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_second_start_ignored() {
        let (mut m, _) = manager();
        m.start();
        assert!(m.start().is_empty());
    }

    #[test]
    fn test_open_clears_error_and_requests_latest() {
        let (mut m, _) = manager();
        m.start();
        m.note_error("Failed to fetch articles from API");
        let directives = m.handle(ConnectionEvent::Opened);
        assert_eq!(m.state(), ConnectionState::Connected);
        assert_eq!(m.last_error(), None);
        assert_eq!(
            directives,
            vec![Directive::Send(r#"{"action":"get_latest"}"#.to_string())]
        );
    }

    #[test]
    fn test_connect_failure_goes_to_error_and_schedules() {
        let (mut m, _) = manager();
        m.start();
        let directives = m.handle(ConnectionEvent::ConnectFailed("relative URL without a base".into()));
        assert_eq!(m.state(), ConnectionState::Error);
        assert!(m.last_error().unwrap().contains("relative URL"));
        assert_eq!(directives, vec![Directive::ScheduleReconnect(DELAY)]);
    }

    #[test]
    fn test_error_event_does_not_schedule() {
        let (mut m, _) = connected();
        let directives = m.handle(ConnectionEvent::Error("reset by peer".into()));
        assert!(directives.is_empty());
        assert_eq!(m.state(), ConnectionState::Error);
        assert!(!m.reconnect_pending());
        assert_eq!(
            m.last_error(),
            Some("WebSocket connection error: reset by peer")
        );
    }

    #[test]
    fn test_close_schedules_exactly_one_timer() {
        let (mut m, _) = connected();
        assert_eq!(
            m.handle(ConnectionEvent::Closed),
            vec![Directive::ScheduleReconnect(DELAY)]
        );
        assert!(m.reconnect_pending());
        assert!(m.handle(ConnectionEvent::Closed).is_empty());
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_error_then_close_schedules_once() {
        let (mut m, _) = connected();
        m.handle(ConnectionEvent::Error("boom".into()));
        assert_eq!(
            m.handle(ConnectionEvent::Closed),
            vec![Directive::ScheduleReconnect(DELAY)]
        );
        // The recorded error survives the close for display
        assert!(m.last_error().is_some());
    }

    #[test]
    fn test_reconnect_due_opens_new_attempt() {
        let (mut m, _) = connected();
        m.handle(ConnectionEvent::Closed);
        assert_eq!(m.handle(ConnectionEvent::ReconnectDue), vec![Directive::Connect]);
        assert_eq!(m.state(), ConnectionState::Connecting);
        assert!(!m.reconnect_pending());
        assert_eq!(m.snapshot().reconnect_attempts, 1);
    }

    #[test]
    fn test_failed_attempts_retry_indefinitely() {
        let (mut m, _) = manager();
        m.start();
        for attempt in 1..=25u32 {
            assert_eq!(
                m.handle(ConnectionEvent::ConnectFailed("refused".into())),
                vec![Directive::ScheduleReconnect(DELAY)]
            );
            assert_eq!(m.handle(ConnectionEvent::ReconnectDue), vec![Directive::Connect]);
            assert_eq!(m.snapshot().reconnect_attempts, attempt);
        }
        m.handle(ConnectionEvent::Opened);
        assert_eq!(m.snapshot().reconnect_attempts, 0);
    }

    #[test]
    fn test_stop_cancels_pending_timer() {
        let (mut m, _) = connected();
        m.handle(ConnectionEvent::Closed);
        assert_eq!(m.stop(), vec![Directive::CancelReconnect]);
        assert!(!m.reconnect_pending());
        assert!(m.handle(ConnectionEvent::ReconnectDue).is_empty());
        assert!(m.handle(ConnectionEvent::Closed).is_empty());
    }

    #[test]
    fn test_stop_closes_open_connection() {
        let (mut m, _) = connected();
        assert_eq!(m.stop(), vec![Directive::Close]);
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(m.snapshot().stopped);
    }

    #[test]
    fn test_stop_during_attempt_closes() {
        let (mut m, _) = manager();
        m.start();
        assert_eq!(m.stop(), vec![Directive::Close]);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut m, _) = connected();
        m.stop();
        assert!(m.stop().is_empty());
        assert!(m.start().is_empty());
    }

    #[test]
    fn test_stop_before_start_is_noop() {
        let (mut m, _) = manager();
        assert!(m.stop().is_empty());
    }

    #[test]
    fn test_duplicate_news_update_ingested_once() {
        let (mut m, store) = connected();
        let raw = r#"{"type":"news_update","articleId":"a1","title":"Rates hold"}"#;
        m.handle(ConnectionEvent::Message(raw.into()));
        m.handle(ConnectionEvent::Message(raw.into()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_latest_news_replaces_feed() {
        let (mut m, store) = connected();
        m.handle(ConnectionEvent::Message(
            r#"{"type":"news_update","articleId":"old"}"#.into(),
        ));
        m.handle(ConnectionEvent::Message(
            r#"{"type":"latest_news","articles":[{"articleId":"n1"},{"articleId":"n2"}]}"#.into(),
        ));
        let feed = store.current_feed();
        let ids: Vec<_> = feed.articles().iter().map(|a| a.article_id.as_str()).collect();
        assert_eq!(ids, vec!["n1", "n2"]);
    }

    #[test]
    fn test_malformed_message_changes_nothing() {
        let (mut m, store) = connected();
        let before = m.snapshot();
        assert!(m.handle(ConnectionEvent::Message("{oops".into())).is_empty());
        assert_eq!(m.snapshot(), before);
        assert!(store.is_empty());

        m.handle(ConnectionEvent::Message(
            r#"{"type":"news_update","articleId":"after"}"#.into(),
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_unknown_type_ignored() {
        let (mut m, store) = connected();
        m.handle(ConnectionEvent::Message(
            r#"{"type":"echo","message":"Unknown action: ping"}"#.into(),
        ));
        m.handle(ConnectionEvent::Message(
            r#"{"type":"error","message":"Failed to fetch articles"}"#.into(),
        ));
        assert!(store.is_empty());
        assert_eq!(m.state(), ConnectionState::Connected);
        assert_eq!(m.last_error(), None);
    }

    #[test]
    fn test_message_while_not_connected_ignored() {
        let (mut m, store) = manager();
        m.start();
        m.handle(ConnectionEvent::Message(
            r#"{"type":"news_update","articleId":"early"}"#.into(),
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_note_error_ignored_after_stop() {
        let (mut m, _) = manager();
        m.stop();
        m.note_error("late");
        assert_eq!(m.last_error(), None);
    }
}
