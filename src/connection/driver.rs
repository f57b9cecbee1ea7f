//! Async binding of [`ConnectionManager`] to a WebSocket and a timer.
//!
//! One driver task owns the state machine and processes one input at a time
//! from three sources: transport events, the reconnect timer and commands
//! from the [`ConnectionHandle`]. Each connection attempt runs in its own
//! socket task that reports back over a channel, tagged with a generation
//! number so events from a superseded socket are dropped.

use super::machine::{
    ConnectionEvent, ConnectionManager, ConnectionSnapshot, Directive, DEFAULT_RECONNECT_DELAY,
};
use crate::feed::{FeedStore, PayloadError};
use crate::util::{validate_push_endpoint, EndpointError};
use futures::{SinkExt, StreamExt};
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// How long a graceful close may take before the socket task is aborted.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Default limit on TCP connect plus WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for the push connection.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// `ws://` or `wss://` endpoint. Validated per attempt, so a bad value
    /// surfaces as a failed attempt rather than a startup error.
    pub ws_endpoint: String,
    pub reconnect_delay: Duration,
    /// An attempt that has not completed its handshake by then counts as
    /// failed and schedules a reconnect.
    pub connect_timeout: Duration,
}

impl DriverConfig {
    pub fn new(ws_endpoint: impl Into<String>) -> Self {
        Self {
            ws_endpoint: ws_endpoint.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Why a connection attempt could not be established.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("{0}")]
    Endpoint(#[from] EndpointError),
    #[error("{0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("handshake timed out")]
    Timeout,
}

enum Command {
    ReportError(String),
    Stop,
}

type TaggedEvent = (u64, ConnectionEvent);

// ============================================================================
// Handle
// ============================================================================

/// Owner-side handle to a running driver.
///
/// Dropping the handle stops the driver as well: the command channel closes
/// and the driver runs the same teardown as [`stop`](Self::stop).
pub struct ConnectionHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionSnapshot>,
    task: Option<JoinHandle<()>>,
}

/// Cloneable sender for errors observed outside the push channel.
#[derive(Clone)]
pub struct ErrorReporter {
    commands: mpsc::UnboundedSender<Command>,
}

impl ErrorReporter {
    /// Records `message` as the current error. Silently dropped once the
    /// driver has stopped.
    pub fn report(&self, message: impl Into<String>) {
        let _ = self.commands.send(Command::ReportError(message.into()));
    }
}

impl ConnectionHandle {
    /// Latest published state.
    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.status.borrow().clone()
    }

    /// Receiver notified whenever the observable state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.status.clone()
    }

    pub fn error_reporter(&self) -> ErrorReporter {
        ErrorReporter {
            commands: self.commands.clone(),
        }
    }

    /// Stops the driver and waits until the timer is cancelled and the
    /// socket is closed.
    pub async fn stop(mut self) {
        let _ = self.commands.send(Command::Stop);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Connection driver task failed");
            }
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.commands.send(Command::Stop);
        }
    }
}

/// Spawns the driver and starts the first connection attempt.
///
/// Must be called from within a tokio runtime.
pub fn spawn(config: DriverConfig, store: FeedStore) -> ConnectionHandle {
    let machine = ConnectionManager::new(store, config.reconnect_delay);
    let (status_tx, status_rx) = watch::channel(machine.snapshot());
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let driver = Driver {
        machine,
        endpoint: config.ws_endpoint,
        connect_timeout: config.connect_timeout,
        generation: 0,
        socket: None,
        events: event_tx,
        status: status_tx,
    };

    let task = tokio::spawn(driver.run(command_rx, event_rx));

    ConnectionHandle {
        commands: command_tx,
        status: status_rx,
        task: Some(task),
    }
}

// ============================================================================
// Driver
// ============================================================================

struct Driver {
    machine: ConnectionManager,
    endpoint: String,
    connect_timeout: Duration,
    generation: u64,
    socket: Option<LiveSocket>,
    events: mpsc::UnboundedSender<TaggedEvent>,
    status: watch::Sender<ConnectionSnapshot>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<TaggedEvent>,
    ) {
        // At most one pending timer: the slot holds one sleep or none.
        let mut reconnect: Option<Pin<Box<Sleep>>> = None;

        let directives = self.machine.start();
        self.apply(directives, &mut reconnect).await;
        self.publish();

        loop {
            tokio::select! {
                biased;

                cmd = commands.recv() => match cmd {
                    Some(Command::ReportError(message)) => self.machine.note_error(message),
                    Some(Command::Stop) | None => break,
                },

                Some((generation, event)) = events.recv() => {
                    if generation != self.generation {
                        tracing::debug!(generation, current = self.generation, ?event, "Dropping stale socket event");
                        continue;
                    }
                    if matches!(event, ConnectionEvent::Closed | ConnectionEvent::ConnectFailed(_)) {
                        // Socket task has finished; reap it.
                        self.socket = None;
                    }
                    let directives = self.machine.handle(event);
                    self.apply(directives, &mut reconnect).await;
                }

                () = reconnect_fired(&mut reconnect), if reconnect.is_some() => {
                    reconnect = None;
                    let directives = self.machine.handle(ConnectionEvent::ReconnectDue);
                    self.apply(directives, &mut reconnect).await;
                }
            }

            self.publish();
        }

        let directives = self.machine.stop();
        self.apply(directives, &mut reconnect).await;
        if let Some(socket) = self.socket.take() {
            socket.close().await;
        }
        self.publish();
        tracing::debug!("Connection driver exited");
    }

    async fn apply(&mut self, directives: Vec<Directive>, reconnect: &mut Option<Pin<Box<Sleep>>>) {
        for directive in directives {
            match directive {
                Directive::Connect => {
                    if let Some(old) = self.socket.take() {
                        old.close().await;
                    }
                    self.generation = self.generation.wrapping_add(1);
                    tracing::debug!(generation = self.generation, endpoint = %self.endpoint, "Opening WebSocket");
                    self.socket = Some(LiveSocket::open(
                        self.endpoint.clone(),
                        self.connect_timeout,
                        self.generation,
                        self.events.clone(),
                    ));
                }
                Directive::Send(text) => match &self.socket {
                    Some(socket) => socket.send(text),
                    None => tracing::warn!("Send requested with no open socket"),
                },
                Directive::ScheduleReconnect(delay) => {
                    *reconnect = Some(Box::pin(tokio::time::sleep(delay)));
                }
                Directive::CancelReconnect => {
                    if reconnect.take().is_some() {
                        tracing::debug!("Reconnect timer cancelled");
                    }
                }
                Directive::Close => {
                    if let Some(socket) = self.socket.take() {
                        socket.close().await;
                    }
                }
            }
        }
    }

    fn publish(&self) {
        let snapshot = self.machine.snapshot();
        self.status.send_if_modified(|current| {
            if *current != snapshot {
                *current = snapshot;
                true
            } else {
                false
            }
        });
    }
}

async fn reconnect_fired(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Socket Task
// ============================================================================

/// One connection attempt and, if it opens, the live socket.
///
/// Dropping the sender half of `outbound` asks the task to close gracefully;
/// dropping the `LiveSocket` aborts the task outright.
struct LiveSocket {
    outbound: Option<mpsc::UnboundedSender<String>>,
    task: JoinHandle<()>,
}

impl LiveSocket {
    fn open(
        endpoint: String,
        connect_timeout: Duration,
        generation: u64,
        events: mpsc::UnboundedSender<TaggedEvent>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_socket(
            endpoint,
            connect_timeout,
            generation,
            events,
            outbound_rx,
        ));
        Self {
            outbound: Some(outbound_tx),
            task,
        }
    }

    fn send(&self, text: String) {
        if let Some(tx) = &self.outbound {
            if tx.send(text).is_err() {
                tracing::debug!("Socket task already finished, outbound message dropped");
            }
        }
    }

    async fn close(mut self) {
        self.outbound.take();
        if tokio::time::timeout(CLOSE_GRACE, &mut self.task).await.is_err() {
            tracing::warn!("WebSocket did not close in time, aborting");
        }
    }
}

impl Drop for LiveSocket {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_socket(
    endpoint: String,
    connect_timeout: Duration,
    generation: u64,
    events: mpsc::UnboundedSender<TaggedEvent>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    let emit = |event: ConnectionEvent| {
        let _ = events.send((generation, event));
    };

    let url = match validate_push_endpoint(&endpoint).map_err(ConnectError::from) {
        Ok(url) => url,
        Err(e) => {
            emit(ConnectionEvent::ConnectFailed(e.to_string()));
            return;
        }
    };

    let connected = tokio::select! {
        result = tokio::time::timeout(connect_timeout, connect_async(url.as_str())) => match result {
            Ok(handshake) => handshake.map_err(ConnectError::from),
            Err(_) => Err(ConnectError::Timeout),
        },
        _ = outbound.recv() => {
            tracing::debug!("Connection attempt abandoned");
            return;
        }
    };

    let ws = match connected {
        Ok((ws, _response)) => ws,
        Err(e) => {
            emit(ConnectionEvent::ConnectFailed(e.to_string()));
            return;
        }
    };

    emit(ConnectionEvent::Opened);
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => emit(ConnectionEvent::Message(text)),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => emit(ConnectionEvent::Message(text)),
                    Err(_) => tracing::warn!(error = %PayloadError::InvalidUtf8, "Discarding binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "Server closed WebSocket");
                    break;
                }
                Some(Ok(_)) => {} // ping/pong handled by tungstenite
                Some(Err(e)) => {
                    emit(ConnectionEvent::Error(e.to_string()));
                    break;
                }
                None => break,
            },

            out = outbound.recv() => match out {
                Some(text) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        emit(ConnectionEvent::Error(e.to_string()));
                        break;
                    }
                }
                None => {
                    if let Err(e) = write.close().await {
                        tracing::debug!(error = %e, "Error sending close frame");
                    }
                    break;
                }
            },
        }
    }

    emit(ConnectionEvent::Closed);
}
