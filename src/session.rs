//! Startup wiring: one store, one push connection, one snapshot fetch.

use crate::config::Config;
use crate::connection::{
    self, ConnectionHandle, ConnectionSnapshot, DriverConfig, ErrorReporter, StatusDisplay,
};
use crate::feed::{FeedBuffer, FeedStore, SnapshotFetcher};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Message recorded on the connection status when the snapshot fails.
pub const FETCH_FAILED_MESSAGE: &str = "Failed to fetch articles from API";

/// A running feed client.
///
/// Starting a session opens the push connection and issues the snapshot
/// request concurrently. Both write to the same [`FeedStore`]; whichever
/// lands last wins. Stopping (or dropping) the session cancels the pending
/// reconnect timer and closes the socket.
pub struct FeedSession {
    store: FeedStore,
    connection: Option<ConnectionHandle>,
    snapshot_task: Option<JoinHandle<()>>,
}

impl FeedSession {
    /// Starts the session. Never fails: a bad endpoint or an unreachable
    /// API shows up as an error on the connection status instead.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: &Config) -> Self {
        let store = FeedStore::new();

        let connection = connection::spawn(
            DriverConfig {
                ws_endpoint: config.ws_endpoint.clone(),
                reconnect_delay: config.reconnect_delay(),
                connect_timeout: config.request_timeout(),
            },
            store.clone(),
        );

        let snapshot_task = spawn_snapshot(config, store.clone(), connection.error_reporter());

        Self {
            store,
            connection: Some(connection),
            snapshot_task: Some(snapshot_task),
        }
    }

    pub fn store(&self) -> &FeedStore {
        &self.store
    }

    /// Current feed, newest first.
    pub fn current_feed(&self) -> Arc<FeedBuffer> {
        self.store.current_feed()
    }

    pub fn subscribe_feed(&self) -> watch::Receiver<Arc<FeedBuffer>> {
        self.store.subscribe()
    }

    pub fn connection_snapshot(&self) -> ConnectionSnapshot {
        self.connection
            .as_ref()
            .map(ConnectionHandle::snapshot)
            .unwrap_or_default()
    }

    /// Status indicator for the current connection state.
    pub fn status(&self) -> StatusDisplay<'static> {
        self.connection_snapshot().display().into_owned()
    }

    pub fn subscribe_status(&self) -> Option<watch::Receiver<ConnectionSnapshot>> {
        self.connection.as_ref().map(ConnectionHandle::subscribe)
    }

    /// Tears the session down and waits for the socket to close.
    pub async fn stop(mut self) {
        if let Some(task) = self.snapshot_task.take() {
            task.abort();
        }
        if let Some(connection) = self.connection.take() {
            connection.stop().await;
        }
    }
}

impl Drop for FeedSession {
    fn drop(&mut self) {
        if let Some(task) = self.snapshot_task.take() {
            task.abort();
        }
        // ConnectionHandle's own Drop stops the driver.
    }
}

fn spawn_snapshot(config: &Config, store: FeedStore, errors: ErrorReporter) -> JoinHandle<()> {
    let api_endpoint = config.api_endpoint.clone();
    let timeout = config.request_timeout();
    let limit = config.snapshot_limit();

    tokio::spawn(async move {
        let fetcher = match SnapshotFetcher::new(&api_endpoint, timeout) {
            Ok(fetcher) => fetcher,
            Err(e) => {
                tracing::warn!(error = %e, "Snapshot fetcher unavailable");
                errors.report(FETCH_FAILED_MESSAGE);
                return;
            }
        };

        if fetcher.seed(&store, limit).await.is_err() {
            errors.report(FETCH_FAILED_MESSAGE);
        }
    })
}
