//! Connections keyed by URL.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use url::Url;

use super::adapter::ExchangeAdapter;
use super::connection::Connection;
use super::event::{ConnectionEvent, ConnectionEventCallback};
use super::store::StreamStore;
use super::subscription::SubscriptionRecord;
use crate::config::{BackoffStrategy, WsConfig};
use crate::error::{NetworkError, Result};

/// At most one live connection per URL, created lazily.
///
/// A connection that died is replaced on the next [`ConnectionPool::get`].
/// The replacement inherits the recorded subscriptions of the dead one when
/// [`ReconnectPolicy::resubscribe`](crate::config::ReconnectPolicy) is set,
/// and waits out an exponential backoff if previous attempts never opened.
pub struct ConnectionPool {
    config: WsConfig,
    adapter: Arc<dyn ExchangeAdapter>,
    store: Arc<StreamStore>,
    connections: DashMap<String, Arc<Connection>>,
    failures: DashMap<String, u32>,
    backoff: BackoffStrategy,
    event_callback: Option<ConnectionEventCallback>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("exchange", &self.adapter.name())
            .field("connections", &self.connections.len())
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    /// Creates an empty pool.
    pub fn new(config: WsConfig, adapter: Arc<dyn ExchangeAdapter>, store: Arc<StreamStore>) -> Self {
        let backoff = BackoffStrategy::new(config.reconnect.backoff.clone());
        Self {
            config,
            adapter,
            store,
            connections: DashMap::new(),
            failures: DashMap::new(),
            backoff,
            event_callback: None,
        }
    }

    /// Sets the lifecycle callback passed to every connection.
    pub fn with_event_callback(mut self, callback: ConnectionEventCallback) -> Self {
        self.event_callback = Some(callback);
        self
    }

    /// Returns the live connection for `url`, creating one if there is none
    /// or the previous one is closed.
    #[instrument(name = "ws_pool_get", skip(self))]
    pub fn get(&self, url: &str) -> Result<Arc<Connection>> {
        validate_url(url)?;

        let (conn, event) = match self.connections.entry(url.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().state().is_live() {
                    return Ok(Arc::clone(entry.get()));
                }
                let (conn, event) = self.replace(url, entry.get());
                entry.insert(Arc::clone(&conn));
                (conn, event)
            }
            Entry::Vacant(entry) => {
                let conn = self.spawn(url, Vec::new(), Duration::ZERO);
                entry.insert(Arc::clone(&conn));
                (conn, None)
            }
        };

        if let (Some(event), Some(callback)) = (event, &self.event_callback) {
            callback(event);
        }
        Ok(conn)
    }

    fn replace(&self, url: &str, previous: &Connection) -> (Arc<Connection>, Option<ConnectionEvent>) {
        let attempt = if previous.ever_opened() {
            self.failures.remove(url);
            0
        } else {
            let mut failures = self.failures.entry(url.to_string()).or_insert(0);
            *failures += 1;
            *failures
        };

        let records = if self.config.reconnect.resubscribe {
            previous.records()
        } else {
            Vec::new()
        };

        if attempt == 0 {
            info!(records = records.len(), "Replacing closed connection");
            return (self.spawn(url, records, Duration::ZERO), None);
        }

        let delay = self.backoff.calculate_delay(attempt - 1);
        warn!(attempt, delay_ms = delay.as_millis(), "Backing off before reconnect");
        let event = ConnectionEvent::Backoff {
            url: url.to_string(),
            attempt,
            delay,
        };
        (self.spawn(url, records, delay), Some(event))
    }

    fn spawn(&self, url: &str, records: Vec<SubscriptionRecord>, delay: Duration) -> Arc<Connection> {
        let mut conn = Connection::new(
            url,
            self.config.clone(),
            Arc::clone(&self.adapter),
            Arc::clone(&self.store),
        );
        if let Some(callback) = &self.event_callback {
            conn = conn.with_event_callback(Arc::clone(callback));
        }
        conn.restore(records);
        let conn = Arc::new(conn);
        conn.start(delay);
        conn
    }

    /// The current connection for `url`, without creating one.
    pub fn connection(&self, url: &str) -> Option<Arc<Connection>> {
        self.connections.get(url).map(|entry| Arc::clone(entry.value()))
    }

    /// Tears down and forgets the connection for `url`, rejecting its waiters
    /// with [`Error::ConnectionClosed`](crate::error::Error::ConnectionClosed).
    pub async fn close(&self, url: &str) -> bool {
        self.failures.remove(url);
        let Some((_, conn)) = self.connections.remove(url) else {
            return false;
        };
        conn.close().await;
        true
    }

    /// Closes every connection.
    pub async fn close_all(&self) {
        for url in self.urls() {
            self.close(&url).await;
        }
    }

    /// Number of pooled connections, live or not yet replaced.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns `true` if the pool holds no connection.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// URLs with a pooled connection.
    pub fn urls(&self) -> Vec<String> {
        self.connections.iter().map(|e| e.key().clone()).collect()
    }

    /// Shared store fed by every connection of the pool.
    pub fn store(&self) -> &Arc<StreamStore> {
        &self.store
    }
}

fn validate_url(url: &str) -> Result<()> {
    let parsed = Url::parse(url).map_err(|e| NetworkError::InvalidUrl(format!("{url}: {e}")))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(NetworkError::InvalidUrl(format!("unsupported scheme '{other}' in {url}")).into()),
    }
}
