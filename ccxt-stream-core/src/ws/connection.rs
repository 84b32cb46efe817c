//! One physical socket to one URL.

use dashmap::DashSet;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Notify, OnceCell, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::adapter::{ErrorScope, ExchangeAdapter, FrameError};
use super::dispatch::{Delivery, DispatchContext, Dispatched, StreamUpdate};
use super::event::{ConnectionEvent, ConnectionEventCallback};
use super::heartbeat;
use super::lock;
use super::state::{ConnectionState, WsStats, WsStatsSnapshot};
use super::store::StreamStore;
use super::subscription::{SubscriptionManager, SubscriptionRecord};
use crate::config::WsConfig;
use crate::error::{Error, NetworkError, Result, truncate_message};
use crate::registry::{FutureRegistry, Waiter, WaiterKind};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// A subscribe or request frame together with how its answer is awaited.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscribe {
    /// Message hash the answer arrives on
    pub message_hash: String,
    /// Frame sent to the exchange
    pub frame: Value,
    /// Dedup key when several hashes share one exchange subscription
    pub subscription_key: Option<String>,
    /// Waiter kind
    pub kind: WaiterKind,
    /// Whether the channel needs authentication
    pub private: bool,
}

impl Subscribe {
    /// A streaming subscription: recorded for replay, answered repeatedly.
    pub fn persistent(message_hash: impl Into<String>, frame: Value) -> Self {
        Self {
            message_hash: message_hash.into(),
            frame,
            subscription_key: None,
            kind: WaiterKind::Persistent,
            private: false,
        }
    }

    /// A request answered once, never replayed.
    pub fn one_shot(message_hash: impl Into<String>, frame: Value) -> Self {
        Self {
            kind: WaiterKind::OneShot,
            ..Self::persistent(message_hash, frame)
        }
    }

    /// Sets the key used to deduplicate the exchange subscription.
    pub fn with_subscription_key(mut self, key: impl Into<String>) -> Self {
        self.subscription_key = Some(key.into());
        self
    }

    /// Marks the channel as private.
    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }
}

/// A connection to one URL, multiplexing every subscription made on it.
///
/// Inbound frames are processed one at a time, in arrival order, by a single
/// receive loop. Outbound frames go through an unbounded FIFO queue drained
/// by a writer task. The connection never reopens: once `Closed`, the
/// [`ConnectionPool`](super::ConnectionPool) builds a replacement.
pub struct Connection {
    url: String,
    config: WsConfig,
    adapter: Arc<dyn ExchangeAdapter>,
    store: Arc<StreamStore>,
    state: AtomicU8,
    state_changed: Notify,
    ever_opened: AtomicBool,
    authenticated: OnceCell<()>,
    registry: FutureRegistry<StreamUpdate>,
    subscriptions: SubscriptionManager,
    private_hashes: DashSet<String>,
    book_symbols: DashSet<String>,
    stats: WsStats,
    write_tx: mpsc::UnboundedSender<Message>,
    write_rx: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    replay: Mutex<Vec<SubscriptionRecord>>,
    cancel: CancellationToken,
    close_error: OnceLock<Error>,
    event_callback: Option<ConnectionEventCallback>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.url)
            .field("exchange", &self.adapter.name())
            .field("state", &self.state())
            .field("subscriptions", &self.subscriptions.count())
            .field("waiting_hashes", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Creates a connection in the `Connecting` state. Nothing happens on the
    /// network until [`Connection::connect`] or the pool starts it.
    pub fn new(
        url: impl Into<String>,
        config: WsConfig,
        adapter: Arc<dyn ExchangeAdapter>,
        store: Arc<StreamStore>,
    ) -> Self {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        Self {
            url: url.into(),
            subscriptions: SubscriptionManager::new(config.max_subscriptions),
            config,
            adapter,
            store,
            state: AtomicU8::new(ConnectionState::Connecting.as_u8()),
            state_changed: Notify::new(),
            ever_opened: AtomicBool::new(false),
            authenticated: OnceCell::new(),
            registry: FutureRegistry::new(),
            private_hashes: DashSet::new(),
            book_symbols: DashSet::new(),
            stats: WsStats::new(),
            write_tx,
            write_rx: Mutex::new(Some(write_rx)),
            writer: Mutex::new(None),
            replay: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            close_error: OnceLock::new(),
            event_callback: None,
        }
    }

    /// Sets the lifecycle event callback. Callbacks run inline on the
    /// connection's tasks and must not block.
    pub fn with_event_callback(mut self, callback: ConnectionEventCallback) -> Self {
        self.event_callback = Some(callback);
        self
    }

    /// Starts connecting in the background and returns the shared handle.
    pub fn connect(self) -> Arc<Self> {
        let conn = Arc::new(self);
        conn.start(Duration::ZERO);
        conn
    }

    /// Carries subscription records over from a previous connection. They
    /// are re-sent, in order, as soon as the socket opens.
    pub(crate) fn restore(&self, records: Vec<SubscriptionRecord>) {
        if records.is_empty() {
            return;
        }
        for record in records.iter().filter(|r| r.private) {
            for hash in &record.hashes {
                self.private_hashes.insert(hash.clone());
            }
        }
        self.subscriptions.restore(records.clone());
        *lock(&self.replay) = records;
    }

    pub(crate) fn start(self: &Arc<Self>, delay: Duration) {
        let conn = Arc::clone(self);
        tokio::spawn(async move { conn.run(delay).await });
    }

    #[instrument(name = "ws_connection", skip(self, delay), fields(url = %self.url))]
    async fn run(self: Arc<Self>, delay: Duration) {
        if !delay.is_zero() {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.emit(ConnectionEvent::Connecting {
            url: self.url.clone(),
        });
        info!("Initiating WebSocket connection");

        let stream = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return,
            result = tokio::time::timeout(self.config.connect_timeout, connect_async(self.url.as_str())) => {
                match result {
                    Ok(Ok((stream, response))) => {
                        info!(
                            status = response.status().as_u16(),
                            "WebSocket connection established"
                        );
                        stream
                    }
                    Ok(Err(e)) => {
                        error!(error = %e, "WebSocket connection failed");
                        self.teardown(Error::from(e));
                        return;
                    }
                    Err(_) => {
                        #[allow(clippy::cast_possible_truncation)]
                        let timeout_ms = self.config.connect_timeout.as_millis() as u64;
                        error!(timeout_ms, "WebSocket connection timeout");
                        self.teardown(NetworkError::ConnectTimeout.into());
                        return;
                    }
                }
            }
        };

        let (write, read) = stream.split();
        self.open(write);
        self.read_loop(read).await;
    }

    fn open(self: &Arc<Self>, write: WsWriter) {
        let Some(write_rx) = lock(&self.write_rx).take() else {
            return;
        };
        let writer = tokio::spawn(Arc::clone(self).write_loop(write, write_rx));
        *lock(&self.writer) = Some(writer);
        self.stats.record_connected();
        self.ever_opened.store(true, Ordering::Release);

        let replay = std::mem::take(&mut *lock(&self.replay));
        let replayed = replay.len();
        let (private, public): (Vec<_>, Vec<_>) = replay.into_iter().partition(|r| r.private);
        self.replay_records(&public);

        if self
            .state
            .compare_exchange(
                ConnectionState::Connecting.as_u8(),
                ConnectionState::Open.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }
        self.state_changed.notify_waiters();

        self.emit(ConnectionEvent::Connected {
            url: self.url.clone(),
        });
        if !private.is_empty() {
            let conn = Arc::clone(self);
            tokio::spawn(async move {
                match conn.ensure_authenticated().await {
                    Ok(()) => conn.replay_records(&private),
                    Err(e) => warn!(url = %conn.url, error = %e, "Private channels not restored"),
                }
            });
        }
        if replayed > 0 {
            info!(count = replayed, "Replaying recorded subscriptions");
            self.emit(ConnectionEvent::Resubscribed {
                url: self.url.clone(),
                count: replayed,
            });
        }

        if self.config.heartbeat.is_enabled() {
            tokio::spawn(heartbeat::monitor(Arc::clone(self)));
        }
    }

    fn replay_records(&self, records: &[SubscriptionRecord]) {
        for record in records {
            if let Err(e) = self.enqueue(&record.request) {
                warn!(message_hash = %record.message_hash, error = %e, "Failed to replay subscription");
            }
        }
    }

    /// Runs the adapter's authentication handshake once per connection.
    /// Concurrent callers wait for the same handshake.
    pub async fn ensure_authenticated(&self) -> Result<()> {
        self.authenticated
            .get_or_try_init(|| async {
                self.ready().await?;
                debug!("Authenticating connection");
                self.adapter.authenticate(self).await
            })
            .await
            .map(|_| ())
    }

    /// Returns `true` once the authentication handshake succeeded.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated.initialized()
    }

    async fn write_loop(
        self: Arc<Self>,
        mut write: WsWriter,
        mut write_rx: mpsc::UnboundedReceiver<Message>,
    ) {
        loop {
            tokio::select! {
                biased;
                message = write_rx.recv() => {
                    let Some(message) = message else { break };
                    let closing = matches!(message, Message::Close(_));
                    let len = message.len() as u64;
                    if let Err(e) = write.send(message).await {
                        if !closing {
                            error!(error = %e, "Failed to write frame");
                            self.teardown(Error::from(e));
                        }
                        break;
                    }
                    self.stats.record_sent(len);
                    if closing {
                        break;
                    }
                }
                () = self.cancel.cancelled() => break,
            }
        }
    }

    async fn read_loop(&self, mut read: WsReader) {
        loop {
            let message = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                message = read.next() => message,
            };

            match message {
                Some(Ok(Message::Text(text))) => {
                    self.stats.record_received(text.len() as u64);
                    self.handle_text(text.as_str());
                }
                Some(Ok(Message::Binary(data))) => {
                    self.stats.record_received(data.len() as u64);
                    match std::str::from_utf8(&data) {
                        Ok(text) => self.handle_text(text),
                        Err(e) => {
                            self.stats.record_parse_failure();
                            warn!(error = %e, "Dropping non UTF-8 binary frame");
                        }
                    }
                }
                Some(Ok(Message::Pong(_))) => self.stats.record_pong(),
                Some(Ok(Message::Ping(_) | Message::Frame(_))) => self.stats.record_received(0),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame.map_or((None, String::new()), |f| {
                        (Some(u16::from(f.code)), f.reason.to_string())
                    });
                    self.teardown(NetworkError::ClosedByPeer { code, reason }.into());
                    break;
                }
                Some(Err(e)) => {
                    self.teardown(Error::from(e));
                    break;
                }
                None => {
                    self.teardown(
                        NetworkError::ClosedByPeer {
                            code: None,
                            reason: "stream ended".to_string(),
                        }
                        .into(),
                    );
                    break;
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        match serde_json::from_str::<Value>(text) {
            Ok(frame) => self.dispatch(&frame),
            Err(e) => {
                self.stats.record_parse_failure();
                warn!(
                    error = %e,
                    frame = %truncate_message(text.to_string()),
                    "Failed to parse inbound frame"
                );
            }
        }
    }

    /// Routes one decoded frame: liveness, error frames, then the adapter's
    /// handler for the frame's stream kind.
    fn dispatch(&self, frame: &Value) {
        if self.adapter.is_pong(frame) {
            self.stats.record_pong();
            return;
        }

        if let Some(FrameError { scope, error }) = self.adapter.classify_error(frame) {
            self.apply_frame_error(scope, error);
            return;
        }

        let Some(kind) = self.adapter.stream_kind(frame) else {
            debug!("Dropping frame with no stream kind");
            return;
        };
        let Some(handler) = self.adapter.handlers().get(kind) else {
            debug!(?kind, "No handler registered for stream kind");
            return;
        };

        let mut ctx = DispatchContext::new(&self.url, &self.store);
        let result = handler(&mut ctx, frame);
        let Dispatched {
            affected,
            deliveries,
            books,
        } = ctx.finish();
        for symbol in books {
            self.book_symbols.insert(symbol);
        }

        match result {
            Ok(()) => {
                for (hash, delivery) in deliveries {
                    match delivery {
                        Delivery::Resolve(update) => self.registry.resolve(&hash, update),
                        Delivery::Reject(error) => self.registry.reject(&hash, error),
                    };
                }
            }
            Err(error) if error.is_connection_fatal() => {
                self.teardown(error);
            }
            Err(error) => {
                warn!(?kind, error = %error, "Frame handler failed");
                let mut explicit = Vec::new();
                for (hash, delivery) in deliveries {
                    if let Delivery::Reject(e) = delivery {
                        self.registry.reject(&hash, e);
                        explicit.push(hash);
                    }
                }
                for hash in affected.iter().filter(|h| !explicit.contains(h)) {
                    self.registry.reject(hash, error.clone());
                }
            }
        }
    }

    fn apply_frame_error(&self, scope: ErrorScope, error: Error) {
        match scope {
            ErrorScope::Hashes(hashes) => {
                warn!(?hashes, error = %error, "Exchange error frame");
                for hash in &hashes {
                    self.registry.reject(hash, error.clone());
                }
            }
            ErrorScope::Private => {
                let hashes: Vec<String> = self.private_hashes.iter().map(|h| h.key().clone()).collect();
                warn!(count = hashes.len(), error = %error, "Rejecting private channels");
                for hash in &hashes {
                    self.registry.reject(hash, error.clone());
                }
            }
            ErrorScope::Connection => {
                self.teardown(error);
            }
        }
    }

    /// Closes the connection with `error`, rejecting every waiter.
    ///
    /// Only the first call has an effect. Returns `true` if this call closed
    /// the connection.
    fn teardown(&self, error: Error) -> bool {
        if self.close_error.set(error.clone()).is_err() {
            return false;
        }
        self.state
            .store(ConnectionState::Closing.as_u8(), Ordering::Release);
        self.cancel.cancel();

        let invalidated = self.invalidate_books();
        let rejected = self.registry.reject_all(&error);
        self.state
            .store(ConnectionState::Closed.as_u8(), Ordering::Release);
        self.state_changed.notify_waiters();

        if error.as_connection_closed().is_some() {
            info!(url = %self.url, rejected, invalidated, "Connection closed");
        } else {
            warn!(url = %self.url, rejected, invalidated, error = %error, "Connection torn down");
        }
        self.emit(ConnectionEvent::Closed {
            url: self.url.clone(),
            reason: error.to_string(),
        });
        true
    }

    /// Marks every book this connection fed as needing a fresh snapshot.
    fn invalidate_books(&self) -> usize {
        let symbols: Vec<String> = self.book_symbols.iter().map(|s| s.key().clone()).collect();
        self.book_symbols.clear();
        symbols
            .iter()
            .filter(|symbol| self.store.books().invalidate(symbol))
            .count()
    }

    pub(crate) fn heartbeat_timeout(&self, elapsed: Duration, window: Duration) {
        warn!(
            url = %self.url,
            elapsed_ms = elapsed.as_millis(),
            window_ms = window.as_millis(),
            "Heartbeat timeout"
        );
        self.emit(ConnectionEvent::HeartbeatTimeout {
            url: self.url.clone(),
            elapsed,
        });
        self.teardown(Error::timeout(format!(
            "no liveness response within {}ms",
            window.as_millis()
        )));
    }

    pub(crate) fn send_ping(&self) -> Result<()> {
        let message = match self.adapter.ping_frame() {
            Some(frame) => Message::Text(serde_json::to_string(&frame)?.into()),
            None => Message::Ping(Vec::<u8>::new().into()),
        };
        self.stats.record_ping();
        self.push(message)
    }

    fn emit(&self, event: ConnectionEvent) {
        if let Some(callback) = &self.event_callback {
            callback(event);
        }
    }

    fn push(&self, message: Message) -> Result<()> {
        self.write_tx
            .send(message)
            .map_err(|e| NetworkError::SendFailed(e.to_string()).into())
    }

    fn enqueue(&self, frame: &Value) -> Result<()> {
        let text = serde_json::to_string(frame)?;
        self.push(Message::Text(text.into()))
    }

    /// Waits until the socket is open.
    ///
    /// Fails with the teardown error if the connection closes first.
    pub async fn ready(&self) -> Result<()> {
        loop {
            let notified = self.state_changed.notified();
            match self.state() {
                ConnectionState::Open => return Ok(()),
                ConnectionState::Closing | ConnectionState::Closed => {
                    return Err(self.close_reason());
                }
                ConnectionState::Connecting => notified.await,
            }
        }
    }

    fn close_reason(&self) -> Error {
        self.close_error
            .get()
            .cloned()
            .unwrap_or_else(|| Error::connection_closed("connection closed"))
    }

    /// Enqueues a JSON frame. Frames are written in FIFO order.
    ///
    /// Fails with a transport error unless the socket is open.
    pub fn send(&self, frame: &Value) -> Result<()> {
        if self.state() != ConnectionState::Open {
            return Err(NetworkError::NotConnected.into());
        }
        self.enqueue(frame)
    }

    /// Records the request, registers a waiter on its message hash, and sends
    /// the frame. Private requests authenticate the connection first.
    ///
    /// Persistent subscriptions are recorded for replay and sent only once per
    /// dedup key; re-subscribing joins the existing waiter channel. One-shot
    /// requests are always sent and never recorded.
    #[instrument(
        name = "ws_subscribe",
        skip(self, request),
        fields(url = %self.url, message_hash = %request.message_hash)
    )]
    pub async fn subscribe(&self, request: Subscribe) -> Result<Waiter<StreamUpdate>> {
        self.ready().await?;
        if request.private {
            self.ensure_authenticated().await?;
        }
        let Subscribe {
            message_hash,
            frame,
            subscription_key,
            kind,
            private,
        } = request;

        match kind {
            WaiterKind::Persistent => {
                let is_new =
                    self.subscriptions
                        .try_add(&message_hash, frame.clone(), subscription_key, private)?;
                if private {
                    self.private_hashes.insert(message_hash.clone());
                }
                let waiter = self.registry.register(&message_hash, kind);
                if is_new {
                    debug!("Sending subscribe frame");
                    self.send(&frame)?;
                }
                Ok(waiter)
            }
            WaiterKind::OneShot => {
                if private {
                    self.private_hashes.insert(message_hash.clone());
                }
                let waiter = self.registry.register(&message_hash, kind);
                self.send(&frame)?;
                Ok(waiter)
            }
        }
    }

    /// Drops the persistent waiter of `message_hash` and detaches it from its
    /// recorded subscription.
    ///
    /// The exchange is only told to unsubscribe, through the adapter's
    /// unsubscribe frame, once no other hash shares the subscription.
    #[instrument(name = "ws_unsubscribe", skip(self), fields(url = %self.url))]
    pub fn unsubscribe(&self, message_hash: &str) -> Result<bool> {
        let recorded = self.subscriptions.contains_hash(message_hash);
        let removed = self.subscriptions.remove_hash(message_hash);
        let had_waiter = self.registry.unsubscribe(message_hash);
        self.private_hashes.remove(message_hash);

        if self.state() == ConnectionState::Open {
            for record in &removed {
                if let Some(frame) = self.adapter.unsubscribe_frame(record) {
                    self.send(&frame)?;
                }
            }
        }
        Ok(recorded || had_waiter)
    }

    /// Resolves `message_hash` on this connection.
    pub fn resolve(&self, message_hash: &str, update: StreamUpdate) -> usize {
        self.registry.resolve(message_hash, update)
    }

    /// Rejects `message_hash` on this connection.
    pub fn reject(&self, message_hash: &str, error: Error) -> usize {
        self.registry.reject(message_hash, error)
    }

    /// Closes the socket gracefully and rejects every waiter with
    /// [`Error::ConnectionClosed`].
    #[instrument(name = "ws_close", skip(self), fields(url = %self.url))]
    pub async fn close(&self) {
        if self.state() == ConnectionState::Open {
            let _ = self.push(Message::Close(None));
        }
        self.teardown(Error::connection_closed("connection closed by caller"));

        let writer = lock(&self.writer).take();
        if let Some(writer) = writer
            && tokio::time::timeout(self.config.shutdown_timeout, writer)
                .await
                .is_err()
        {
            warn!("Writer did not finish within the shutdown timeout");
        }
    }

    /// Endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns `true` while the socket is open.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub(crate) fn ever_opened(&self) -> bool {
        self.ever_opened.load(Ordering::Acquire)
    }

    /// Error the connection was closed with, if it is closed.
    pub fn close_error(&self) -> Option<&Error> {
        self.close_error.get()
    }

    /// Configuration the connection was created with.
    pub fn config(&self) -> &WsConfig {
        &self.config
    }

    /// Snapshot of connection statistics.
    pub fn stats(&self) -> WsStatsSnapshot {
        self.stats.snapshot()
    }

    pub(crate) fn raw_stats(&self) -> &WsStats {
        &self.stats
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Recorded subscriptions in registration order.
    pub fn records(&self) -> Vec<SubscriptionRecord> {
        self.subscriptions.ordered()
    }

    /// Number of recorded subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.count()
    }

    /// Waiters registered on this connection.
    pub fn registry(&self) -> &FutureRegistry<StreamUpdate> {
        &self.registry
    }

    /// Store the connection's handlers write to.
    pub fn store(&self) -> &Arc<StreamStore> {
        &self.store
    }
}
