//! Shared fixtures: a scripted exchange adapter and a local WebSocket server.

#![allow(dead_code)]

use async_trait::async_trait;
use ccxt_stream_core::prelude::*;
use ccxt_stream_core::ws::SubscriptionRecord;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;

/// How long a test waits for a frame or a delivery before failing.
pub const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Mock adapter
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawTrade {
    id: String,
    price: Decimal,
    amount: Decimal,
    side: OrderSide,
    ts: i64,
}

#[derive(Debug, Deserialize)]
struct RawOrder {
    id: String,
    symbol: String,
    side: OrderSide,
    amount: Decimal,
    price: Decimal,
    status: OrderStatus,
}

fn levels(frame: &Value, key: &str) -> Result<Vec<OrderBookEntry>> {
    let raw: Vec<(Decimal, Decimal)> = serde_json::from_value(frame[key].clone())?;
    Ok(raw
        .into_iter()
        .map(|(price, amount)| OrderBookEntry::new(price, amount))
        .collect())
}

fn symbol_of(frame: &Value) -> Result<String> {
    frame["symbol"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::invalid_request("frame without symbol"))
}

fn handle_trades(ctx: &mut DispatchContext<'_>, frame: &Value) -> Result<()> {
    let symbol = symbol_of(frame)?;
    let hash = format!("trades::{symbol}");
    ctx.affects(hash.clone());

    let raw: Vec<RawTrade> = serde_json::from_value(frame["data"].clone())?;
    let trades = raw
        .into_iter()
        .map(|t| Trade::new(symbol.clone(), t.side, t.price, t.amount, t.ts).with_id(t.id));
    ctx.store().append_trades(&symbol, trades);

    let recent = ctx.store().trades(&symbol, None);
    ctx.resolve(hash, StreamUpdate::Trades(recent));
    Ok(())
}

fn handle_book(ctx: &mut DispatchContext<'_>, frame: &Value) -> Result<()> {
    let symbol = symbol_of(frame)?;
    let hash = format!("book::{symbol}");
    ctx.affects(hash.clone());

    let sequence = frame["seq"].as_u64();
    let bids = levels(frame, "bids")?;
    let asks = levels(frame, "asks")?;
    if frame["type"] == "snapshot" {
        ctx.books_for(&symbol).apply_snapshot(&symbol, bids, asks, sequence)?;
    } else {
        let updates = bids
            .into_iter()
            .map(|l| LevelUpdate::new(Side::Bid, l.price, l.amount))
            .chain(asks.into_iter().map(|l| LevelUpdate::new(Side::Ask, l.price, l.amount)))
            .collect();
        ctx.books_for(&symbol)
            .apply_batch(&symbol, DeltaBatch::new(sequence, updates))?;
    }

    if let Some(book) = ctx.store().orderbook(&symbol, None) {
        ctx.resolve(hash, StreamUpdate::OrderBook(book));
    }
    Ok(())
}

fn handle_orders(ctx: &mut DispatchContext<'_>, frame: &Value) -> Result<()> {
    ctx.affects("orders");
    let raw: Vec<RawOrder> = serde_json::from_value(frame["data"].clone())?;
    for o in raw {
        let order = Order::new(o.id, o.symbol, o.side, Some(o.amount), Some(o.price))
            .with_status(o.status);
        ctx.store().upsert_order(order);
    }
    let orders = ctx.store().orders(None, None);
    ctx.resolve("orders", StreamUpdate::Orders(orders));
    Ok(())
}

fn handle_reply(ctx: &mut DispatchContext<'_>, frame: &Value) -> Result<()> {
    if let Some(hash) = frame["hash"].as_str() {
        ctx.resolve(hash, StreamUpdate::Message(frame.clone()));
    }
    Ok(())
}

/// Scripted exchange speaking a small JSON protocol:
///
/// - `{"event":"ping"}` / `{"event":"pong"}` liveness
/// - `{"channel": "...", ...}` data frames
/// - `{"error": {"code", "message"}, "hash" | "scope": ...}` error frames
pub struct MockAdapter {
    handlers: HandlerMap,
    auth_calls: AtomicUsize,
}

impl MockAdapter {
    pub fn new() -> Arc<Self> {
        let handlers = HandlerMap::new()
            .on(StreamKind::Trades, handle_trades)
            .on(StreamKind::OrderBook, handle_book)
            .on(StreamKind::Orders, handle_orders)
            .on(StreamKind::Auth, handle_reply)
            .on(StreamKind::Subscription, handle_reply);
        Arc::new(Self {
            handlers,
            auth_calls: AtomicUsize::new(0),
        })
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExchangeAdapter for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    fn ping_frame(&self) -> Option<Value> {
        Some(json!({"event": "ping"}))
    }

    fn is_pong(&self, frame: &Value) -> bool {
        frame["event"] == "pong"
    }

    fn classify_error(&self, frame: &Value) -> Option<FrameError> {
        let error = frame.get("error")?;
        let code = error["code"].as_str().unwrap_or_default().to_string();
        let message = error["message"].as_str().unwrap_or_default().to_string();

        if let Some(hash) = frame["hash"].as_str() {
            return Some(FrameError::hashes([hash], Error::exchange(code, message)));
        }
        match frame["scope"].as_str() {
            Some("private") => Some(FrameError::private(Error::authentication(message))),
            _ => Some(FrameError::connection(Error::exchange(code, message))),
        }
    }

    fn stream_kind(&self, frame: &Value) -> Option<StreamKind> {
        match frame["channel"].as_str()? {
            "trades" => Some(StreamKind::Trades),
            "book" => Some(StreamKind::OrderBook),
            "orders" => Some(StreamKind::Orders),
            "auth" => Some(StreamKind::Auth),
            "ack" => Some(StreamKind::Subscription),
            _ => None,
        }
    }

    fn handlers(&self) -> &HandlerMap {
        &self.handlers
    }

    fn unsubscribe_frame(&self, record: &SubscriptionRecord) -> Option<Value> {
        Some(json!({"op": "unsubscribe", "hash": record.message_hash}))
    }

    async fn authenticate(&self, conn: &Connection) -> Result<()> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        let mut waiter = conn
            .subscribe(Subscribe::one_shot("auth", json!({"op": "login", "hash": "auth"})))
            .await?;
        match waiter.recv().await? {
            StreamUpdate::Message(reply) if reply["ok"] == true => Ok(()),
            _ => Err(Error::authentication("login refused")),
        }
    }
}

// ============================================================================
// Local exchange server
// ============================================================================

/// One accepted client socket, driven from the test.
pub struct Peer {
    incoming: mpsc::UnboundedReceiver<Value>,
    outgoing: mpsc::UnboundedSender<Message>,
}

impl Peer {
    /// Next JSON frame sent by the client, skipping liveness probes.
    pub async fn next_frame(&mut self) -> Value {
        loop {
            let frame = tokio::time::timeout(WAIT, self.incoming.recv())
                .await
                .expect("timed out waiting for a client frame")
                .expect("client socket closed");
            if frame["event"] != "ping" {
                return frame;
            }
        }
    }

    /// Sends a JSON frame to the client.
    pub fn send(&self, frame: Value) {
        self.outgoing
            .send(Message::Text(frame.to_string().into()))
            .expect("server socket closed");
    }

    /// Sends a close frame and ends the socket.
    pub fn close(&self) {
        let _ = self.outgoing.send(Message::Close(None));
    }
}

/// WebSocket server on a random local port. It never answers pings on its
/// own: only frames the test sends reach the client.
pub struct MockServer {
    url: String,
    peers: mpsc::UnboundedReceiver<Peer>,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (peer_tx, peers) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let peer_tx = peer_tx.clone();
                tokio::spawn(async move {
                    let Ok(ws) = accept_async(stream).await else {
                        return;
                    };
                    let (mut write, mut read) = ws.split();
                    let (in_tx, incoming) = mpsc::unbounded_channel();
                    let (outgoing, mut out_rx) = mpsc::unbounded_channel::<Message>();
                    if peer_tx.send(Peer { incoming, outgoing }).is_err() {
                        return;
                    }

                    loop {
                        tokio::select! {
                            message = read.next() => match message {
                                Some(Ok(Message::Text(text))) => {
                                    if let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) {
                                        let _ = in_tx.send(frame);
                                    }
                                }
                                Some(Ok(_)) => {}
                                _ => break,
                            },
                            message = out_rx.recv() => match message {
                                Some(message) => {
                                    let closing = matches!(message, Message::Close(_));
                                    if write.send(message).await.is_err() || closing {
                                        break;
                                    }
                                }
                                None => break,
                            },
                        }
                    }
                });
            }
        });

        Self { url, peers }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Waits for the next client connection.
    pub async fn accept(&mut self) -> Peer {
        tokio::time::timeout(WAIT, self.peers.recv())
            .await
            .expect("timed out waiting for a client connection")
            .expect("listener stopped")
    }
}

/// Config with the heartbeat off, so only scripted frames flow.
pub fn quiet_config() -> WsConfig {
    WsConfig::default().with_heartbeat(HeartbeatConfig::disabled())
}

/// Waits for a waiter delivery, failing the test after [`WAIT`].
pub async fn recv(waiter: &mut Waiter<StreamUpdate>) -> Result<StreamUpdate> {
    tokio::time::timeout(WAIT, waiter.recv())
        .await
        .expect("timed out waiting for a delivery")
}

pub fn trade_frame(symbol: &str, id: &str, price: &str, amount: &str) -> Value {
    json!({
        "channel": "trades",
        "symbol": symbol,
        "data": [{"id": id, "price": price, "amount": amount, "side": "buy", "ts": 1_700_000_000_000_i64}],
    })
}
