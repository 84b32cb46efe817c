//! Connection, pool and client integration tests against a local server.
//!
//! Test coverage:
//! - Frame dispatch and message-hash resolution
//! - Shared subscriptions and one-shot requests
//! - Exchange error scopes (hash, private, connection)
//! - Order book gaps and book invalidation across reconnects
//! - Heartbeat timeout, teardown and replacement
//! - Subscription replay on a replacement connection
//! - Graceful close and unwatch

mod common;

use ccxt_stream_core::prelude::*;
use common::{MockAdapter, MockServer, WAIT, quiet_config, recv, trade_frame};
use futures::StreamExt;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn trades_request(symbol: &str) -> serde_json::Value {
    json!({"op": "subscribe", "channel": "trades", "symbol": symbol})
}

fn pool(config: WsConfig) -> ConnectionPool {
    ConnectionPool::new(config, MockAdapter::new(), Arc::new(StreamStore::default()))
}

#[tokio::test]
async fn test_watch_resolves_with_cached_trades() {
    let mut server = MockServer::start().await;
    let url = server.url().to_string();
    let client = Arc::new(StreamClient::new(
        MockAdapter::new(),
        quiet_config(),
        CacheLimits::default(),
    ));

    let task = {
        let client = Arc::clone(&client);
        let url = url.clone();
        tokio::spawn(async move {
            client
                .watch(&url, "trades::BTC/USDT", trades_request("BTC/USDT"), None)
                .await
        })
    };

    let mut peer = server.accept().await;
    let subscribe = peer.next_frame().await;
    assert_eq!(subscribe["op"], "subscribe");
    assert_eq!(subscribe["symbol"], "BTC/USDT");

    peer.send(trade_frame("BTC/USDT", "t1", "100.5", "0.25"));

    let update = tokio::time::timeout(WAIT, task).await.unwrap().unwrap().unwrap();
    match update {
        StreamUpdate::Trades(trades) => {
            assert_eq!(trades.len(), 1);
            assert_eq!(trades[0].price, dec!(100.5));
            assert_eq!(trades[0].cost, dec!(25.125));
        }
        other => panic!("unexpected update: {other:?}"),
    }
    assert_eq!(client.trades("BTC/USDT", None).len(), 1);

    client.shutdown().await;
}

#[tokio::test]
async fn test_shared_subscription_is_sent_once() {
    let mut server = MockServer::start().await;
    let pool = pool(quiet_config());
    let conn = pool.get(server.url()).unwrap();

    let mut first = conn
        .subscribe(Subscribe::persistent("trades::BTC/USDT", trades_request("BTC/USDT")))
        .await
        .unwrap();
    let mut second = conn
        .subscribe(Subscribe::persistent("trades::BTC/USDT", trades_request("BTC/USDT")))
        .await
        .unwrap();
    let mut request = conn
        .subscribe(Subscribe::one_shot("ack-1", json!({"op": "status", "hash": "ack-1"})))
        .await
        .unwrap();

    let mut peer = server.accept().await;
    assert_eq!(peer.next_frame().await["op"], "subscribe");
    // The second subscribe joined the first; the next frame is the request.
    assert_eq!(peer.next_frame().await["op"], "status");
    assert_eq!(conn.subscription_count(), 1);

    peer.send(trade_frame("BTC/USDT", "t1", "100", "1"));
    assert!(matches!(recv(&mut first).await, Ok(StreamUpdate::Trades(_))));
    assert!(matches!(recv(&mut second).await, Ok(StreamUpdate::Trades(_))));

    peer.send(json!({"channel": "ack", "hash": "ack-1", "status": "ok"}));
    match recv(&mut request).await.unwrap() {
        StreamUpdate::Message(reply) => assert_eq!(reply["status"], "ok"),
        other => panic!("unexpected update: {other:?}"),
    }
    assert_eq!(conn.registry().pending_one_shot("ack-1"), 0);
    assert!(conn.registry().is_persistent("trades::BTC/USDT"));

    pool.close_all().await;
}

#[tokio::test]
async fn test_exchange_error_rejects_only_its_hash() {
    let mut server = MockServer::start().await;
    let pool = pool(quiet_config());
    let conn = pool.get(server.url()).unwrap();

    let mut btc = conn
        .subscribe(Subscribe::persistent("trades::BTC/USDT", trades_request("BTC/USDT")))
        .await
        .unwrap();
    let mut eth = conn
        .subscribe(Subscribe::persistent("trades::ETH/USDT", trades_request("ETH/USDT")))
        .await
        .unwrap();

    let mut peer = server.accept().await;
    peer.next_frame().await;
    peer.next_frame().await;

    peer.send(json!({
        "error": {"code": "30001", "message": "unknown symbol"},
        "hash": "trades::ETH/USDT",
    }));
    let err = recv(&mut eth).await.unwrap_err();
    assert_eq!(err.as_exchange().map(|d| d.code.as_str()), Some("30001"));
    assert!(conn.is_open());

    // Both persistent waiters keep receiving after the rejection.
    peer.send(trade_frame("BTC/USDT", "t1", "100", "1"));
    assert!(recv(&mut btc).await.is_ok());
    peer.send(trade_frame("ETH/USDT", "t2", "2000", "1"));
    assert!(recv(&mut eth).await.is_ok());

    pool.close_all().await;
}

#[tokio::test]
async fn test_private_error_scope_spares_public_channels() {
    let mut server = MockServer::start().await;
    let adapter = MockAdapter::new();
    let pool = ConnectionPool::new(
        quiet_config(),
        Arc::clone(&adapter) as Arc<dyn ExchangeAdapter>,
        Arc::new(StreamStore::default()),
    );
    let conn = pool.get(server.url()).unwrap();

    let pending = {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move {
            conn.subscribe(
                Subscribe::persistent("orders", json!({"op": "subscribe", "channel": "orders"}))
                    .private(),
            )
            .await
        })
    };

    let mut peer = server.accept().await;
    let login = peer.next_frame().await;
    assert_eq!(login["op"], "login");
    peer.send(json!({"channel": "auth", "hash": "auth", "ok": true}));
    assert_eq!(peer.next_frame().await["channel"], "orders");

    let mut orders = tokio::time::timeout(WAIT, pending).await.unwrap().unwrap().unwrap();
    assert!(conn.is_authenticated());
    assert_eq!(adapter.auth_calls(), 1);

    let mut trades = conn
        .subscribe(Subscribe::persistent("trades::BTC/USDT", trades_request("BTC/USDT")))
        .await
        .unwrap();
    peer.next_frame().await;

    peer.send(json!({
        "channel": "orders",
        "data": [{"id": "o-1", "symbol": "BTC/USDT", "side": "buy", "amount": "1", "price": "100", "status": "open"}],
    }));
    match recv(&mut orders).await.unwrap() {
        StreamUpdate::Orders(list) => assert_eq!(list[0].id, "o-1"),
        other => panic!("unexpected update: {other:?}"),
    }

    peer.send(json!({
        "error": {"code": "401", "message": "session expired"},
        "scope": "private",
    }));
    let err = recv(&mut orders).await.unwrap_err();
    assert_eq!(err.as_authentication(), Some("session expired"));
    assert!(conn.is_open());

    peer.send(trade_frame("BTC/USDT", "t1", "100", "1"));
    assert!(recv(&mut trades).await.is_ok());

    // A second private subscription reuses the handshake.
    conn.subscribe(
        Subscribe::persistent("my_trades", json!({"op": "subscribe", "channel": "fills"})).private(),
    )
    .await
    .unwrap();
    assert_eq!(peer.next_frame().await["channel"], "fills");
    assert_eq!(adapter.auth_calls(), 1);

    pool.close_all().await;
}

#[tokio::test]
async fn test_connection_error_frame_tears_down() {
    let mut server = MockServer::start().await;
    let pool = pool(quiet_config());
    let conn = pool.get(server.url()).unwrap();

    let mut trades = conn
        .subscribe(Subscribe::persistent("trades::BTC/USDT", trades_request("BTC/USDT")))
        .await
        .unwrap();
    let peer = server.accept().await;

    peer.send(json!({"error": {"code": "1013", "message": "maintenance"}}));
    let err = recv(&mut trades).await.unwrap_err();
    assert_eq!(err.as_exchange().map(|d| d.message.as_str()), Some("maintenance"));
    assert!(!conn.state().is_live());
    assert!(conn.send(&json!({"op": "noop"})).is_err());
}

#[tokio::test]
async fn test_orderbook_gap_rejects_book_waiter() {
    let mut server = MockServer::start().await;
    let store = Arc::new(StreamStore::with_sequence_policy(
        CacheLimits::default(),
        SequencePolicy::Strict,
    ));
    let pool = ConnectionPool::new(quiet_config(), MockAdapter::new(), Arc::clone(&store));
    let conn = pool.get(server.url()).unwrap();

    let mut book = conn
        .subscribe(Subscribe::persistent(
            "book::BTC/USDT",
            json!({"op": "subscribe", "channel": "book", "symbol": "BTC/USDT"}),
        ))
        .await
        .unwrap();
    let mut peer = server.accept().await;
    peer.next_frame().await;

    peer.send(json!({
        "channel": "book", "type": "snapshot", "symbol": "BTC/USDT", "seq": 10,
        "bids": [["100", "1"], ["99", "2"]],
        "asks": [["101", "1.5"]],
    }));
    match recv(&mut book).await.unwrap() {
        StreamUpdate::OrderBook(snapshot) => {
            assert_eq!(snapshot.bids[0].price, dec!(100));
            assert_eq!(snapshot.asks[0].amount, dec!(1.5));
            assert_eq!(snapshot.nonce, Some(10));
        }
        other => panic!("unexpected update: {other:?}"),
    }

    peer.send(json!({
        "channel": "book", "type": "delta", "symbol": "BTC/USDT", "seq": 11,
        "bids": [["100", "0"]], "asks": [],
    }));
    match recv(&mut book).await.unwrap() {
        StreamUpdate::OrderBook(snapshot) => {
            assert_eq!(snapshot.bids.len(), 1);
            assert_eq!(snapshot.bids[0].price, dec!(99));
        }
        other => panic!("unexpected update: {other:?}"),
    }

    peer.send(json!({
        "channel": "book", "type": "delta", "symbol": "BTC/USDT", "seq": 13,
        "bids": [["98", "1"]], "asks": [],
    }));
    let err = recv(&mut book).await.unwrap_err();
    assert!(err.as_out_of_sync().is_some());
    assert!(conn.is_open());
    assert!(store.books().inspect("BTC/USDT", OrderBook::needs_resync).unwrap_or(false));

    pool.close_all().await;
}

fn book_request(symbol: &str) -> serde_json::Value {
    json!({"op": "subscribe", "channel": "book", "symbol": symbol})
}

#[tokio::test]
async fn test_books_need_fresh_snapshot_after_reconnect() {
    let mut server = MockServer::start().await;
    let store = Arc::new(StreamStore::with_sequence_policy(
        CacheLimits::default(),
        SequencePolicy::Monotonic,
    ));
    let pool = ConnectionPool::new(quiet_config(), MockAdapter::new(), Arc::clone(&store));
    let url = server.url().to_string();
    let conn = pool.get(&url).unwrap();

    let mut book = conn
        .subscribe(Subscribe::persistent("book::BTC/USDT", book_request("BTC/USDT")))
        .await
        .unwrap();
    let mut peer = server.accept().await;
    peer.next_frame().await;
    peer.send(json!({
        "channel": "book", "type": "snapshot", "symbol": "BTC/USDT", "seq": 10,
        "bids": [["100", "1"]], "asks": [],
    }));
    assert!(recv(&mut book).await.is_ok());

    peer.close();
    assert!(recv(&mut book).await.unwrap_err().is_connection_fatal());
    assert_eq!(store.books().inspect("BTC/USDT", OrderBook::is_synced), Some(false));

    let replacement = pool.get(&url).unwrap();
    let mut peer = server.accept().await;
    assert_eq!(peer.next_frame().await["channel"], "book");
    let mut book = replacement
        .subscribe(Subscribe::persistent("book::BTC/USDT", book_request("BTC/USDT")))
        .await
        .unwrap();

    // A delta from the new socket must not land on the pre-disconnect book.
    peer.send(json!({
        "channel": "book", "type": "delta", "symbol": "BTC/USDT", "seq": 50,
        "bids": [["99", "3"]], "asks": [],
    }));
    let err = recv(&mut book).await.unwrap_err();
    assert_eq!(
        err.as_out_of_sync().map(|d| d.reason),
        Some(OutOfSyncReason::NotSynchronized)
    );
    let stale = store.orderbook("BTC/USDT", None).unwrap();
    assert_eq!(stale.bids.len(), 1);
    assert_eq!(stale.bids[0].price, dec!(100));

    peer.send(json!({
        "channel": "book", "type": "snapshot", "symbol": "BTC/USDT", "seq": 60,
        "bids": [["98", "2"]], "asks": [],
    }));
    match recv(&mut book).await.unwrap() {
        StreamUpdate::OrderBook(snapshot) => {
            assert_eq!(snapshot.bids.len(), 1);
            assert_eq!(snapshot.bids[0].price, dec!(98));
            assert_eq!(snapshot.nonce, Some(60));
        }
        other => panic!("unexpected update: {other:?}"),
    }
    assert_eq!(store.books().inspect("BTC/USDT", OrderBook::is_synced), Some(true));

    pool.close_all().await;
}

#[tokio::test]
async fn test_unwatching_one_hash_keeps_shared_subscription() {
    let mut server = MockServer::start().await;
    let pool = pool(quiet_config());
    let conn = pool.get(server.url()).unwrap();

    let _a = conn
        .subscribe(Subscribe::persistent("book::A", book_request("A")).with_subscription_key("book"))
        .await
        .unwrap();
    let mut b = conn
        .subscribe(Subscribe::persistent("book::B", book_request("B")).with_subscription_key("book"))
        .await
        .unwrap();
    let mut peer = server.accept().await;
    assert_eq!(peer.next_frame().await["symbol"], "A");

    assert!(conn.unsubscribe("book::A").unwrap());
    assert_eq!(conn.subscription_count(), 1);
    assert_eq!(conn.records()[0].hashes, vec!["book::B".to_string()]);

    peer.send(json!({
        "channel": "book", "type": "snapshot", "symbol": "B", "seq": 1,
        "bids": [["10", "1"]], "asks": [],
    }));
    assert!(matches!(recv(&mut b).await, Ok(StreamUpdate::OrderBook(_))));

    // The exchange only hears about the last hash leaving the subscription.
    assert!(conn.unsubscribe("book::B").unwrap());
    let unsubscribe = peer.next_frame().await;
    assert_eq!(unsubscribe["op"], "unsubscribe");
    assert_eq!(unsubscribe["hash"], "book::B");
    assert_eq!(conn.subscription_count(), 0);

    pool.close_all().await;
}

#[tokio::test]
async fn test_heartbeat_timeout_rejects_every_waiter() {
    let mut server = MockServer::start().await;
    let events = Arc::new(Mutex::new(Vec::new()));
    let config = WsConfig::default().with_heartbeat(
        HeartbeatConfig::new(Duration::from_millis(100)).with_timeout_multiple(2),
    );
    let pool = {
        let events = Arc::clone(&events);
        pool(config).with_event_callback(Arc::new(move |event: ConnectionEvent| {
            events.lock().unwrap().push(event);
        }))
    };
    let conn = pool.get(server.url()).unwrap();
    let _peer = server.accept().await;

    let requests = [
        Subscribe::persistent("trades::BTC/USDT", trades_request("BTC/USDT")),
        Subscribe::persistent("trades::ETH/USDT", trades_request("ETH/USDT")),
        Subscribe::one_shot("ack-1", json!({"op": "status", "hash": "ack-1"})),
    ];
    for request in requests {
        let outcome = match conn.subscribe(request).await {
            Ok(mut waiter) => recv(&mut waiter).await,
            Err(e) => Err(e),
        };
        let err = outcome.unwrap_err();
        assert!(err.as_timeout().is_some(), "expected timeout, got {err}");
    }

    assert_eq!(conn.state(), ConnectionState::Closed);
    assert!(conn.registry().is_empty());
    assert!(
        events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, ConnectionEvent::HeartbeatTimeout { .. }))
    );

    let replacement = pool.get(server.url()).unwrap();
    assert!(!Arc::ptr_eq(&conn, &replacement));
    assert!(replacement.state().is_live());

    pool.close_all().await;
}

#[tokio::test]
async fn test_pong_frames_keep_connection_alive() {
    let mut server = MockServer::start().await;
    let config = WsConfig::default()
        .with_heartbeat(HeartbeatConfig::new(Duration::from_millis(50)).pong_only());
    let pool = pool(config);
    let conn = pool.get(server.url()).unwrap();
    conn.ready().await.unwrap();
    let peer = server.accept().await;

    let responder = tokio::spawn(async move {
        for _ in 0..6 {
            tokio::time::sleep(Duration::from_millis(40)).await;
            peer.send(json!({"event": "pong"}));
        }
        peer
    });
    let _peer = responder.await.unwrap();

    assert!(conn.is_open());
    let stats = conn.stats();
    assert!(stats.last_ping_time > 0);
    assert!(stats.last_pong_time >= stats.connected_at);

    pool.close_all().await;
}

#[tokio::test]
async fn test_replacement_replays_recorded_subscriptions() {
    let mut server = MockServer::start().await;
    let events = Arc::new(Mutex::new(Vec::new()));
    let pool = {
        let events = Arc::clone(&events);
        pool(quiet_config()).with_event_callback(Arc::new(move |event: ConnectionEvent| {
            events.lock().unwrap().push(event);
        }))
    };
    let url = server.url().to_string();
    let conn = pool.get(&url).unwrap();

    let mut btc = conn
        .subscribe(Subscribe::persistent("trades::BTC/USDT", trades_request("BTC/USDT")))
        .await
        .unwrap();
    conn.subscribe(Subscribe::persistent("trades::ETH/USDT", trades_request("ETH/USDT")))
        .await
        .unwrap();
    conn.subscribe(Subscribe::one_shot("ack-1", json!({"op": "status", "hash": "ack-1"})))
        .await
        .unwrap();

    let mut peer = server.accept().await;
    for _ in 0..3 {
        peer.next_frame().await;
    }
    peer.close();

    let err = recv(&mut btc).await.unwrap_err();
    assert!(err.is_connection_fatal());

    let replacement = pool.get(&url).unwrap();
    assert!(!Arc::ptr_eq(&conn, &replacement));
    let mut peer = server.accept().await;
    assert_eq!(peer.next_frame().await["symbol"], "BTC/USDT");
    assert_eq!(peer.next_frame().await["symbol"], "ETH/USDT");

    // One-shot requests are not replayed.
    replacement
        .subscribe(Subscribe::one_shot("ack-2", json!({"op": "status", "hash": "ack-2"})))
        .await
        .unwrap();
    assert_eq!(peer.next_frame().await["hash"], "ack-2");
    assert_eq!(replacement.subscription_count(), 2);

    // New waiters on the replacement receive data again.
    let mut btc = replacement
        .subscribe(Subscribe::persistent("trades::BTC/USDT", trades_request("BTC/USDT")))
        .await
        .unwrap();
    peer.send(trade_frame("BTC/USDT", "t9", "100", "1"));
    assert!(recv(&mut btc).await.is_ok());
    assert!(events.lock().unwrap().iter().any(|e| matches!(
        e,
        ConnectionEvent::Resubscribed { count: 2, .. }
    )));

    pool.close_all().await;
}

#[tokio::test]
async fn test_close_rejects_with_connection_closed() {
    let mut server = MockServer::start().await;
    let url = server.url().to_string();
    let client = Arc::new(StreamClient::new(
        MockAdapter::new(),
        quiet_config(),
        CacheLimits::default(),
    ));

    let task = {
        let client = Arc::clone(&client);
        let url = url.clone();
        tokio::spawn(async move {
            client
                .watch(&url, "trades::BTC/USDT", trades_request("BTC/USDT"), None)
                .await
        })
    };
    let mut peer = server.accept().await;
    peer.next_frame().await;

    assert!(client.close(&url).await);
    let err = tokio::time::timeout(WAIT, task).await.unwrap().unwrap().unwrap_err();
    assert!(err.as_connection_closed().is_some());
    assert!(client.pool().is_empty());
    assert!(!client.close(&url).await);
}

#[tokio::test]
async fn test_unwatch_ends_stream_and_sends_unsubscribe() {
    let mut server = MockServer::start().await;
    let url = server.url().to_string();
    let client = StreamClient::new(MockAdapter::new(), quiet_config(), CacheLimits::default());

    let mut updates = client
        .subscribe_stream(&url, "trades::BTC/USDT", trades_request("BTC/USDT"), None)
        .await
        .unwrap();
    let mut peer = server.accept().await;
    peer.next_frame().await;

    peer.send(trade_frame("BTC/USDT", "t1", "100", "1"));
    let first = tokio::time::timeout(WAIT, updates.next()).await.unwrap();
    assert!(matches!(first, Some(Ok(StreamUpdate::Trades(_)))));

    assert!(client.unwatch(&url, "trades::BTC/USDT").unwrap());
    let unsubscribe = peer.next_frame().await;
    assert_eq!(unsubscribe["op"], "unsubscribe");
    assert_eq!(unsubscribe["hash"], "trades::BTC/USDT");

    let end = tokio::time::timeout(WAIT, updates.next()).await.unwrap();
    assert!(end.is_none());

    client.shutdown().await;
}

#[tokio::test]
async fn test_subscription_capacity_and_url_validation() {
    let mut server = MockServer::start().await;
    let pool = pool(quiet_config().with_max_subscriptions(1));

    let err = pool.get("https://api.example.test").unwrap_err();
    assert!(matches!(err.as_transport(), Some(NetworkError::InvalidUrl(_))));

    let conn = pool.get(server.url()).unwrap();
    conn.subscribe(Subscribe::persistent("trades::BTC/USDT", trades_request("BTC/USDT")))
        .await
        .unwrap();
    let _peer = server.accept().await;

    let err = conn
        .subscribe(Subscribe::persistent("trades::ETH/USDT", trades_request("ETH/USDT")))
        .await
        .unwrap_err();
    assert!(err.as_resource_exhausted().is_some());
    assert_eq!(conn.subscription_count(), 1);

    pool.close_all().await;
}
