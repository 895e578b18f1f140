//! Stream Reconnect Integration Tests
//!
//! Runs the feed connection against a local WebSocket server that drops
//! the first session, and checks recovery, persistence and clean shutdown.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use kline_recorder::{
    ConnectionState, FeedState, FixedDelay, InMemorySeriesStore, IngestPipeline, SeriesStore,
    StreamConnection, StreamConnectionConfig, Symbol, SystemClock, ThrottleState,
};

fn frame(symbol: &str, close: &str) -> String {
    format!(
        r#"{{"stream":"{lower}@kline_1m","data":{{"e":"kline","E":1704067200000,"s":"{symbol}","k":{{"i":"1m","o":"{close}","c":"{close}","h":"{close}","l":"{close}","v":"2","x":false}}}}}}"#,
        lower = symbol.to_lowercase(),
    )
}

/// Accepts two sessions: the first sends one frame and closes, the second
/// sends one frame and stays open until the client leaves.
async fn flaky_feed(listener: TcpListener) {
    let (tcp, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
    ws.send(Message::text(frame("BTCUSDT", "42000.5"))).await.unwrap();
    ws.close(None).await.unwrap();
    while ws.next().await.is_some() {}

    let (tcp, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
    ws.send(Message::Ping(vec![1, 2, 3].into())).await.unwrap();
    ws.send(Message::text(frame("ETHUSDT", "2250.25"))).await.unwrap();
    while let Some(Ok(message)) = ws.next().await {
        if message.is_close() {
            break;
        }
    }
}

async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reconnects_after_server_close_and_terminates_on_cancel() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(flaky_feed(listener));

    let store = Arc::new(InMemorySeriesStore::new());
    let pipeline = IngestPipeline::new(
        Arc::clone(&store) as Arc<dyn SeriesStore>,
        Arc::new(SystemClock),
        Duration::from_secs(10),
        ThrottleState::new(),
    );
    let state = Arc::new(FeedState::new());
    let cancel = CancellationToken::new();
    let connection = StreamConnection::new(
        StreamConnectionConfig::new(format!(
            "ws://{addr}/stream?streams=btcusdt@kline_1m/ethusdt@kline_1m"
        )),
        pipeline,
        Arc::new(FixedDelay::IMMEDIATE),
        Arc::clone(&state),
        cancel.clone(),
    );
    let mut states = state.subscribe();
    let task = tokio::spawn(connection.run());

    let btc = Symbol::parse("BTCUSDT").unwrap();
    let eth = Symbol::parse("ETHUSDT").unwrap();
    wait_for("both sessions to deliver", || {
        store.count(&btc).unwrap() == 1 && store.count(&eth).unwrap() == 1
    })
    .await;
    wait_for("second session", || {
        state.get_state() == ConnectionState::Connected
    })
    .await;

    let snapshot = state.snapshot();
    assert_eq!(snapshot.frames_received, 2);
    assert_eq!(snapshot.observations_stored, 2);
    assert_eq!(snapshot.reconnect_attempts, 0);
    assert!(snapshot.last_connected_at.is_some());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.get_state(), ConnectionState::Terminated);
    assert_eq!(*states.borrow_and_update(), ConnectionState::Terminated);

    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_during_backoff_terminates() {
    // Nothing listens on this port once the listener is dropped.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let pipeline = IngestPipeline::new(
        Arc::new(InMemorySeriesStore::new()),
        Arc::new(SystemClock),
        Duration::from_secs(10),
        ThrottleState::new(),
    );
    let state = Arc::new(FeedState::new());
    let cancel = CancellationToken::new();
    let connection = StreamConnection::new(
        StreamConnectionConfig::new(format!("ws://{addr}/stream")),
        pipeline,
        Arc::new(FixedDelay(Duration::from_secs(3600))),
        Arc::clone(&state),
        cancel.clone(),
    );
    let task = tokio::spawn(connection.run());

    wait_for("first failed attempt", || state.get_reconnect_attempts() == 1).await;
    assert_eq!(state.get_state(), ConnectionState::Disconnected);
    assert!(state.snapshot().last_error.is_some());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.get_state(), ConnectionState::Terminated);
}
