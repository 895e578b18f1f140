//! HTTP API Integration Tests
//!
//! Exercises the router against real stores and a mocked upstream source,
//! plus one end-to-end request over a bound socket.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use chrono::{DateTime, NaiveDate, Utc};
use mockall::mock;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use kline_recorder::{
    ApiServer, AppState, FeedState, HistoricalFetcher, KlineInterval, Observation, QueryService,
    SeriesStore, SqliteSeriesStore, StorageError, Symbol, UpstreamFetchError, router,
};

mock! {
    pub Fetcher {}

    #[async_trait]
    impl HistoricalFetcher for Fetcher {
        async fn fetch_bars(
            &self,
            symbol: &Symbol,
            interval: KlineInterval,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<Observation>, UpstreamFetchError>;
    }
}

fn btc() -> Symbol {
    Symbol::parse("BTCUSDT").unwrap()
}

fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

fn bar(time: DateTime<Utc>, close: f64) -> Observation {
    Observation {
        symbol: btc(),
        time,
        open: close - 10.0,
        high: close + 10.0,
        low: close - 20.0,
        close,
        volume: 100.0,
    }
}

/// Store whose backend has gone away.
struct FailingStore;

impl SeriesStore for FailingStore {
    fn append(&self, _: &Observation) -> Result<(), StorageError> {
        Err(StorageError::Backend("disk gone".into()))
    }

    fn latest(&self, _: &Symbol) -> Result<Option<Observation>, StorageError> {
        Err(StorageError::Backend("disk gone".into()))
    }

    fn range(
        &self,
        _: &Symbol,
        _: Option<DateTime<Utc>>,
        _: Option<DateTime<Utc>>,
    ) -> Result<Vec<Observation>, StorageError> {
        Err(StorageError::Backend("disk gone".into()))
    }

    fn count(&self, _: &Symbol) -> Result<u64, StorageError> {
        Err(StorageError::Backend("disk gone".into()))
    }

    fn has_series(&self, _: &Symbol) -> Result<bool, StorageError> {
        Err(StorageError::Backend("disk gone".into()))
    }

    fn ping(&self) -> Result<(), StorageError> {
        Err(StorageError::Backend("disk gone".into()))
    }
}

fn app(store: Arc<dyn SeriesStore>, fetcher: MockFetcher) -> Router {
    let query = QueryService::new(
        store,
        Arc::new(fetcher),
        KlineInterval::OneDay,
        vec![btc(), Symbol::parse("ETHUSDT").unwrap()],
    );
    router(Arc::new(AppState::new(
        Arc::new(query),
        Arc::new(FeedState::new()),
    )))
}

async fn get(app: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

fn json(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn upstream_requires_both_bounds_before_fetching() {
    let mut fetcher = MockFetcher::new();
    fetcher.expect_fetch_bars().never();
    let app = app(Arc::new(SqliteSeriesStore::open_in_memory().unwrap()), fetcher);

    let (status, _, body) = get(app, "/api/historical-upstream/BTCUSDT?start=2024-01-01").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "Start and end dates are required");
}

#[tokio::test]
async fn upstream_rejects_unparseable_date_before_fetching() {
    let mut fetcher = MockFetcher::new();
    fetcher.expect_fetch_bars().never();
    let app = app(Arc::new(SqliteSeriesStore::open_in_memory().unwrap()), fetcher);

    let (status, _, _) = get(
        app,
        "/api/historical-upstream/BTCUSDT?start=last-week&end=2024-01-31",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upstream_bars_are_served_as_rows() {
    let mut fetcher = MockFetcher::new();
    fetcher
        .expect_fetch_bars()
        .withf(|symbol, interval, start, end| {
            symbol.as_str() == "BTCUSDT"
                && *interval == KlineInterval::OneDay
                && *start == day(2024, 1, 1)
                && *end > day(2024, 1, 31)
        })
        .times(1)
        .returning(|_, _, _, _| Ok(vec![bar(day(2024, 1, 1), 42_000.0), bar(day(2024, 1, 2), 43_000.0)]));
    let app = app(Arc::new(SqliteSeriesStore::open_in_memory().unwrap()), fetcher);

    let (status, _, body) = get(
        app,
        "/api/historical-binance/btcusdt?start=2024-01-01&end=2024-01-31",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rows = json(&body);
    assert_eq!(rows.as_array().unwrap().len(), 2);
    assert_eq!(rows[0]["Time"], "2024-01-01T00:00:00.000");
    assert_eq!(rows[1]["Close"], 43_000.0);
}

#[tokio::test]
async fn upstream_csv_download_names_the_period() {
    let mut fetcher = MockFetcher::new();
    fetcher
        .expect_fetch_bars()
        .returning(|_, _, _, _| Ok(vec![bar(day(2024, 1, 1), 42_000.0)]));
    let app = app(Arc::new(SqliteSeriesStore::open_in_memory().unwrap()), fetcher);

    let (status, headers, body) = get(
        app,
        "/api/historical-upstream/BTCUSDT?start=2024-01-01&end=2024-01-31&download=csv",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"BTCUSDT_historical_2024-01-01_2024-01-31.csv\""
    );
    assert!(
        headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/csv")
    );
    let text = String::from_utf8(body).unwrap();
    assert_eq!(
        text,
        "Time,Open,High,Low,Close,Volume\n2024-01-01 00:00:00.000,41990,42010,41980,42000,100\n"
    );
}

#[tokio::test]
async fn upstream_with_no_bars_is_404() {
    let mut fetcher = MockFetcher::new();
    fetcher.expect_fetch_bars().returning(|_, _, _, _| Ok(Vec::new()));
    let app = app(Arc::new(SqliteSeriesStore::open_in_memory().unwrap()), fetcher);

    let (status, _, body) = get(
        app,
        "/api/historical-upstream/BTCUSDT?start=2024-01-01&end=2024-01-02",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["error"], "No data available for this period");
}

#[tokio::test]
async fn realtime_history_follows_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn SeriesStore> =
        Arc::new(SqliteSeriesStore::open(dir.path().join("recorder.db")).unwrap());
    let app = app(Arc::clone(&store), MockFetcher::new());

    let (status, _, body) = get(app.clone(), "/api/realtime-history/BTCUSDT").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["error"], "No real-time data available");

    store.append(&bar(day(2024, 3, 1), 60_000.0)).unwrap();
    store.append(&bar(day(2024, 3, 2), 61_000.0)).unwrap();

    let (status, _, body) = get(app.clone(), "/api/realtime-history/BTCUSDT").await;
    assert_eq!(status, StatusCode::OK);
    let closes: Vec<f64> = json(&body)
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["Close"].as_f64().unwrap())
        .collect();
    assert_eq!(closes, [60_000.0, 61_000.0]);

    let (_, _, body) = get(app, "/api/status").await;
    let status = json(&body);
    assert_eq!(status["database"], "connected");
    assert_eq!(status["coins"]["BTCUSDT"]["records"], 2);
    assert_eq!(status["coins"]["ETHUSDT"]["records"], 0);
}

#[tokio::test]
async fn realtime_serves_the_latest_stored_row() {
    let store: Arc<dyn SeriesStore> = Arc::new(SqliteSeriesStore::open_in_memory().unwrap());
    store.append(&bar(day(2024, 3, 1), 60_000.0)).unwrap();
    store.append(&bar(day(2024, 3, 2), 61_500.0)).unwrap();
    let app = app(store, MockFetcher::new());

    let (status, _, body) = get(app.clone(), "/api/realtime/btcusdt").await;
    assert_eq!(status, StatusCode::OK);
    let row = json(&body);
    assert_eq!(row["Time"], "2024-03-02T00:00:00.000");
    assert_eq!(row["Close"], 61_500.0);
    assert_eq!(row["Volume"], 100.0);

    let (status, _, body) = get(app, "/api/realtime/ETHUSDT").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body), serde_json::json!({"error": "No data available"}));
}

#[tokio::test]
async fn historical_date_bounds_cover_whole_days() {
    let store: Arc<dyn SeriesStore> = Arc::new(SqliteSeriesStore::open_in_memory().unwrap());
    store.append(&bar(day(2024, 1, 1), 42_000.0)).unwrap();
    store
        .append(&bar(day(2024, 1, 1) + chrono::Duration::hours(23), 42_100.0))
        .unwrap();
    store.append(&bar(day(2024, 1, 2), 43_000.0)).unwrap();
    let app = app(store, MockFetcher::new());

    let (status, _, body) = get(
        app.clone(),
        "/api/historical/BTCUSDT?start=2024-01-01&end=2024-01-01",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let closes: Vec<f64> = json(&body)
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["Close"].as_f64().unwrap())
        .collect();
    assert_eq!(closes, [42_000.0, 42_100.0]);

    let (status, _, body) = get(
        app.clone(),
        "/api/historical/BTCUSDT?start=2023-06-01&end=2023-06-30",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body), serde_json::json!([]));

    let (status, headers, body) =
        get(app, "/api/historical/BTCUSDT?end=2024-01-01&download=csv").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"BTCUSDT_begin_2024-01-01.csv\""
    );
    let text = String::from_utf8(body).unwrap();
    assert_eq!(text.lines().count(), 3);
    assert!(text.ends_with("2024-01-01 23:00:00.000,42090,42110,42080,42100,100\n"));
}

#[tokio::test]
async fn storage_failure_is_a_500_with_the_backend_message() {
    let app = app(Arc::new(FailingStore), MockFetcher::new());

    for uri in [
        "/api/realtime/BTCUSDT",
        "/api/realtime-history/BTCUSDT",
        "/api/historical/BTCUSDT?start=2024-01-01&end=2024-01-31",
    ] {
        let (status, _, body) = get(app.clone(), uri).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
        assert_eq!(
            json(&body),
            serde_json::json!({"error": "storage backend error: disk gone"}),
            "{uri}"
        );
    }

    let (status, _, body) = get(app, "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    let status = json(&body);
    assert_eq!(status["database"], "unavailable");
    assert_eq!(
        status["coins"]["BTCUSDT"]["status"],
        "error: storage backend error: disk gone"
    );
}

#[tokio::test]
async fn hostile_symbol_is_rejected() {
    let app = app(
        Arc::new(SqliteSeriesStore::open_in_memory().unwrap()),
        MockFetcher::new(),
    );
    let (status, _, _) = get(app, "/api/historical/BTC%27%20OR%201%3D1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn server_answers_over_tcp_and_stops_on_cancel() {
    let _ = rustls::crypto::ring::default_provider().install_default();
    let query = QueryService::new(
        Arc::new(SqliteSeriesStore::open_in_memory().unwrap()),
        Arc::new(MockFetcher::new()),
        KlineInterval::OneDay,
        vec![btc()],
    );
    let state = Arc::new(AppState::new(Arc::new(query), Arc::new(FeedState::new())));
    let cancel = CancellationToken::new();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = ApiServer::new(addr.port(), state, cancel.clone());
    let handle = tokio::spawn(server.serve(listener));

    let body: serde_json::Value = reqwest::get(format!("http://{addr}/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
