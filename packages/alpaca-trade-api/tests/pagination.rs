//! Pagination Integration Tests
//!
//! Runs the market data accessors over the real reqwest transport against
//! a wiremock server, plus property checks over an in-memory transport.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use parking_lot::Mutex;
use proptest::prelude::*;
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use alpaca_trade_api::{
    ApiError, Credentials, DataError, DataFeed, DataTransport, HistoricalQuery, HttpClient,
    LimitError, Limits, MarketDataClient, NewsQuery, PageRequest, QueryParams, paginate,
};
use alpaca_trade_api::infrastructure::http::{TimeFrame, TimeFrameUnit};
use tokio_util::sync::CancellationToken;

fn trade(id: u64) -> Value {
    json!({ "i": id, "x": "V", "p": 100 + id, "s": 1, "t": "2024-01-02T15:00:00Z", "c": ["@"], "z": "C" })
}

fn trades(ids: std::ops::Range<u64>) -> Vec<Value> {
    ids.map(trade).collect()
}

async fn client(server: &MockServer) -> MarketDataClient {
    let credentials = Credentials::key_pair("key1", "secret1").unwrap();
    let http = HttpClient::new(server.uri(), &credentials, Duration::from_secs(5)).unwrap();
    MarketDataClient::with_transport(Arc::new(http), DataFeed::Iex)
}

fn limits_sent(requests: &[wiremock::Request]) -> Vec<u32> {
    requests
        .iter()
        .filter_map(|request| {
            request
                .url
                .query_pairs()
                .find(|(k, _)| k == "limit")
                .and_then(|(_, v)| v.parse().ok())
        })
        .collect()
}

// =============================================================================
// Over HTTP
// =============================================================================

#[tokio::test]
async fn unbounded_sequence_follows_tokens_to_the_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/stocks/AAPL/trades"))
        .and(query_param_is_missing("page_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "symbol": "AAPL", "trades": trades(0..10), "next_page_token": "next"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/stocks/AAPL/trades"))
        .and(query_param("page_token", "next"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "symbol": "AAPL", "trades": trades(10..13), "next_page_token": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let query = HistoricalQuery::new().limits(Limits::none().total(0));
    let items: Vec<_> = client(&server)
        .await
        .trades("AAPL", &query)
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    assert_eq!(items.len(), 13);
    let ids: Vec<_> = items.iter().filter_map(|t| t.id).collect();
    assert_eq!(ids, (0..13).collect::<Vec<_>>());
    assert!(items.iter().all(|t| t.symbol == "AAPL"));
}

#[tokio::test]
async fn sends_feed_and_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/stocks/AAPL/bars"))
        .and(query_param("feed", "iex"))
        .and(query_param("timeframe", "5Min"))
        .and(header("APCA-API-KEY-ID", "key1"))
        .and(header("APCA-API-SECRET-KEY", "secret1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "bars": [{ "o": 1, "h": 2, "l": 1, "c": 2, "v": 10, "t": "2024-01-02T15:00:00Z" }],
            "next_page_token": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let timeframe = TimeFrame::new(5, TimeFrameUnit::Min);
    let bars: Vec<_> = client(&server)
        .await
        .bars("AAPL", timeframe, &HistoricalQuery::new())
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(bars.len(), 1);
    assert_eq!(bars[0].symbol, "AAPL");
}

#[tokio::test]
async fn page_limit_is_clamped_to_server_maximum() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/stocks/AAPL/trades"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "trades": trades(0..2), "next_page_token": null
        })))
        .mount(&server)
        .await;

    let query = HistoricalQuery::new().limits(Limits::none().page(50_000));
    let _: Vec<_> = client(&server)
        .await
        .trades("AAPL", &query)
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(limits_sent(&requests), [10_000]);
}

#[tokio::test]
async fn missing_token_ends_after_one_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/stocks/AAPL/trades"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "trades": trades(0..4) })))
        .expect(1)
        .mount(&server)
        .await;

    let query = HistoricalQuery::new().limits(Limits::none().total(100));
    let items: Vec<_> = client(&server)
        .await
        .trades("AAPL", &query)
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(items.len(), 4);
}

#[tokio::test]
async fn negative_limit_fails_before_any_request() {
    let server = MockServer::start().await;
    let query = HistoricalQuery::new().limits(Limits::none().total(-1));

    let result = client(&server).await.trades("AAPL", &query);
    assert!(matches!(
        result,
        Err(DataError::InvalidLimit(LimitError::NegativeTotal(-1)))
    ));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn multi_symbol_total_counts_across_symbols() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/stocks/trades"))
        .and(query_param("symbols", "A,B"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "trades": { "A": trades(0..3) }, "next_page_token": "p2"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/stocks/trades"))
        .and(query_param("page_token", "p2"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "trades": { "B": trades(3..5) }, "next_page_token": "p3"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let query = HistoricalQuery::new().limits(Limits::none().total(5));
    let items: Vec<_> = client(&server)
        .await
        .multi_trades(["A", "B"], &query)
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    let symbols: Vec<_> = items.iter().map(|t| t.symbol.as_str()).collect();
    assert_eq!(symbols, ["A", "A", "A", "B", "B"]);
}

#[tokio::test]
async fn server_error_ends_the_sequence() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/stocks/AAPL/trades"))
        .and(query_param_is_missing("page_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "trades": trades(0..2), "next_page_token": "next"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/stocks/AAPL/trades"))
        .and(query_param("page_token", "next"))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(json!({ "code": 42_910_000, "message": "rate limit exceeded" })),
        )
        .mount(&server)
        .await;

    let mut stream = client(&server)
        .await
        .trades("AAPL", &HistoricalQuery::new())
        .unwrap();

    assert!(stream.next().await.unwrap().is_ok());
    assert!(stream.next().await.unwrap().is_ok());
    match stream.next().await.unwrap() {
        Err(DataError::Api(err)) => {
            assert_eq!(err.to_string(), "code: 429, message: rate limit exceeded");
        }
        other => panic!("expected API error, got {other:?}"),
    }
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn news_defaults_to_ten_articles() {
    let server = MockServer::start().await;
    let articles: Vec<Value> = (0..10)
        .map(|id| json!({ "id": id, "headline": format!("h{id}"), "created_at": "2024-01-02T15:00:00Z" }))
        .collect();
    Mock::given(method("GET"))
        .and(path("/v1beta1/news"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "news": articles, "next_page_token": "more"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let news: Vec<_> = client(&server)
        .await
        .news(&NewsQuery::default())
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(news.len(), 10);
}

#[tokio::test]
async fn cancelled_query_stops_without_further_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/stocks/AAPL/trades"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "trades": trades(0..3), "next_page_token": "next"
        })))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let query = HistoricalQuery::new().cancel_with(cancel.clone());
    let mut stream = client(&server).await.trades("AAPL", &query).unwrap();

    assert!(stream.next().await.unwrap().is_ok());
    cancel.cancel();
    assert!(matches!(stream.next().await, Some(Err(DataError::Cancelled))));
    assert!(stream.next().await.is_none());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

// =============================================================================
// Properties
// =============================================================================

/// Serves `available` numbered items, honouring `limit` and using the
/// offset as the page token.
struct Numbered {
    available: u64,
    limits: Mutex<Vec<u64>>,
}

#[async_trait]
impl DataTransport for Numbered {
    async fn get_json(&self, _path: &str, query: &QueryParams) -> Result<Value, ApiError> {
        let get = |key: &str| query.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone());
        let limit: u64 = get("limit").and_then(|v| v.parse().ok()).unwrap_or(0);
        let offset: u64 = get("page_token").and_then(|v| v.parse().ok()).unwrap_or(0);
        self.limits.lock().push(limit);

        let end = (offset + limit).min(self.available);
        let items: Vec<u64> = (offset..end).collect();
        let next = (end < self.available).then(|| end.to_string());
        Ok(json!({ "items": items, "next_page_token": next }))
    }
}

fn collect(available: u64, limits: Limits) -> (Vec<u64>, Vec<u64>) {
    let transport = Arc::new(Numbered {
        available,
        limits: Mutex::new(Vec::new()),
    });
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let items = runtime.block_on(async {
        paginate::<u64>(
            Arc::clone(&transport) as Arc<dyn DataTransport>,
            PageRequest::new("/items", "items").limits(limits),
            CancellationToken::new(),
        )
        .unwrap()
        .try_collect::<Vec<_>>()
        .await
        .unwrap()
    });
    let sent = transport.limits.lock().clone();
    (items, sent)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn yields_min_of_total_and_available_in_order(
        available in 0u64..300,
        total in 1i64..400,
        page in 1i64..60,
    ) {
        let (items, _) = collect(available, Limits::none().total(total).page(page));
        let expected = available.min(total.unsigned_abs());
        prop_assert_eq!(items, (0..expected).collect::<Vec<_>>());
    }

    #[test]
    fn no_request_exceeds_page_or_remaining(
        available in 0u64..300,
        total in 0i64..400,
        page in 0i64..20_000,
    ) {
        let (items, sent) = collect(available, Limits::none().total(total).page(page));
        let page_cap = if page == 0 { 10_000 } else { page.unsigned_abs().min(10_000) };

        let mut received = 0u64;
        for limit in &sent {
            prop_assert!(*limit <= page_cap);
            if total > 0 {
                prop_assert!(*limit <= total.unsigned_abs() - received);
            }
            received += (*limit).min(available.saturating_sub(received));
        }
        prop_assert_eq!(u64::try_from(items.len()).unwrap(), received);
    }
}
