//! Behaviour of the Binance and Coinbase clients against a scripted exchange.

mod support;

use std::sync::Arc;

use support::{query_param, ts, ScriptedHttpClient};
use tickwatch_core::{
    BinanceClient, CoinbaseClient, DataSource, HttpResponse, KlinesRequest, RateLimitConfig,
    SourceErrorKind, Timeframe, UtcDateTime,
};
use tokio_util::sync::CancellationToken;

const HOUR_MS: i64 = 3_600_000;

fn fast_limits() -> RateLimitConfig {
    RateLimitConfig {
        requests_per_minute: 60_000,
        max_retries: 0,
        retry_delay_ms: 0,
    }
}

/// Hourly Binance rows ending at `endTime`, never older than `listed_since`.
fn binance_hourly(url: &str, listed_since: i64) -> HttpResponse {
    let end: i64 = query_param(url, "endTime").and_then(|v| v.parse().ok()).expect("endTime");
    let limit: i64 = query_param(url, "limit").and_then(|v| v.parse().ok()).expect("limit");
    let newest = end.div_euclid(HOUR_MS) * HOUR_MS;

    let rows: Vec<String> = (0..limit)
        .rev()
        .map(|back| newest - back * HOUR_MS)
        .filter(|open| *open >= listed_since)
        .map(|open| {
            format!(
                r#"[{open}, "100.0", "110.0", "90.0", "105.0", "2.5", {}, "0", 1, "0", "0", "0"]"#,
                open + HOUR_MS - 1
            )
        })
        .collect();
    HttpResponse::ok_json(format!("[{}]", rows.join(",")))
}

// =============================================================================
// Binance
// =============================================================================

#[tokio::test]
async fn when_binance_limit_exceeds_one_page_client_pages_backward_and_concatenates() {
    // Given: an exchange with unlimited hourly history
    let http = ScriptedHttpClient::new(|request| Ok(binance_hourly(&request.url, i64::MIN)));
    let client = BinanceClient::new(http.clone(), fast_limits()).with_base_url("https://binance.test");

    // When: 1500 bars are requested
    let end = ts("2024-03-01T00:00:00Z");
    let start = end.saturating_sub(time::Duration::hours(1500));
    let request = KlinesRequest::new("BTCUSDT", Timeframe::OneHour, start, end, 1500).expect("request");
    let klines = client
        .klines(request, &CancellationToken::new())
        .await
        .expect("klines");

    // Then: two pages (1000 + 500) were stitched into one ascending series
    let urls = http.urls();
    assert_eq!(urls.len(), 2);
    assert_eq!(query_param(&urls[0], "limit").as_deref(), Some("1000"));
    assert_eq!(query_param(&urls[1], "limit").as_deref(), Some("500"));
    assert_eq!(klines.len(), 1500);
    assert!(klines.windows(2).all(|pair| pair[0].open_time < pair[1].open_time));
    assert_eq!(klines.last().map(|k| k.open_time), Some(end));
    assert!(klines.iter().all(|k| k.open_time >= start && k.open_time <= end));
}

#[tokio::test]
async fn when_binance_history_is_short_client_stops_after_a_short_page() {
    let end = ts("2024-03-01T00:00:00Z");
    let listed_since = end.unix_millis() - 10 * HOUR_MS;
    let http = ScriptedHttpClient::new(move |request| Ok(binance_hourly(&request.url, listed_since)));
    let client = BinanceClient::new(http.clone(), fast_limits()).with_base_url("https://binance.test");

    let start = end.saturating_sub(time::Duration::hours(100));
    let request = KlinesRequest::new("ETHUSDT", Timeframe::OneHour, start, end, 100).expect("request");
    let klines = client
        .klines(request, &CancellationToken::new())
        .await
        .expect("klines");

    assert_eq!(http.urls().len(), 1);
    assert_eq!(klines.len(), 11);
    for kline in &klines {
        assert_eq!(kline.symbol, "ETHUSDT");
        assert!(kline.high >= kline.open.max(kline.close));
        assert!(kline.low <= kline.open.min(kline.close));
        assert!(kline.open_time < kline.close_time);
    }
}

#[tokio::test]
async fn when_binance_rejects_symbol_probe_returns_false_without_error() {
    let http = ScriptedHttpClient::new(|request| {
        if request.url.contains("symbol=BTCUSDT") {
            Ok(HttpResponse::ok_json(r#"{"symbols":[{"symbol":"BTCUSDT"}]}"#))
        } else {
            Ok(HttpResponse::new(400, r#"{"code":-1121,"msg":"Invalid symbol."}"#))
        }
    });
    let client = BinanceClient::new(http, fast_limits()).with_base_url("https://binance.test");
    let cancel = CancellationToken::new();

    assert!(client.is_symbol_valid("BTCUSDT", &cancel).await.expect("probe"));
    assert!(!client.is_symbol_valid("NOPEUSDT", &cancel).await.expect("probe"));
}

#[tokio::test]
async fn when_binance_keeps_failing_error_is_reported_as_data_fetch() {
    let http = ScriptedHttpClient::new(|_| Ok(HttpResponse::new(503, "maintenance")));
    let client = BinanceClient::new(
        http.clone(),
        RateLimitConfig {
            requests_per_minute: 60_000,
            max_retries: 2,
            retry_delay_ms: 0,
        },
    )
    .with_base_url("https://binance.test");

    let request = KlinesRequest::latest("BTCUSDT", Timeframe::OneDay, 10).expect("request");
    let error = client
        .klines(request, &CancellationToken::new())
        .await
        .expect_err("server keeps failing");

    assert_eq!(error.kind(), SourceErrorKind::DataFetch);
    assert_eq!(http.urls().len(), 3);
}

#[tokio::test]
async fn when_request_is_cancelled_client_returns_cancelled() {
    let http = ScriptedHttpClient::new(|request| Ok(binance_hourly(&request.url, i64::MIN)));
    let client = BinanceClient::new(http.clone(), fast_limits()).with_base_url("https://binance.test");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let request = KlinesRequest::latest("BTCUSDT", Timeframe::OneHour, 10).expect("request");
    let error = client.klines(request, &cancel).await.expect_err("cancelled");

    assert_eq!(error.kind(), SourceErrorKind::Cancelled);
    assert!(http.urls().is_empty());
}

// =============================================================================
// Coinbase
// =============================================================================

/// Daily Coinbase candles (newest first) inside the requested window.
fn coinbase_daily(url: &str) -> HttpResponse {
    let bound = |name: &str| -> UtcDateTime {
        let raw = query_param(url, name).expect("window bound");
        let decoded = urlencoding::decode(&raw).expect("utf-8");
        UtcDateTime::parse(&decoded).expect("rfc3339")
    };
    let (start, end) = (bound("start"), bound("end"));

    let first_day = start.unix_seconds().div_euclid(86_400) + i64::from(start.unix_seconds() % 86_400 != 0);
    let last_day = end.unix_seconds().div_euclid(86_400);
    let rows: Vec<String> = (first_day..=last_day)
        .rev()
        .map(|day| format!("[{}, 90.0, 110.0, 100.0, 105.0, 1000.0]", day * 86_400))
        .collect();
    HttpResponse::ok_json(format!("[{}]", rows.join(",")))
}

#[tokio::test]
async fn when_coinbase_lacks_weekly_granularity_daily_candles_are_aggregated() {
    // Given: daily candles for two full ISO weeks
    let http = ScriptedHttpClient::new(|request| {
        assert!(request.url.contains("/products/BTC-USD/candles"));
        assert_eq!(query_param(&request.url, "granularity").as_deref(), Some("86400"));
        Ok(coinbase_daily(&request.url))
    });
    let client = CoinbaseClient::new(http.clone(), fast_limits()).with_base_url("https://coinbase.test");

    // When: weekly bars are requested
    let request = KlinesRequest::new(
        "BTCUSD",
        Timeframe::OneWeek,
        ts("2024-01-01T00:00:00Z"),
        ts("2024-01-14T23:59:59Z"),
        10,
    )
    .expect("request");
    let weeks = client
        .klines(request, &CancellationToken::new())
        .await
        .expect("klines");

    // Then: one bar per Monday-anchored week, volumes summed
    assert_eq!(http.urls().len(), 1);
    assert_eq!(weeks.len(), 2);
    assert_eq!(weeks[0].open_time, ts("2024-01-01T00:00:00Z"));
    assert_eq!(weeks[1].open_time, ts("2024-01-08T00:00:00Z"));
    assert!(weeks.iter().all(|week| week.volume == 7000.0));
    assert!(weeks.iter().all(|week| week.symbol == "BTCUSD"));
}

#[tokio::test]
async fn when_coinbase_serves_native_granularity_rows_become_daily_bars() {
    let http = ScriptedHttpClient::new(|request| Ok(coinbase_daily(&request.url)));
    let client = CoinbaseClient::new(http, fast_limits()).with_base_url("https://coinbase.test");

    let request = KlinesRequest::new(
        "ETH-USD",
        Timeframe::OneDay,
        ts("2024-02-01T00:00:00Z"),
        ts("2024-02-05T00:00:00Z"),
        3,
    )
    .expect("request");
    let days = client
        .klines(request, &CancellationToken::new())
        .await
        .expect("klines");

    // newest three of the five available days, ascending
    assert_eq!(days.len(), 3);
    assert_eq!(days[0].open_time, ts("2024-02-03T00:00:00Z"));
    assert_eq!(days[2].open_time, ts("2024-02-05T00:00:00Z"));
    assert_eq!(days[0].close_time, ts("2024-02-03T23:59:59.999Z"));
    assert_eq!((days[0].open, days[0].close), (100.0, 105.0));
}

#[tokio::test]
async fn when_coinbase_product_is_unknown_probe_returns_false() {
    let http = ScriptedHttpClient::new(|request| {
        if request.url.ends_with("/products/BTC-USDT") {
            Ok(HttpResponse::ok_json(r#"{"id":"BTC-USDT"}"#))
        } else {
            Ok(HttpResponse::new(404, r#"{"message":"NotFound"}"#))
        }
    });
    let client = CoinbaseClient::new(http, fast_limits()).with_base_url("https://coinbase.test");
    let cancel = CancellationToken::new();

    assert!(client.is_symbol_valid("BTCUSDT", &cancel).await.expect("probe"));
    assert!(!client.is_symbol_valid("DOGEEUR", &cancel).await.expect("probe"));
}

#[tokio::test]
async fn exchange_clients_do_not_share_rate_limit_state() {
    let http = ScriptedHttpClient::new(|request| Ok(binance_hourly(&request.url, i64::MIN)));
    let binance = BinanceClient::new(http.clone(), fast_limits());
    let coinbase = CoinbaseClient::new(http, RateLimitConfig::default_for(tickwatch_core::ExchangeId::Coinbase));

    let request = KlinesRequest::latest("BTCUSDT", Timeframe::OneHour, 5).expect("request");
    binance
        .klines(request, &CancellationToken::new())
        .await
        .expect("klines");

    assert_eq!(binance.transport().state().await.requests_issued, 1);
    assert_eq!(coinbase.transport().state().await.requests_issued, 0);
    assert_eq!(coinbase.transport().state().await.requests_per_minute, 180);
}
