use std::sync::Arc;

use serde_json::Value;
use time::Duration;
use tokio_util::sync::CancellationToken;

use super::{ensure_success, integer_at, number_at};
use crate::aggregation::aggregate;
use crate::data_source::{finalize_klines, DataSource, KlinesRequest, SourceError, SourceFuture};
use crate::domain::symbol::{normalize_pair, to_dashed_pair};
use crate::http_client::{HttpClient, HttpRequest};
use crate::provider_policy::RateLimitConfig;
use crate::throttling::RateLimitedTransport;
use crate::{ExchangeId, Kline, Timeframe, UtcDateTime};

/// Coinbase Exchange public REST client.
///
/// Only six granularities are served natively. Everything else is fetched at
/// the coarsest native granularity that evenly divides the target and then
/// aggregated locally (calendar rules for `1w`/`1M`, epoch-aligned buckets
/// otherwise).
pub struct CoinbaseClient {
    transport: RateLimitedTransport,
    base_url: String,
}

impl CoinbaseClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.exchange.coinbase.com";

    /// Maximum candles returned by one `/candles` call.
    pub const MAX_PAGE_SIZE: i64 = 300;

    pub fn new(http_client: Arc<dyn HttpClient>, config: RateLimitConfig) -> Self {
        Self::from_transport(RateLimitedTransport::new(
            ExchangeId::Coinbase.as_str(),
            http_client,
            config,
        ))
    }

    pub fn from_transport(transport: RateLimitedTransport) -> Self {
        Self {
            transport,
            base_url: Self::DEFAULT_BASE_URL.to_owned(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn transport(&self) -> &RateLimitedTransport {
        &self.transport
    }

    async fn probe_symbol(&self, symbol: &str, cancel: &CancellationToken) -> Result<bool, SourceError> {
        let symbol = normalize_pair(symbol)
            .map_err(|error| SourceError::invalid_request(error.to_string()))?;
        let endpoint = format!(
            "{}/products/{}",
            self.base_url,
            urlencoding::encode(&to_dashed_pair(&symbol))
        );

        let response = self
            .transport
            .execute(HttpRequest::get(endpoint), cancel)
            .await
            .map_err(|error| SourceError::from_transport(ExchangeId::Coinbase, error))?;

        match response.status {
            200 => Ok(true),
            400 | 404 => Ok(false),
            _ => ensure_success(ExchangeId::Coinbase, response).map(|_| false),
        }
    }

    async fn fetch_klines(
        &self,
        req: &KlinesRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<Kline>, SourceError> {
        let native = native_timeframe(req.timeframe);
        let aggregating = native != req.timeframe;
        let bars = self.fetch_native(req, native, aggregating, cancel).await?;

        let bars = if aggregating {
            tracing::debug!(
                exchange = "coinbase",
                symbol = %req.symbol,
                from = %native,
                to = %req.timeframe,
                bars = bars.len(),
                "aggregating native candles"
            );
            aggregate(&finalize_native(bars), req.timeframe)?
        } else {
            bars
        };

        Ok(finalize_klines(bars, req))
    }

    /// Walks backward from `req.end` in windows of at most
    /// [`Self::MAX_PAGE_SIZE`] candles until `req.start` is reached or a window
    /// comes back empty.
    async fn fetch_native(
        &self,
        req: &KlinesRequest,
        native: Timeframe,
        skip_bad_rows: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<Kline>, SourceError> {
        let granularity = native.duration();
        let window = granularity * (Self::MAX_PAGE_SIZE as i32);
        let product = to_dashed_pair(&req.symbol);
        let mut collected = Vec::new();
        let mut window_end = req.end;

        while window_end > req.start {
            let window_start = if window_end - req.start > window {
                window_end.saturating_sub(window)
            } else {
                req.start
            };

            let endpoint = format!(
                "{}/products/{}/candles?granularity={}&start={}&end={}",
                self.base_url,
                urlencoding::encode(&product),
                granularity.whole_seconds(),
                urlencoding::encode(&window_start.format_rfc3339()),
                urlencoding::encode(&window_end.format_rfc3339())
            );

            let response = self
                .transport
                .execute(HttpRequest::get(endpoint), cancel)
                .await
                .map_err(|error| SourceError::from_transport(ExchangeId::Coinbase, error))?;
            let response = ensure_success(ExchangeId::Coinbase, response)?;
            let page = parse_candles(&req.symbol, granularity, &response.body, skip_bad_rows)?;

            if page.is_empty() {
                break;
            }
            collected.extend(page);
            window_end = window_start;
        }

        Ok(collected)
    }
}

impl DataSource for CoinbaseClient {
    fn id(&self) -> ExchangeId {
        ExchangeId::Coinbase
    }

    fn is_symbol_valid<'a>(
        &'a self,
        symbol: &'a str,
        cancel: &'a CancellationToken,
    ) -> SourceFuture<'a, bool> {
        Box::pin(async move { self.probe_symbol(symbol, cancel).await })
    }

    fn klines<'a>(
        &'a self,
        req: KlinesRequest,
        cancel: &'a CancellationToken,
    ) -> SourceFuture<'a, Vec<Kline>> {
        Box::pin(async move { self.fetch_klines(&req, cancel).await })
    }
}

/// Granularity actually requested from Coinbase for `timeframe`.
pub(crate) const fn native_timeframe(timeframe: Timeframe) -> Timeframe {
    match timeframe {
        Timeframe::OneMinute | Timeframe::ThreeMinutes => Timeframe::OneMinute,
        Timeframe::FiveMinutes => Timeframe::FiveMinutes,
        Timeframe::FifteenMinutes | Timeframe::ThirtyMinutes => Timeframe::FifteenMinutes,
        Timeframe::OneHour | Timeframe::TwoHours | Timeframe::FourHours | Timeframe::EightHours => {
            Timeframe::OneHour
        }
        Timeframe::SixHours | Timeframe::TwelveHours => Timeframe::SixHours,
        Timeframe::OneDay | Timeframe::ThreeDays | Timeframe::OneWeek | Timeframe::OneMonth => {
            Timeframe::OneDay
        }
    }
}

fn finalize_native(mut bars: Vec<Kline>) -> Vec<Kline> {
    bars.sort_by_key(|kline| kline.open_time);
    bars.dedup_by_key(|kline| kline.open_time);
    bars
}

/// Rows are `[time, low, high, open, close, volume]`, newest first. When the
/// page feeds an aggregation a malformed row is skipped; otherwise it fails
/// the call.
fn parse_candles(
    symbol: &str,
    granularity: Duration,
    body: &str,
    skip_bad_rows: bool,
) -> Result<Vec<Kline>, SourceError> {
    let rows: Vec<Vec<Value>> = serde_json::from_str(body)
        .map_err(|error| SourceError::parse(format!("failed to parse coinbase candles: {error}")))?;

    let mut klines = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        match parse_row(symbol, granularity, row) {
            Ok(kline) => klines.push(kline),
            Err(error) if skip_bad_rows => {
                tracing::warn!(
                    exchange = "coinbase",
                    symbol,
                    index,
                    error = %error,
                    "skipping malformed candle"
                );
            }
            Err(error) => return Err(error),
        }
    }
    Ok(klines)
}

fn parse_row(symbol: &str, granularity: Duration, row: &[Value]) -> Result<Kline, SourceError> {
    let malformed = || SourceError::parse(format!("malformed coinbase candle row: {row:?}"));

    let open_time = UtcDateTime::from_unix_seconds(integer_at(row, 0).ok_or_else(malformed)?)?;
    let low = number_at(row, 1).ok_or_else(malformed)?;
    let high = number_at(row, 2).ok_or_else(malformed)?;
    let open = number_at(row, 3).ok_or_else(malformed)?;
    let close = number_at(row, 4).ok_or_else(malformed)?;
    let volume = number_at(row, 5).ok_or_else(malformed)?;
    let close_time = open_time.saturating_add(granularity - Duration::milliseconds(1));

    Ok(Kline::new(symbol, open_time, close_time, open, high, low, close, volume)?)
}
