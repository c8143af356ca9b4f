use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{ensure_success, integer_at, number_at};
use crate::data_source::{finalize_klines, DataSource, KlinesRequest, SourceError, SourceFuture};
use crate::domain::symbol::normalize_pair;
use crate::http_client::{HttpClient, HttpRequest};
use crate::provider_policy::RateLimitConfig;
use crate::throttling::RateLimitedTransport;
use crate::{ExchangeId, Kline, UtcDateTime};

/// Binance spot REST client. Every timeframe is native.
pub struct BinanceClient {
    transport: RateLimitedTransport,
    base_url: String,
}

impl BinanceClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.binance.com";

    /// Hard per-request ceiling of `/api/v3/klines`.
    pub const MAX_PAGE_SIZE: usize = 1_000;

    pub fn new(http_client: Arc<dyn HttpClient>, config: RateLimitConfig) -> Self {
        Self::from_transport(RateLimitedTransport::new(
            ExchangeId::Binance.as_str(),
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
            "{}/api/v3/exchangeInfo?symbol={}",
            self.base_url,
            urlencoding::encode(&symbol)
        );

        let response = self
            .transport
            .execute(HttpRequest::get(endpoint), cancel)
            .await
            .map_err(|error| SourceError::from_transport(ExchangeId::Binance, error))?;

        match response.status {
            200 => Ok(true),
            // -1121 "Invalid symbol." comes back as a plain 400.
            400 => Ok(false),
            _ => ensure_success(ExchangeId::Binance, response).map(|_| false),
        }
    }

    /// Pages backward from `req.end` using `endTime` cursors so the newest
    /// bars are always fetched first.
    async fn fetch_klines(
        &self,
        req: &KlinesRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<Kline>, SourceError> {
        let mut collected: Vec<Kline> = Vec::new();
        let mut cursor_end = req.end;

        loop {
            let remaining = req.limit.saturating_sub(collected.len());
            let page_size = remaining.clamp(1, Self::MAX_PAGE_SIZE);
            let endpoint = format!(
                "{}/api/v3/klines?symbol={}&interval={}&endTime={}&limit={}",
                self.base_url,
                urlencoding::encode(&req.symbol),
                req.timeframe.as_str(),
                cursor_end.unix_millis(),
                page_size
            );

            let response = self
                .transport
                .execute(HttpRequest::get(endpoint), cancel)
                .await
                .map_err(|error| SourceError::from_transport(ExchangeId::Binance, error))?;
            let response = ensure_success(ExchangeId::Binance, response)?;
            let page = parse_klines(&req.symbol, &response.body)?;

            let Some(oldest) = page.iter().map(|kline| kline.open_time).min() else {
                break;
            };
            let short_page = page.len() < page_size;
            collected.extend(page);

            tracing::debug!(
                exchange = "binance",
                symbol = %req.symbol,
                timeframe = %req.timeframe,
                fetched = collected.len(),
                "fetched klines page"
            );

            if short_page || oldest <= req.start || collected.len() >= req.limit {
                break;
            }
            cursor_end = UtcDateTime::from_unix_millis(oldest.unix_millis() - 1)?;
        }

        Ok(finalize_klines(collected, req))
    }
}

impl DataSource for BinanceClient {
    fn id(&self) -> ExchangeId {
        ExchangeId::Binance
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

/// Rows are `[openTime, "open", "high", "low", "close", "volume", closeTime, ...]`.
/// Any malformed row fails the whole call.
fn parse_klines(symbol: &str, body: &str) -> Result<Vec<Kline>, SourceError> {
    let rows: Vec<Vec<Value>> = serde_json::from_str(body)
        .map_err(|error| SourceError::parse(format!("failed to parse binance klines: {error}")))?;

    rows.iter()
        .enumerate()
        .map(|(index, row)| parse_row(row).ok_or_else(|| malformed_row(index)))
        .map(|parsed| parsed.and_then(|row| row.into_kline(symbol)))
        .collect()
}

struct BinanceRow {
    open_time: i64,
    close_time: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl BinanceRow {
    fn into_kline(self, symbol: &str) -> Result<Kline, SourceError> {
        Kline::new(
            symbol,
            UtcDateTime::from_unix_millis(self.open_time)?,
            UtcDateTime::from_unix_millis(self.close_time)?,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
        )
        .map_err(SourceError::from)
    }
}

fn parse_row(row: &[Value]) -> Option<BinanceRow> {
    Some(BinanceRow {
        open_time: integer_at(row, 0)?,
        open: number_at(row, 1)?,
        high: number_at(row, 2)?,
        low: number_at(row, 3)?,
        close: number_at(row, 4)?,
        volume: number_at(row, 5)?,
        close_time: integer_at(row, 6)?,
    })
}

fn malformed_row(index: usize) -> SourceError {
    SourceError::parse(format!("malformed binance kline row at index {index}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::SourceErrorKind;

    #[test]
    fn parses_string_encoded_rows() {
        let body = r#"[
            [1704067200000, "42000.0", "42500.5", "41800.0", "42300.1", "1234.5", 1704153599999, "0", 10, "0", "0", "0"]
        ]"#;

        let klines = parse_klines("BTCUSDT", body).expect("parses");

        assert_eq!(klines.len(), 1);
        assert_eq!(klines[0].symbol, "BTCUSDT");
        assert_eq!(klines[0].open_time.unix_millis(), 1_704_067_200_000);
        assert_eq!(klines[0].high, 42500.5);
        assert_eq!(klines[0].volume, 1234.5);
    }

    #[test]
    fn malformed_row_fails_the_call() {
        let body = r#"[[1704067200000, "oops", "1", "1", "1", "1", 1704153599999]]"#;

        let error = parse_klines("BTCUSDT", body).expect_err("must fail");
        assert_eq!(error.kind(), SourceErrorKind::Parse);
    }

    #[test]
    fn inconsistent_bar_fails_validation() {
        // high below low
        let body = r#"[[1704067200000, "10", "9", "11", "10", "1", 1704153599999]]"#;

        let error = parse_klines("BTCUSDT", body).expect_err("must fail");
        assert_eq!(error.kind(), SourceErrorKind::Parse);
    }
}
