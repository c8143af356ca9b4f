//! Exchange client contract and request/error types.
//!
//! Every exchange integration implements [`DataSource`]. The watcher and the
//! asset validator only ever see `Arc<dyn DataSource>`, selected by
//! [`crate::factory::DataSourceFactory`].
//!
//! | Method | Description |
//! |--------|-------------|
//! | [`id`](DataSource::id) | Exchange identifier |
//! | [`is_symbol_valid`](DataSource::is_symbol_valid) | Probe whether a pair is listed |
//! | [`klines`](DataSource::klines) | Ascending OHLCV bars for a window |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::domain::symbol::normalize_pair;
use crate::throttling::TransportError;
use crate::{ExchangeId, Kline, Timeframe, UtcDateTime, ValidationError};

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// Transport failure or 5xx response that survived every retry.
    DataFetch,
    /// 4xx response or a request the client refuses to send.
    InvalidRequest,
    /// Upstream payload could not be turned into klines.
    Parse,
    Cancelled,
    UnsupportedSource,
    Internal,
}

/// Structured source error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn data_fetch(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::DataFetch,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Parse,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            kind: SourceErrorKind::Cancelled,
            message: String::from("operation cancelled"),
            retryable: false,
        }
    }

    pub fn unsupported_source(value: &str) -> Self {
        Self {
            kind: SourceErrorKind::UnsupportedSource,
            message: format!("unsupported source type '{value}'"),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub(crate) fn from_transport(exchange: ExchangeId, error: TransportError) -> Self {
        match error {
            TransportError::Cancelled => Self::cancelled(),
            TransportError::Http(error) if error.retryable() => {
                Self::data_fetch(format!("{exchange} transport error: {}", error.message()))
            }
            TransportError::Http(error) => {
                Self::invalid_request(format!("{exchange} transport error: {}", error.message()))
            }
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::DataFetch => "source.data_fetch",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::Parse => "source.parse",
            SourceErrorKind::Cancelled => "source.cancelled",
            SourceErrorKind::UnsupportedSource => "source.unsupported",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

impl From<ValidationError> for SourceError {
    fn from(error: ValidationError) -> Self {
        Self::parse(error.to_string())
    }
}

/// Request payload for [`DataSource::klines`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KlinesRequest {
    /// Canonical compact pair, e.g. `BTCUSDT`.
    pub symbol: String,
    pub timeframe: Timeframe,
    pub start: UtcDateTime,
    pub end: UtcDateTime,
    pub limit: usize,
}

impl KlinesRequest {
    pub fn new(
        symbol: &str,
        timeframe: Timeframe,
        start: UtcDateTime,
        end: UtcDateTime,
        limit: usize,
    ) -> Result<Self, SourceError> {
        let symbol = normalize_pair(symbol)
            .map_err(|error| SourceError::invalid_request(error.to_string()))?;
        if limit == 0 {
            return Err(SourceError::invalid_request(
                "klines request limit must be greater than zero",
            ));
        }
        if start >= end {
            return Err(SourceError::invalid_request(
                "klines request start must be before end",
            ));
        }
        Ok(Self {
            symbol,
            timeframe,
            start,
            end,
            limit,
        })
    }

    /// Window ending now that covers `limit` bars of `timeframe`.
    pub fn latest(symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Self, SourceError> {
        let end = UtcDateTime::now();
        let span = timeframe.duration() * (limit.max(1) as u32);
        Self::new(symbol, timeframe, end.saturating_sub(span), end, limit)
    }
}

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Exchange client contract.
///
/// Implementations must be `Send + Sync`; one instance is shared by every
/// watcher worker. Both async methods observe `cancel` and resolve to
/// [`SourceErrorKind::Cancelled`] promptly once it fires.
pub trait DataSource: Send + Sync {
    fn id(&self) -> ExchangeId;

    fn name(&self) -> &'static str {
        self.id().as_str()
    }

    /// Probes whether `symbol` is listed. A network failure is an error, not
    /// `false`.
    fn is_symbol_valid<'a>(
        &'a self,
        symbol: &'a str,
        cancel: &'a CancellationToken,
    ) -> SourceFuture<'a, bool>;

    /// Bars ordered ascending by open time, clipped to `[start, end]` and
    /// capped at `limit` (newest kept).
    fn klines<'a>(
        &'a self,
        req: KlinesRequest,
        cancel: &'a CancellationToken,
    ) -> SourceFuture<'a, Vec<Kline>>;
}

/// Sort ascending, drop duplicate open times, clip to the window, keep the
/// newest `limit` bars.
pub(crate) fn finalize_klines(mut klines: Vec<Kline>, req: &KlinesRequest) -> Vec<Kline> {
    klines.sort_by_key(|kline| kline.open_time);
    klines.dedup_by_key(|kline| kline.open_time);
    klines.retain(|kline| kline.open_time >= req.start && kline.open_time <= req.end);
    if klines.len() > req.limit {
        let excess = klines.len() - req.limit;
        klines.drain(..excess);
    }
    klines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(input: &str) -> UtcDateTime {
        UtcDateTime::parse(input).expect("timestamp")
    }

    #[test]
    fn rejects_zero_limit_and_inverted_window() {
        let start = ts("2024-01-01T00:00:00Z");
        let end = ts("2024-02-01T00:00:00Z");

        let error = KlinesRequest::new("BTCUSDT", Timeframe::OneDay, start, end, 0)
            .expect_err("zero limit");
        assert_eq!(error.kind(), SourceErrorKind::InvalidRequest);

        let error = KlinesRequest::new("BTCUSDT", Timeframe::OneDay, end, start, 10)
            .expect_err("inverted window");
        assert!(error.message().contains("start"));
    }

    #[test]
    fn normalizes_symbol_on_construction() {
        let request = KlinesRequest::new(
            "btc-usdt",
            Timeframe::OneHour,
            ts("2024-01-01T00:00:00Z"),
            ts("2024-01-02T00:00:00Z"),
            24,
        )
        .expect("valid request");
        assert_eq!(request.symbol, "BTCUSDT");
    }

    #[test]
    fn finalize_sorts_dedups_and_keeps_newest() {
        let day = |d: u8| {
            let open = ts(&format!("2024-01-{d:02}T00:00:00Z"));
            let close = ts(&format!("2024-01-{d:02}T23:59:59Z"));
            Kline::new("BTCUSDT", open, close, 1.0, 2.0, 0.5, 1.5, f64::from(d))
                .expect("valid kline")
        };
        let request = KlinesRequest::new(
            "BTCUSDT",
            Timeframe::OneDay,
            ts("2024-01-02T00:00:00Z"),
            ts("2024-01-31T00:00:00Z"),
            2,
        )
        .expect("valid request");

        let result = finalize_klines(vec![day(4), day(1), day(3), day(3), day(2)], &request);

        let volumes: Vec<f64> = result.iter().map(|kline| kline.volume).collect();
        assert_eq!(volumes, vec![3.0, 4.0]);
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(SourceError::data_fetch("x").code(), "source.data_fetch");
        assert_eq!(SourceError::unsupported_source("").code(), "source.unsupported");
        assert!(SourceError::data_fetch("x").retryable());
    }
}
