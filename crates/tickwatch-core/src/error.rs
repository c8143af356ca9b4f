use thiserror::Error;

/// Validation and contract errors exposed by `tickwatch-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error(
        "invalid timeframe '{value}', expected one of 1m, 3m, 5m, 15m, 30m, 1h, 2h, 4h, 6h, 8h, 12h, 1d, 3d, 1w, 1M"
    )]
    InvalidTimeframe { value: String },
    #[error("invalid source '{value}', expected one of binance, coinbase")]
    InvalidSource { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("timestamp out of range: {value}")]
    TimestampOutOfRange { value: i64 },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be positive")]
    NonPositiveValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },

    #[error("kline high must be >= low")]
    InvalidKlineRange,
    #[error("kline open/close must be within high/low range")]
    InvalidKlineBounds,
    #[error("kline open time must be before close time")]
    InvalidKlineTimes,
}
