//! # Domain Models
//!
//! Canonical market-data types shared by every exchange client.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Kline`] | Validated OHLCV bar |
//! | [`Timeframe`] | Bar granularity (1m through 1M) |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! Pair formatting helpers live in [`symbol`].

mod kline;
pub mod symbol;
mod timeframe;
mod timestamp;

pub use kline::Kline;
pub use timeframe::Timeframe;
pub use timestamp::UtcDateTime;
