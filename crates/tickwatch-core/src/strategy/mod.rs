//! # Strategies
//!
//! Pluggable signal evaluation over a kline window.
//!
//! | Item | Description |
//! |------|-------------|
//! | [`Strategy`] | Evaluation contract used by the watcher |
//! | [`RsiStrategy`] | Built-in Wilder RSI threshold strategy |
//! | [`build_strategy`] | Name-keyed factory over [`StrategyConfig`] |

mod rsi;

pub use rsi::RsiStrategy;

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::StrategyConfig;
use crate::notification::NotificationLevel;
use crate::{Kline, Timeframe, UtcDateTime};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StrategyError {
    #[error("unknown strategy '{name}'")]
    UnknownStrategy { name: String },
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("insufficient data: {required} points required, {available} available")]
    InsufficientData { required: usize, available: usize },
}

/// Snapshot handed to [`Strategy::evaluate`].
#[derive(Debug, Clone, PartialEq)]
pub struct MarketData {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// Ascending by open time.
    pub klines: Vec<Kline>,
    pub timestamp: UtcDateTime,
}

impl MarketData {
    pub fn latest_close(&self) -> Option<f64> {
        self.klines.last().map(|kline| kline.close)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Buy,
    Sell,
}

impl SignalKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl Display for SignalKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalResult {
    pub kind: SignalKind,
    pub level: NotificationLevel,
    /// Price the signal fired at, normally the latest close.
    pub price: f64,
    pub message: String,
    /// Indicator values, surfaced as notification template data.
    pub indicators: BTreeMap<String, f64>,
}

/// Signal evaluation contract. Implementations are pure functions of the
/// snapshot and are shared across workers.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Fewer bars than this is a skip, not an error.
    fn required_data_points(&self) -> usize;

    fn evaluate(&self, data: &MarketData) -> Result<Option<SignalResult>, StrategyError>;
}

/// Construct a strategy by name.
pub fn build_strategy(config: &StrategyConfig) -> Result<Box<dyn Strategy>, StrategyError> {
    match config.name.trim().to_ascii_lowercase().as_str() {
        "rsi" => Ok(Box::new(RsiStrategy::from_params(&config.params)?)),
        _ => Err(StrategyError::UnknownStrategy {
            name: config.name.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_resolves_known_names_only() {
        let rsi = StrategyConfig {
            name: String::from("RSI"),
            params: BTreeMap::new(),
        };
        let strategy = build_strategy(&rsi).expect("rsi is built in");
        assert_eq!(strategy.name(), "rsi");
        assert_eq!(strategy.required_data_points(), 15);

        let unknown = StrategyConfig {
            name: String::from("macd"),
            params: BTreeMap::new(),
        };
        assert!(matches!(
            build_strategy(&unknown),
            Err(StrategyError::UnknownStrategy { .. })
        ));
    }
}
