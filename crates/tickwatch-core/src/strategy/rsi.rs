use std::collections::BTreeMap;

use super::{MarketData, SignalKind, SignalResult, Strategy, StrategyError};
use crate::notification::NotificationLevel;

/// Upper bound on `period`; far beyond any lookback an exchange serves.
pub const MAX_PERIOD: usize = 10_000;

/// Relative Strength Index threshold strategy.
///
/// Emits `Buy` at or below `oversold` and `Sell` at or above `overbought`.
#[derive(Debug, Clone, PartialEq)]
pub struct RsiStrategy {
    period: usize,
    oversold: f64,
    overbought: f64,
}

impl Default for RsiStrategy {
    fn default() -> Self {
        Self {
            period: 14,
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

impl RsiStrategy {
    pub fn new(period: usize, oversold: f64, overbought: f64) -> Result<Self, StrategyError> {
        if !(2..=MAX_PERIOD).contains(&period) {
            return Err(invalid("period", "must be between 2 and 10000"));
        }
        if !(0.0..=100.0).contains(&oversold) || !(0.0..=100.0).contains(&overbought) {
            return Err(invalid("oversold/overbought", "must be within 0..=100"));
        }
        if oversold >= overbought {
            return Err(invalid("oversold", "must be below overbought"));
        }
        Ok(Self {
            period,
            oversold,
            overbought,
        })
    }

    /// Reads `period`, `oversold` and `overbought`; anything missing keeps its
    /// default.
    pub fn from_params(params: &BTreeMap<String, f64>) -> Result<Self, StrategyError> {
        let defaults = Self::default();
        let period = match params.get("period") {
            Some(value) if value.fract() != 0.0 || *value < 0.0 => {
                return Err(invalid("period", "must be a whole number"));
            }
            Some(value) if *value > MAX_PERIOD as f64 => {
                return Err(invalid("period", "must be between 2 and 10000"));
            }
            Some(value) => *value as usize,
            None => defaults.period,
        };
        Self::new(
            period,
            params.get("oversold").copied().unwrap_or(defaults.oversold),
            params.get("overbought").copied().unwrap_or(defaults.overbought),
        )
    }

    /// Wilder-smoothed RSI of the last value in `closes`.
    pub fn compute(&self, closes: &[f64]) -> Option<f64> {
        if closes.len() < self.period + 1 {
            return None;
        }

        let period = self.period as f64;
        let changes: Vec<f64> = closes.windows(2).map(|pair| pair[1] - pair[0]).collect();
        let (seed, rest) = changes.split_at(self.period);

        let mut avg_gain = seed.iter().map(|change| change.max(0.0)).sum::<f64>() / period;
        let mut avg_loss = seed.iter().map(|change| (-change).max(0.0)).sum::<f64>() / period;

        for change in rest {
            avg_gain = (avg_gain * (period - 1.0) + change.max(0.0)) / period;
            avg_loss = (avg_loss * (period - 1.0) + (-change).max(0.0)) / period;
        }

        if avg_loss == 0.0 {
            return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
        }
        let rs = avg_gain / avg_loss;
        Some(100.0 - 100.0 / (1.0 + rs))
    }
}

impl Strategy for RsiStrategy {
    fn name(&self) -> &str {
        "rsi"
    }

    fn description(&self) -> &str {
        "Wilder RSI crossing oversold/overbought thresholds"
    }

    fn required_data_points(&self) -> usize {
        self.period + 1
    }

    fn evaluate(&self, data: &MarketData) -> Result<Option<SignalResult>, StrategyError> {
        let closes: Vec<f64> = data.klines.iter().map(|kline| kline.close).collect();
        let rsi = self.compute(&closes).ok_or(StrategyError::InsufficientData {
            required: self.required_data_points(),
            available: closes.len(),
        })?;
        let Some(price) = data.latest_close() else {
            return Ok(None);
        };

        let (kind, threshold) = if rsi <= self.oversold {
            (SignalKind::Buy, self.oversold)
        } else if rsi >= self.overbought {
            (SignalKind::Sell, self.overbought)
        } else {
            return Ok(None);
        };

        let mut indicators = BTreeMap::new();
        indicators.insert(String::from("rsi"), rsi);
        indicators.insert(String::from("threshold"), threshold);
        indicators.insert(String::from("period"), self.period as f64);

        Ok(Some(SignalResult {
            kind,
            level: NotificationLevel::Warning,
            price,
            message: format!(
                "{} {} RSI({}) = {:.2} crossed {} threshold {:.0}, close {}",
                data.symbol,
                data.timeframe,
                self.period,
                rsi,
                if kind == SignalKind::Buy { "oversold" } else { "overbought" },
                threshold,
                price
            ),
            indicators,
        }))
    }
}

fn invalid(name: &str, reason: &str) -> StrategyError {
    StrategyError::InvalidParameter {
        name: name.to_owned(),
        reason: reason.to_owned(),
    }
}
