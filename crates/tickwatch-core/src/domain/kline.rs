use serde::{Deserialize, Serialize};

use crate::{UtcDateTime, ValidationError};

/// One OHLCV bar.
///
/// Construction through [`Kline::new`] enforces the price and time invariants;
/// fields are public for reading but nothing in the crate mutates a kline once
/// it has been produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub symbol: String,
    pub open_time: UtcDateTime,
    pub close_time: UtcDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Kline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        open_time: UtcDateTime,
        close_time: UtcDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, ValidationError> {
        validate_positive("open", open)?;
        validate_positive("high", high)?;
        validate_positive("low", low)?;
        validate_positive("close", close)?;
        validate_non_negative("volume", volume)?;

        if high < low {
            return Err(ValidationError::InvalidKlineRange);
        }

        if open < low || open > high || close < low || close > high {
            return Err(ValidationError::InvalidKlineBounds);
        }

        if open_time >= close_time {
            return Err(ValidationError::InvalidKlineTimes);
        }

        Ok(Self {
            symbol: symbol.into(),
            open_time,
            close_time,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}

fn validate_positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value <= 0.0 {
        return Err(ValidationError::NonPositiveValue { field });
    }
    Ok(())
}

fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}
