use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;
use crate::ExchangeId;

/// Per-exchange request budget and retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl RateLimitConfig {
    /// Binance allows 1200 request weight per minute; half of it leaves room
    /// for other processes sharing the same IP.
    pub const fn binance_default() -> Self {
        Self {
            requests_per_minute: 600,
            max_retries: 3,
            retry_delay_ms: 1_000,
        }
    }

    /// Coinbase public endpoints allow 10 requests per second per IP and
    /// throttle bursts aggressively.
    pub const fn coinbase_default() -> Self {
        Self {
            requests_per_minute: 180,
            max_retries: 3,
            retry_delay_ms: 1_000,
        }
    }

    pub const fn default_for(exchange: ExchangeId) -> Self {
        match exchange {
            ExchangeId::Binance => Self::binance_default(),
            ExchangeId::Coinbase => Self::coinbase_default(),
        }
    }

    /// `1 minute / requests_per_minute`, with a zero budget treated as one.
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(60) / self.requests_per_minute.max(1)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(Duration::from_millis(self.retry_delay_ms), self.max_retries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchanges_keep_independent_defaults() {
        let binance = RateLimitConfig::default_for(ExchangeId::Binance);
        let coinbase = RateLimitConfig::default_for(ExchangeId::Coinbase);

        assert_eq!(binance.requests_per_minute, 600);
        assert_eq!(coinbase.requests_per_minute, 180);
        assert_ne!(binance, coinbase);
    }

    #[test]
    fn min_interval_divides_a_minute() {
        let config = RateLimitConfig {
            requests_per_minute: 120,
            max_retries: 0,
            retry_delay_ms: 0,
        };
        assert_eq!(config.min_interval(), Duration::from_millis(500));

        let zero = RateLimitConfig {
            requests_per_minute: 0,
            ..config
        };
        assert_eq!(zero.min_interval(), Duration::from_secs(60));
    }
}
