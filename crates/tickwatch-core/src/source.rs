use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Exchanges with a concrete client implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeId {
    Binance,
    Coinbase,
}

impl ExchangeId {
    pub const ALL: [Self; 2] = [Self::Binance, Self::Coinbase];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::Coinbase => "coinbase",
        }
    }
}

impl Display for ExchangeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "binance" => Ok(Self::Binance),
            "coinbase" => Ok(Self::Coinbase),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_exchanges_case_insensitively() {
        assert_eq!(ExchangeId::from_str(" Binance ").expect("known"), ExchangeId::Binance);
        assert_eq!(ExchangeId::from_str("coinbase").expect("known"), ExchangeId::Coinbase);
    }

    #[test]
    fn rejects_empty_and_unknown_sources() {
        assert!(ExchangeId::from_str("").is_err());
        assert!(ExchangeId::from_str("kraken").is_err());
    }
}
