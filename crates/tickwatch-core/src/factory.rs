//! Builds the configured exchange client behind the [`DataSource`] trait.

use std::str::FromStr;
use std::sync::Arc;

use crate::adapters::{BinanceClient, CoinbaseClient};
use crate::config::{AppConfig, ExchangeConfig};
use crate::data_source::{DataSource, SourceError};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::ExchangeId;

pub struct DataSourceFactory;

impl DataSourceFactory {
    /// `source_type` is matched case-insensitively after trimming. Each
    /// exchange gets its own rate-limit budget from `exchange`.
    pub fn create(
        source_type: &str,
        exchange: &ExchangeConfig,
        http_client: Arc<dyn HttpClient>,
    ) -> Result<Arc<dyn DataSource>, SourceError> {
        let id = ExchangeId::from_str(source_type)
            .map_err(|_| SourceError::unsupported_source(source_type.trim()))?;
        let limits = exchange.rate_limit_for(id);

        let source: Arc<dyn DataSource> = match id {
            ExchangeId::Binance => {
                let client = BinanceClient::new(http_client, limits);
                Arc::new(match &exchange.base_url {
                    Some(base_url) => client.with_base_url(base_url),
                    None => client,
                })
            }
            ExchangeId::Coinbase => {
                let client = CoinbaseClient::new(http_client, limits);
                Arc::new(match &exchange.base_url {
                    Some(base_url) => client.with_base_url(base_url),
                    None => client,
                })
            }
        };

        tracing::debug!(
            exchange = %id,
            requests_per_minute = limits.requests_per_minute,
            "data source created"
        );
        Ok(source)
    }

    /// Active exchange from `config.exchange.source` over a reqwest client.
    pub fn from_config(config: &AppConfig) -> Result<Arc<dyn DataSource>, SourceError> {
        Self::create(
            &config.exchange.source,
            &config.exchange,
            Arc::new(ReqwestHttpClient::new()),
        )
    }
}
