//! # Configuration
//!
//! YAML configuration loaded once at startup into an immutable [`AppConfig`]
//! and passed by reference to every constructor.
//!
//! `${VAR}` references anywhere in the file are replaced with the value of
//! the environment variable before parsing; an unset variable is an error.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::symbol::normalize_pair;
use crate::logging::{LoggingConfig, LOG_LEVELS};
use crate::notification::{NotificationFilter, WebhookFlavour};
use crate::provider_policy::RateLimitConfig;
use crate::strategy::build_strategy;
use crate::{ExchangeId, Timeframe};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("environment variable '{name}' referenced in config is not set")]
    MissingEnvVar { name: String },
    #[error("invalid config field '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    pub assets: AssetsConfig,
    pub strategies: Vec<StrategyConfig>,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Read, expand, parse and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_with(raw, |name| std::env::var(name).ok())?;
        let config: Self = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.exchange.validate()?;
        self.watcher.validate()?;
        self.assets.validate()?;

        if self.strategies.is_empty() {
            return Err(ConfigError::invalid("strategies", "at least one strategy is required"));
        }
        for (index, strategy) in self.strategies.iter().enumerate() {
            build_strategy(strategy)
                .map_err(|error| ConfigError::invalid(format!("strategies[{index}]"), error.to_string()))?;
        }

        self.notifications.validate()?;

        let level = self.logging.level.trim().to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::invalid(
                "logging.level",
                format!("expected one of {}", LOG_LEVELS.join(", ")),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// `binance` or `coinbase`.
    pub source: String,
    pub binance: Option<RateLimitConfig>,
    pub coinbase: Option<RateLimitConfig>,
    /// Overrides the active exchange's REST base URL.
    pub base_url: Option<String>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            source: String::from("binance"),
            binance: None,
            coinbase: None,
            base_url: None,
        }
    }
}

impl ExchangeConfig {
    /// Configured budget for `exchange`, or that exchange's own default.
    pub fn rate_limit_for(&self, exchange: ExchangeId) -> RateLimitConfig {
        let configured = match exchange {
            ExchangeId::Binance => self.binance,
            ExchangeId::Coinbase => self.coinbase,
        };
        configured.unwrap_or_else(|| RateLimitConfig::default_for(exchange))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.source
            .parse::<ExchangeId>()
            .map_err(|error| ConfigError::invalid("exchange.source", error.to_string()))?;

        for (field, limits) in [("exchange.binance", self.binance), ("exchange.coinbase", self.coinbase)] {
            if let Some(limits) = limits {
                if limits.requests_per_minute == 0 {
                    return Err(ConfigError::invalid(
                        format!("{field}.requests_per_minute"),
                        "must be greater than zero",
                    ));
                }
            }
        }

        if let Some(base_url) = &self.base_url {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err(ConfigError::invalid("exchange.base_url", "must be an http(s) URL"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub interval_secs: u64,
    pub max_workers: usize,
    /// Task queue capacity.
    pub buffer_size: usize,
    /// Bound on a single-run cycle.
    pub run_timeout_secs: u64,
    pub status_interval_secs: u64,
    pub lookback_bars: usize,
    /// Send a heartbeat notification with every status report.
    pub heartbeat: bool,
    /// Report failed units as system alerts.
    pub notify_on_error: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            max_workers: 4,
            buffer_size: 64,
            run_timeout_secs: 120,
            status_interval_secs: 60,
            lookback_bars: 200,
            heartbeat: false,
            notify_on_error: false,
        }
    }
}

impl WatcherConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("watcher.interval_secs", self.interval_secs as u128),
            ("watcher.max_workers", self.max_workers as u128),
            ("watcher.buffer_size", self.buffer_size as u128),
            ("watcher.run_timeout_secs", self.run_timeout_secs as u128),
            ("watcher.status_interval_secs", self.status_interval_secs as u128),
            ("watcher.lookback_bars", self.lookback_bars as u128),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be greater than zero"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetsConfig {
    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,
    /// Base assets (`BTC`) or full pairs (`BTCUSDT`).
    pub symbols: Vec<String>,
    /// `BASE/QUOTE` pairs, e.g. `ETH/BTC`.
    #[serde(default)]
    pub cross_pairs: Vec<String>,
    pub timeframes: Vec<Timeframe>,
}

fn default_quote_currency() -> String {
    String::from("USDT")
}

impl AssetsConfig {
    /// Trading pair for a configured symbol against the quote currency.
    pub fn pair_for(&self, symbol: &str) -> String {
        let symbol = symbol.trim().to_ascii_uppercase();
        let quote = self.quote_currency.trim().to_ascii_uppercase();
        if symbol.len() > quote.len() && symbol.ends_with(&quote) {
            symbol
        } else {
            format!("{symbol}{quote}")
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.quote_currency.trim().is_empty() {
            return Err(ConfigError::invalid("assets.quote_currency", "cannot be empty"));
        }
        if self.symbols.is_empty() && self.cross_pairs.is_empty() {
            return Err(ConfigError::invalid("assets.symbols", "at least one symbol is required"));
        }
        if self.timeframes.is_empty() {
            return Err(ConfigError::invalid("assets.timeframes", "at least one timeframe is required"));
        }

        for (index, symbol) in self.symbols.iter().enumerate() {
            normalize_pair(symbol)
                .map_err(|error| ConfigError::invalid(format!("assets.symbols[{index}]"), error.to_string()))?;
        }
        for (index, pair) in self.cross_pairs.iter().enumerate() {
            let valid = pair
                .split_once('/')
                .map(|(base, quote)| {
                    normalize_pair(base).is_ok() && normalize_pair(quote).is_ok()
                })
                .unwrap_or(false);
            if !valid {
                return Err(ConfigError::invalid(
                    format!("assets.cross_pairs[{index}]"),
                    format!("expected BASE/QUOTE, got '{pair}'"),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub filter: NotificationFilter,
    pub console: ConsoleConfig,
    pub webhooks: Vec<WebhookConfig>,
}

impl NotificationsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let mut names = BTreeSet::new();
        if self.console.enabled {
            names.insert(self.console.name.trim().to_owned());
        }

        for (index, webhook) in self.webhooks.iter().enumerate() {
            let field = format!("notifications.webhooks[{index}]");
            let name = webhook.name.trim();
            if name.is_empty() {
                return Err(ConfigError::invalid(format!("{field}.name"), "cannot be empty"));
            }
            if !names.insert(name.to_owned()) {
                return Err(ConfigError::invalid(
                    format!("{field}.name"),
                    format!("duplicate channel name '{name}'"),
                ));
            }
            if !webhook.url.starts_with("http://") && !webhook.url.starts_with("https://") {
                return Err(ConfigError::invalid(format!("{field}.url"), "must be an http(s) URL"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub name: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: String::from("console"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub flavour: WebhookFlavour,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub title_template: Option<String>,
    #[serde(default)]
    pub message_template: Option<String>,
    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_webhook_timeout_ms() -> u64 {
    10_000
}

/// Replace every `${NAME}` with `lookup(NAME)`.
pub fn expand_env_with(
    raw: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|error| ConfigError::invalid("<env pattern>", error.to_string()))?;

    let mut missing = None;
    let expanded = pattern.replace_all(raw, |captures: &Captures<'_>| {
        let name = &captures[1];
        lookup(name).unwrap_or_else(|| {
            missing.get_or_insert_with(|| name.to_owned());
            String::new()
        })
    });

    match missing {
        Some(name) => Err(ConfigError::MissingEnvVar { name }),
        None => Ok(expanded.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
assets:
  symbols: [BTC, ETH]
  timeframes: [1h, 1d]
strategies:
  - name: rsi
"#;

    #[test]
    fn minimal_config_fills_defaults() {
        let config = AppConfig::from_yaml_str(MINIMAL).expect("valid config");

        assert_eq!(config.exchange.source, "binance");
        assert_eq!(config.watcher.max_workers, 4);
        assert_eq!(config.watcher.lookback_bars, 200);
        assert_eq!(config.assets.quote_currency, "USDT");
        assert_eq!(config.assets.timeframes, vec![Timeframe::OneHour, Timeframe::OneDay]);
        assert!(config.notifications.console.enabled);
        assert_eq!(
            config.exchange.rate_limit_for(ExchangeId::Coinbase),
            RateLimitConfig::coinbase_default()
        );
    }

    #[test]
    fn expands_environment_references() {
        let expanded = expand_env_with("url: ${HOOK_URL}/x", |name| {
            (name == "HOOK_URL").then(|| String::from("https://hook.test"))
        })
        .expect("expands");
        assert_eq!(expanded, "url: https://hook.test/x");

        let error = expand_env_with("a: ${NOPE}", |_| None).expect_err("missing");
        assert!(matches!(error, ConfigError::MissingEnvVar { name } if name == "NOPE"));
    }

    #[test]
    fn rejects_unknown_source_and_zero_workers() {
        let raw = format!("exchange:\n  source: kraken\n{MINIMAL}");
        let error = AppConfig::from_yaml_str(&raw).expect_err("unknown source");
        assert!(error.to_string().contains("exchange.source"));

        let raw = format!("watcher:\n  max_workers: 0\n{MINIMAL}");
        let error = AppConfig::from_yaml_str(&raw).expect_err("zero workers");
        assert!(error.to_string().contains("watcher.max_workers"));
    }

    #[test]
    fn rejects_duplicate_channel_names_and_bad_cross_pairs() {
        let raw = format!(
            "{MINIMAL}notifications:\n  webhooks:\n    - name: console\n      url: https://hook.test\n"
        );
        let error = AppConfig::from_yaml_str(&raw).expect_err("duplicate");
        assert!(error.to_string().contains("duplicate channel name"));

        let raw = MINIMAL.replace("timeframes", "cross_pairs: [ETHBTC]\n  timeframes");
        let error = AppConfig::from_yaml_str(&raw).expect_err("bad cross pair");
        assert!(error.to_string().contains("BASE/QUOTE"));
    }

    #[test]
    fn rejects_out_of_range_strategy_period() {
        let raw = format!("{MINIMAL}    params:\n      period: 99999999\n");
        let error = AppConfig::from_yaml_str(&raw).expect_err("period too large");
        assert!(error.to_string().contains("strategies[0]"));
    }

    #[test]
    fn pair_for_appends_quote_once() {
        let config = AppConfig::from_yaml_str(MINIMAL).expect("valid config");
        assert_eq!(config.assets.pair_for("btc"), "BTCUSDT");
        assert_eq!(config.assets.pair_for("ETHUSDT"), "ETHUSDT");
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tickwatch.yaml");
        std::fs::write(&path, MINIMAL).expect("write config");

        let config = AppConfig::load(&path).expect("loads");
        assert_eq!(config.strategies[0].name, "rsi");

        let error = AppConfig::load(dir.path().join("missing.yaml")).expect_err("missing file");
        assert!(matches!(error, ConfigError::Io { .. }));
    }
}
