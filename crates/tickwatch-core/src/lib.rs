//! # Tickwatch Core
//!
//! Market-data acquisition, scheduled strategy evaluation, and alert fan-out
//! for crypto exchanges.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Binance and Coinbase REST clients |
//! | [`aggregation`] | Local kline aggregation and cross-rate derivation |
//! | [`config`] | YAML configuration with `${VAR}` expansion |
//! | [`data_source`] | Data source trait, kline requests, structured errors |
//! | [`domain`] | Klines, timeframes, timestamps, pair helpers |
//! | [`factory`] | Exchange selection by name |
//! | [`http_client`] | HTTP client abstraction |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`notification`] | Notification model, channels, fan-out manager |
//! | [`provider_policy`] | Per-exchange rate limits |
//! | [`retry`] | Retry policy |
//! | [`strategy`] | Strategy trait and the RSI strategy |
//! | [`throttling`] | Rate-limited, cancellable transport |
//! | [`validator`] | Asset availability checks |
//! | [`watcher`] | Cycle scheduler over a bounded worker pool |
//!
//! ## Data Flow
//!
//! ```text
//! AppConfig ──▶ DataSourceFactory ──▶ AssetValidator ──▶ Watcher
//!                                                          │
//!                      ┌───────────────────────────────────┘
//!                      ▼
//!        WorkerPool ──▶ DataSource::klines ──▶ Strategy::evaluate
//!                                                          │
//!                                                          ▼
//!                                           NotificationManager::send
//! ```
//!
//! ## Cancellation
//!
//! Every network-bound operation takes a
//! [`CancellationToken`](tokio_util::sync::CancellationToken). Cancellation
//! surfaces as [`SourceErrorKind::Cancelled`] and is never retried.

/// Crate version, reported by `tickwatch version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod adapters;
pub mod aggregation;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod factory;
pub mod http_client;
pub mod logging;
pub mod notification;
pub mod provider_policy;
pub mod retry;
pub mod source;
pub mod strategy;
pub mod throttling;
pub mod validator;
pub mod watcher;

// Exchange clients
pub use adapters::{BinanceClient, CoinbaseClient};

// Configuration
pub use config::{AppConfig, AssetsConfig, ConfigError, ExchangeConfig, WatcherConfig};

// Data source trait and types
pub use data_source::{DataSource, KlinesRequest, SourceError, SourceErrorKind, SourceFuture};

// Domain models
pub use domain::{Kline, Timeframe, UtcDateTime};

// Error types
pub use error::ValidationError;

pub use factory::DataSourceFactory;

// HTTP client types
pub use http_client::{HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, ReqwestHttpClient};

pub use logging::{init_logging, LogFormat, LoggingConfig};

// Notifications
pub use notification::{
    Notification, NotificationError, NotificationFilter, NotificationLevel, NotificationManager,
    NotificationType, Notifier,
};

pub use provider_policy::RateLimitConfig;
pub use retry::RetryPolicy;
pub use source::ExchangeId;
pub use strategy::{Strategy, StrategyError};
pub use throttling::{RateLimitedTransport, TransportError};
pub use validator::{AssetValidator, ValidationReport};
pub use watcher::{CycleReport, FailureStage, WatchTarget, Watcher, WatcherError, WatcherState, WatcherStatus};
