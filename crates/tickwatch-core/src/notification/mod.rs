//! # Notifications
//!
//! Alert model, channel contract, and the fan-out manager.
//!
//! | Item | Description |
//! |------|-------------|
//! | [`Notification`] | One immutable alert event |
//! | [`NotificationFilter`] | Level / type / asset gate applied before fan-out |
//! | [`Notifier`] | Channel contract (console, webhooks) |
//! | [`NotificationManager`] | Channel registry with partial-failure tolerant fan-out |

mod console;
mod manager;
mod template;
mod webhook;

pub use console::ConsoleNotifier;
pub use manager::{ChannelFailure, DeliveryReport, NotificationError, NotificationManager};
pub use template::render_template;
pub use webhook::{WebhookFlavour, WebhookNotifier};

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::UtcDateTime;

/// Severity, totally ordered `Info < Warning < Error < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl NotificationLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl Display for NotificationLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown notification level '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    PriceAlert,
    StrategySignal,
    SystemAlert,
    Heartbeat,
}

impl NotificationType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PriceAlert => "price_alert",
            Self::StrategySignal => "strategy_signal",
            Self::SystemAlert => "system_alert",
            Self::Heartbeat => "heartbeat",
        }
    }
}

impl Display for NotificationType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One alert event. Never mutated after it is handed to the manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub level: NotificationLevel,
    #[serde(default)]
    pub asset: String,
    #[serde(default)]
    pub strategy: String,
    pub title: String,
    pub message: String,
    /// Template interpolation values, addressed as `{{data.<key>}}`.
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    pub timestamp: UtcDateTime,
}

impl Notification {
    /// New notification with a random v4 id and the current time.
    pub fn new(
        kind: NotificationType,
        level: NotificationLevel,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            level,
            asset: String::new(),
            strategy: String::new(),
            title: title.into(),
            message: message.into(),
            data: BTreeMap::new(),
            timestamp: UtcDateTime::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_asset(mut self, asset: impl Into<String>) -> Self {
        self.asset = asset.into();
        self
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = strategy.into();
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.data.insert(key.into(), value.to_string());
        self
    }
}

/// Gate applied by [`NotificationManager::send`]. The default passes
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationFilter {
    pub min_level: NotificationLevel,
    /// Empty allows every type.
    pub allowed_types: Vec<NotificationType>,
    /// Empty allows every asset. Notifications without an asset always pass
    /// this check.
    pub allowed_assets: Vec<String>,
}

impl NotificationFilter {
    pub fn should_notify(&self, notification: &Notification) -> bool {
        if notification.level < self.min_level {
            return false;
        }

        if !self.allowed_types.is_empty() && !self.allowed_types.contains(&notification.kind) {
            return false;
        }

        self.allowed_assets.is_empty()
            || notification.asset.is_empty()
            || self
                .allowed_assets
                .iter()
                .any(|asset| asset.eq_ignore_ascii_case(&notification.asset))
    }
}

/// Failure reported by a single channel.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ChannelError {
    message: String,
}

impl ChannelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type ChannelFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ChannelError>> + Send + 'a>>;

/// Notification channel contract.
pub trait Notifier: Send + Sync {
    /// Unique registry key.
    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool;

    fn send<'a>(&'a self, notification: &'a Notification) -> ChannelFuture<'a>;

    fn close<'a>(&'a self) -> ChannelFuture<'a>;
}
