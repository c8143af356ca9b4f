use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::RwLock;

use super::{ChannelError, ConsoleNotifier, Notification, NotificationFilter, Notifier, WebhookNotifier};
use crate::config::NotificationsConfig;
use crate::http_client::HttpClient;

/// One channel's failure inside a fan-out or close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelFailure {
    pub channel: String,
    pub error: ChannelError,
}

impl Display for ChannelFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.channel, self.error)
    }
}

fn join_failures(failures: &[ChannelFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotificationError {
    #[error("notifier name cannot be empty")]
    EmptyChannelName,
    #[error("notifier '{name}' already registered")]
    DuplicateChannel { name: String },
    #[error("notifier '{name}' not found")]
    ChannelNotFound { name: String },
    #[error("notifier '{name}' is disabled")]
    ChannelDisabled { name: String },
    #[error("no enabled notifiers registered")]
    NoEnabledChannels,
    #[error("notifier '{name}' failed: {error}")]
    ChannelFailed { name: String, error: ChannelError },
    #[error("all notifiers failed: {}", join_failures(.failures))]
    AllFailed { failures: Vec<ChannelFailure> },
    #[error("failed to close notifiers: {}", join_failures(.failures))]
    CloseFailed { failures: Vec<ChannelFailure> },
}

/// Outcome of a successful [`NotificationManager::send`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Channels that accepted the notification.
    pub delivered: Vec<String>,
    pub failed: Vec<ChannelFailure>,
    /// `true` when the active filter dropped the notification; nothing was sent.
    pub filtered: bool,
}

struct Registry {
    notifiers: BTreeMap<String, Arc<dyn Notifier>>,
    filter: NotificationFilter,
}

/// Channel registry plus fan-out.
///
/// Registry and filter share one reader/writer lock: concurrent `send`s
/// proceed in parallel, registry mutation waits for them to finish.
pub struct NotificationManager {
    registry: RwLock<Registry>,
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationManager {
    pub fn new() -> Self {
        Self::with_filter(NotificationFilter::default())
    }

    pub fn with_filter(filter: NotificationFilter) -> Self {
        Self {
            registry: RwLock::new(Registry {
                notifiers: BTreeMap::new(),
                filter,
            }),
        }
    }

    /// Builds the console channel and every configured webhook.
    pub fn from_config(
        config: &NotificationsConfig,
        http_client: Arc<dyn HttpClient>,
    ) -> Result<Self, NotificationError> {
        let mut notifiers: BTreeMap<String, Arc<dyn Notifier>> = BTreeMap::new();

        let mut channels: Vec<Arc<dyn Notifier>> = Vec::new();
        if config.console.enabled {
            channels.push(Arc::new(ConsoleNotifier::new(config.console.name.clone())));
        }
        for webhook in &config.webhooks {
            channels.push(Arc::new(WebhookNotifier::from_config(
                webhook,
                Arc::clone(&http_client),
            )));
        }

        for channel in channels {
            insert_channel(&mut notifiers, channel)?;
        }

        Ok(Self {
            registry: RwLock::new(Registry {
                notifiers,
                filter: config.filter.clone(),
            }),
        })
    }

    pub async fn add_notifier(&self, notifier: Arc<dyn Notifier>) -> Result<(), NotificationError> {
        let mut registry = self.registry.write().await;
        insert_channel(&mut registry.notifiers, notifier)
    }

    pub async fn remove_notifier(&self, name: &str) -> Result<Arc<dyn Notifier>, NotificationError> {
        let mut registry = self.registry.write().await;
        registry
            .notifiers
            .remove(name)
            .ok_or_else(|| NotificationError::ChannelNotFound {
                name: name.to_owned(),
            })
    }

    pub async fn notifier_names(&self) -> Vec<String> {
        self.registry.read().await.notifiers.keys().cloned().collect()
    }

    /// Filters, then delivers to every enabled channel concurrently.
    ///
    /// Succeeds when at least one channel accepts the notification; fails with
    /// [`NotificationError::AllFailed`] when every enabled channel fails.
    pub async fn send(&self, notification: &Notification) -> Result<DeliveryReport, NotificationError> {
        let registry = self.registry.read().await;

        if !registry.filter.should_notify(notification) {
            tracing::debug!(
                id = %notification.id,
                level = %notification.level,
                kind = %notification.kind,
                asset = %notification.asset,
                "notification filtered"
            );
            return Ok(DeliveryReport {
                filtered: true,
                ..DeliveryReport::default()
            });
        }

        let enabled: Vec<&Arc<dyn Notifier>> = registry
            .notifiers
            .values()
            .filter(|notifier| notifier.is_enabled())
            .collect();
        if enabled.is_empty() {
            return Err(NotificationError::NoEnabledChannels);
        }

        let outcomes = join_all(enabled.iter().map(|notifier| async move {
            (notifier.name().to_owned(), notifier.send(notification).await)
        }))
        .await;

        let mut report = DeliveryReport::default();
        for (channel, outcome) in outcomes {
            match outcome {
                Ok(()) => report.delivered.push(channel),
                Err(error) => {
                    tracing::warn!(channel = %channel, id = %notification.id, error = %error, "notifier failed");
                    report.failed.push(ChannelFailure { channel, error });
                }
            }
        }

        if report.delivered.is_empty() {
            return Err(NotificationError::AllFailed {
                failures: report.failed,
            });
        }
        Ok(report)
    }

    /// Delivers to one named channel, bypassing the filter.
    pub async fn send_to(&self, name: &str, notification: &Notification) -> Result<(), NotificationError> {
        let registry = self.registry.read().await;
        let notifier = registry
            .notifiers
            .get(name)
            .ok_or_else(|| NotificationError::ChannelNotFound {
                name: name.to_owned(),
            })?;

        if !notifier.is_enabled() {
            return Err(NotificationError::ChannelDisabled {
                name: name.to_owned(),
            });
        }

        notifier
            .send(notification)
            .await
            .map_err(|error| NotificationError::ChannelFailed {
                name: name.to_owned(),
                error,
            })
    }

    /// Closes every channel and empties the registry. Individual close
    /// failures do not stop the others.
    pub async fn close(&self) -> Result<(), NotificationError> {
        let mut registry = self.registry.write().await;
        let notifiers = std::mem::take(&mut registry.notifiers);

        let mut failures = Vec::new();
        for (channel, notifier) in notifiers {
            if let Err(error) = notifier.close().await {
                failures.push(ChannelFailure { channel, error });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::CloseFailed { failures })
        }
    }

    /// `None` resets to the pass-everything filter.
    pub async fn set_filter(&self, filter: Option<NotificationFilter>) {
        self.registry.write().await.filter = filter.unwrap_or_default();
    }

    pub async fn filter(&self) -> NotificationFilter {
        self.registry.read().await.filter.clone()
    }
}

fn insert_channel(
    notifiers: &mut BTreeMap<String, Arc<dyn Notifier>>,
    notifier: Arc<dyn Notifier>,
) -> Result<(), NotificationError> {
    let name = notifier.name().trim().to_owned();
    if name.is_empty() {
        return Err(NotificationError::EmptyChannelName);
    }
    if notifiers.contains_key(&name) {
        return Err(NotificationError::DuplicateChannel { name });
    }
    notifiers.insert(name, notifier);
    Ok(())
}
