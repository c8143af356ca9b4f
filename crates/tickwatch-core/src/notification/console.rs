use std::sync::atomic::{AtomicBool, Ordering};

use super::{ChannelError, ChannelFuture, Notification, NotificationLevel, Notifier};

/// Writes notifications to the structured log.
pub struct ConsoleNotifier {
    name: String,
    enabled: AtomicBool,
}

impl ConsoleNotifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: AtomicBool::new(true),
        }
    }

    #[cfg(test)]
    pub(crate) fn disabled(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: AtomicBool::new(false),
        }
    }
}

impl Default for ConsoleNotifier {
    fn default() -> Self {
        Self::new("console")
    }
}

impl Notifier for ConsoleNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn send<'a>(&'a self, notification: &'a Notification) -> ChannelFuture<'a> {
        Box::pin(async move {
            if !self.is_enabled() {
                return Err(ChannelError::new(format!("channel '{}' is closed", self.name)));
            }

            match notification.level {
                NotificationLevel::Info => tracing::info!(
                    channel = %self.name,
                    id = %notification.id,
                    kind = %notification.kind,
                    asset = %notification.asset,
                    strategy = %notification.strategy,
                    title = %notification.title,
                    "{}",
                    notification.message
                ),
                NotificationLevel::Warning => tracing::warn!(
                    channel = %self.name,
                    id = %notification.id,
                    kind = %notification.kind,
                    asset = %notification.asset,
                    strategy = %notification.strategy,
                    title = %notification.title,
                    "{}",
                    notification.message
                ),
                NotificationLevel::Error | NotificationLevel::Critical => tracing::error!(
                    channel = %self.name,
                    id = %notification.id,
                    kind = %notification.kind,
                    level = %notification.level,
                    asset = %notification.asset,
                    strategy = %notification.strategy,
                    title = %notification.title,
                    "{}",
                    notification.message
                ),
            }
            Ok(())
        })
    }

    fn close<'a>(&'a self) -> ChannelFuture<'a> {
        Box::pin(async move {
            self.enabled.store(false, Ordering::SeqCst);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::NotificationType;

    #[tokio::test]
    async fn closed_console_rejects_sends() {
        let console = ConsoleNotifier::default();
        let notification =
            Notification::new(NotificationType::SystemAlert, NotificationLevel::Error, "t", "m");

        console.send(&notification).await.expect("delivers while open");
        console.close().await.expect("closes");

        assert!(!console.is_enabled());
        assert!(console.send(&notification).await.is_err());
    }
}
