use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{render_template, ChannelError, ChannelFuture, Notification, Notifier};
use crate::config::WebhookConfig;
use crate::http_client::{HttpClient, HttpRequest};

/// Payload dialect expected by the receiving endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookFlavour {
    /// Feishu / Lark custom bot.
    Feishu,
    /// WeCom (WeChat Work) group robot.
    Wecom,
    #[default]
    Generic,
}

impl WebhookFlavour {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Feishu => "feishu",
            Self::Wecom => "wecom",
            Self::Generic => "generic",
        }
    }
}

pub const DEFAULT_TITLE_TEMPLATE: &str = "{{title}}";
pub const DEFAULT_MESSAGE_TEMPLATE: &str = "[{{level}}] {{asset}} {{message}}";

/// POSTs rendered notifications to a chat-bot or generic JSON webhook.
pub struct WebhookNotifier {
    name: String,
    url: String,
    flavour: WebhookFlavour,
    title_template: String,
    message_template: String,
    timeout_ms: u64,
    http_client: Arc<dyn HttpClient>,
    enabled: AtomicBool,
}

impl WebhookNotifier {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        flavour: WebhookFlavour,
        http_client: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            flavour,
            title_template: DEFAULT_TITLE_TEMPLATE.to_owned(),
            message_template: DEFAULT_MESSAGE_TEMPLATE.to_owned(),
            timeout_ms: 10_000,
            http_client,
            enabled: AtomicBool::new(true),
        }
    }

    pub fn from_config(config: &WebhookConfig, http_client: Arc<dyn HttpClient>) -> Self {
        let mut notifier = Self::new(&config.name, &config.url, config.flavour, http_client)
            .with_timeout_ms(config.timeout_ms);
        if let Some(title) = &config.title_template {
            notifier.title_template = title.clone();
        }
        if let Some(message) = &config.message_template {
            notifier.message_template = message.clone();
        }
        notifier.enabled.store(config.enabled, Ordering::SeqCst);
        notifier
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn flavour(&self) -> WebhookFlavour {
        self.flavour
    }

    fn payload(&self, notification: &Notification) -> Value {
        let title = render_template(&self.title_template, notification);
        let message = render_template(&self.message_template, notification);

        match self.flavour {
            WebhookFlavour::Feishu => json!({
                "msg_type": "text",
                "content": { "text": format!("{title}\n{message}") },
            }),
            WebhookFlavour::Wecom => json!({
                "msgtype": "markdown",
                "markdown": { "content": format!("**{title}**\n{message}") },
            }),
            WebhookFlavour::Generic => json!({
                "title": title,
                "message": message,
                "notification": notification,
            }),
        }
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), ChannelError> {
        if !self.is_enabled() {
            return Err(ChannelError::new(format!("channel '{}' is closed", self.name)));
        }

        let request = HttpRequest::post_json(&self.url, self.payload(notification).to_string())
            .with_timeout_ms(self.timeout_ms);
        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|error| ChannelError::new(format!("webhook transport error: {}", error.message())))?;

        if !response.is_success() {
            return Err(ChannelError::new(format!(
                "webhook returned status {}: {}",
                response.status,
                response.body_snippet(120)
            )));
        }

        // Both bot APIs answer 200 and report failures in the body.
        if let Some(code) = bot_error_code(self.flavour, &response.body) {
            return Err(ChannelError::new(format!(
                "{} bot rejected message with code {code}",
                self.flavour.as_str()
            )));
        }

        tracing::debug!(channel = %self.name, id = %notification.id, "webhook delivered");
        Ok(())
    }
}

fn bot_error_code(flavour: WebhookFlavour, body: &str) -> Option<i64> {
    let field = match flavour {
        WebhookFlavour::Feishu => "code",
        WebhookFlavour::Wecom => "errcode",
        WebhookFlavour::Generic => return None,
    };
    let body: Value = serde_json::from_str(body).ok()?;
    body.get(field)?.as_i64().filter(|code| *code != 0)
}

impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn send<'a>(&'a self, notification: &'a Notification) -> ChannelFuture<'a> {
        Box::pin(self.deliver(notification))
    }

    fn close<'a>(&'a self) -> ChannelFuture<'a> {
        Box::pin(async move {
            self.enabled.store(false, Ordering::SeqCst);
            Ok(())
        })
    }
}
