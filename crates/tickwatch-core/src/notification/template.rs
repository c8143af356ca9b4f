use std::sync::OnceLock;

use regex::{Captures, Regex};

use super::Notification;

fn placeholder() -> Option<&'static Regex> {
    static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}\}").ok())
        .as_ref()
}

/// Substitutes `{{title}}`, `{{message}}`, `{{asset}}`, `{{strategy}}`,
/// `{{level}}`, `{{type}}`, `{{id}}`, `{{timestamp}}` and `{{data.<key>}}`.
/// Unknown placeholders render as an empty string.
pub fn render_template(template: &str, notification: &Notification) -> String {
    let Some(pattern) = placeholder() else {
        return template.to_owned();
    };

    pattern
        .replace_all(template, |captures: &Captures<'_>| {
            lookup(&captures[1], notification).unwrap_or_default()
        })
        .into_owned()
}

fn lookup(key: &str, notification: &Notification) -> Option<String> {
    if let Some(data_key) = key.strip_prefix("data.") {
        return notification.data.get(data_key).cloned();
    }

    let value = match key {
        "id" => notification.id.clone(),
        "title" => notification.title.clone(),
        "message" => notification.message.clone(),
        "asset" => notification.asset.clone(),
        "strategy" => notification.strategy.clone(),
        "level" => notification.level.as_str().to_uppercase(),
        "type" => notification.kind.as_str().to_owned(),
        "timestamp" => notification.timestamp.format_rfc3339(),
        _ => return None,
    };
    Some(value)
}
