use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::NotifyError;
use super::payload::AlertPayload;
use crate::database::models::ChannelKind;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivery strategy for one kind of channel
#[async_trait]
pub trait NotificationSender: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Reject configs that could never deliver, without touching the network.
    fn validate(&self, config: &serde_json::Value) -> Result<(), NotifyError>;

    async fn send(&self, config: &serde_json::Value, payload: &AlertPayload) -> Result<(), NotifyError>;
}

fn parse_config<T: DeserializeOwned>(kind: ChannelKind, config: &serde_json::Value) -> Result<T, NotifyError> {
    serde_json::from_value(config.clone())
        .map_err(|e| NotifyError::InvalidConfig { kind, reason: e.to_string() })
}

fn require_http_url(kind: ChannelKind, field: &str, value: &str) -> Result<(), NotifyError> {
    match url::Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err(NotifyError::InvalidConfig {
            kind,
            reason: format!("{field} must be an http(s) URL"),
        }),
    }
}

async fn post_json(
    client: &reqwest::Client,
    url: &str,
    headers: &BTreeMap<String, String>,
    body: &serde_json::Value,
) -> Result<(), NotifyError> {
    let mut request = client.post(url).timeout(DELIVERY_TIMEOUT).json(body);
    for (name, value) in headers {
        request = request.header(name, value);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(NotifyError::Delivery(format!("{url} answered {status}")));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct WebhookConfig {
    url: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

/// POSTs the alert payload as JSON
pub struct WebhookSender {
    client: reqwest::Client,
}

impl WebhookSender {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    fn validate(&self, config: &serde_json::Value) -> Result<(), NotifyError> {
        let config: WebhookConfig = parse_config(self.kind(), config)?;
        require_http_url(self.kind(), "url", &config.url)
    }

    async fn send(&self, config: &serde_json::Value, payload: &AlertPayload) -> Result<(), NotifyError> {
        let config: WebhookConfig = parse_config(self.kind(), config)?;
        let body = serde_json::to_value(payload)
            .map_err(|e| NotifyError::Delivery(format!("failed to encode payload: {e}")))?;
        post_json(&self.client, &config.url, &config.headers, &body).await
    }
}

#[derive(Debug, Deserialize)]
struct SlackConfig {
    webhook_url: String,
}

/// Posts a text message to a Slack incoming webhook
pub struct SlackSender {
    client: reqwest::Client,
}

impl SlackSender {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NotificationSender for SlackSender {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Slack
    }

    fn validate(&self, config: &serde_json::Value) -> Result<(), NotifyError> {
        let config: SlackConfig = parse_config(self.kind(), config)?;
        require_http_url(self.kind(), "webhook_url", &config.webhook_url)
    }

    async fn send(&self, config: &serde_json::Value, payload: &AlertPayload) -> Result<(), NotifyError> {
        let config: SlackConfig = parse_config(self.kind(), config)?;
        let body = json!({ "text": payload.summary() });
        post_json(&self.client, &config.webhook_url, &BTreeMap::new(), &body).await
    }
}

#[derive(Debug, Deserialize)]
struct EmailConfig {
    relay_url: String,
    from: String,
    #[serde(default)]
    recipients: Vec<String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

/// Hands the message to an HTTP mail relay
pub struct EmailSender {
    client: reqwest::Client,
}

impl EmailSender {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn checked_config(&self, config: &serde_json::Value) -> Result<EmailConfig, NotifyError> {
        let config: EmailConfig = parse_config(self.kind(), config)?;
        require_http_url(self.kind(), "relay_url", &config.relay_url)?;
        if config.recipients.iter().all(|r| r.trim().is_empty()) {
            return Err(NotifyError::InvalidConfig {
                kind: self.kind(),
                reason: "no recipients configured".to_string(),
            });
        }
        if let Some(bad) = config.recipients.iter().find(|r| !r.contains('@')) {
            return Err(NotifyError::InvalidConfig {
                kind: self.kind(),
                reason: format!("invalid recipient '{bad}'"),
            });
        }
        Ok(config)
    }
}

#[async_trait]
impl NotificationSender for EmailSender {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn validate(&self, config: &serde_json::Value) -> Result<(), NotifyError> {
        self.checked_config(config).map(|_| ())
    }

    async fn send(&self, config: &serde_json::Value, payload: &AlertPayload) -> Result<(), NotifyError> {
        let config = self.checked_config(config)?;
        let body = json!({
            "from": config.from,
            "to": config.recipients,
            "subject": payload.subject(),
            "text": payload.summary(),
        });
        post_json(&self.client, &config.relay_url, &config.headers, &body).await
    }
}

/// Channel kind to strategy lookup, built once at startup
#[derive(Clone, Default)]
pub struct SenderRegistry {
    senders: HashMap<ChannelKind, Arc<dyn NotificationSender>>,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Webhook, Slack and email senders sharing one HTTP client
    pub fn with_defaults(client: reqwest::Client) -> Self {
        Self::new()
            .register(Arc::new(WebhookSender::new(client.clone())))
            .register(Arc::new(SlackSender::new(client.clone())))
            .register(Arc::new(EmailSender::new(client)))
    }

    pub fn register(mut self, sender: Arc<dyn NotificationSender>) -> Self {
        self.senders.insert(sender.kind(), sender);
        self
    }

    pub fn get(&self, kind: ChannelKind) -> Result<Arc<dyn NotificationSender>, NotifyError> {
        self.senders.get(&kind).cloned().ok_or(NotifyError::UnsupportedChannel(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> reqwest::Client {
        reqwest::Client::new()
    }

    #[test]
    fn test_webhook_requires_url() {
        let sender = WebhookSender::new(client());
        assert!(sender.validate(&json!({ "url": "https://hooks.example.com/x" })).is_ok());
        assert!(matches!(
            sender.validate(&json!({})),
            Err(NotifyError::InvalidConfig { kind: ChannelKind::Webhook, .. })
        ));
        assert!(sender.validate(&json!({ "url": "ftp://example.com" })).is_err());
    }

    #[test]
    fn test_slack_requires_webhook_url() {
        let sender = SlackSender::new(client());
        assert!(sender.validate(&json!({ "webhook_url": "https://hooks.slack.com/services/T/B/X" })).is_ok());
        assert!(sender.validate(&json!({ "url": "https://hooks.slack.com" })).is_err());
    }

    #[test]
    fn test_email_requires_recipients() {
        let sender = EmailSender::new(client());
        let valid = json!({
            "relay_url": "https://mail.example.com/send",
            "from": "beacon@example.com",
            "recipients": ["ops@example.com"],
        });
        assert!(sender.validate(&valid).is_ok());

        let empty = json!({
            "relay_url": "https://mail.example.com/send",
            "from": "beacon@example.com",
            "recipients": [],
        });
        let err = sender.validate(&empty).unwrap_err();
        assert!(err.to_string().contains("no recipients"));

        let malformed = json!({
            "relay_url": "https://mail.example.com/send",
            "from": "beacon@example.com",
            "recipients": ["ops"],
        });
        assert!(sender.validate(&malformed).is_err());
    }

    #[test]
    fn test_registry_lookup() {
        let registry = SenderRegistry::with_defaults(client());
        for kind in [ChannelKind::Email, ChannelKind::Webhook, ChannelKind::Slack] {
            assert_eq!(registry.get(kind).unwrap().kind(), kind);
        }
        assert!(matches!(
            SenderRegistry::new().get(ChannelKind::Slack),
            Err(NotifyError::UnsupportedChannel(ChannelKind::Slack))
        ));
    }
}
