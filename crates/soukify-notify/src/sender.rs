use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, warn};

/// Longest body the relay will carry before we truncate with an ellipsis.
const MAX_BODY_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Message,
    NewProduct,
    Promotion,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::NewProduct => "new_product",
            Self::Promotion => "promotion",
        }
    }
}

/// One push notification addressed to a single user, with correlation ids
/// the client uses to deep-link into the right screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub recipient_id: String,
    pub title: String,
    pub body: String,
    pub kind: NotificationKind,
    pub conversation_id: Option<String>,
    pub shop_id: Option<String>,
    pub product_id: Option<String>,
}

impl Notification {
    pub fn message(
        recipient_id: impl Into<String>,
        sender_name: &str,
        text: &str,
        conversation_id: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            title: format!("New message from {sender_name}"),
            body: truncate_body(text),
            kind: NotificationKind::Message,
            conversation_id: Some(conversation_id.into()),
            shop_id: None,
            product_id: None,
        }
    }

    pub fn new_product(
        recipient_id: impl Into<String>,
        shop_name: &str,
        product_title: &str,
        shop_id: impl Into<String>,
        product_id: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            title: format!("New product at {shop_name}"),
            body: truncate_body(product_title),
            kind: NotificationKind::NewProduct,
            conversation_id: None,
            shop_id: Some(shop_id.into()),
            product_id: Some(product_id.into()),
        }
    }

    pub fn promotion(
        recipient_id: impl Into<String>,
        shop_name: &str,
        promotion_text: &str,
        shop_id: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            title: format!("{shop_name} has a promotion!"),
            body: truncate_body(promotion_text),
            kind: NotificationKind::Promotion,
            conversation_id: None,
            shop_id: Some(shop_id.into()),
            product_id: None,
        }
    }

    /// Same notification readdressed to another recipient.
    pub fn readdress(&self, recipient_id: impl Into<String>) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            ..self.clone()
        }
    }
}

fn truncate_body(text: &str) -> String {
    if text.chars().count() <= MAX_BODY_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(MAX_BODY_CHARS - 3).collect();
    format!("{head}...")
}

/// Fire-and-forget dispatch seam. Failures are logged, never propagated
/// to the operation that triggered the notification.
pub trait NotificationSink: Send + Sync {
    fn dispatch(&self, notification: Notification);
}

/// Relay endpoint and credentials, read from the environment.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub app_id: String,
    pub api_key: String,
    pub api_url: String,
}

impl RelayConfig {
    pub fn from_env() -> Self {
        Self {
            app_id: std::env::var("SOUKIFY_PUSH_APP_ID").unwrap_or_default(),
            api_key: std::env::var("SOUKIFY_PUSH_API_KEY").unwrap_or_default(),
            api_url: std::env::var("SOUKIFY_PUSH_API_URL")
                .unwrap_or_else(|_| "https://onesignal.com/api/v1/notifications".into()),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.app_id.is_empty() && !self.api_key.is_empty()
    }
}

/// Client for the third-party push relay.
#[derive(Clone)]
pub struct NotificationSender {
    client: reqwest::Client,
    config: RelayConfig,
}

impl NotificationSender {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub async fn send(&self, notification: &Notification) -> Result<()> {
        if !self.config.is_configured() {
            debug!(
                recipient = %notification.recipient_id,
                "push relay not configured, dropping notification"
            );
            return Ok(());
        }

        let response = self
            .client
            .post(&self.config.api_url)
            .header("Authorization", format!("Basic {}", self.config.api_key))
            .json(&payload(&self.config.app_id, notification))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("push relay returned {status}: {body}"));
        }

        debug!(
            recipient = %notification.recipient_id,
            kind = notification.kind.as_str(),
            "notification sent"
        );
        Ok(())
    }

    /// Fan one notification out to a follower list. Individual failures
    /// are logged and skipped; returns how many sends succeeded.
    pub async fn announce(&self, recipients: &[String], notification: &Notification) -> usize {
        let mut sent = 0;
        for recipient in recipients {
            match self.send(&notification.readdress(recipient)).await {
                Ok(()) => sent += 1,
                Err(e) => warn!(recipient = %recipient, "announce send failed: {e}"),
            }
        }
        sent
    }
}

impl NotificationSink for NotificationSender {
    fn dispatch(&self, notification: Notification) {
        let sender = self.clone();
        tokio::spawn(async move {
            if let Err(e) = sender.send(&notification).await {
                error!(
                    recipient = %notification.recipient_id,
                    "notification dispatch failed: {e}"
                );
            }
        });
    }
}

fn payload(app_id: &str, n: &Notification) -> serde_json::Value {
    let mut data = json!({ "type": n.kind.as_str() });
    if let Some(id) = &n.conversation_id {
        data["conversationId"] = json!(id);
    }
    if let Some(id) = &n.shop_id {
        data["shopId"] = json!(id);
    }
    if let Some(id) = &n.product_id {
        data["productId"] = json!(id);
    }

    json!({
        "app_id": app_id,
        "include_external_user_ids": [n.recipient_id],
        "headings": { "en": n.title },
        "contents": { "en": n.body },
        "data": data,
        "priority": 10,
        "android_visibility": 1,
    })
}
