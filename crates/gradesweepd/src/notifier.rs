//! Notification sinks - best-effort status delivery
//!
//! Supports:
//! - Telegram bot messages (sendMessage over HTTPS)
//! - Log-only fallback when no bot is configured
//!
//! Delivery never fails the caller: errors are logged and dropped.

use async_trait::async_trait;
use gradesweep_common::config::NotifyConfig;
use std::time::Duration;
use tracing::{error, info, warn};

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Notification urgency level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationUrgency {
    Low,
    Normal,
    Critical,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str, urgency: NotificationUrgency);
}

/// Writes notifications to the daemon log only
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str, urgency: NotificationUrgency) {
        match urgency {
            NotificationUrgency::Critical => error!("[notify] {}", message),
            NotificationUrgency::Normal => info!("[notify] {}", message),
            NotificationUrgency::Low => info!("[notify] {}", message),
        }
    }
}

pub struct TelegramNotifier {
    client: reqwest::Client,
    url: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(token: &str, chat_id: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Self::with_base_url(TELEGRAM_API, token, chat_id, timeout)
    }

    pub fn with_base_url(
        base_url: &str,
        token: &str,
        chat_id: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}/bot{}/sendMessage", base_url.trim_end_matches('/'), token),
            chat_id: chat_id.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str, urgency: NotificationUrgency) {
        LogNotifier.notify(message, urgency).await;

        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": message,
            "disable_notification": urgency == NotificationUrgency::Low,
        });

        match self.client.post(&self.url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => warn!("Telegram rejected notification: HTTP {}", response.status()),
            Err(e) => warn!("Telegram notification failed: {}", e),
        }
    }
}

/// Telegram when both token and chat id are set, otherwise log-only
pub fn from_config(config: &NotifyConfig) -> Box<dyn Notifier> {
    if let (true, Some(token), Some(chat_id)) = (
        config.telegram_enabled(),
        config.telegram_bot_token.as_deref(),
        config.telegram_chat_id.as_deref(),
    ) {
        match TelegramNotifier::new(token, chat_id, Duration::from_secs(config.timeout_secs)) {
            Ok(notifier) => {
                info!("Telegram notifications enabled");
                return Box::new(notifier);
            }
            Err(e) => warn!("Cannot build Telegram client ({}), logging notifications only", e),
        }
    }
    Box::new(LogNotifier)
}
