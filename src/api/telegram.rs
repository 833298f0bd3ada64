//! Outbound notifications: Telegram Bot API or the log.

use std::sync::Arc;

use reqwest::Client;
use tracing::{debug, info, warn};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Best-effort text notification. Never blocks or fails the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, text: &str);
}

/// Telegram settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

impl TelegramConfig {
    /// Read `TELEGRAM_TOKEN` and `TELEGRAM_CHAT_ID`; `None` if either is missing or empty.
    pub fn from_env() -> Option<Self> {
        let bot_token = std::env::var("TELEGRAM_TOKEN").ok().filter(|v| !v.is_empty())?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID").ok().filter(|v| !v.is_empty())?;
        Some(Self { bot_token, chat_id })
    }
}

/// Sends each message on its own task via `sendMessage`.
pub struct TelegramNotifier {
    config: TelegramConfig,
    client: Client,
    base_url: String,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: Client::new(),
            base_url: TELEGRAM_API_BASE.to_string(),
        }
    }

    pub fn from_env() -> Option<Self> {
        TelegramConfig::from_env().map(Self::new)
    }

    fn send_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.base_url, self.config.bot_token)
    }
}

impl Notifier for TelegramNotifier {
    fn notify(&self, text: &str) {
        let client = self.client.clone();
        let url = self.send_url();
        let params = serde_json::json!({
            "chat_id": self.config.chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });

        // Requires a running tokio runtime; outside one the message is only logged.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(text = text, "No runtime for Telegram notification");
            return;
        };

        handle.spawn(async move {
            match client.post(&url).json(&params).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("Telegram notification sent");
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    warn!(status = %status, body = %body, "Telegram notification rejected");
                }
                Err(e) => {
                    warn!(error = %e, "Telegram notification failed");
                }
            }
        });
    }
}

/// Writes notifications to the activity log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, text: &str) {
        info!(notification = text, "Notification");
    }
}

/// Telegram when configured in the environment, the log otherwise.
pub fn notifier_from_env() -> Arc<dyn Notifier> {
    match TelegramNotifier::from_env() {
        Some(telegram) => {
            info!(chat_id = %telegram.config.chat_id, "Telegram notifications enabled");
            Arc::new(telegram)
        }
        None => {
            info!("Telegram not configured, notifications go to the log");
            Arc::new(LogNotifier)
        }
    }
}
