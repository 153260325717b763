use std::time::Duration;

use async_trait::async_trait;
use proxypool::AllQuarantinedSink;

use crate::dispatcher::NotificationDispatcher;
use crate::types::MatchFoundEvent;

const MAX_SEND_ATTEMPTS: usize = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends messages through the Telegram Bot HTTP API directly (`sendMessage`), the
/// same surface `telegram_notifier.py`'s aiogram `Bot.send_message` call ultimately
/// drives. Never routed through the proxy pool — the messenger is not subject to the
/// marketplace's rate limits this system is built to dodge.
pub struct TelegramNotifier {
    http: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            http: reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build().expect("static config"),
            bot_token,
            chat_id,
        }
    }

    async fn send(&self, text: &str) {
        if self.bot_token.is_empty() || self.chat_id.is_empty() {
            tracing::debug!("telegram notifier: not configured, skipping message");
            return;
        }

        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        for attempt in 0..MAX_SEND_ATTEMPTS {
            let result = self
                .http
                .post(&url)
                .json(&serde_json::json!({ "chat_id": self.chat_id, "text": text }))
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => return,
                Ok(resp) => {
                    tracing::warn!(attempt, status = %resp.status(), "telegram notifier: send failed");
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "telegram notifier: request failed");
                }
            }
            if attempt + 1 < MAX_SEND_ATTEMPTS {
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
        }
        tracing::error!("telegram notifier: exhausted retries, dropping notification");
    }
}

#[async_trait]
impl NotificationDispatcher for TelegramNotifier {
    async fn notify_match(&self, event: &MatchFoundEvent) {
        self.send(&event.summary()).await;
    }

    async fn notify_all_proxies_quarantined(&self, quarantined: usize, total: usize) {
        let message = format!(
            "Proxy pool exhausted: {quarantined}/{total} proxies are currently quarantined. \
             The scraping pipeline will wait for revival before resuming."
        );
        self.send(&message).await;
    }
}

#[async_trait]
impl AllQuarantinedSink for TelegramNotifier {
    async fn notify(&self, quarantined: usize, total: usize) {
        self.notify_all_proxies_quarantined(quarantined, total).await;
    }
}
